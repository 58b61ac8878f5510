//! Decorators that contradict each other or the state they sit on

use veil_ast::{NodeIdx, NodeType};

use crate::context::CompilationContext;
use crate::error::AnalysisError;
use crate::passes::nodes_of_type;
use crate::traverse::Pass;
use crate::warning::WarningKind;

pub struct DecoratorChecks;

impl Pass for DecoratorChecks {
    fn name(&self) -> &'static str {
        "decorator-checks"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        for ident in nodes_of_type(ctx, NodeType::Identifier) {
            check_identifier(ctx, ident)?;
        }
        Ok(())
    }
}

fn check_identifier(ctx: &mut CompilationContext, ident: NodeIdx) -> Result<(), AnalysisError> {
    if ctx.path(ident).is_pseudo_identifier() {
        return Ok(());
    }
    let Some(binding) = ctx.referenced_binding(ident) else {
        return Ok(());
    };
    let binding = ctx.binding(binding);
    if !binding.is_state_variable() {
        return Ok(());
    }
    let decorations = ctx.decorations(ident);
    let node = ctx.node(ident);
    let name = &binding.name;

    if !binding.is_secret() {
        for (set, decorator) in [
            (decorations.is_unknown, "unknown"),
            (decorations.reinitialisable, "reinitialisable"),
        ] {
            if set {
                return Err(AnalysisError::syntax_usage(
                    format!(
                        "Identifier '{}' is decorated as '{}' but is not decorated as 'secret'. Only secret states can be decorated as '{}'.",
                        name, decorator, decorator
                    ),
                    node,
                ));
            }
        }
        if decorations.is_known {
            let message = format!(
                "PEDANTIC: Superfluous 'known' decorator. A conventional smart contract state variable ({}) is 'known' by its very nature.",
                name
            );
            let src = node.src;
            ctx.warn(WarningKind::Pedantic, message, Some(src));
        }
        return Ok(());
    }

    let usage = &binding.usage;
    if (decorations.is_known && usage.is_unknown) || (decorations.is_unknown && usage.is_known) {
        return Err(AnalysisError::syntax_usage(
            format!(
                "Variable {} is marked as both unknown and known. Try removing 'known' from decremented states",
                name
            ),
            node,
        ));
    }
    if (decorations.is_unknown && usage.reinitialisable) || (decorations.reinitialisable && usage.is_unknown) {
        return Err(AnalysisError::syntax_usage(
            format!(
                "Variable {} is marked as both unknown and reinitialisable. You must know a state's value to be able to initialise it!",
                name
            ),
            node,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::AnalysisOptions;
    use crate::test_support::{analysed, analysed_with};
    use veil_ast::{AstBuilder, Decorate};

    #[test]
    fn known_and_unknown_on_different_lines_conflict() {
        let mut b = AstBuilder::new();
        let balance = b.state_var("balance", "uint256").secret();
        let amount = b.param("amount", "uint256");
        let lhs = b.ident(&balance).known();
        let rhs = b.ident(&amount);
        let first = b.assign_stmt(lhs, "+=", rhs);
        let lhs = b.ident(&balance).unknown();
        let rhs = b.ident(&amount);
        let second = b.assign_stmt(lhs, "+=", rhs);
        let f = b.function("add", vec![amount], vec![first, second]);
        let c = b.contract("Wallet", vec![balance.node.clone(), f]);
        let err = analysed(b.source_unit(vec![c])).unwrap_err();
        assert!(err.to_string().contains("marked as both unknown and known"));
    }

    #[test]
    fn public_states_cannot_be_unknown() {
        let mut b = AstBuilder::new();
        let total = b.state_var("total", "uint256");
        let lhs = b.ident(&total).unknown();
        let one = b.literal("1");
        let stmt = b.assign_stmt(lhs, "+=", one);
        let f = b.function("bump", vec![], vec![stmt]);
        let c = b.contract("Counter", vec![total.node.clone(), f]);
        let err = analysed(b.source_unit(vec![c])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Identifier 'total' is decorated as 'unknown' but is not decorated as 'secret'. Only secret states can be decorated as 'unknown'."
        );
    }

    #[test]
    fn superfluous_known_is_pedantic() {
        let source = || {
            let mut b = AstBuilder::new();
            let total = b.state_var("total", "uint256");
            let lhs = b.ident(&total).known();
            let one = b.literal("1");
            let stmt = b.assign_stmt(lhs, "+=", one);
            let f = b.function("bump", vec![], vec![stmt]);
            let c = b.contract("Counter", vec![total.node.clone(), f]);
            b.source_unit(vec![c])
        };
        let quiet = analysed(source()).unwrap();
        assert!(quiet.warnings().iter().all(|w| w.kind != WarningKind::Pedantic));

        let options = AnalysisOptions {
            pedantic: true,
            ..AnalysisOptions::default()
        };
        let loud = analysed_with(source(), options).unwrap();
        assert!(loud
            .warnings()
            .iter()
            .any(|w| w.kind == WarningKind::Pedantic && w.message.contains("(total)")));
    }
}
