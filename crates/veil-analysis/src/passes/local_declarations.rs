use veil_ast::{Field, NodeType};

use crate::context::CompilationContext;
use crate::error::AnalysisError;
use crate::traverse::Pass;
use crate::warning::WarningKind;

const LOCAL_DECLARATION: &str = "Local state declarations aren't fully supported yet, because their possible interactions with private states complicate things considerably. If the local state you've declared interacts with a secret variable, transpilation might result in bugs at the moment. We're actively working on it.";

/// Warns, once per compilation, about local variables declared in a
/// function body
pub struct LocalDeclarations;

impl Pass for LocalDeclarations {
    fn name(&self) -> &'static str {
        "local-declarations"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        if !ctx.options().warn_local_declarations || ctx.local_declaration_warned {
            return Ok(());
        }
        let first = ctx.ast().iter().map(|n| n.idx).find(|idx| {
            let path = ctx.path(*idx);
            matches!(
                path.node_type(),
                NodeType::VariableDeclarationStatement | NodeType::VariableDeclaration
            ) && path.is_contained_within(Field::Body)
        });
        if let Some(first) = first {
            let src = ctx.node(first).src;
            ctx.warn(WarningKind::LocalDeclaration, LOCAL_DECLARATION, Some(src));
            ctx.local_declaration_warned = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::AnalysisOptions;
    use crate::test_support::{analysed, analysed_with};
    use veil_ast::AstBuilder;

    fn two_locals() -> serde_json::Value {
        let mut b = AstBuilder::new();
        let x = b.param("x", "uint256");
        let y = b.param("y", "uint256");
        let one = b.literal("1");
        let first = b.declare(&x, Some(one));
        let two = b.literal("2");
        let second = b.declare(&y, Some(two));
        let f = b.function("f", vec![], vec![first, second]);
        let c = b.contract("C", vec![f]);
        b.source_unit(vec![c])
    }

    #[test]
    fn warns_once() {
        let analysis = analysed(two_locals()).unwrap();
        let count = analysis
            .warnings()
            .iter()
            .filter(|w| w.kind == WarningKind::LocalDeclaration)
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn can_be_switched_off() {
        let options = AnalysisOptions {
            warn_local_declarations: false,
            ..AnalysisOptions::default()
        };
        let analysis = analysed_with(two_locals(), options).unwrap();
        assert!(analysis.warnings().is_empty());
    }

    #[test]
    fn parameters_are_not_locals() {
        let mut b = AstBuilder::new();
        let x = b.param("x", "uint256");
        let f = b.function("f", vec![x], vec![]);
        let c = b.contract("C", vec![f]);
        let analysis = analysed(b.source_unit(vec![c])).unwrap();
        assert!(analysis.warnings().is_empty());
    }
}
