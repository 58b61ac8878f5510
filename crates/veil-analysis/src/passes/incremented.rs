//! Classify every write to a secret state as an increment, decrement or
//! overwrite, and record it on the binding and the function's indicator

use tracing::debug;
use veil_ast::{Field, NodeType};

use crate::context::CompilationContext;
use crate::error::AnalysisError;
use crate::incrementation::classify;
use crate::passes::nodes_of_type;
use crate::scope::ScopeKind;
use crate::traverse::Pass;
use crate::warning::WarningKind;

const MIXED_OPERATORS: &str = "When we mix positive and negative operands in assigning to a secret variable, we may encounter underflow errors. Make sure that incrementing (a = a + ...) always increases the secret state value while decrementing (a = a - ...) decreases it. Whenever we see something like a = a + b - c, we assume it's a positive incrementation, so b > c. Similarly, we assume a = a - b + c is a decrementation, so c - b < a.";

pub struct Incrementations;

impl Pass for Incrementations {
    fn name(&self) -> &'static str {
        "incrementations"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        for statement in nodes_of_type(ctx, NodeType::ExpressionStatement) {
            let Some(inc) = classify(ctx, statement)? else {
                continue;
            };
            debug!(
                statement = %ctx.node(statement).src,
                incremented = inc.is_incremented,
                decremented = inc.is_decremented,
                "classified write"
            );
            let expression = ctx.ast().child(statement, Field::Expression);
            for idx in std::iter::once(statement).chain(expression) {
                let facts = ctx.facts_mut(idx);
                facts.is_incremented = Some(inc.is_incremented);
                facts.is_decremented = Some(inc.is_decremented);
                facts.incremented_declaration = Some(inc.declaration);
            }
            if inc.mixed_operators {
                let src = ctx.node(statement).src;
                ctx.warn(WarningKind::MixedOperators, MIXED_OPERATORS, Some(src));
            }

            let Some(binding) = ctx.binding_for_decl(inc.declaration) else {
                continue;
            };
            ctx.binding_update_incrementation(binding, &inc)?;
            let indicator = ctx
                .enclosing_scope(statement, ScopeKind::Function)
                .and_then(|function| ctx.state_indicator_in(function, inc.declaration));
            if let Some(indicator) = indicator {
                ctx.indicator_update_incrementation(indicator, &inc)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ScopeId;
    use crate::test_support::built;
    use veil_ast::{AstBuilder, Decorate};

    #[test]
    fn records_facts_on_statement_and_expression() {
        let mut b = AstBuilder::new();
        let balance = b.state_var("balance", "uint256").secret();
        let amount = b.param("amount", "uint256");
        let lhs = b.ident(&balance).unknown();
        let rhs = b.ident(&amount);
        let stmt = b.assign_stmt(lhs, "-=", rhs);
        let f = b.function("spend", vec![amount], vec![stmt]);
        let c = b.contract("Wallet", vec![balance.node.clone(), f]);
        let mut ctx = built(b.source_unit(vec![c]));
        Incrementations.run(&mut ctx).unwrap();

        let statement = ctx
            .ast()
            .iter()
            .find(|n| n.node_type == NodeType::ExpressionStatement)
            .map(|n| n.idx)
            .unwrap();
        let assignment = ctx.ast().child(statement, Field::Expression).unwrap();
        for idx in [statement, assignment] {
            let facts = ctx.facts(idx);
            assert_eq!(facts.is_incremented, Some(true));
            assert_eq!(facts.is_decremented, Some(true));
            assert_eq!(facts.incremented_declaration, Some(balance.id));
        }
        let sid = ctx.state_indicator_in(ScopeId(2), balance.id).unwrap();
        let usage = &ctx.state_indicator(sid).usage;
        assert!(usage.is_decremented && usage.is_nullified);
        assert!(!usage.is_whole);
    }

    #[test]
    fn mixed_operators_warn() {
        let mut b = AstBuilder::new();
        let balance = b.state_var("balance", "uint256").secret();
        let x = b.param("x", "uint256");
        let y = b.param("y", "uint256");
        let lhs = b.ident(&balance).unknown();
        let read = b.ident(&balance);
        let add = b.ident(&x);
        let sub = b.ident(&y);
        let sum = b.binary(read, "+", add);
        let rhs = b.binary(sum, "-", sub);
        let stmt = b.assign_stmt(lhs, "=", rhs);
        let f = b.function("adjust", vec![x, y], vec![stmt]);
        let c = b.contract("Wallet", vec![balance.node.clone(), f]);
        let mut ctx = built(b.source_unit(vec![c]));
        Incrementations.run(&mut ctx).unwrap();
        assert!(ctx.warnings().iter().any(|w| w.kind == WarningKind::MixedOperators));
    }

    #[test]
    fn public_writes_are_left_alone() {
        let mut b = AstBuilder::new();
        let total = b.state_var("total", "uint256");
        let lhs = b.ident(&total);
        let one = b.literal("1");
        let stmt = b.assign_stmt(lhs, "+=", one);
        let f = b.function("bump", vec![], vec![stmt]);
        let c = b.contract("Counter", vec![total.node.clone(), f]);
        let mut ctx = built(b.source_unit(vec![c]));
        Incrementations.run(&mut ctx).unwrap();
        assert!(ctx.ast().iter().all(|n| ctx.facts(n.idx).is_incremented.is_none()));
    }
}
