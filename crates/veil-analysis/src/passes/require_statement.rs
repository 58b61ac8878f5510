//! Whether a `require` has to move into the circuit to keep its operands
//! secret

use veil_ast::NodeType;

use crate::context::CompilationContext;
use crate::error::AnalysisError;
use crate::passes::nodes_of_type;
use crate::traverse::Pass;

pub struct RequireStatements;

impl Pass for RequireStatements {
    fn name(&self) -> &'static str {
        "require-statements"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        for call in nodes_of_type(ctx, NodeType::FunctionCall) {
            if !ctx.path(call).is_require_statement() {
                continue;
            }
            let mut private = false;
            for idx in ctx.ast().subtree(call) {
                let Some(binding) = ctx.referenced_binding(idx) else {
                    continue;
                };
                let binding = ctx.binding(binding);
                if !binding.is_secret() {
                    continue;
                }
                if binding.usage.is_partitioned {
                    return Err(AnalysisError::syntax_usage(
                        format!(
                            "Require statement cannot be used on partitioned secret state '{}'. Partitioned states are checked internally when they are nullified.",
                            binding.name
                        ),
                        ctx.node(call),
                    ));
                }
                private = true;
                break;
            }
            ctx.facts_mut(call).require_statement_private = private;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::built;
    use crate::passes::Incrementations;
    use veil_ast::{AstBuilder, Decorate};

    #[test]
    fn requires_over_secrets_are_private() {
        let mut b = AstBuilder::new();
        let limit = b.state_var("limit", "uint256");
        let amount = b.param("amount", "uint256").secret();
        let left = b.ident(&amount);
        let right = b.ident(&limit);
        let check = b.binary(left, "<", right);
        let secret_check = b.require(check);
        let left = b.ident(&limit);
        let zero = b.literal("0");
        let check = b.binary(left, ">", zero);
        let public_check = b.require(check);
        let f = b.function("spend", vec![amount], vec![secret_check, public_check]);
        let c = b.contract("C", vec![limit.node.clone(), f]);
        let mut ctx = built(b.source_unit(vec![c]));
        RequireStatements.run(&mut ctx).unwrap();

        let flags: Vec<_> = ctx
            .ast()
            .iter()
            .filter(|n| n.node_type == NodeType::FunctionCall)
            .map(|n| ctx.facts(n.idx).require_statement_private)
            .collect();
        assert_eq!(flags, vec![true, false]);
    }

    #[test]
    fn partitioned_states_cannot_be_required() {
        let mut b = AstBuilder::new();
        let balance = b.state_var("balance", "uint256").secret();
        let lhs = b.ident(&balance).unknown();
        let one = b.literal("1");
        let bump = b.assign_stmt(lhs, "+=", one);
        let read = b.ident(&balance);
        let zero = b.literal("0");
        let check = b.binary(read, ">", zero);
        let check = b.require(check);
        let f = b.function("bump", vec![], vec![bump, check]);
        let c = b.contract("C", vec![balance.node.clone(), f]);
        let mut ctx = built(b.source_unit(vec![c]));
        Incrementations.run(&mut ctx).unwrap();
        let err = RequireStatements.run(&mut ctx).unwrap_err();
        assert!(err.to_string().contains("partitioned secret state 'balance'"));
    }
}
