//! Decide which functions take `msg.sender` as a circuit input

use veil_ast::{Field, NodeType};

use crate::context::CompilationContext;
use crate::error::AnalysisError;
use crate::passes::nodes_of_type;
use crate::scope::ScopeKind;
use crate::traverse::Pass;

pub struct MsgSenderParam;

impl Pass for MsgSenderParam {
    fn name(&self) -> &'static str {
        "msg-sender-param"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        for member in nodes_of_type(ctx, NodeType::MemberAccess) {
            let path = ctx.path(member);
            if !path.is_msg_sender() {
                continue;
            }
            let Some(function) = ctx.enclosing_scope(member, ScopeKind::Function) else {
                continue;
            };
            if !ctx.modifies_secret_state(function) {
                continue;
            }
            let is_mapping_key = path.key() == Some(Field::IndexExpression);
            let expression = path
                .ancestor_of_type(NodeType::ExpressionStatement)
                .or_else(|| path.ancestor_of_type(NodeType::Assignment))
                .or_else(|| path.ancestor_of_type(NodeType::BinaryOperation));
            let Some(expression) = expression else {
                continue;
            };
            let facts = ctx.facts(expression.idx());
            // a secret value needs it, and so does a key shared between a
            // public and a secret state, or the caller could cheat
            let needed = (!is_mapping_key && facts.contains_secret) || (facts.contains_public && facts.contains_secret);
            if needed {
                if let Some(f) = ctx.scope_mut(function).function_indicator_mut() {
                    f.msg_sender_param = true;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ScopeId;
    use crate::test_support::analysed;
    use veil_ast::{AstBuilder, Decorate};

    fn msg_sender_param(source: serde_json::Value) -> bool {
        let analysis = analysed(source).unwrap();
        analysis
            .context()
            .scope(ScopeId(2))
            .function_indicator()
            .map_or(false, |f| f.msg_sender_param)
    }

    #[test]
    fn a_secret_key_alone_needs_no_input() {
        let mut b = AstBuilder::new();
        let balances = b.mapping_var("balances", "address", "uint256").secret();
        let amount = b.param("amount", "uint256").secret();
        let base = b.ident(&balances);
        let key = b.msg_sender();
        let lhs = b.index(base, key).unknown();
        let rhs = b.ident(&amount);
        let stmt = b.assign_stmt(lhs, "+=", rhs);
        let f = b.function("deposit", vec![amount], vec![stmt]);
        let c = b.contract("Bank", vec![balances.node.clone(), f]);
        assert!(!msg_sender_param(b.source_unit(vec![c])));
    }

    #[test]
    fn a_secret_value_of_msg_sender_needs_it() {
        let mut b = AstBuilder::new();
        let admin = b.state_var("admin", "address").secret();
        let lhs = b.ident(&admin);
        let rhs = b.msg_sender();
        let stmt = b.assign_stmt(lhs, "=", rhs);
        let f = b.function("claim", vec![], vec![stmt]);
        let c = b.contract("Office", vec![admin.node.clone(), f]);
        assert!(msg_sender_param(b.source_unit(vec![c])));
    }
}
