//! Spreading decorations across access chains
//!
//! The decoration pipeline puts `known`/`unknown` on whatever the user
//! wrote it next to, which for `balances[msg.sender]` is the index access
//! rather than the identifier. Decorations flow down from an index access
//! to its base, and both ways across a member access.

use veil_ast::{Decorations, Field, NodeIdx, NodeType};

use crate::context::CompilationContext;
use crate::error::AnalysisError;
use crate::traverse::Pass;

pub struct DecorationPropagation;

impl Pass for DecorationPropagation {
    fn name(&self) -> &'static str {
        "decoration-propagation"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        let len = ctx.ast().len();
        // pre-order: outer accesses reach their innermost base in one sweep
        for i in 0..len {
            let idx = NodeIdx(i as u32);
            let base = match ctx.ast().node_type(idx) {
                NodeType::IndexAccess => ctx.ast().child(idx, Field::BaseExpression),
                NodeType::MemberAccess => ctx.ast().child(idx, Field::Expression),
                _ => None,
            };
            if let Some(base) = base {
                copy(ctx, idx, base);
            }
        }
        for i in (0..len).rev() {
            let idx = NodeIdx(i as u32);
            if ctx.ast().node_type(idx) != NodeType::MemberAccess {
                continue;
            }
            if let Some(receiver) = ctx.ast().child(idx, Field::Expression) {
                copy(ctx, receiver, idx);
            }
        }
        Ok(())
    }
}

fn copy(ctx: &mut CompilationContext, from: NodeIdx, to: NodeIdx) {
    let decorations = Decorations {
        is_per: false,
        ..ctx.decorations(from)
    };
    let facts = ctx.facts_mut(to);
    facts.propagated = facts.propagated.union(decorations);
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_ast::{Ast, AstBuilder, Decorate};

    use crate::options::AnalysisOptions;

    #[test]
    fn index_decorations_reach_the_mapping_identifier() {
        let mut b = AstBuilder::new();
        let balances = b.mapping_var("balances", "address", "uint256").secret();
        let base = b.ident(&balances);
        let key = b.msg_sender();
        let access = b.index(base, key).unknown();
        let stmt = b.expr_stmt(access);
        let f = b.function("peek", vec![], vec![stmt]);
        let c = b.contract("Bank", vec![balances.node.clone(), f]);
        let ast = Ast::from_json(b.source_unit(vec![c])).unwrap();
        let mut ctx = CompilationContext::new(ast, AnalysisOptions::default());
        DecorationPropagation.run(&mut ctx).unwrap();

        let ident = ctx
            .ast()
            .iter()
            .find(|n| n.node_type == NodeType::Identifier && n.name() == "balances")
            .map(|n| n.idx)
            .unwrap();
        assert!(ctx.decorations(ident).is_unknown);
        assert!(!ctx.ast().node(ident).decorations.is_unknown);

        // the key is not the base, so it stays undecorated
        let msg = ctx
            .ast()
            .iter()
            .find(|n| n.node_type == NodeType::MemberAccess)
            .map(|n| n.idx)
            .unwrap();
        assert!(!ctx.decorations(msg).is_unknown);
    }

    #[test]
    fn member_decorations_flow_up_from_the_receiver() {
        let mut b = AstBuilder::new();
        let (struct_id, account) = b.struct_def("Bank", "Account", vec![]);
        let ty = b.user_defined("struct Bank.Account", struct_id);
        let mut holder = b.state_var("holder", "uint256");
        holder.node["typeName"] = ty;
        holder.node["typeDescriptions"]["typeString"] = "struct Bank.Account".into();
        let holder = holder.secret();
        let receiver = b.ident(&holder).known();
        let member = b.member(receiver, "amount", "uint256");
        let stmt = b.expr_stmt(member);
        let f = b.function("peek", vec![], vec![stmt]);
        let c = b.contract("Bank", vec![account, holder.node.clone(), f]);
        let ast = Ast::from_json(b.source_unit(vec![c])).unwrap();
        let mut ctx = CompilationContext::new(ast, AnalysisOptions::default());
        DecorationPropagation.run(&mut ctx).unwrap();

        let member = ctx
            .ast()
            .iter()
            .find(|n| n.node_type == NodeType::MemberAccess)
            .map(|n| n.idx)
            .unwrap();
        assert!(ctx.decorations(member).is_known);
    }
}
