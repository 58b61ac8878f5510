//! The traversal driver and the pass interface
//!
//! Every pass walks the tree in source order, depth first, calling
//! `enter` on the way down and `exit` on the way up. Visitors get the
//! context mutably, so a child list is copied before descending.

use veil_ast::{Field, NodeIdx};

use crate::context::CompilationContext;
use crate::error::AnalysisError;

/// What the driver does after a visitor callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Don't descend into this node's children (only meaningful on `enter`)
    Skip,
    /// Abandon the rest of the traversal
    Stop,
}

/// One step of a traversal: the node and where its parent holds it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit {
    pub node: NodeIdx,
    pub parent: Option<NodeIdx>,
    pub key: Field,
    pub index: Option<usize>,
}

pub trait Visitor {
    fn enter(&mut self, _ctx: &mut CompilationContext, _visit: &Visit) -> Result<Flow, AnalysisError> {
        Ok(Flow::Continue)
    }

    fn exit(&mut self, _ctx: &mut CompilationContext, _visit: &Visit) -> Result<Flow, AnalysisError> {
        Ok(Flow::Continue)
    }
}

/// A named step of the analysis pipeline
pub trait Pass {
    fn name(&self) -> &'static str;

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError>;
}

/// Walk the whole tree
pub fn traverse(ctx: &mut CompilationContext, visitor: &mut dyn Visitor) -> Result<(), AnalysisError> {
    let root = Visit {
        node: ctx.ast().root(),
        parent: None,
        key: Field::Ast,
        index: None,
    };
    walk(ctx, root, visitor).map(|_| ())
}

/// Walk one subtree. Returns `Flow::Stop` when a visitor stopped it.
pub fn walk(ctx: &mut CompilationContext, visit: Visit, visitor: &mut dyn Visitor) -> Result<Flow, AnalysisError> {
    match visitor.enter(ctx, &visit)? {
        Flow::Stop => return Ok(Flow::Stop),
        Flow::Skip => return visitor.exit(ctx, &visit),
        Flow::Continue => {}
    }
    for child in children(ctx, visit.node) {
        if walk(ctx, child, visitor)? == Flow::Stop {
            return Ok(Flow::Stop);
        }
    }
    visitor.exit(ctx, &visit)
}

/// The children a traversal visits, in order
pub fn children(ctx: &CompilationContext, parent: NodeIdx) -> Vec<Visit> {
    let node = ctx.node(parent);
    node.node_type
        .visitable_fields()
        .iter()
        .filter_map(|field| node.slot(*field).map(|slot| (*field, slot)))
        .flat_map(|(key, slot)| {
            slot.entries().into_iter().map(move |(index, child)| Visit {
                node: child,
                parent: Some(parent),
                key,
                index,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::AnalysisOptions;
    use veil_ast::{Ast, AstBuilder, NodeType};

    #[derive(Default)]
    struct Recorder {
        events: Vec<(bool, NodeType)>,
        skip: Option<NodeType>,
        stop_at: Option<NodeType>,
    }

    impl Visitor for Recorder {
        fn enter(&mut self, ctx: &mut CompilationContext, visit: &Visit) -> Result<Flow, AnalysisError> {
            let ty = ctx.ast().node_type(visit.node);
            self.events.push((true, ty));
            if Some(ty) == self.stop_at {
                return Ok(Flow::Stop);
            }
            Ok(if Some(ty) == self.skip { Flow::Skip } else { Flow::Continue })
        }

        fn exit(&mut self, ctx: &mut CompilationContext, visit: &Visit) -> Result<Flow, AnalysisError> {
            self.events.push((false, ctx.ast().node_type(visit.node)));
            Ok(Flow::Continue)
        }
    }

    fn context() -> CompilationContext {
        let mut b = AstBuilder::new();
        let balances = b.mapping_var("balances", "address", "uint256");
        let base = b.ident(&balances);
        let key = b.msg_sender();
        let access = b.index(base, key);
        let stmt = b.expr_stmt(access);
        let f = b.function("peek", vec![], vec![stmt]);
        let c = b.contract("Bank", vec![balances.node.clone(), f]);
        let ast = Ast::from_json(b.source_unit(vec![c])).unwrap();
        CompilationContext::new(ast, AnalysisOptions::default())
    }

    #[test]
    fn visits_index_before_base_and_exits_in_reverse() {
        let mut ctx = context();
        let mut recorder = Recorder::default();
        traverse(&mut ctx, &mut recorder).unwrap();
        let entered: Vec<_> = recorder
            .events
            .iter()
            .filter(|(enter, _)| *enter)
            .map(|(_, ty)| *ty)
            .collect();
        let access = entered.iter().position(|t| *t == NodeType::IndexAccess).unwrap();
        assert_eq!(entered[access + 1], NodeType::MemberAccess);
        assert_eq!(recorder.events.first(), Some(&(true, NodeType::SourceUnit)));
        assert_eq!(recorder.events.last(), Some(&(false, NodeType::SourceUnit)));
        assert_eq!(recorder.events.len(), entered.len() * 2);
    }

    #[test]
    fn skip_prunes_children_and_stop_ends_the_walk() {
        let mut ctx = context();
        let mut recorder = Recorder {
            skip: Some(NodeType::FunctionDefinition),
            ..Recorder::default()
        };
        traverse(&mut ctx, &mut recorder).unwrap();
        assert!(!recorder.events.iter().any(|(_, ty)| *ty == NodeType::IndexAccess));
        assert!(recorder.events.contains(&(false, NodeType::FunctionDefinition)));

        let mut recorder = Recorder {
            stop_at: Some(NodeType::IndexAccess),
            ..Recorder::default()
        };
        traverse(&mut ctx, &mut recorder).unwrap();
        assert_eq!(recorder.events.last(), Some(&(true, NodeType::IndexAccess)));
        assert!(!recorder.events.contains(&(false, NodeType::FunctionDefinition)));
        assert!(!recorder.events.contains(&(false, NodeType::SourceUnit)));
    }
}
