//! The build pass: paths, scopes, bindings and indicators
//!
//! Runs as two traversals. The first places every node (path entry and
//! scope) and binds every declaration; the second resolves references,
//! which is why a function may use a state variable declared after it.

use tracing::debug;
use veil_ast::NodeType;

use crate::binding::is_bindable;
use crate::context::CompilationContext;
use crate::error::AnalysisError;
use crate::path::PathEntry;
use crate::traverse::{traverse, Flow, Pass, Visit, Visitor};

pub struct Build;

impl Pass for Build {
    fn name(&self) -> &'static str {
        "build"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        traverse(ctx, &mut Declarations)?;
        traverse(ctx, &mut References)?;
        debug!(
            scopes = ctx.scopes().len(),
            bindings = ctx.bindings().len(),
            indicators = ctx.state_indicators().len(),
            "built"
        );
        Ok(())
    }
}

struct Declarations;

impl Visitor for Declarations {
    fn enter(&mut self, ctx: &mut CompilationContext, visit: &Visit) -> Result<Flow, AnalysisError> {
        let node_type = ctx.ast().node_type(visit.node);
        let parent_scope = visit.parent.map(|p| ctx.scope_of(p)).transpose()?;
        let scope = match (node_type.is_scopable(), parent_scope) {
            (true, parent) => ctx.create_scope(visit.node, parent)?,
            (false, Some(parent)) => parent,
            (false, None) => {
                let node = ctx.node(visit.node);
                return Err(AnalysisError::MalformedPath {
                    detail: format!("the root is a {}, not a SourceUnit", node.node_type),
                    node: visit.node,
                    src: node.src,
                });
            }
        };
        let entry = PathEntry::new(ctx, visit.node, visit.parent, visit.key, visit.index, scope)?;
        ctx.insert_path(entry)?;

        if is_bindable(node_type) {
            // contracts and functions are named in the scope around them
            let bind_in = match node_type {
                NodeType::ContractDefinition | NodeType::FunctionDefinition => parent_scope.unwrap_or(scope),
                _ => scope,
            };
            ctx.create_binding(visit.node, bind_in)?;
        }
        Ok(Flow::Continue)
    }
}

struct References;

impl Visitor for References {
    fn enter(&mut self, ctx: &mut CompilationContext, visit: &Visit) -> Result<Flow, AnalysisError> {
        ctx.update_scope(visit.node)?;
        Ok(Flow::Continue)
    }
}
