//! Which expressions contain, and which statements interact with, secret
//! or public state
//!
//! An identifier of a secret (or public state) binding marks every
//! ancestor as containing it, and every identifier of its statement as
//! interacting with it. External calls count as public.

use veil_ast::{NodeIdx, NodeType};

use crate::context::CompilationContext;
use crate::error::AnalysisError;
use crate::scope::ScopeKind;
use crate::traverse::{traverse, Flow, Pass, Visit, Visitor};

pub struct InteractsWithSecret;

impl Pass for InteractsWithSecret {
    fn name(&self) -> &'static str {
        "interacts-with-secret"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        traverse(ctx, &mut Marker)
    }
}

struct Marker;

impl Visitor for Marker {
    fn exit(&mut self, ctx: &mut CompilationContext, visit: &Visit) -> Result<Flow, AnalysisError> {
        let path = ctx.path(visit.node);
        match path.node_type() {
            NodeType::FunctionCall if path.is_external_function_call() => {
                let statement = path
                    .ancestor_of_type(NodeType::ExpressionStatement)
                    .or_else(|| path.parent())
                    .map(|p| p.idx());
                mark_contains(ctx, visit.node, false);
                if let Some(statement) = statement {
                    mark_subtree(ctx, statement, visit.node, false);
                }
            }
            NodeType::FunctionCall if path.is_internal_function_call() => {
                if ctx.facts(visit.node).interacts_with_secret || ctx.facts(visit.node).contains_secret {
                    if let Some(f) = function_indicator_scope(ctx, visit.node) {
                        if let Some(f) = ctx.scope_mut(f).function_indicator_mut() {
                            f.internal_function_interacts_with_secret = true;
                        }
                    }
                }
            }
            NodeType::Identifier => mark_identifier(ctx, visit.node),
            _ => {}
        }
        Ok(Flow::Continue)
    }
}

fn function_indicator_scope(ctx: &CompilationContext, idx: NodeIdx) -> Option<crate::context::ScopeId> {
    ctx.enclosing_scope(idx, ScopeKind::Function)
}

fn mark_identifier(ctx: &mut CompilationContext, ident: NodeIdx) {
    let Some(binding) = ctx.referenced_binding(ident) else {
        return;
    };
    let binding = ctx.binding(binding);
    let secret = if binding.is_secret() {
        true
    } else if binding.is_state_variable() {
        false
    } else {
        return;
    };
    let path = ctx.path(ident);
    let statement = path
        .ancestor_of_type(NodeType::ExpressionStatement)
        .or_else(|| path.ancestor_of_type(NodeType::VariableDeclarationStatement))
        .map(|p| p.idx());
    mark_contains(ctx, ident, secret);
    if let Some(statement) = statement {
        mark_subtree(ctx, statement, ident, secret);
    }
    if !secret {
        if let Some(f) = function_indicator_scope(ctx, ident) {
            if let Some(f) = ctx.scope_mut(f).function_indicator_mut() {
                f.interacts_with_public = true;
            }
        }
    }
}

/// Mark every ancestor of `source` as containing a secret (or public) value
fn mark_contains(ctx: &mut CompilationContext, source: NodeIdx, secret: bool) {
    let own = ctx.path(source).referenced_declaration();
    let ancestors: Vec<_> = ctx
        .path(source)
        .ancestors()
        .skip(1)
        .map(|p| (p.idx(), p.referenced_declaration()))
        .collect();
    for (ancestor, decl) in ancestors {
        let facts = ctx.facts_mut(ancestor);
        if secret {
            facts.contains_secret = true;
        } else {
            facts.contains_public = true;
        }
        // an access chain interacts with its own keys, not with itself
        if decl.is_some() && decl != own {
            add_interacting_path(ctx, ancestor, source, secret);
        }
    }
}

/// Mark the identifiers of a statement as interacting with `source`
fn mark_subtree(ctx: &mut CompilationContext, statement: NodeIdx, source: NodeIdx, secret: bool) {
    let targets: Vec<_> = ctx
        .ast()
        .subtree(statement)
        .filter(|idx| {
            matches!(
                ctx.ast().node_type(*idx),
                NodeType::Identifier | NodeType::VariableDeclarationStatement
            )
        })
        .collect();
    for target in targets {
        let facts = ctx.facts_mut(target);
        if secret {
            facts.interacts_with_secret = true;
        } else {
            facts.interacts_with_public = true;
        }
        if target != source {
            add_interacting_path(ctx, target, source, secret);
        }
    }
}

/// Tell the indicator of whatever `reference` names that it met `source`
fn add_interacting_path(ctx: &mut CompilationContext, reference: NodeIdx, source: NodeIdx, secret: bool) {
    let Some(binding) = ctx.referenced_binding(reference) else {
        return;
    };
    let Some(function) = function_indicator_scope(ctx, reference) else {
        return;
    };
    let decl = ctx.binding(binding).decl_id;
    if ctx.binding(binding).is_state_variable() {
        if let Some(sid) = ctx.state_indicator_in(function, decl) {
            ctx.indicator_add_interacting_path(sid, source, secret);
        }
        return;
    }
    if let Some(local) = ctx
        .scope_mut(function)
        .function_indicator_mut()
        .and_then(|f| f.locals.get_mut(&decl))
    {
        local.add_interacting_path(source, secret);
    }
}
