//! Ownership inference
//!
//! `require(msg.sender == x)` restricts who may call a function, and the
//! restriction names the owner of every state the function nullifies.
//! Once a contract's functions are all seen, each secret state gets its
//! owner and zero-owner writes are checked.

use tracing::debug;
use veil_ast::{Field, NodeIdx, NodeType};

use crate::binding::BindingKind;
use crate::context::CompilationContext;
use crate::error::AnalysisError;
use crate::scope::{RestrictionKind, ScopeKind};
use crate::traverse::{traverse, Flow, Pass, Visit, Visitor};
use crate::warning::WarningKind;

pub struct Ownership;

impl Pass for Ownership {
    fn name(&self) -> &'static str {
        "ownership"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        traverse(ctx, &mut Owners)
    }
}

struct Owners;

impl Visitor for Owners {
    fn enter(&mut self, ctx: &mut CompilationContext, visit: &Visit) -> Result<Flow, AnalysisError> {
        if ctx.ast().node_type(visit.node) == NodeType::FunctionCall && ctx.path(visit.node).is_require_statement() {
            caller_restriction(ctx, visit.node)?;
        }
        Ok(Flow::Continue)
    }

    fn exit(&mut self, ctx: &mut CompilationContext, visit: &Visit) -> Result<Flow, AnalysisError> {
        if ctx.ast().node_type(visit.node) != NodeType::ContractDefinition {
            return Ok(Flow::Continue);
        }
        let Some(contract) = ctx.scope_for_node(visit.node) else {
            return Ok(Flow::Continue);
        };
        let secrets = ctx.filter_bindings(contract, |b| b.kind == BindingKind::Variable && b.is_secret());
        for binding in secrets {
            ctx.infer_ownership(binding)?;
            let b = ctx.binding(binding);
            if let Some(owner) = &b.usage.owner {
                debug!(state = %b.name, owner = %owner.name, "owned");
            } else if b.usage.is_whole {
                let message = format!(
                    "Warning: secret state {} is not owned. Without an owner, the state is initialised by the first caller submitting a dummy nullifier. This reveals when the state is initialised.",
                    b.name
                );
                let src = ctx.node(b.node).src;
                ctx.warn(WarningKind::UnownedState, message, Some(src));
            }
            ctx.owner_set_to_zero_check(binding)?;
        }
        Ok(Flow::Continue)
    }
}

/// Record `require(msg.sender == x)` or `require(msg.sender != x)` on the
/// enclosing function
fn caller_restriction(ctx: &mut CompilationContext, call: NodeIdx) -> Result<(), AnalysisError> {
    let Some(requirement) = ctx.ast().list(call, Field::Arguments).first().copied() else {
        return Ok(());
    };
    if ctx.ast().node_type(requirement) != NodeType::BinaryOperation {
        return Ok(());
    }
    let is_msg_sender = |field| {
        ctx.ast()
            .child(requirement, field)
            .map_or(false, |side| ctx.path(side).is_msg_sender())
    };
    let address = if is_msg_sender(Field::LeftExpression) {
        ctx.ast().child(requirement, Field::RightExpression)
    } else if is_msg_sender(Field::RightExpression) {
        ctx.ast().child(requirement, Field::LeftExpression)
    } else {
        return Ok(());
    };
    let Some(address) = address else {
        return Ok(());
    };
    let Some(binding) = ctx.referenced_binding(address) else {
        return Err(AnalysisError::todo(
            "Requirements on msg.sender addresses are currently only supported as state variables. We will work on adding constant addresses and parameters.",
            ctx.node(call),
        ));
    };
    let kind = match ctx.node(requirement).operator() {
        "==" => RestrictionKind::Match,
        "!=" => RestrictionKind::Exclude,
        _ => {
            return Err(AnalysisError::todo(
                "This kind of restriction on msg.sender isn't implemented yet!",
                ctx.node(call),
            ))
        }
    };
    let Some(function) = ctx.enclosing_scope(call, ScopeKind::Function) else {
        return Ok(());
    };
    ctx.add_caller_restriction(function, kind, address)?;
    let secret = ctx.binding(binding).is_secret();
    ctx.facts_mut(call).require_statement_private |= secret;
    Ok(())
}
