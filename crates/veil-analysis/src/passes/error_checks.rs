//! End-of-scope validation
//!
//! Classification conflicts only show once every use in a scope is known,
//! so indicators are checked when their function is left and bindings when
//! their contract is.

use veil_ast::NodeType;

use crate::binding::BindingKind;
use crate::context::CompilationContext;
use crate::error::AnalysisError;
use crate::traverse::{traverse, Flow, Pass, Visit, Visitor};

pub struct ErrorChecks;

impl Pass for ErrorChecks {
    fn name(&self) -> &'static str {
        "error-checks"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        traverse(ctx, &mut ScopeExits)
    }
}

struct ScopeExits;

impl Visitor for ScopeExits {
    fn exit(&mut self, ctx: &mut CompilationContext, visit: &Visit) -> Result<Flow, AnalysisError> {
        let Some(scope) = ctx.scope_for_node(visit.node) else {
            return Ok(Flow::Continue);
        };
        match ctx.ast().node_type(visit.node) {
            NodeType::FunctionDefinition => {
                let indicators: Vec<_> = ctx
                    .scope(scope)
                    .function_indicator()
                    .map(|f| f.state_variables.values().copied().collect())
                    .unwrap_or_default();
                for sid in indicators {
                    ctx.indicator_prelim_checks(sid)?;
                    ctx.indicator_update_from_binding(sid)?;
                    ctx.indicator_update_new_commitments(sid)?;
                }
                ctx.function_update_new_commitments(scope);
            }
            NodeType::ContractDefinition => {
                let variables = ctx.filter_bindings(scope, |b| b.kind == BindingKind::Variable);
                for binding in variables {
                    ctx.binding_prelim_checks(binding)?;
                    ctx.binding_is_nullifiable(binding)?;
                }
            }
            _ => {}
        }
        Ok(Flow::Continue)
    }
}
