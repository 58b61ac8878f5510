//! Secret values handed to calls that would reveal them

use veil_ast::{Field, NodeType};

use crate::context::CompilationContext;
use crate::error::AnalysisError;
use crate::passes::nodes_of_type;
use crate::traverse::Pass;

pub struct ExternalCallChecks;

impl Pass for ExternalCallChecks {
    fn name(&self) -> &'static str {
        "external-calls"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        for call in nodes_of_type(ctx, NodeType::FunctionCall) {
            let path = ctx.path(call);
            let arguments = ctx.ast().list(call, Field::Arguments);
            let secret_argument = arguments.iter().any(|arg| {
                ctx.ast().node_type(*arg) == NodeType::Identifier
                    && ctx
                        .referenced_binding(*arg)
                        .map_or(false, |b| ctx.binding(b).is_secret())
            });
            if !secret_argument {
                continue;
            }
            let node = ctx.node(call);
            if path.is_type_conversion() {
                let literal = arguments
                    .first()
                    .map_or(false, |arg| ctx.ast().node_type(*arg) == NodeType::Literal);
                if !literal {
                    return Err(AnalysisError::todo(
                        "Type conversions of secret states. We plan to suppport conversions which can be replicated in a zero-knowledge circuit in the near future.",
                        node,
                    ));
                }
            } else if path.is_require_statement() {
                return Err(AnalysisError::todo(
                    "Require statements involving secret states. We plan to suppport these (by replicating them with Zokrates assert statements) in the near future.",
                    node,
                ));
            } else if path.is_external_function_call() {
                return Err(AnalysisError::zkp(
                    "We cannot support external function calls with secret arguments - they can't be hidden due to the nature of the blockchain",
                    node,
                ));
            }
        }
        Ok(())
    }
}
