//! The check passes and the order they run in
//!
//! Every pass implements [`Pass`]. The first two work on the bare tree; the
//! rest need the paths, scopes and bindings the build pass creates.

mod accessed;
mod decorations;
mod decorator;
mod domain;
mod encryption;
mod error_checks;
mod external_call;
mod incremented;
mod interacts;
mod local_declarations;
mod msg_sender_param;
mod ownership;
mod require_statement;
mod unsupported;

pub use accessed::AccessedStates;
pub use decorations::DecorationPropagation;
pub use decorator::DecoratorChecks;
pub use domain::{DomainConsistency, DomainParameters, MappingAccessChecks};
pub use encryption::EncryptionRequirements;
pub use error_checks::ErrorChecks;
pub use external_call::ExternalCallChecks;
pub use incremented::Incrementations;
pub use interacts::InteractsWithSecret;
pub use local_declarations::LocalDeclarations;
pub use msg_sender_param::MsgSenderParam;
pub use ownership::Ownership;
pub use require_statement::RequireStatements;
pub use unsupported::UnsupportedConstructs;

use veil_ast::{Field, NodeIdx, NodeType};

use crate::build::Build;
use crate::context::CompilationContext;
use crate::traverse::Pass;

/// Every pass of a full analysis, in order
pub fn pipeline() -> Vec<Box<dyn Pass>> {
    vec![
        Box::new(UnsupportedConstructs),
        Box::new(DecorationPropagation),
        Box::new(Build),
        Box::new(ExternalCallChecks),
        Box::new(DecoratorChecks),
        Box::new(DomainParameters),
        Box::new(DomainConsistency),
        Box::new(MappingAccessChecks),
        Box::new(InteractsWithSecret),
        Box::new(Incrementations),
        Box::new(AccessedStates),
        Box::new(RequireStatements),
        Box::new(LocalDeclarations),
        Box::new(MsgSenderParam),
        Box::new(Ownership),
        Box::new(ErrorChecks),
        Box::new(EncryptionRequirements),
    ]
}

/// Nodes of one type, in source order
pub(crate) fn nodes_of_type(ctx: &CompilationContext, node_type: NodeType) -> Vec<NodeIdx> {
    ctx.ast()
        .iter()
        .filter(|n| n.node_type == node_type)
        .map(|n| n.idx)
        .collect()
}

/// The parameter declarations of a function, in order
pub(crate) fn function_parameters(ctx: &CompilationContext, function: NodeIdx) -> Vec<NodeIdx> {
    ctx.ast()
        .child(function, Field::Parameters)
        .map(|list| ctx.ast().list(list, Field::Parameters))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_names_are_unique() {
        let names: Vec<_> = pipeline().iter().map(|p| p.name()).collect();
        let mut deduped = names.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(names.len(), deduped.len());
        assert_eq!(names.first(), Some(&"unsupported-constructs"));
        assert_eq!(names[2], "build");
        assert_eq!(names.last(), Some(&"encryption-requirements"));
    }
}
