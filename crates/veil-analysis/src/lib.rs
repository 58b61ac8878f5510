//! Veil Analysis
//!
//! Decides, for every secret state of a privacy-annotated contract, how it is
//! represented as commitments and nullifiers: whole or partitioned, who owns
//! it, and what each function has to prove.
//!
//! The work happens in a [`CompilationContext`] that a fixed [`pipeline`] of
//! passes fills in. [`analyse`] runs the whole thing.
//!
//! [`pipeline`]: passes::pipeline

mod binding;
mod build;
mod context;
mod error;
mod incrementation;
mod indicator;
mod mapping_key;
mod options;
pub mod passes;
mod path;
mod scope;
mod summary;
mod traverse;
mod usage;
mod warning;

pub use binding::{Binding, BindingKind};
pub use build::Build;
pub use context::{BindingId, CompilationContext, MappingKeyId, NodeFacts, ScopeId, StateIndicatorId};
pub use error::{AnalysisError, Reason};
pub use incrementation::Incrementation;
pub use indicator::{
    ContractDefinitionIndicator, FunctionDefinitionIndicator, LocalVariableIndicator, RequirementFlags,
    StateVariableIndicator,
};
pub use mapping_key::{Holder, KeyKind, MappingKey};
pub use options::AnalysisOptions;
pub use path::{Path, PathEntry};
pub use scope::{CallerRestriction, RestrictionKind, Scope, ScopeIndicators, ScopeKind};
pub use summary::{
    Analysis, AnalysisSummary, ContractSummary, FunctionSummary, SecretStateSummary, StateSummary,
};
pub use traverse::{traverse, walk, Flow, Pass, Visit, Visitor};
pub use usage::{Owner, OwnershipType, StateUsage};
pub use warning::{Warning, WarningKind};

use tracing::{debug, info};
use veil_ast::Ast;

/// Run every pass over `ast` and return the finished analysis
pub fn analyse(ast: Ast, options: AnalysisOptions) -> Result<Analysis, AnalysisError> {
    let mut ctx = CompilationContext::new(ast, options);
    for pass in passes::pipeline() {
        info!(pass = pass.name(), "running pass");
        pass.run(&mut ctx)?;
    }
    debug!(warnings = ctx.warnings().len(), "analysis complete");
    Ok(Analysis::new(ctx))
}

#[cfg(test)]
pub(crate) mod test_support {
    use serde_json::Value;
    use veil_ast::Ast;

    use super::*;

    /// A context with decorations propagated and the build pass run
    pub fn built(source: Value) -> CompilationContext {
        let ast = Ast::from_json(source).unwrap();
        let mut ctx = CompilationContext::new(ast, AnalysisOptions::default());
        passes::DecorationPropagation.run(&mut ctx).unwrap();
        Build.run(&mut ctx).unwrap();
        ctx
    }

    pub fn analysed(source: Value) -> Result<Analysis, AnalysisError> {
        analysed_with(source, AnalysisOptions::default())
    }

    pub fn analysed_with(source: Value, options: AnalysisOptions) -> Result<Analysis, AnalysisError> {
        analyse(Ast::from_json(source)?, options)
    }
}
