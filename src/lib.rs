//! Veil - secret-state analysis for privacy-annotated contracts
//!
//! This is the root workspace crate that hosts the end-to-end tests.
//! The implementation lives in the workspace member crates.

// Re-export main crates for convenience
pub use veil_analysis as analysis;
pub use veil_ast as ast;

pub use veil_analysis::{analyse, Analysis, AnalysisError, AnalysisOptions};
