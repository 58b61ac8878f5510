use serde_json::Value;
use veil::{analyse, Analysis, AnalysisError, AnalysisOptions};
use veil::ast::Ast;
use veil::analysis::WarningKind;

/// Analyse a document that is expected to pass
pub fn analyse_ok(source: Value) -> Analysis {
    analyse_with(source, AnalysisOptions::default())
        .unwrap_or_else(|e| panic!("Expected analysis to succeed, got [{}] {}", e.code(), e))
}

/// Analyse a document that is expected to be rejected
pub fn analyse_err(source: Value) -> AnalysisError {
    match analyse_with(source, AnalysisOptions::default()) {
        Ok(_) => panic!("Expected analysis to fail"),
        Err(e) => e,
    }
}

pub fn analyse_with(source: Value, options: AnalysisOptions) -> Result<Analysis, AnalysisError> {
    let ast = Ast::from_json(source).expect("Expected the document to ingest");
    analyse(ast, options)
}

/// Assert the analysis produced at least one warning of `kind`
pub fn assert_warned(analysis: &Analysis, kind: WarningKind) {
    assert!(
        analysis.warnings().iter().any(|w| w.kind == kind),
        "Expected a {:?} warning, got {:?}",
        kind,
        analysis.warnings()
    );
}
