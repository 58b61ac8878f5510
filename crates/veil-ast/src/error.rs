//! Errors raised while ingesting a JSON tree

use thiserror::Error;

/// Errors from turning the parser's JSON output into an [`crate::Ast`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AstError {
    #[error("invalid JSON: {message}")]
    Json { message: String },

    #[error("expected a JSON object at {pointer}")]
    NotAnObject { pointer: String },

    #[error("node at {pointer} has no nodeType")]
    MissingNodeType { pointer: String },

    /// A node kind outside the closed set. Fatal: new node shapes must be
    /// classified before they can be analysed.
    #[error("unknown nodeType '{node_type}' at {pointer}")]
    UnknownNodeType { node_type: String, pointer: String },

    #[error("node at {pointer} is missing required field '{field}'")]
    MissingField { field: &'static str, pointer: String },

    #[error("node at {pointer} has a malformed '{field}' field")]
    InvalidField { field: &'static str, pointer: String },

    #[error("malformed src '{src}'")]
    InvalidSrc { src: String },
}

impl AstError {
    /// Error code for machine-readable output
    pub fn code(&self) -> &'static str {
        match self {
            AstError::Json { .. } => "E-AST-001",
            AstError::NotAnObject { .. } => "E-AST-002",
            AstError::MissingNodeType { .. } => "E-AST-003",
            AstError::UnknownNodeType { .. } => "E-AST-004",
            AstError::MissingField { .. } => "E-AST-005",
            AstError::InvalidField { .. } => "E-AST-006",
            AstError::InvalidSrc { .. } => "E-AST-007",
        }
    }
}

impl From<serde_json::Error> for AstError {
    fn from(err: serde_json::Error) -> Self {
        AstError::Json {
            message: err.to_string(),
        }
    }
}
