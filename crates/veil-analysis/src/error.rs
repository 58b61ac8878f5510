//! Error taxonomy of the analysis
//!
//! User errors (`SyntaxUsage`, `Zkp`, `Todo`) carry the offending node and its
//! source location. Construction errors point at a defect in the tree the
//! parser handed us and are never recoverable.

use serde::Serialize;
use thiserror::Error;
use veil_ast::{AstError, DeclId, Node, NodeIdx, NodeType, Src};

/// Why a state was classified one way or another
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reason {
    pub src: Src,
    pub text: String,
}

impl Reason {
    pub fn new(src: Src, text: impl Into<String>) -> Self {
        Self {
            src,
            text: text.into(),
        }
    }
}

/// Errors that abort an analysis run
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    /// The annotations contradict each other
    #[error("{message}")]
    SyntaxUsage {
        message: String,
        node: Option<NodeIdx>,
        src: Src,
        reasons: Vec<Reason>,
    },

    /// The program asks for something a zero-knowledge circuit can't enforce
    #[error("{message}")]
    Zkp {
        message: String,
        node: Option<NodeIdx>,
        src: Src,
    },

    /// A recognised construct we don't handle yet
    #[error("TODO: veil doesn't yet support this feature: {message}")]
    Todo {
        message: String,
        node: Option<NodeIdx>,
        src: Src,
    },

    #[error("declaration {decl_id} is bound twice in scope '{scope}'")]
    DuplicateBinding {
        decl_id: DeclId,
        scope: String,
        src: Src,
    },

    #[error("malformed path at {node}: {detail}")]
    MalformedPath {
        detail: String,
        node: NodeIdx,
        src: Src,
    },

    #[error("no rule classifies node type {node_type} at {node}")]
    UnclassifiedNode {
        node_type: NodeType,
        node: NodeIdx,
        src: Src,
    },

    #[error("no path was built for {node}")]
    MissingPath { node: NodeIdx },

    #[error(transparent)]
    Ast(#[from] AstError),
}

impl AnalysisError {
    pub fn syntax_usage(message: impl Into<String>, node: &Node) -> Self {
        AnalysisError::SyntaxUsage {
            message: message.into(),
            node: Some(node.idx),
            src: node.src,
            reasons: Vec::new(),
        }
    }

    pub fn zkp(message: impl Into<String>, node: &Node) -> Self {
        AnalysisError::Zkp {
            message: message.into(),
            node: Some(node.idx),
            src: node.src,
        }
    }

    pub fn todo(message: impl Into<String>, node: &Node) -> Self {
        AnalysisError::Todo {
            message: message.into(),
            node: Some(node.idx),
            src: node.src,
        }
    }

    /// Attach the reasons behind a conflicting classification
    pub fn with_reasons(mut self, extra: impl IntoIterator<Item = Reason>) -> Self {
        if let AnalysisError::SyntaxUsage { reasons, .. } = &mut self {
            reasons.extend(extra);
        }
        self
    }

    /// Error code for machine-readable output
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::SyntaxUsage { .. } => "E-USAGE-001",
            AnalysisError::Zkp { .. } => "E-ZKP-001",
            AnalysisError::Todo { .. } => "E-TODO-001",
            AnalysisError::DuplicateBinding { .. } => "E-BUILD-001",
            AnalysisError::MalformedPath { .. } => "E-BUILD-002",
            AnalysisError::UnclassifiedNode { .. } => "E-BUILD-003",
            AnalysisError::MissingPath { .. } => "E-BUILD-004",
            AnalysisError::Ast(err) => err.code(),
        }
    }

    /// Primary source location, when the error has one
    pub fn src(&self) -> Option<Src> {
        match self {
            AnalysisError::SyntaxUsage { src, .. }
            | AnalysisError::Zkp { src, .. }
            | AnalysisError::Todo { src, .. }
            | AnalysisError::DuplicateBinding { src, .. }
            | AnalysisError::MalformedPath { src, .. }
            | AnalysisError::UnclassifiedNode { src, .. } => Some(*src).filter(|s| !s.is_dummy()),
            AnalysisError::MissingPath { .. } | AnalysisError::Ast(_) => None,
        }
    }

    pub fn reasons(&self) -> &[Reason] {
        match self {
            AnalysisError::SyntaxUsage { reasons, .. } => reasons,
            _ => &[],
        }
    }

    /// Whether the user can fix this by changing their contract. Everything
    /// else is a defect in the tree we were given.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            AnalysisError::SyntaxUsage { .. } | AnalysisError::Zkp { .. } | AnalysisError::Todo { .. }
        )
    }
}
