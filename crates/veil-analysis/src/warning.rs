//! Advisories collected during analysis

use serde::Serialize;
use veil_ast::Src;

/// Kind of advisory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WarningKind {
    /// Style advisories, only reported in pedantic mode
    Pedantic,
    LocalDeclaration,
    NonSecretParameter,
    SecretParameterToLocal,
    OwnerSetToZero,
    BurnAndEdit,
    UnownedState,
    MixedOperators,
    DomainParameterName,
}

impl WarningKind {
    pub fn code(&self) -> &'static str {
        match self {
            WarningKind::Pedantic => "W-PEDANTIC-001",
            WarningKind::LocalDeclaration => "W-LOCAL-001",
            WarningKind::NonSecretParameter => "W-PARAM-001",
            WarningKind::SecretParameterToLocal => "W-PARAM-002",
            WarningKind::OwnerSetToZero => "W-OWNER-001",
            WarningKind::BurnAndEdit => "W-OWNER-002",
            WarningKind::UnownedState => "W-OWNER-003",
            WarningKind::MixedOperators => "W-INCR-001",
            WarningKind::DomainParameterName => "W-DOMAIN-001",
        }
    }
}

/// A warning that doesn't stop the analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub code: &'static str,
    pub message: String,
    pub src: Option<Src>,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>, src: Option<Src>) -> Self {
        Self {
            kind,
            code: kind.code(),
            message: message.into(),
            src: src.filter(|s| !s.is_dummy()),
        }
    }
}
