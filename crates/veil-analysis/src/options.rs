//! Knobs that change what the analysis reports

use serde::{Deserialize, Serialize};

/// Options for one analysis run.
///
/// Deserialises from the `[analysis]` table of `veil.toml`; every field has a
/// default so partial tables are fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Report superfluous decorators and other style advisories
    pub pedantic: bool,
    /// Require encrypted preimages for every secret state that produces new
    /// commitments, whoever owns it
    pub encrypt_all_new_commitments: bool,
    /// Warn (once) when a function declares local variables
    pub warn_local_declarations: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            pedantic: false,
            encrypt_all_new_commitments: false,
            warn_local_declarations: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_tables_keep_defaults() {
        let opts: AnalysisOptions = serde_json::from_str(r#"{ "pedantic": true }"#).unwrap();
        assert!(opts.pedantic);
        assert!(!opts.encrypt_all_new_commitments);
        assert!(opts.warn_local_declarations);
    }
}
