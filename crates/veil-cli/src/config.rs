use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use veil_analysis::AnalysisOptions;

/// Looked for in the working directory when `--config` isn't given
pub const DEFAULT_CONFIG_FILE: &str = "veil.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// `tracing` filter used when `RUST_LOG` isn't set
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub analysis: AnalysisOptions,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// The explicit file, else `veil.toml` if present, else defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_table_maps_onto_options() {
        let config: Config = toml::from_str(
            r#"
log_level = "debug"

[analysis]
encrypt_all_new_commitments = true
"#,
        )
        .unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert!(config.analysis.encrypt_all_new_commitments);
        assert!(!config.analysis.pedantic);
        assert!(config.analysis.warn_local_declarations);
    }

    #[test]
    fn empty_file_is_the_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Config::discover(Some(Path::new("/nonexistent/veil.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
