//! Report configuration
//!
//! ```toml
//! force_v2 = true
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub force_v2: bool,
    pub logging: LoggingConfig,
}

impl ReportConfig {
    /// # Errors
    /// [`ConfigError::Parse`] on malformed TOML.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// # Errors
    /// [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] on malformed TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_keys() {
        let config = ReportConfig::from_toml_str("force_v2 = true").unwrap();
        assert!(config.force_v2);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn logging_section_parses() {
        let config = ReportConfig::from_toml_str("[logging]\nlevel = \"debug\"\nformat = \"json\"\n").unwrap();
        assert!(!config.force_v2);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(matches!(
            ReportConfig::from_toml_str("[logging]\nformat = \"xml\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
