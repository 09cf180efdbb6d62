//! Graph build configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Knobs for [`GraphBuilder`](crate::GraphBuilder)
///
/// ```toml
/// metadata_outputs = true
/// packages_dataset = true
/// output_run = "u/someone/run1"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Add a `<label>_metadata` output to every quantum
    pub metadata_outputs: bool,
    /// Register a graph-wide `packages` init output
    pub packages_dataset: bool,
    /// Run (collection) predicted outputs are written to
    pub output_run: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            metadata_outputs: true,
            packages_dataset: true,
            output_run: "quanta/run".to_string(),
        }
    }
}

impl BuildConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_metadata_outputs(mut self, enabled: bool) -> Self {
        self.metadata_outputs = enabled;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_packages_dataset(mut self, enabled: bool) -> Self {
        self.packages_dataset = enabled;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_output_run(mut self, run: impl Into<String>) -> Self {
        self.output_run = run.into();
        self
    }

    /// # Errors
    /// Returns [`ConfigError::Parse`] on malformed TOML.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// # Errors
    /// Fails if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = BuildConfig::from_toml_str("output_run = \"u/me/r1\"").unwrap();
        assert_eq!(c.output_run, "u/me/r1");
        assert!(c.metadata_outputs);
        assert!(c.packages_dataset);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(
            BuildConfig::from_toml_str("metadata_outputs = \"yes\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
