//! Comparison configuration
//!
//! Tolerances and reporting options shared by every comparison action.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Comparison configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Absolute tolerance for float comparisons
    pub atol: f64,
    /// Relative tolerance, scaled by the reference value
    pub rtol: f64,
    /// Whether to list offending elements in failure messages
    pub verbose: bool,
    /// Maximum number of differences to list
    pub max_diffs: usize,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            atol: 1e-7,
            rtol: 0.0,
            verbose: false,
            max_diffs: 10,
        }
    }
}

impl CompareConfig {
    /// Load a config from a YAML file; missing keys keep their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse config: {:?}", path))
    }

    /// Parse a config from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Tolerance allowed for an element whose reference value is `expected`
    pub fn tolerance(&self, expected: f64) -> f64 {
        self.atol + self.rtol * expected.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_config_default() {
        let config = CompareConfig::default();
        assert_eq!(config.atol, 1e-7);
        assert_eq!(config.rtol, 0.0);
        assert!(!config.verbose);
    }

    #[test]
    fn test_compare_config_partial_yaml() {
        let config = CompareConfig::from_yaml("atol: 0.001\nverbose: true\n").unwrap();
        assert_eq!(config.atol, 0.001);
        assert!(config.verbose);
        assert_eq!(config.max_diffs, 10);
    }

    #[test]
    fn test_tolerance_scales_with_rtol() {
        let config = CompareConfig {
            atol: 1e-4,
            rtol: 1e-3,
            ..Default::default()
        };
        assert!((config.tolerance(-10.0) - 0.0101).abs() < 1e-6);
    }
}
