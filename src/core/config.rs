//! Configuration loaded from TOML.
//!
//! ```toml
//! [engine]
//! threads = 4
//! partitions = 8
//!
//! [blocks]
//! size_mb = 64.0
//!
//! [export]
//! prefix = "frame"
//! overwrite = true
//! ```

use crate::core::error::ConfigError;
use crate::core::types::{BlockSize, DEFAULT_BLOCK_SIZE_MB};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Partitioned execution settings.
    pub engine: EngineConfig,
    /// Block conversion settings.
    pub blocks: BlockConfig,
    /// Export settings.
    pub export: ExportConfig,
}

/// Engine section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads (0 = use all available).
    pub threads: usize,
    /// Partitions for new collections (0 = engine parallelism).
    pub partitions: usize,
}

/// Blocks section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    /// Target footprint per block in megabytes.
    pub size_mb: f64,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            size_mb: DEFAULT_BLOCK_SIZE_MB,
        }
    }
}

impl From<&BlockConfig> for BlockSize {
    fn from(config: &BlockConfig) -> Self {
        BlockSize::Megabytes(config.size_mb)
    }
}

/// Export section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// File name prefix.
    pub prefix: String,
    /// Replace an existing output directory.
    pub overwrite: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            prefix: "image".to_string(),
            overwrite: false,
        }
    }
}

impl Config {
    /// Parse configuration from a TOML string.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.threads, 0);
        assert_eq!(BlockSize::from(&config.blocks), BlockSize::default());
        assert_eq!(config.export.prefix, "image");
        assert!(!config.export.overwrite);
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [engine]
            threads = 2

            [export]
            prefix = "frame"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.threads, 2);
        assert_eq!(config.engine.partitions, 0);
        assert_eq!(config.blocks.size_mb, DEFAULT_BLOCK_SIZE_MB);
        assert_eq!(config.export.prefix, "frame");
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml_str("[engine]\nthreads = \"many\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/framestack.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
