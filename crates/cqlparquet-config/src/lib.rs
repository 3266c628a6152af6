// cqlparquet-config - Configuration for copy operations
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from CQLPARQUET_CONFIG env var
// 3. Config file contents from CQLPARQUET_CONFIG_CONTENT env var
// 4. Default config file location (./cqlparquet.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::Result;
use serde::{Deserialize, Serialize};

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{apply_env_overrides, EnvSource, ENV_PREFIX};
pub use sources::{load_from_file_path, load_with_env};

/// Compression codec names accepted by `writer.compression`.
pub const SUPPORTED_CODECS: &[&str] = &["snappy", "gzip", "lz4", "zstd", "none"];

/// Top-level copy configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CopyConfig {
    #[serde(default)]
    pub writer: WriterConfig,

    #[serde(default)]
    pub partition: PartitionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Single-file writer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Rows buffered before a chunk is materialized into a record batch
    pub chunk_rows: usize,
    pub compression: String,
    pub max_row_group_size: usize,
    pub data_page_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            chunk_rows: 10_000,
            compression: "snappy".to_string(),
            max_row_group_size: 100_000,
            data_page_size: 1024 * 1024,
        }
    }
}

/// Partitioned dataset settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Partition columns, outermost directory first. `col.year` style names
    /// derive the value from a time-bearing column.
    pub columns: Vec<String>,
    pub max_open_files: usize,
    pub max_file_size_bytes: u64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            max_open_files: 10,
            max_file_size_bytes: 100 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
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

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Unsupported log format: {}. Supported: text, json", s),
        }
    }
}

impl CopyConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Parse a TOML document; absent sections and fields take their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let config = CopyConfig::default();
        assert_eq!(config.writer.chunk_rows, 10_000);
        assert_eq!(config.writer.compression, "snappy");
        assert_eq!(config.partition.max_open_files, 10);
        assert_eq!(config.partition.max_file_size_bytes, 100 * 1024 * 1024);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CopyConfig::from_toml(
            r#"
            [writer]
            chunk_rows = 500

            [partition]
            columns = ["year", "created_at.month"]
            "#,
        )
        .unwrap();
        assert_eq!(config.writer.chunk_rows, 500);
        assert_eq!(config.writer.compression, "snappy");
        assert_eq!(config.partition.columns, vec!["year", "created_at.month"]);
        assert_eq!(config.partition.max_open_files, 10);
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
