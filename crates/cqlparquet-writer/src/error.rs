//! Error types for the Parquet writer crate

use std::path::PathBuf;

use arrow::error::ArrowError;
use cqlparquet_core::SchemaError;
use parquet::errors::ParquetError;
use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Column names and types do not line up
    E001SchemaMismatch,
    /// E002: Partition column not present in the schema
    E002UnknownPartitionColumn,
    /// E003: Dataset path is not a directory
    E003NotADirectory,
    /// E004: Configuration missing or invalid
    E004InvalidConfig,
    /// E005: Write operation failed
    E005WriteFailure,
    /// E006: Dataset directory holds no parquet files
    E006NoParquetFiles,
    /// E007: Operation on a closed writer or reader
    E007Closed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E001SchemaMismatch => "E001",
            Self::E002UnknownPartitionColumn => "E002",
            Self::E003NotADirectory => "E003",
            Self::E004InvalidConfig => "E004",
            Self::E005WriteFailure => "E005",
            Self::E006NoParquetFiles => "E006",
            Self::E007Closed => "E007",
        }
    }
}

/// Errors that can occur while writing or reading parquet data
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("[{code}] Schema mismatch: {message}")]
    SchemaMismatch { code: &'static str, message: String },

    #[error("[{code}] Partition column '{column}' not found in schema")]
    UnknownPartitionColumn { code: &'static str, column: String },

    #[error("[{code}] Not a directory: {}", path.display())]
    NotADirectory { code: &'static str, path: PathBuf },

    #[error("[{code}] No parquet files found under {}", path.display())]
    NoParquetFiles { code: &'static str, path: PathBuf },

    #[error("[{code}] Writer is closed")]
    WriterClosed { code: &'static str },

    #[error("[{code}] Reader is closed")]
    ReaderClosed { code: &'static str },

    #[error("[{code}] Invalid configuration: {message}")]
    InvalidConfig { code: &'static str, message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),
}

impl WriterError {
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            code: ErrorCode::E001SchemaMismatch.as_str(),
            message: message.into(),
        }
    }

    pub fn unknown_partition_column(column: impl Into<String>) -> Self {
        Self::UnknownPartitionColumn {
            code: ErrorCode::E002UnknownPartitionColumn.as_str(),
            column: column.into(),
        }
    }

    pub fn not_a_directory(path: impl Into<PathBuf>) -> Self {
        Self::NotADirectory {
            code: ErrorCode::E003NotADirectory.as_str(),
            path: path.into(),
        }
    }

    pub fn no_parquet_files(path: impl Into<PathBuf>) -> Self {
        Self::NoParquetFiles {
            code: ErrorCode::E006NoParquetFiles.as_str(),
            path: path.into(),
        }
    }

    pub fn writer_closed() -> Self {
        Self::WriterClosed {
            code: ErrorCode::E007Closed.as_str(),
        }
    }

    pub fn reader_closed() -> Self {
        Self::ReaderClosed {
            code: ErrorCode::E007Closed.as_str(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            code: ErrorCode::E004InvalidConfig.as_str(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Code for programmatic handling; I/O and encoding failures share E005.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SchemaMismatch { .. } => ErrorCode::E001SchemaMismatch,
            Self::UnknownPartitionColumn { .. } => ErrorCode::E002UnknownPartitionColumn,
            Self::NotADirectory { .. } => ErrorCode::E003NotADirectory,
            Self::NoParquetFiles { .. } => ErrorCode::E006NoParquetFiles,
            Self::WriterClosed { .. } | Self::ReaderClosed { .. } => ErrorCode::E007Closed,
            Self::InvalidConfig { .. } => ErrorCode::E004InvalidConfig,
            Self::Io { .. } | Self::Arrow(_) | Self::Parquet(_) => ErrorCode::E005WriteFailure,
        }
    }
}

impl From<SchemaError> for WriterError {
    fn from(err: SchemaError) -> Self {
        Self::schema_mismatch(err.to_string())
    }
}

/// Result type alias for WriterError
pub type Result<T> = std::result::Result<T, WriterError>;
