//! Parquet writers and readers for CQL rows
//!
//! [`StreamWriter`] and [`StreamReader`] handle a single file;
//! [`PartitionWriter`] and [`PartitionReader`] handle a Hive-style
//! partitioned directory of files.

// Error variants carry paths and messages for diagnostics.
#![allow(clippy::result_large_err)]

mod encoding;
mod error;
pub mod partition;
mod stream_reader;
mod stream_writer;

pub use encoding::{
    parse_compression, StreamWriterOptions, DEFAULT_CHUNK_ROWS, DEFAULT_DATA_PAGE_SIZE,
    DEFAULT_ROW_GROUP_SIZE,
};
pub use error::{ErrorCode, Result, WriterError};
pub use partition::{
    PartitionFile, PartitionInfo, PartitionReader, PartitionWriter, PartitionWriterOptions,
};
pub use stream_reader::StreamReader;
pub use stream_writer::StreamWriter;

// Re-export commonly used types for convenience
pub use cqlparquet_core;
