//! Parquet encoding settings shared by every writer in this crate.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use cqlparquet_config::WriterConfig;
use cqlparquet_core::{CopyObserver, TracingObserver};
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

use crate::error::{Result, WriterError};

pub const DEFAULT_CHUNK_ROWS: usize = 10_000;
pub const DEFAULT_ROW_GROUP_SIZE: usize = 100_000;
pub const DEFAULT_DATA_PAGE_SIZE: usize = 1024 * 1024;

const CREATED_BY: &str = concat!("cqlparquet version ", env!("CARGO_PKG_VERSION"));

/// Map a codec name to a parquet compression setting (case-insensitive).
pub fn parse_compression(name: &str) -> Result<Compression> {
    match name.trim().to_lowercase().as_str() {
        "snappy" => Ok(Compression::SNAPPY),
        "gzip" => Ok(Compression::GZIP(GzipLevel::default())),
        "lz4" => Ok(Compression::LZ4_RAW),
        "zstd" => Ok(Compression::ZSTD(ZstdLevel::default())),
        "none" | "uncompressed" | "" => Ok(Compression::UNCOMPRESSED),
        other => Err(WriterError::invalid_config(format!(
            "unsupported compression codec '{}'. Supported: snappy, gzip, lz4, zstd, none",
            other
        ))),
    }
}

/// Options for a single [`StreamWriter`](crate::StreamWriter).
#[derive(Clone)]
pub struct StreamWriterOptions {
    /// Rows buffered before a chunk is turned into a record batch. Only bounds
    /// peak builder memory; the file layout is governed by the row group size.
    pub chunk_rows: usize,
    pub compression: Compression,
    pub max_row_group_size: usize,
    pub data_page_size: usize,
    /// Receives null-substitution and file lifecycle events.
    pub observer: Arc<dyn CopyObserver>,
}

impl Default for StreamWriterOptions {
    fn default() -> Self {
        Self {
            chunk_rows: DEFAULT_CHUNK_ROWS,
            compression: Compression::SNAPPY,
            max_row_group_size: DEFAULT_ROW_GROUP_SIZE,
            data_page_size: DEFAULT_DATA_PAGE_SIZE,
            observer: Arc::new(TracingObserver),
        }
    }
}

impl fmt::Debug for StreamWriterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamWriterOptions")
            .field("chunk_rows", &self.chunk_rows)
            .field("compression", &self.compression)
            .field("max_row_group_size", &self.max_row_group_size)
            .field("data_page_size", &self.data_page_size)
            .finish_non_exhaustive()
    }
}

impl StreamWriterOptions {
    pub fn from_config(config: &WriterConfig) -> Result<Self> {
        Ok(Self {
            chunk_rows: config.chunk_rows.max(1),
            compression: parse_compression(&config.compression)?,
            max_row_group_size: config.max_row_group_size.max(1),
            data_page_size: config.data_page_size.max(1),
            ..Self::default()
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn CopyObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_chunk_rows(mut self, chunk_rows: usize) -> Self {
        self.chunk_rows = chunk_rows.max(1);
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Writer properties for files produced with these options.
    ///
    /// Dictionary encoding is off: exported columns are mostly high
    /// cardinality keys and free text.
    pub fn writer_properties(&self) -> WriterProperties {
        let metadata = vec![KeyValue {
            key: "cqlparquet.version".to_string(),
            value: Some(env!("CARGO_PKG_VERSION").to_string()),
        }];

        WriterProperties::builder()
            .set_compression(self.compression)
            .set_dictionary_enabled(false)
            .set_data_page_size_limit(self.data_page_size)
            .set_max_row_group_size(self.max_row_group_size)
            .set_created_by(CREATED_BY.to_string())
            .set_key_value_metadata(Some(metadata))
            .build()
    }
}

/// Sink wrapper that counts bytes handed to the inner writer.
pub(crate) struct CountingWriter<W> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    pub(crate) fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqlparquet_config::WriterConfig;

    #[test]
    fn codec_names() {
        assert_eq!(parse_compression("SNAPPY").unwrap(), Compression::SNAPPY);
        assert_eq!(parse_compression("none").unwrap(), Compression::UNCOMPRESSED);
        assert!(matches!(
            parse_compression("zstd").unwrap(),
            Compression::ZSTD(_)
        ));
        assert!(matches!(
            parse_compression("brotli"),
            Err(WriterError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn properties_follow_options() {
        let options = StreamWriterOptions::from_config(&WriterConfig {
            compression: "gzip".to_string(),
            max_row_group_size: 500,
            ..WriterConfig::default()
        })
        .unwrap();
        let props = options.writer_properties();
        assert_eq!(props.max_row_group_size(), 500);
        assert!(!props.dictionary_enabled(&parquet::schema::types::ColumnPath::from("x")));
        assert!(props.created_by().starts_with("cqlparquet version"));
    }

    #[test]
    fn counting_writer_counts() {
        let mut sink = CountingWriter::new(Vec::new());
        sink.write_all(b"hello").unwrap();
        assert_eq!(sink.bytes_written(), 5);
    }
}
