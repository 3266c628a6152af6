//! Chunked single-file writer.
//!
//! Rows are appended to one [`ColumnBuilder`] per column. Every
//! `chunk_rows` rows the builders are materialized into a retained
//! [`RecordBatch`]; `close` concatenates the retained batches and writes
//! the table to the destination in one pass.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use cqlparquet_core::{arrow_schema, finish_all, ColumnBuilder, ColumnSchema, Row, Value};
use parquet::arrow::ArrowWriter;
use tracing::{debug, warn};

use crate::encoding::{CountingWriter, StreamWriterOptions};
use crate::error::{Result, WriterError};

type Sink = CountingWriter<Box<dyn Write + Send>>;

/// Returns true for destinations that mean standard output.
fn is_stdout(path: &Path) -> bool {
    let text = path.to_string_lossy();
    text.is_empty() || text == "-" || text.eq_ignore_ascii_case("stdout")
}

pub struct StreamWriter {
    path: PathBuf,
    schema: SchemaRef,
    options: StreamWriterOptions,
    sink: Option<Sink>,
    builders: Vec<ColumnBuilder>,
    batches: Vec<RecordBatch>,
    chunk_len: usize,
    row_count: u64,
    null_substitutions: u64,
    bytes_written: u64,
    closed: bool,
}

impl StreamWriter {
    /// Create the destination and one builder per column.
    ///
    /// `path` of `-`, `stdout` or the empty string writes to standard output.
    pub fn open(
        path: impl AsRef<Path>,
        columns: &ColumnSchema,
        options: StreamWriterOptions,
    ) -> Result<Self> {
        Self::with_arrow_schema(path, arrow_schema(columns), options)
    }

    /// Like [`StreamWriter::open`] with an already mapped Arrow schema.
    pub fn with_arrow_schema(
        path: impl AsRef<Path>,
        schema: SchemaRef,
        options: StreamWriterOptions,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let builders = schema
            .fields()
            .iter()
            .map(|field| {
                ColumnBuilder::try_new(field.data_type()).map_err(|err| {
                    WriterError::schema_mismatch(format!("column '{}': {}", field.name(), err))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let inner: Box<dyn Write + Send> = if is_stdout(&path) {
            Box::new(std::io::stdout())
        } else {
            Box::new(File::create(&path).map_err(|e| WriterError::io(&path, e))?)
        };

        options.observer.file_opened(&path);
        debug!(
            path = %path.display(),
            columns = schema.fields().len(),
            chunk_rows = options.chunk_rows,
            "Opened stream writer"
        );

        Ok(Self {
            path,
            schema,
            options,
            sink: Some(CountingWriter::new(inner)),
            builders,
            batches: Vec::new(),
            chunk_len: 0,
            row_count: 0,
            null_substitutions: 0,
            bytes_written: 0,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(WriterError::writer_closed());
        }
        Ok(())
    }

    /// Append one row. Columns absent from the row are written as null;
    /// entries that match no column are ignored.
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        self.ensure_open()?;

        for (field, builder) in self.schema.fields().iter().zip(self.builders.iter_mut()) {
            let value = row.get(field.name()).unwrap_or(&Value::Null);
            if let Err(err) = builder.append(value) {
                self.null_substitutions += 1;
                self.options.observer.null_substituted(field.name(), &err);
            }
        }

        self.chunk_len += 1;
        self.row_count += 1;
        if self.chunk_len >= self.options.chunk_rows {
            self.flush_chunk()?;
        }
        Ok(())
    }

    pub fn write_rows(&mut self, rows: &[Row]) -> Result<()> {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Write positional rows, pairing each value with the header at the same
    /// index. Values past the last header are ignored.
    pub fn write_positional<S: AsRef<str>>(
        &mut self,
        headers: &[S],
        rows: &[Vec<Value>],
    ) -> Result<()> {
        for values in rows {
            let row: Row = headers
                .iter()
                .zip(values)
                .map(|(name, value)| (name.as_ref().to_string(), value.clone()))
                .collect();
            self.write_row(&row)?;
        }
        Ok(())
    }

    /// Materialize the current chunk into a retained batch.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.flush_chunk()
    }

    fn flush_chunk(&mut self) -> Result<()> {
        if self.chunk_len == 0 {
            return Ok(());
        }

        // Every builder is reset here, so a failed chunk is dropped whole and
        // later chunks stay aligned.
        let rows = self.chunk_len;
        self.chunk_len = 0;
        let batch = finish_all(&mut self.builders)
            .and_then(|columns| RecordBatch::try_new(self.schema.clone(), columns));
        let batch = match batch {
            Ok(batch) => batch,
            Err(err) => {
                self.row_count -= rows as u64;
                warn!(
                    path = %self.path.display(),
                    rows,
                    error = %err,
                    "Dropped chunk that failed to build"
                );
                return Err(err.into());
            }
        };

        debug!(
            path = %self.path.display(),
            rows = batch.num_rows(),
            retained_batches = self.batches.len() + 1,
            "Flushed chunk"
        );
        self.batches.push(batch);
        Ok(())
    }

    /// Flush, then write every retained batch to the destination as one
    /// table. Calling `close` again is a no-op.
    ///
    /// A failure before encoding starts leaves the writer open so `close`
    /// can be retried. Once the sink is handed to the encoder the writer is
    /// closed whatever the outcome.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.flush_chunk()?;
        let table = concat_batches(&self.schema, &self.batches)?;

        self.closed = true;
        self.batches.clear();
        let Some(sink) = self.sink.take() else {
            return Ok(());
        };
        let properties = self.options.writer_properties();
        let mut writer = ArrowWriter::try_new(sink, self.schema.clone(), Some(properties))?;
        if table.num_rows() > 0 {
            writer.write(&table)?;
        }
        let mut sink = writer.into_inner()?;
        sink.flush().map_err(|e| WriterError::io(&self.path, e))?;
        self.bytes_written = sink.bytes_written();

        self.options
            .observer
            .file_closed(&self.path, self.row_count, self.bytes_written);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Rows accepted since open.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Rows waiting in the builders for the next chunk flush.
    pub fn buffered_rows(&self) -> usize {
        self.chunk_len
    }

    /// Values replaced by null because they could not be converted.
    pub fn null_substitutions(&self) -> u64 {
        self.null_substitutions
    }

    /// Encoded file size; zero until closed.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.close() {
                warn!(path = %self.path.display(), error = %err, "Failed to close writer on drop");
            }
        }
    }
}
