//! Single-file reader yielding [`Row`]s.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use cqlparquet_core::{extract_value, reverse_map, Row};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;

use crate::error::{Result, WriterError};

pub struct StreamReader {
    path: PathBuf,
    schema: SchemaRef,
    row_count: u64,
    num_row_groups: usize,
    /// Whole file, materialized on the first `read_batch`.
    table: Option<RecordBatch>,
    cursor: usize,
    closed: bool,
}

impl StreamReader {
    /// Open `path` and read its footer. Row data is not touched until the
    /// first read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| WriterError::io(&path, e))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

        let schema = builder.schema().clone();
        let metadata = builder.metadata();
        let row_count = metadata.file_metadata().num_rows().max(0) as u64;
        let num_row_groups = metadata.num_row_groups();

        debug!(
            path = %path.display(),
            rows = row_count,
            row_groups = num_row_groups,
            "Opened stream reader"
        );

        Ok(Self {
            path,
            schema,
            row_count,
            num_row_groups,
            table: None,
            cursor: 0,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(WriterError::reader_closed());
        }
        Ok(())
    }

    fn load_table(&self) -> Result<RecordBatch> {
        let file = File::open(&self.path).map_err(|e| WriterError::io(&self.path, e))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(concat_batches(&self.schema, &batches)?)
    }

    /// Up to `n` rows from the internal cursor; `None` once exhausted.
    pub fn read_batch(&mut self, n: usize) -> Result<Option<Vec<Row>>> {
        self.ensure_open()?;

        if self.table.is_none() {
            self.table = Some(self.load_table()?);
        }
        let Some(table) = self.table.as_ref() else {
            return Ok(None);
        };

        let end = self.cursor.saturating_add(n).min(table.num_rows());
        if self.cursor >= end {
            return Ok(None);
        }
        let rows = rows_in_range(table, self.cursor, end);
        self.cursor = end;
        Ok(Some(rows))
    }

    /// Every row of the file. Does not move the `read_batch` cursor.
    pub fn read_all(&self) -> Result<Vec<Row>> {
        self.ensure_open()?;
        let table = match &self.table {
            Some(table) => table.clone(),
            None => self.load_table()?,
        };
        Ok(rows_in_range(&table, 0, table.num_rows()))
    }

    /// Release the materialized table. Calling `close` again is a no-op.
    pub fn close(&mut self) {
        self.table = None;
        self.closed = true;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Row count recorded in the file footer.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn num_row_groups(&self) -> usize {
        self.num_row_groups
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Textual type of every column, re-derived from the Arrow schema.
    pub fn column_types(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| reverse_map(f.data_type()))
            .collect()
    }
}

fn rows_in_range(table: &RecordBatch, start: usize, end: usize) -> Vec<Row> {
    let schema = table.schema();
    (start..end)
        .map(|idx| {
            schema
                .fields()
                .iter()
                .zip(table.columns())
                .map(|(field, column)| (field.name().clone(), extract_value(column.as_ref(), idx)))
                .collect()
        })
        .collect()
}
