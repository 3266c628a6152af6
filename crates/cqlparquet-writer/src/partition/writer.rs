//! Partitioned dataset writer.
//!
//! Rows are grouped by [`PartitionKey`] and routed to one pooled
//! [`StreamWriter`] per partition directory. At most `max_open_files`
//! writers are open at once; the least recently used one is closed to make
//! room. A partition whose estimated size passes `max_file_size_bytes` is
//! rotated to the next `part-NNNNN.parquet` file. Closed files are never
//! reopened: a partition that comes back after eviction continues at its
//! next part number.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;
use cqlparquet_config::CopyConfig;
use cqlparquet_core::{arrow_schema, ColumnSchema, Row};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::pool::{PooledWriter, WriterPool};
use super::{part_file_name, PartitionColumn, PartitionKey};
use crate::encoding::StreamWriterOptions;
use crate::error::{Result, WriterError};
use crate::stream_writer::StreamWriter;

pub const DEFAULT_MAX_OPEN_FILES: usize = 10;
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct PartitionWriterOptions {
    /// Outermost directory first.
    pub partition_columns: Vec<String>,
    pub max_open_files: usize,
    pub max_file_size_bytes: u64,
    pub writer: StreamWriterOptions,
}

impl Default for PartitionWriterOptions {
    fn default() -> Self {
        Self {
            partition_columns: Vec::new(),
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            writer: StreamWriterOptions::default(),
        }
    }
}

impl PartitionWriterOptions {
    pub fn new<S: Into<String>>(partition_columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            partition_columns: partition_columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn from_config(config: &CopyConfig) -> Result<Self> {
        Ok(Self {
            partition_columns: config.partition.columns.clone(),
            max_open_files: config.partition.max_open_files,
            max_file_size_bytes: config.partition.max_file_size_bytes,
            writer: StreamWriterOptions::from_config(&config.writer)?,
        })
    }

    pub fn with_max_open_files(mut self, max_open_files: usize) -> Self {
        self.max_open_files = max_open_files;
        self
    }

    pub fn with_max_file_size_bytes(mut self, max_file_size_bytes: u64) -> Self {
        self.max_file_size_bytes = max_file_size_bytes;
        self
    }

    pub fn with_writer(mut self, writer: StreamWriterOptions) -> Self {
        self.writer = writer;
        self
    }
}

/// Summary of one partition directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub path: PathBuf,
    pub row_count: u64,
    /// Encoded bytes of finished files plus the estimated size of rows
    /// still buffered in an open writer.
    pub file_size: u64,
    pub num_files: u32,
}

#[derive(Debug)]
struct PartitionState {
    dir: PathBuf,
    next_part: u32,
    row_count: u64,
    closed_bytes: u64,
    /// Estimated payload of the currently open part file.
    open_bytes: u64,
}

impl PartitionState {
    fn info(&self) -> PartitionInfo {
        PartitionInfo {
            path: self.dir.clone(),
            row_count: self.row_count,
            file_size: self.closed_bytes + self.open_bytes,
            num_files: self.next_part,
        }
    }
}

struct Inner {
    base_dir: PathBuf,
    schema: SchemaRef,
    columns: Vec<PartitionColumn>,
    /// Virtual column names, stripped from row payloads.
    virtual_names: Vec<String>,
    max_file_size_bytes: u64,
    writer_options: StreamWriterOptions,
    pool: WriterPool,
    partitions: HashMap<String, PartitionState>,
    closed: bool,
}

/// Writes rows into a Hive-style partitioned directory tree.
///
/// All methods take `&self`; a single mutex serializes callers.
pub struct PartitionWriter {
    inner: Mutex<Inner>,
}

impl PartitionWriter {
    /// Validate partition columns against `columns` and create `base_dir`.
    ///
    /// A virtual column (`base.part`) only requires `base` in the schema.
    pub fn open(
        base_dir: impl AsRef<Path>,
        columns: &ColumnSchema,
        options: PartitionWriterOptions,
    ) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();

        let partition_columns: Vec<PartitionColumn> = options
            .partition_columns
            .iter()
            .map(|name| PartitionColumn::parse(name))
            .collect();
        for column in &partition_columns {
            if !columns.contains(column.source_column()) {
                return Err(WriterError::unknown_partition_column(column.name()));
            }
        }

        fs::create_dir_all(&base_dir).map_err(|e| WriterError::io(&base_dir, e))?;

        let virtual_names = partition_columns
            .iter()
            .filter(|c| c.is_virtual())
            .map(|c| c.name().to_string())
            .collect();

        let max_open_files = if options.max_open_files == 0 {
            DEFAULT_MAX_OPEN_FILES
        } else {
            options.max_open_files
        };
        let max_file_size_bytes = if options.max_file_size_bytes == 0 {
            DEFAULT_MAX_FILE_SIZE_BYTES
        } else {
            options.max_file_size_bytes
        };

        info!(
            base_dir = %base_dir.display(),
            partition_columns = ?options.partition_columns,
            max_open_files,
            max_file_size_bytes,
            "Opened partitioned writer"
        );

        Ok(Self {
            inner: Mutex::new(Inner {
                base_dir,
                schema: arrow_schema(columns),
                columns: partition_columns,
                virtual_names,
                max_file_size_bytes,
                writer_options: options.writer,
                pool: WriterPool::new(max_open_files),
                partitions: HashMap::new(),
                closed: false,
            }),
        })
    }

    /// Route every row to its partition.
    pub fn write_rows(&self, rows: &[Row]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(WriterError::writer_closed());
        }

        for (key, group) in inner.group_rows(rows) {
            inner.write_group(&key, &group)?;
        }
        Ok(())
    }

    /// Materialize the buffered chunk of every open writer.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(WriterError::writer_closed());
        }
        for entry in inner.pool.writers_mut() {
            entry.writer.flush()?;
        }
        Ok(())
    }

    /// Close every open writer. All writers are attempted; the first error
    /// is returned. Calling `close` again is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;

        let mut first_err = None;
        for entry in inner.pool.drain() {
            if let Err(err) = inner.retire(entry) {
                warn!(error = %err, "Failed to close partition writer");
                first_err.get_or_insert(err);
            }
        }

        info!(
            base_dir = %inner.base_dir.display(),
            partitions = inner.partitions.len(),
            "Closed partitioned writer"
        );
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Per-partition summary keyed by relative directory, including
    /// partitions whose writers were evicted or rotated.
    pub fn partition_info(&self) -> BTreeMap<String, PartitionInfo> {
        let inner = self.inner.lock();
        inner
            .partitions
            .iter()
            .map(|(key, state)| (key.clone(), state.info()))
            .collect()
    }

    /// Writers currently holding an open file.
    pub fn open_writers(&self) -> usize {
        self.inner.lock().pool.len()
    }

    pub fn base_dir(&self) -> PathBuf {
        self.inner.lock().base_dir.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl Drop for PartitionWriter {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "Failed to close partitioned writer on drop");
        }
    }
}

impl Inner {
    /// Group rows by partition key, keeping first-seen order of keys and
    /// input order within a group.
    fn group_rows<'a>(&self, rows: &'a [Row]) -> Vec<(PartitionKey, Vec<Cow<'a, Row>>)> {
        let mut groups: Vec<(PartitionKey, Vec<Cow<'a, Row>>)> = Vec::new();
        let mut index: HashMap<PartitionKey, usize> = HashMap::new();

        for row in rows {
            let key = PartitionKey::for_row(&self.columns, row);
            let payload = self.strip_virtual(row);
            match index.get(&key) {
                Some(&pos) => groups[pos].1.push(payload),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, vec![payload]));
                }
            }
        }
        groups
    }

    fn strip_virtual<'a>(&self, row: &'a Row) -> Cow<'a, Row> {
        if !self.virtual_names.iter().any(|name| row.contains_key(name)) {
            return Cow::Borrowed(row);
        }
        let mut stripped = row.clone();
        for name in &self.virtual_names {
            stripped.remove(name);
        }
        Cow::Owned(stripped)
    }

    fn write_group(&mut self, key: &PartitionKey, rows: &[Cow<'_, Row>]) -> Result<()> {
        let key_text = key.to_path_string();

        for row in rows {
            let writer = match self.pool.touch(&key_text) {
                Some(writer) => writer,
                None => self.admit(key, &key_text)?,
            };
            writer.write_row(row)?;

            let size = row_size(row);
            let rotate = match self.partitions.get_mut(&key_text) {
                Some(state) => {
                    state.row_count += 1;
                    state.open_bytes += size;
                    state.open_bytes > self.max_file_size_bytes
                }
                None => false,
            };
            if rotate {
                if let Some(entry) = self.pool.remove(&key_text) {
                    debug!(partition = %key_text, "Rotating partition file");
                    self.retire(entry)?;
                }
            }
        }
        Ok(())
    }

    /// Open the next part file for a partition not currently pooled,
    /// closing the least recently used writer first when the pool is full.
    fn admit(&mut self, key: &PartitionKey, key_text: &str) -> Result<&mut StreamWriter> {
        if self.pool.is_full() {
            if let Some(evicted) = self.pool.pop_lru() {
                debug!(partition = %evicted.key, "Evicting least recently used writer");
                self.retire(evicted)?;
            }
        }

        let base_dir = &self.base_dir;
        let state = self
            .partitions
            .entry(key_text.to_string())
            .or_insert_with(|| PartitionState {
                dir: if key.is_root() {
                    base_dir.clone()
                } else {
                    base_dir.join(key_text)
                },
                next_part: 0,
                row_count: 0,
                closed_bytes: 0,
                open_bytes: 0,
            });

        fs::create_dir_all(&state.dir).map_err(|e| WriterError::io(&state.dir, e))?;
        let path = state.dir.join(part_file_name(state.next_part));
        let writer = StreamWriter::with_arrow_schema(
            path,
            self.schema.clone(),
            self.writer_options.clone(),
        )?;
        state.next_part += 1;
        state.open_bytes = 0;

        Ok(self.pool.insert(key_text.to_string(), writer))
    }

    /// Close a writer taken out of the pool and fold its size into the
    /// partition totals.
    fn retire(&mut self, mut entry: PooledWriter) -> Result<()> {
        let result = entry.writer.close();
        if let Some(state) = self.partitions.get_mut(&entry.key) {
            state.closed_bytes += entry.writer.bytes_written();
            state.open_bytes = 0;
        }
        result
    }
}

fn row_size(row: &Row) -> u64 {
    row.iter()
        .map(|(name, value)| name.len() + value.estimated_size())
        .sum::<usize>() as u64
}
