//! Partitioned dataset reader.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use cqlparquet_core::{Row, Value};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::parse_partition_path;
use crate::error::{Result, WriterError};
use crate::stream_reader::StreamReader;

const PARQUET_EXTENSION: &str = "parquet";
const PARTITION_COLUMN_TYPE: &str = "text";

/// One data file and the partition values decoded from its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFile {
    pub path: PathBuf,
    /// `(column, value)` in path order; `None` is a null partition value.
    pub values: Vec<(String, Option<String>)>,
}

impl PartitionFile {
    /// Add partition values to `row` for columns the file does not store.
    /// Virtual (dotted) columns are directory metadata only and are skipped.
    fn merge_into(&self, row: &mut Row) {
        for (column, value) in &self.values {
            if column.contains('.') || row.contains_key(column) {
                continue;
            }
            row.insert(column.clone(), partition_value(value.as_deref()));
        }
    }
}

/// Typed value for a decoded partition segment: integer, then float, else
/// text.
fn partition_value(text: Option<&str>) -> Value {
    let Some(text) = text else {
        return Value::Null;
    };
    if let Ok(int) = text.parse::<i64>() {
        return Value::Int64(int);
    }
    if text.bytes().any(|b| b.is_ascii_digit()) {
        if let Ok(float) = text.parse::<f64>() {
            return Value::Float64(float);
        }
    }
    Value::Text(text.to_string())
}

/// Reads every parquet file under a directory tree in path order, merging
/// each file's partition values into its rows. At most one file is open at
/// a time.
pub struct PartitionReader {
    base_dir: PathBuf,
    files: Vec<PartitionFile>,
    partition_columns: Vec<String>,
    /// Columns of the first file, as `(name, type)`.
    file_columns: Vec<(String, String)>,
    row_count: u64,
    current: Option<(usize, StreamReader)>,
    next_file: usize,
    closed: bool,
}

impl PartitionReader {
    /// Discover the data files under `base_dir` and read their footers.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        if !base_dir.is_dir() {
            return Err(WriterError::not_a_directory(&base_dir));
        }

        let mut paths = collect_parquet_files(&base_dir)?;
        if paths.is_empty() {
            return Err(WriterError::no_parquet_files(&base_dir));
        }
        paths.sort();

        let mut columns = BTreeSet::new();
        let mut files = Vec::with_capacity(paths.len());
        let mut row_count = 0u64;
        let mut file_columns = Vec::new();

        for path in paths {
            let relative = path
                .parent()
                .and_then(|dir| dir.strip_prefix(&base_dir).ok())
                .unwrap_or_else(|| Path::new(""));
            let values = parse_partition_path(relative);
            columns.extend(values.iter().map(|(column, _)| column.clone()));

            let reader = StreamReader::open(&path)?;
            row_count += reader.row_count();
            if file_columns.is_empty() {
                file_columns = reader
                    .column_names()
                    .into_iter()
                    .zip(reader.column_types())
                    .collect();
            }

            files.push(PartitionFile { path, values });
        }

        info!(
            base_dir = %base_dir.display(),
            files = files.len(),
            rows = row_count,
            "Opened partitioned dataset"
        );

        Ok(Self {
            base_dir,
            files,
            partition_columns: columns.into_iter().collect(),
            file_columns,
            row_count,
            current: None,
            next_file: 0,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(WriterError::reader_closed());
        }
        Ok(())
    }

    /// Every row of every file, independent of the `read_batch` cursor.
    pub fn read_all(&self) -> Result<Vec<Row>> {
        self.ensure_open()?;
        let mut rows = Vec::with_capacity(self.row_count as usize);
        for file in &self.files {
            let mut reader = StreamReader::open(&file.path)?;
            let mut file_rows = reader.read_all()?;
            reader.close();
            for row in &mut file_rows {
                file.merge_into(row);
            }
            rows.extend(file_rows);
        }
        Ok(rows)
    }

    /// Up to `n` rows, continuing across file boundaries; `None` once every
    /// file is exhausted.
    pub fn read_batch(&mut self, n: usize) -> Result<Option<Vec<Row>>> {
        self.ensure_open()?;

        let mut batch = Vec::new();
        while batch.len() < n {
            if self.current.is_none() {
                if self.next_file >= self.files.len() {
                    break;
                }
                let file = &self.files[self.next_file];
                debug!(path = %file.path.display(), "Opening partition file");
                self.current = Some((self.next_file, StreamReader::open(&file.path)?));
                self.next_file += 1;
            }

            let exhausted = match self.current.as_mut() {
                Some((index, reader)) => match reader.read_batch(n - batch.len())? {
                    Some(mut rows) => {
                        let file = &self.files[*index];
                        for row in &mut rows {
                            file.merge_into(row);
                        }
                        batch.extend(rows);
                        false
                    }
                    None => {
                        reader.close();
                        true
                    }
                },
                None => true,
            };
            if exhausted {
                self.current = None;
            }
        }

        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }

    /// Release the open file. Calling `close` again is a no-op.
    pub fn close(&mut self) {
        if let Some((_, mut reader)) = self.current.take() {
            reader.close();
        }
        self.closed = true;
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Columns of the first file followed by partition columns the files do
    /// not store, typed as text. Virtual columns are not listed.
    pub fn schema(&self) -> Vec<(String, String)> {
        let mut schema = self.file_columns.clone();
        for column in &self.partition_columns {
            if column.contains('.') || schema.iter().any(|(name, _)| name == column) {
                continue;
            }
            schema.push((column.clone(), PARTITION_COLUMN_TYPE.to_string()));
        }
        schema
    }

    /// Union of partition column names seen in any path, sorted.
    pub fn partition_columns(&self) -> &[String] {
        &self.partition_columns
    }

    pub fn partition_files(&self) -> &[PartitionFile] {
        &self.files
    }

    /// Sum of the row counts recorded in every file footer.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }
}

/// Data files anywhere under `base_dir`. Symlinks are not followed, so a
/// link back into the tree cannot list a file twice.
fn collect_parquet_files(base_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(base_dir).follow_links(false) {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(base_dir).to_path_buf();
            WriterError::io(path, std::io::Error::from(err))
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let is_parquet = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(PARQUET_EXTENSION));
        if is_parquet {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn partition_values_are_typed() {
        assert_eq!(partition_value(Some("2024")), Value::Int64(2024));
        assert_eq!(partition_value(Some("-1.5")), Value::Float64(-1.5));
        assert_eq!(partition_value(Some("eu")), Value::from("eu"));
        assert_eq!(partition_value(Some("nan")), Value::from("nan"));
        assert_eq!(partition_value(Some("")), Value::from(""));
        assert_eq!(partition_value(None), Value::Null);
    }

    #[test]
    fn merge_skips_stored_and_virtual_columns() {
        let file = PartitionFile {
            path: PathBuf::from("x/part-00000.parquet"),
            values: vec![
                ("year".to_string(), Some("2024".to_string())),
                ("region".to_string(), Some("eu".to_string())),
                ("created.month".to_string(), Some("7".to_string())),
                ("shard".to_string(), None),
            ],
        };
        let mut row = Row::from([("region".to_string(), Value::from("stored"))]);
        file.merge_into(&mut row);

        assert_eq!(row["year"], Value::Int64(2024));
        assert_eq!(row["region"], Value::from("stored"));
        assert_eq!(row["shard"], Value::Null);
        assert!(!row.contains_key("created.month"));
    }

    #[test]
    fn open_requires_a_directory_with_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = PartitionReader::open(dir.path()).err().unwrap();
        assert!(matches!(err, WriterError::NoParquetFiles { .. }));

        let file = dir.path().join("notes.txt");
        fs::write(&file, "hello").unwrap();
        let err = PartitionReader::open(&file).err().unwrap();
        assert!(matches!(err, WriterError::NotADirectory { .. }));

        let err = PartitionReader::open(dir.path().join("missing")).err().unwrap();
        assert!(matches!(err, WriterError::NotADirectory { .. }));
    }
}
