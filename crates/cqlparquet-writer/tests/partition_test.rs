// Integration tests for partitioned datasets
//
// Writes Hive-style directory trees with PartitionWriter and reads them back
// with PartitionReader.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use cqlparquet_core::{ColumnSchema, CopyObserver, Row, Value};
use cqlparquet_writer::{
    PartitionReader, PartitionWriter, PartitionWriterOptions, StreamWriter, StreamWriterOptions,
    WriterError,
};
use parking_lot::Mutex;

fn row<const N: usize>(entries: [(&str, Value); N]) -> Row {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

fn relative_files(base: &Path) -> Vec<String> {
    let reader = PartitionReader::open(base).unwrap();
    reader
        .partition_files()
        .iter()
        .map(|f| {
            f.path
                .strip_prefix(base)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

fn ids(rows: &[Row]) -> Vec<i64> {
    let mut ids: Vec<i64> = rows
        .iter()
        .map(|r| match r["id"] {
            Value::Int64(id) => id,
            ref other => panic!("unexpected id {:?}", other),
        })
        .collect();
    ids.sort_unstable();
    ids
}

#[test]
fn year_month_partitions() {
    let dir = tempfile::tempdir().unwrap();
    let schema =
        ColumnSchema::from_text(&["id", "year", "month"], &["int", "int", "int"]).unwrap();
    let writer = PartitionWriter::open(
        dir.path(),
        &schema,
        PartitionWriterOptions::new(["year", "month"]),
    )
    .unwrap();

    let rows: Vec<Row> = [(1, 2024, 1), (2, 2024, 1), (3, 2024, 2), (4, 2023, 12), (5, 2023, 12)]
        .into_iter()
        .map(|(id, year, month)| {
            row([
                ("id", Value::Int64(id)),
                ("year", Value::Int64(year)),
                ("month", Value::Int64(month)),
            ])
        })
        .collect();
    writer.write_rows(&rows).unwrap();
    writer.close().unwrap();

    let info = writer.partition_info();
    let counts: Vec<(&str, u64)> = info
        .iter()
        .map(|(key, info)| (key.as_str(), info.row_count))
        .collect();
    assert_eq!(
        counts,
        vec![
            ("year=2023/month=12", 2),
            ("year=2024/month=1", 2),
            ("year=2024/month=2", 1),
        ]
    );
    for partition in info.values() {
        assert!(partition.path.is_dir());
        assert_eq!(partition.num_files, 1);
        assert!(partition.file_size > 0);
    }

    assert_eq!(
        relative_files(dir.path()),
        vec![
            "year=2023/month=12/part-00000.parquet",
            "year=2024/month=1/part-00000.parquet",
            "year=2024/month=2/part-00000.parquet",
        ]
    );

    let reader = PartitionReader::open(dir.path()).unwrap();
    assert_eq!(reader.row_count(), 5);
    assert_eq!(reader.partition_columns(), ["month", "year"]);
    let read = reader.read_all().unwrap();
    assert_eq!(ids(&read), vec![1, 2, 3, 4, 5]);
    // Stored columns win over path values
    assert!(read.iter().all(|r| matches!(r["year"], Value::Int64(_))));
}

#[test]
fn awkward_values_are_escaped_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let schema = ColumnSchema::from_text(&["id", "region"], &["int", "text"]).unwrap();
    let writer =
        PartitionWriter::open(dir.path(), &schema, PartitionWriterOptions::new(["region"]))
            .unwrap();
    writer
        .write_rows(&[
            row([("id", Value::Int64(1)), ("region", Value::from("eu/west"))]),
            row([("id", Value::Int64(2)), ("region", Value::from("k=v"))]),
            row([("id", Value::Int64(3)), ("region", Value::from(""))]),
            row([("id", Value::Int64(4)), ("region", Value::Null)]),
            row([("id", Value::Int64(5))]),
        ])
        .unwrap();
    writer.close().unwrap();

    for segment in [
        "region=eu__SLASH__west",
        "region=k__EQ__v",
        "region=__EMPTY__",
        "region=__NULL__",
    ] {
        assert!(dir.path().join(segment).is_dir(), "{}", segment);
    }
    assert_eq!(writer.partition_info()["region=__NULL__"].row_count, 2);

    let reader = PartitionReader::open(dir.path()).unwrap();
    let recovered: BTreeSet<Option<String>> = reader
        .partition_files()
        .iter()
        .map(|f| f.values[0].1.clone())
        .collect();
    assert_eq!(
        recovered,
        BTreeSet::from([
            None,
            Some(String::new()),
            Some("eu/west".to_string()),
            Some("k=v".to_string()),
        ])
    );
}

/// Tracks how many files are open at once.
#[derive(Default)]
struct OpenFiles {
    state: Mutex<(usize, usize, usize)>,
}

impl OpenFiles {
    fn current(&self) -> usize {
        self.state.lock().0
    }

    fn peak(&self) -> usize {
        self.state.lock().1
    }

    fn total_opened(&self) -> usize {
        self.state.lock().2
    }
}

impl CopyObserver for OpenFiles {
    fn file_opened(&self, _path: &Path) {
        let mut state = self.state.lock();
        state.0 += 1;
        state.1 = state.1.max(state.0);
        state.2 += 1;
    }

    fn file_closed(&self, _path: &Path, _rows: u64, _bytes: u64) {
        self.state.lock().0 -= 1;
    }
}

#[test]
fn open_writers_never_exceed_the_limit() {
    let dir = tempfile::tempdir().unwrap();
    let schema = ColumnSchema::from_text(&["id", "region"], &["int", "text"]).unwrap();
    let observer = Arc::new(OpenFiles::default());
    let options = PartitionWriterOptions::new(["region"])
        .with_max_open_files(2)
        .with_writer(StreamWriterOptions::default().with_observer(observer.clone()));
    let writer = PartitionWriter::open(dir.path(), &schema, options).unwrap();

    let regions = ["a", "b", "c", "d", "e"];
    let mut next_id = 0;
    for _ in 0..2 {
        let batch: Vec<Row> = regions
            .iter()
            .map(|region| {
                next_id += 1;
                row([("id", Value::Int64(next_id)), ("region", Value::from(*region))])
            })
            .collect();
        writer.write_rows(&batch).unwrap();
        assert!(writer.open_writers() <= 2);
        assert!(observer.current() <= 2);
    }
    writer.close().unwrap();

    assert_eq!(observer.peak(), 2);
    assert_eq!(observer.current(), 0);
    assert_eq!(observer.total_opened(), 10);
    assert_eq!(writer.open_writers(), 0);

    // Evicted partitions resumed at the next part number
    let info = writer.partition_info();
    assert!(info.values().all(|p| p.num_files == 2 && p.row_count == 2));
    let files = relative_files(dir.path());
    assert_eq!(files.len(), 10);
    assert!(files.contains(&"region=a/part-00001.parquet".to_string()));

    let reader = PartitionReader::open(dir.path()).unwrap();
    assert_eq!(ids(&reader.read_all().unwrap()), (1..=10).collect::<Vec<_>>());
}

#[test]
fn oversized_partitions_rotate_without_losing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let schema = ColumnSchema::from_text(&["id"], &["bigint"]).unwrap();
    let options = PartitionWriterOptions::default().with_max_file_size_bytes(100);
    let writer = PartitionWriter::open(dir.path(), &schema, options).unwrap();

    let rows: Vec<Row> = (0..50).map(|i| row([("id", Value::Int64(i))])).collect();
    writer.write_rows(&rows[..20]).unwrap();
    writer.write_rows(&rows[20..]).unwrap();
    writer.close().unwrap();

    let files = relative_files(dir.path());
    assert!(files.len() > 1);
    let expected: Vec<String> = (0..files.len())
        .map(|i| format!("part-{:05}.parquet", i))
        .collect();
    assert_eq!(files, expected);

    let info = writer.partition_info();
    assert_eq!(info[""].num_files as usize, files.len());
    assert_eq!(info[""].row_count, 50);

    let reader = PartitionReader::open(dir.path()).unwrap();
    assert_eq!(reader.row_count(), 50);
    assert_eq!(ids(&reader.read_all().unwrap()), (0..50).collect::<Vec<_>>());
}

#[test]
fn virtual_time_columns_only_shape_directories() {
    let dir = tempfile::tempdir().unwrap();
    let schema = ColumnSchema::from_text(&["id", "created"], &["int", "timestamp"]).unwrap();
    let writer = PartitionWriter::open(
        dir.path(),
        &schema,
        PartitionWriterOptions::new(["created.year", "created.month"]),
    )
    .unwrap();

    let at = |y, m| Value::Timestamp(Utc.with_ymd_and_hms(y, m, 15, 12, 0, 0).unwrap());
    writer
        .write_rows(&[
            row([("id", Value::Int64(1)), ("created", at(2024, 7))]),
            row([("id", Value::Int64(2)), ("created", at(2023, 1))]),
            row([("id", Value::Int64(3)), ("created", Value::from("garbage"))]),
        ])
        .unwrap();
    writer.close().unwrap();

    assert_eq!(
        relative_files(dir.path()),
        vec![
            "created.year=2023/created.month=1/part-00000.parquet",
            "created.year=2024/created.month=7/part-00000.parquet",
            // Unrecognized time values land with genuinely null ones
            "created.year=__NULL__/created.month=__NULL__/part-00000.parquet",
        ]
    );

    let reader = PartitionReader::open(dir.path()).unwrap();
    assert_eq!(
        reader.schema(),
        vec![
            ("id".to_string(), "int".to_string()),
            ("created".to_string(), "timestamp".to_string()),
        ]
    );
    for read in reader.read_all().unwrap() {
        assert_eq!(read.keys().collect::<Vec<_>>(), vec!["created", "id"]);
    }
}

fn write_plain(path: PathBuf, ids: std::ops::Range<i64>) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let schema = ColumnSchema::from_text(&["id"], &["int"]).unwrap();
    let mut writer = StreamWriter::open(&path, &schema, StreamWriterOptions::default()).unwrap();
    let rows: Vec<Row> = ids.map(|i| row([("id", Value::Int64(i))])).collect();
    writer.write_rows(&rows).unwrap();
    writer.close().unwrap();
}

#[test]
fn path_values_fill_columns_the_files_lack() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();
    write_plain(base.join("country=fr/shard=3/part-00000.parquet"), 0..2);
    write_plain(base.join("country=de__SLASH__at/shard=__NULL__/data.PARQUET"), 2..5);
    fs::write(base.join("country=fr/_SUCCESS"), "").unwrap();

    let mut reader = PartitionReader::open(base).unwrap();
    assert_eq!(reader.row_count(), 5);
    assert_eq!(reader.partition_columns(), ["country", "shard"]);
    assert_eq!(
        reader.schema(),
        vec![
            ("id".to_string(), "int".to_string()),
            ("country".to_string(), "text".to_string()),
            ("shard".to_string(), "text".to_string()),
        ]
    );

    // Batches span file boundaries
    let first = reader.read_batch(3).unwrap().unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(
        first[0],
        row([
            ("id", Value::Int64(2)),
            ("country", Value::from("de/at")),
            ("shard", Value::Null),
        ])
    );
    let second = reader.read_batch(3).unwrap().unwrap();
    assert_eq!(second.len(), 2);
    assert_eq!(
        second[1],
        row([
            ("id", Value::Int64(1)),
            ("country", Value::from("fr")),
            ("shard", Value::Int64(3)),
        ])
    );
    assert!(reader.read_batch(3).unwrap().is_none());

    reader.close();
    assert!(matches!(
        reader.read_batch(1),
        Err(WriterError::ReaderClosed { .. })
    ));
}

#[cfg(unix)]
#[test]
fn symlinked_directories_are_not_followed() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();
    write_plain(base.join("a=1/part-00000.parquet"), 0..3);
    std::os::unix::fs::symlink(base, base.join("a=1/loop")).unwrap();

    let reader = PartitionReader::open(base).unwrap();
    assert_eq!(reader.partition_files().len(), 1);
    assert_eq!(reader.row_count(), 3);
    assert_eq!(ids(&reader.read_all().unwrap()), vec![0, 1, 2]);
}

#[test]
fn oversized_batch_request_reads_everything_left() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();
    write_plain(base.join("a=1/part-00000.parquet"), 0..3);
    write_plain(base.join("a=2/part-00000.parquet"), 3..5);

    let mut reader = PartitionReader::open(base).unwrap();
    assert_eq!(reader.read_batch(2).unwrap().unwrap().len(), 2);
    let rest = reader.read_batch(usize::MAX).unwrap().unwrap();
    assert_eq!(ids(&rest), vec![2, 3, 4]);
    assert!(reader.read_batch(usize::MAX).unwrap().is_none());
}

#[test]
fn concurrent_callers_share_one_writer() {
    let dir = tempfile::tempdir().unwrap();
    let schema = ColumnSchema::from_text(&["id", "bucket"], &["int", "int"]).unwrap();
    let writer = Arc::new(
        PartitionWriter::open(
            dir.path(),
            &schema,
            PartitionWriterOptions::new(["bucket"]).with_max_open_files(3),
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let writer = Arc::clone(&writer);
            std::thread::spawn(move || {
                for chunk in 0..5 {
                    let rows: Vec<Row> = (0..10)
                        .map(|i| {
                            let id = t * 1000 + chunk * 10 + i;
                            row([("id", Value::Int64(id)), ("bucket", Value::Int64(id % 5))])
                        })
                        .collect();
                    writer.write_rows(&rows).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    writer.close().unwrap();

    let total: u64 = writer.partition_info().values().map(|p| p.row_count).sum();
    assert_eq!(total, 200);
    let reader = PartitionReader::open(dir.path()).unwrap();
    assert_eq!(reader.read_all().unwrap().len(), 200);
}
