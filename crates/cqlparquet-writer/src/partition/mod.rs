//! Hive-style partitioned datasets.
//!
//! Layout: `col1=value1/col2=value2/part-NNNNN.parquet`. Partition values are
//! escaped so they form a single path segment:
//!
//! | value        | segment text |
//! |--------------|--------------|
//! | null/absent  | `__NULL__`   |
//! | empty string | `__EMPTY__`  |
//! | `/`          | `__SLASH__`  |
//! | `=`          | `__EQ__`     |
//!
//! A partition column written `base.part` (for example `created_at.year`) is
//! virtual: its value is derived from the time carried by column `base`.

mod pool;
mod reader;
mod writer;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Timelike, Utc};
use cqlparquet_core::bridge::parse_timestamp_text;
use cqlparquet_core::{Row, Value};
use uuid::Uuid;

pub use reader::{PartitionFile, PartitionReader};
pub use writer::{PartitionInfo, PartitionWriter, PartitionWriterOptions};

pub const NULL_SENTINEL: &str = "__NULL__";
pub const EMPTY_SENTINEL: &str = "__EMPTY__";
const SLASH_ESCAPE: &str = "__SLASH__";
const EQ_ESCAPE: &str = "__EQ__";

/// Escape a partition value into one path segment.
pub fn escape_value(value: Option<&str>) -> String {
    match value {
        None => NULL_SENTINEL.to_string(),
        Some("") => EMPTY_SENTINEL.to_string(),
        Some(v) => v.replace('/', SLASH_ESCAPE).replace('=', EQ_ESCAPE),
    }
}

/// Inverse of [`escape_value`]. A bare empty segment (`col=`) also reads as
/// null.
pub fn unescape_value(segment: &str) -> Option<String> {
    match segment {
        NULL_SENTINEL | "" => None,
        EMPTY_SENTINEL => Some(String::new()),
        s => Some(s.replace(SLASH_ESCAPE, "/").replace(EQ_ESCAPE, "=")),
    }
}

/// Time component a virtual partition column extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePart {
    Year,
    Month,
    Day,
    Hour,
    Date,
}

impl FromStr for TimePart {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "year" => Ok(Self::Year),
            "month" => Ok(Self::Month),
            "day" => Ok(Self::Day),
            "hour" => Ok(Self::Hour),
            "date" => Ok(Self::Date),
            _ => Err(()),
        }
    }
}

impl TimePart {
    fn extract(self, ts: DateTime<Utc>) -> Value {
        match self {
            Self::Year => Value::Int64(ts.year() as i64),
            Self::Month => Value::Int64(ts.month() as i64),
            Self::Day => Value::Int64(ts.day() as i64),
            Self::Hour => Value::Int64(ts.hour() as i64),
            Self::Date => Value::Text(ts.format("%Y-%m-%d").to_string()),
        }
    }
}

/// One configured partition column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionColumn {
    Literal(String),
    /// `part` is `None` for an unrecognized suffix; such a column always
    /// resolves to null.
    Virtual {
        name: String,
        base: String,
        part: Option<TimePart>,
    },
}

impl PartitionColumn {
    pub fn parse(name: &str) -> Self {
        match name.split_once('.') {
            Some((base, part)) => Self::Virtual {
                name: name.to_string(),
                base: base.to_string(),
                part: part.parse().ok(),
            },
            None => Self::Literal(name.to_string()),
        }
    }

    /// Directory key, i.e. the configured name.
    pub fn name(&self) -> &str {
        match self {
            Self::Literal(name) | Self::Virtual { name, .. } => name,
        }
    }

    /// Column that must exist in the schema.
    pub fn source_column(&self) -> &str {
        match self {
            Self::Literal(name) => name,
            Self::Virtual { base, .. } => base,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual { .. })
    }

    /// Value used for the directory segment of `row`.
    pub fn resolve(&self, row: &Row) -> Value {
        match self {
            Self::Literal(name) => row.get(name).cloned().unwrap_or(Value::Null),
            Self::Virtual { base, part, .. } => {
                match (part, row.get(base).and_then(time_of)) {
                    (Some(part), Some(ts)) => part.extract(ts),
                    _ => Value::Null,
                }
            }
        }
    }
}

/// Time carried by a value: the embedded timestamp of a time-based UUID
/// (native or as text), a timestamp, or timestamp text. Anything else has
/// no time and resolves to null.
fn time_of(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Uuid(id) => uuid_time(id),
        Value::Timestamp(ts) => Some(*ts),
        Value::Date(date) => date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
        Value::Text(text) => match Uuid::parse_str(text.trim()) {
            Ok(id) => uuid_time(&id),
            Err(_) => parse_timestamp_text(text),
        },
        _ => None,
    }
}

fn uuid_time(id: &Uuid) -> Option<DateTime<Utc>> {
    let (secs, nanos) = id.get_timestamp()?.to_unix();
    DateTime::from_timestamp(i64::try_from(secs).ok()?, nanos)
}

/// Ordered `(column, escaped value)` pairs identifying a partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    parts: Vec<(String, String)>,
}

impl PartitionKey {
    pub fn for_row(columns: &[PartitionColumn], row: &Row) -> Self {
        let parts = columns
            .iter()
            .map(|column| {
                let value = column.resolve(row);
                let escaped = match &value {
                    Value::Null => escape_value(None),
                    Value::Text(text) => escape_value(Some(text.as_str())),
                    other => escape_value(Some(other.to_string().as_str())),
                };
                (column.name().to_string(), escaped)
            })
            .collect();
        Self { parts }
    }

    pub fn parts(&self) -> &[(String, String)] {
        &self.parts
    }

    /// No partition columns: files go straight into the base directory.
    pub fn is_root(&self) -> bool {
        self.parts.is_empty()
    }

    /// Relative directory, `col=value` segments joined by `/`.
    pub fn to_path_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (column, value)) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}={}", column, value)?;
        }
        Ok(())
    }
}

/// Parse a relative directory path back into `(column, value)` pairs.
/// Segments without `=` are ignored.
pub fn parse_partition_path(relative: &std::path::Path) -> Vec<(String, Option<String>)> {
    relative
        .components()
        .filter_map(|component| {
            let segment = component.as_os_str().to_str()?;
            let (column, value) = segment.split_once('=')?;
            Some((column.to_string(), unescape_value(value)))
        })
        .collect()
}

/// Part file name for rotation number `part`.
pub fn part_file_name(part: u32) -> String {
    format!("part-{:05}.parquet", part)
}
