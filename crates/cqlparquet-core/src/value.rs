//! Tagged row values.
//!
//! The row source converts whatever its driver hands back into [`Value`]
//! before rows reach the writer, so all widening/narrowing logic lives in
//! the type bridge rather than in container-shape guessing.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

/// One row: column name to value. Absent columns are treated as null.
pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Struct(Vec<(String, Value)>),
}

/// Discriminant of a [`Value`], used to key conversion strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTag {
    Null,
    Bool,
    Int64,
    Float64,
    Text,
    Bytes,
    Uuid,
    Date,
    Time,
    Timestamp,
    List,
    Map,
    Struct,
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueTag::Null => "null",
            ValueTag::Bool => "bool",
            ValueTag::Int64 => "int64",
            ValueTag::Float64 => "float64",
            ValueTag::Text => "text",
            ValueTag::Bytes => "bytes",
            ValueTag::Uuid => "uuid",
            ValueTag::Date => "date",
            ValueTag::Time => "time",
            ValueTag::Timestamp => "timestamp",
            ValueTag::List => "list",
            ValueTag::Map => "map",
            ValueTag::Struct => "struct",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn tag(&self) -> ValueTag {
        match self {
            Value::Null => ValueTag::Null,
            Value::Bool(_) => ValueTag::Bool,
            Value::Int64(_) => ValueTag::Int64,
            Value::Float64(_) => ValueTag::Float64,
            Value::Text(_) => ValueTag::Text,
            Value::Bytes(_) => ValueTag::Bytes,
            Value::Uuid(_) => ValueTag::Uuid,
            Value::Date(_) => ValueTag::Date,
            Value::Time(_) => ValueTag::Time,
            Value::Timestamp(_) => ValueTag::Timestamp,
            Value::List(_) => ValueTag::List,
            Value::Map(_) => ValueTag::Map,
            Value::Struct(_) => ValueTag::Struct,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Rough in-memory footprint, used to decide when a partition file
    /// should be rotated.
    pub fn estimated_size(&self) -> usize {
        match self {
            Value::Null => 1,
            Value::Bool(_) => 1,
            Value::Int64(_) | Value::Float64(_) | Value::Time(_) | Value::Timestamp(_) => 8,
            Value::Date(_) => 4,
            Value::Uuid(_) => 16,
            Value::Text(s) => s.len() + 4,
            Value::Bytes(b) => b.len() + 4,
            Value::List(items) => 4 + items.iter().map(Value::estimated_size).sum::<usize>(),
            Value::Map(pairs) => {
                4 + pairs
                    .iter()
                    .map(|(k, v)| k.estimated_size() + v.estimated_size())
                    .sum::<usize>()
            }
            Value::Struct(fields) => fields.iter().map(|(_, v)| v.estimated_size()).sum(),
        }
    }

    /// JSON rendering used for text columns that receive nested values and
    /// for the inspect tool.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int64(i) => Json::from(*i),
            Value::Float64(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or_else(|| Json::String(f.to_string())),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(pairs) => {
                let mut map = serde_json::Map::new();
                for (k, v) in pairs {
                    let key = match k {
                        Value::Text(s) => s.clone(),
                        other => other.to_string(),
                    };
                    map.insert(key, v.to_json());
                }
                Json::Object(map)
            }
            Value::Struct(fields) => {
                let mut map = serde_json::Map::new();
                for (name, v) in fields {
                    map.insert(name.clone(), v.to_json());
                }
                Json::Object(map)
            }
            other => Json::String(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Struct(fields) => {
                f.write_str("{")?;
                for (i, (name, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", name, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}
