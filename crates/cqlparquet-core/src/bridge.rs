//! Type bridge between CQL type descriptors and the Arrow type model.
//!
//! Scalar conversions are looked up in a strategy table keyed by the value's
//! tag and the target Arrow type. A pair without an entry is unsupported and
//! the caller substitutes a null.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Fields, Schema, SchemaRef, TimeUnit};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use tracing::debug;

use crate::error::ConversionError;
use crate::types::{ColumnSchema, TypeDescriptor};
use crate::value::{Value, ValueTag};

pub const DECIMAL_PRECISION: u8 = 38;
pub const DECIMAL_SCALE: i8 = 10;

pub const LIST_ITEM_FIELD: &str = "item";
pub const MAP_ENTRIES_FIELD: &str = "entries";
pub const MAP_KEY_FIELD: &str = "key";
pub const MAP_VALUE_FIELD: &str = "value";
/// Tuple elements become struct fields `field0`, `field1`, ...
pub const TUPLE_FIELD_PREFIX: &str = "field";
/// Sole field of a UDT whose definition carried no fields.
pub const UDT_FALLBACK_FIELD: &str = "value";

/// Timezone attached to timestamp columns.
pub const TIMESTAMP_TZ: &str = "UTC";

/// Map a CQL scalar name to its Arrow type.
///
/// Unknown names fall back to a string column instead of failing.
pub fn scalar_arrow_type(name: &str) -> DataType {
    match name {
        "tinyint" => DataType::Int8,
        "smallint" => DataType::Int16,
        "int" => DataType::Int32,
        "bigint" | "counter" => DataType::Int64,
        // Nanoseconds
        "duration" => DataType::Int64,
        "float" => DataType::Float32,
        "double" => DataType::Float64,
        "decimal" => DataType::Decimal128(DECIMAL_PRECISION, DECIMAL_SCALE),
        "ascii" | "text" | "varchar" => DataType::Utf8,
        // Display text for portability
        "varint" | "uuid" | "timeuuid" | "inet" => DataType::Utf8,
        "blob" => DataType::Binary,
        "boolean" => DataType::Boolean,
        "date" => DataType::Date32,
        "time" => DataType::Time64(TimeUnit::Nanosecond),
        "timestamp" => DataType::Timestamp(TimeUnit::Millisecond, Some(TIMESTAMP_TZ.into())),
        other => {
            debug!(type_name = other, "Unknown scalar type, mapping to string");
            DataType::Utf8
        }
    }
}

pub fn list_type(element: DataType) -> DataType {
    DataType::List(Arc::new(Field::new(LIST_ITEM_FIELD, element, true)))
}

pub fn map_type(key: DataType, value: DataType) -> DataType {
    let entries = Fields::from(vec![
        Field::new(MAP_KEY_FIELD, key, false),
        Field::new(MAP_VALUE_FIELD, value, true),
    ]);
    DataType::Map(
        Arc::new(Field::new(MAP_ENTRIES_FIELD, DataType::Struct(entries), false)),
        false,
    )
}

/// Deterministic descriptor -> Arrow type mapping.
pub fn to_arrow_type(descriptor: &TypeDescriptor) -> DataType {
    match descriptor {
        TypeDescriptor::Scalar(name) => scalar_arrow_type(name),
        TypeDescriptor::List(elem) | TypeDescriptor::Set(elem) => list_type(to_arrow_type(elem)),
        TypeDescriptor::Vector { element, .. } => list_type(to_arrow_type(element)),
        TypeDescriptor::Map(key, value) => map_type(to_arrow_type(key), to_arrow_type(value)),
        TypeDescriptor::Frozen(inner) => to_arrow_type(inner),
        TypeDescriptor::Tuple(elems) => DataType::Struct(
            elems
                .iter()
                .enumerate()
                .map(|(i, e)| {
                    Field::new(format!("{}{}", TUPLE_FIELD_PREFIX, i), to_arrow_type(e), true)
                })
                .collect(),
        ),
        TypeDescriptor::Udt { fields, .. } => {
            if fields.is_empty() {
                return DataType::Struct(Fields::from(vec![Field::new(
                    UDT_FALLBACK_FIELD,
                    DataType::Utf8,
                    true,
                )]));
            }
            DataType::Struct(
                fields
                    .iter()
                    .map(|(name, t)| Field::new(name.as_str(), to_arrow_type(t), true))
                    .collect(),
            )
        }
    }
}

/// Build the Arrow schema for a column schema. Every column is nullable.
pub fn arrow_schema(columns: &ColumnSchema) -> SchemaRef {
    let fields: Vec<Field> = columns
        .columns()
        .iter()
        .map(|column| {
            let data_type = to_arrow_type(&column.descriptor);
            debug!(
                column = %column.name,
                cql_type = %column.descriptor,
                arrow_type = %data_type,
                "Mapped column type"
            );
            Field::new(column.name.as_str(), data_type, true)
        })
        .collect();
    Arc::new(Schema::new(fields))
}

/// Inverse mapping used when re-deriving a textual schema from a file.
pub fn reverse_map(data_type: &DataType) -> String {
    match data_type {
        DataType::Boolean => "boolean".to_string(),
        DataType::Int8 | DataType::UInt8 => "tinyint".to_string(),
        DataType::Int16 | DataType::UInt16 => "smallint".to_string(),
        DataType::Int32 | DataType::UInt32 => "int".to_string(),
        DataType::Int64 | DataType::UInt64 => "bigint".to_string(),
        DataType::Float16 | DataType::Float32 => "float".to_string(),
        DataType::Float64 => "double".to_string(),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => "text".to_string(),
        DataType::Binary
        | DataType::LargeBinary
        | DataType::BinaryView
        | DataType::FixedSizeBinary(_) => "blob".to_string(),
        DataType::Date32 | DataType::Date64 => "date".to_string(),
        DataType::Timestamp(_, _) => "timestamp".to_string(),
        DataType::Time32(_) | DataType::Time64(_) => "time".to_string(),
        DataType::Decimal128(_, _) | DataType::Decimal256(_, _) => "decimal".to_string(),
        DataType::List(item) | DataType::LargeList(item) | DataType::FixedSizeList(item, _) => {
            format!("list<{}>", reverse_map(item.data_type()))
        }
        DataType::Map(entries, _) => match entries.data_type() {
            DataType::Struct(kv) if kv.len() == 2 => format!(
                "map<{},{}>",
                reverse_map(kv[0].data_type()),
                reverse_map(kv[1].data_type())
            ),
            _ => "text".to_string(),
        },
        DataType::Struct(fields) => {
            let positional = fields
                .iter()
                .enumerate()
                .all(|(i, f)| f.name() == &format!("{}{}", TUPLE_FIELD_PREFIX, i));
            let parts: Vec<String> = if positional {
                fields.iter().map(|f| reverse_map(f.data_type())).collect()
            } else {
                fields
                    .iter()
                    .map(|f| format!("{}:{}", f.name(), reverse_map(f.data_type())))
                    .collect()
            };
            let kind = if positional { "tuple" } else { "udt" };
            format!("{}<{}>", kind, parts.join(","))
        }
        _ => "text".to_string(),
    }
}

/// Native value ready to be appended to a scalar Arrow builder.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnarValue {
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Utf8(String),
    Binary(Vec<u8>),
    /// Days since the Unix epoch
    Date32(i32),
    /// Nanoseconds since midnight
    Time64Nanos(i64),
    /// Milliseconds since the Unix epoch
    TimestampMillis(i64),
    Decimal128(i128),
}

type ConvertFn = fn(&Value, &DataType) -> Result<ColumnarValue, ConversionError>;

fn strategy(tag: ValueTag, target: &DataType) -> Option<ConvertFn> {
    use DataType as D;
    use ValueTag as T;

    let convert: ConvertFn = match (tag, target) {
        (T::Null, _) => return None,
        (T::Bool, D::Boolean) => bool_to_boolean,
        (T::Text, D::Boolean) => text_to_boolean,
        (T::Int64 | T::Float64 | T::Text, D::Int8 | D::Int16 | D::Int32 | D::Int64) => to_integer,
        (T::Int64 | T::Float64 | T::Text, D::Float32 | D::Float64) => to_float,
        (T::Int64 | T::Float64 | T::Text, D::Decimal128(_, _)) => to_decimal,
        (_, D::Utf8) => to_utf8,
        (T::Text | T::Bytes | T::Uuid, D::Binary) => to_binary,
        (T::Date | T::Timestamp | T::Text | T::Int64, D::Date32) => to_date32,
        (T::Time | T::Text | T::Int64, D::Time64(TimeUnit::Nanosecond)) => to_time64,
        (
            T::Timestamp | T::Date | T::Text | T::Int64,
            D::Timestamp(TimeUnit::Millisecond, _),
        ) => to_timestamp_millis,
        _ => return None,
    };
    Some(convert)
}

/// Convert a single scalar value to the native representation of `target`.
pub fn convert_scalar(value: &Value, target: &DataType) -> Result<ColumnarValue, ConversionError> {
    if value.is_null() {
        return Ok(ColumnarValue::Null);
    }

    let convert = strategy(value.tag(), target).ok_or_else(|| unsupported(value, target))?;
    convert(value, target)
}

fn unsupported(value: &Value, target: &DataType) -> ConversionError {
    ConversionError::Unsupported {
        from: value.tag(),
        to: target.to_string(),
    }
}

fn unparseable(text: &str, to: &'static str) -> ConversionError {
    ConversionError::Unparseable {
        text: text.to_string(),
        to,
    }
}

fn out_of_range(value: impl ToString, to: &'static str) -> ConversionError {
    ConversionError::OutOfRange {
        value: value.to_string(),
        to,
    }
}

fn bool_to_boolean(value: &Value, target: &DataType) -> Result<ColumnarValue, ConversionError> {
    match value {
        Value::Bool(b) => Ok(ColumnarValue::Boolean(*b)),
        other => Err(unsupported(other, target)),
    }
}

fn text_to_boolean(value: &Value, target: &DataType) -> Result<ColumnarValue, ConversionError> {
    match value {
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(ColumnarValue::Boolean(true)),
            "false" => Ok(ColumnarValue::Boolean(false)),
            _ => Err(unparseable(s, "boolean")),
        },
        other => Err(unsupported(other, target)),
    }
}

fn float_to_i64(f: f64) -> Result<i64, ConversionError> {
    // 2^63 is the first float past i64::MAX; `i64::MAX as f64` rounds up to it
    if !f.is_finite()
        || f.fract() != 0.0
        || f < i64::MIN as f64
        || f >= 9_223_372_036_854_775_808.0
    {
        return Err(out_of_range(f, "int64"));
    }
    Ok(f as i64)
}

fn to_integer(value: &Value, target: &DataType) -> Result<ColumnarValue, ConversionError> {
    let wide = match value {
        Value::Int64(i) => *i,
        Value::Float64(f) => float_to_i64(*f)?,
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| unparseable(s, "integer"))?,
        other => return Err(unsupported(other, target)),
    };

    match target {
        DataType::Int8 => i8::try_from(wide)
            .map(ColumnarValue::Int8)
            .map_err(|_| out_of_range(wide, "int8")),
        DataType::Int16 => i16::try_from(wide)
            .map(ColumnarValue::Int16)
            .map_err(|_| out_of_range(wide, "int16")),
        DataType::Int32 => i32::try_from(wide)
            .map(ColumnarValue::Int32)
            .map_err(|_| out_of_range(wide, "int32")),
        _ => Ok(ColumnarValue::Int64(wide)),
    }
}

fn to_float(value: &Value, target: &DataType) -> Result<ColumnarValue, ConversionError> {
    let wide = match value {
        Value::Int64(i) => *i as f64,
        Value::Float64(f) => *f,
        Value::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| unparseable(s, "float"))?,
        other => return Err(unsupported(other, target)),
    };

    match target {
        DataType::Float32 => Ok(ColumnarValue::Float32(wide as f32)),
        _ => Ok(ColumnarValue::Float64(wide)),
    }
}

fn to_decimal(value: &Value, target: &DataType) -> Result<ColumnarValue, ConversionError> {
    let DataType::Decimal128(precision, scale) = target else {
        return Err(unsupported(value, target));
    };

    let unscaled = match value {
        Value::Int64(i) => (*i as i128)
            .checked_mul(pow10(*scale as u32).ok_or_else(|| out_of_range(i, "decimal"))?)
            .ok_or_else(|| out_of_range(i, "decimal"))?,
        Value::Float64(f) => {
            let scaled = f * 10f64.powi(*scale as i32);
            if !scaled.is_finite() || scaled.abs() >= 1e38 {
                return Err(out_of_range(f, "decimal"));
            }
            scaled.round() as i128
        }
        Value::Text(s) => parse_decimal(s, *scale).ok_or_else(|| unparseable(s, "decimal"))?,
        other => return Err(unsupported(other, target)),
    };

    let limit = pow10(*precision as u32).unwrap_or(i128::MAX);
    if unscaled.abs() >= limit {
        return Err(out_of_range(format_decimal(unscaled, *scale), "decimal"));
    }
    Ok(ColumnarValue::Decimal128(unscaled))
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

/// Parse decimal text (`-12.345`, `1.5E+3`) into an unscaled integer at
/// `scale`. Digits beyond the scale are truncated.
pub fn parse_decimal(text: &str, scale: i8) -> Option<i128> {
    let text = text.trim();
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(idx) => (&unsigned[..idx], unsigned[idx + 1..].parse::<i32>().ok()?),
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut digits: i128 = 0;
    for c in int_part.chars().chain(frac_part.chars()) {
        digits = digits.checked_mul(10)?.checked_add(c.to_digit(10)? as i128)?;
    }

    // Scale currently carried by `digits`
    let present = frac_part.len() as i64 - exponent as i64;
    let wanted = scale as i64;
    let unscaled = if wanted >= present {
        let shift = u32::try_from(wanted - present).ok()?;
        digits.checked_mul(pow10(shift)?)?
    } else {
        // Dividing by more than 10^38 leaves nothing
        u32::try_from(present - wanted)
            .ok()
            .and_then(pow10)
            .map_or(0, |factor| digits / factor)
    };

    Some(if negative { -unscaled } else { unscaled })
}

/// Render an unscaled decimal without trailing fractional zeros.
pub fn format_decimal(unscaled: i128, scale: i8) -> String {
    if scale <= 0 {
        let shift = scale.unsigned_abs() as u32;
        return match pow10(shift).and_then(|factor| unscaled.checked_mul(factor)) {
            Some(value) => value.to_string(),
            None => format!("{}E+{}", unscaled, shift),
        };
    }

    let factor = pow10(scale as u32).unwrap_or(1) as u128;
    let magnitude = unscaled.unsigned_abs();
    let int_part = magnitude / factor;
    let frac_part = magnitude % factor;
    let sign = if unscaled < 0 { "-" } else { "" };

    if frac_part == 0 {
        return format!("{}{}", sign, int_part);
    }
    let frac = format!("{:0width$}", frac_part, width = scale as usize);
    format!("{}{}.{}", sign, int_part, frac.trim_end_matches('0'))
}

fn to_utf8(value: &Value, _target: &DataType) -> Result<ColumnarValue, ConversionError> {
    let text = match value {
        Value::Text(s) => s.clone(),
        Value::Bytes(b) => {
            String::from_utf8(b.clone()).map_err(|_| unparseable(&value.to_string(), "utf8"))?
        }
        Value::List(_) | Value::Map(_) | Value::Struct(_) => value.to_json().to_string(),
        other => other.to_string(),
    };
    Ok(ColumnarValue::Utf8(text))
}

fn to_binary(value: &Value, target: &DataType) -> Result<ColumnarValue, ConversionError> {
    match value {
        Value::Text(s) => Ok(ColumnarValue::Binary(s.as_bytes().to_vec())),
        Value::Bytes(b) => Ok(ColumnarValue::Binary(b.clone())),
        Value::Uuid(u) => Ok(ColumnarValue::Binary(u.as_bytes().to_vec())),
        other => Err(unsupported(other, target)),
    }
}

fn unix_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn date_to_days(date: NaiveDate) -> Result<i32, ConversionError> {
    let days = date.signed_duration_since(unix_epoch()).num_days();
    i32::try_from(days).map_err(|_| out_of_range(date, "date32"))
}

fn to_date32(value: &Value, target: &DataType) -> Result<ColumnarValue, ConversionError> {
    let days = match value {
        Value::Date(d) => date_to_days(*d)?,
        Value::Timestamp(ts) => date_to_days(ts.date_naive())?,
        Value::Text(s) => {
            let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .or_else(|| parse_timestamp_text(s).map(|ts| ts.date_naive()))
                .ok_or_else(|| unparseable(s, "date"))?;
            date_to_days(date)?
        }
        Value::Int64(i) => i32::try_from(*i).map_err(|_| out_of_range(i, "date32"))?,
        other => return Err(unsupported(other, target)),
    };
    Ok(ColumnarValue::Date32(days))
}

fn time_to_nanos(time: NaiveTime) -> i64 {
    time.num_seconds_from_midnight() as i64 * 1_000_000_000 + time.nanosecond() as i64
}

fn to_time64(value: &Value, target: &DataType) -> Result<ColumnarValue, ConversionError> {
    let nanos = match value {
        Value::Time(t) => time_to_nanos(*t),
        Value::Int64(i) => *i,
        Value::Text(s) => {
            let trimmed = s.trim();
            let time = NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
                .map_err(|_| unparseable(s, "time"))?;
            time_to_nanos(time)
        }
        other => return Err(unsupported(other, target)),
    };
    Ok(ColumnarValue::Time64Nanos(nanos))
}

fn to_timestamp_millis(value: &Value, target: &DataType) -> Result<ColumnarValue, ConversionError> {
    let millis = match value {
        Value::Timestamp(ts) => ts.timestamp_millis(),
        Value::Date(d) => d
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .ok_or_else(|| out_of_range(d, "timestamp"))?,
        Value::Int64(i) => *i,
        Value::Text(s) => parse_timestamp_text(s)
            .map(|ts| ts.timestamp_millis())
            .ok_or_else(|| unparseable(s, "timestamp"))?,
        other => return Err(unsupported(other, target)),
    };
    Ok(ColumnarValue::TimestampMillis(millis))
}

/// Parse the timestamp spellings CQL tooling produces: RFC 3339,
/// `2024-01-15 14:30:00.000+0000`, naive date-times (taken as UTC) and bare
/// dates (midnight UTC).
pub fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(ts) = DateTime::parse_from_str(text, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
