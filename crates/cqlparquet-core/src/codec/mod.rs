//! Nested value codec.
//!
//! [`ColumnBuilder`] is a tree of builders mirroring an Arrow [`DataType`].
//! Scalar leaves wrap the stock Arrow builders; list, map and struct nodes
//! keep their own offsets and validity so children stay strongly typed all
//! the way down.
//!
//! Every `append` adds exactly one slot. When some part of the value could
//! not be represented the slot (or the offending child) is filled with null
//! and the first error is returned for reporting.

mod display;
mod extract;

use std::sync::Arc;

use arrow::array::{
    ArrayBuilder, ArrayRef, BinaryBuilder, BooleanBuilder, Date32Builder, Decimal128Builder,
    Float32Builder, Float64Builder, Int16Builder, Int32Builder, Int64Builder, Int8Builder,
    ListArray, MapArray, StringBuilder, StructArray, Time64NanosecondBuilder,
    TimestampMillisecondBuilder,
};
use arrow::buffer::{NullBuffer, OffsetBuffer, ScalarBuffer};
use arrow::datatypes::{DataType, FieldRef, Fields, TimeUnit};
use arrow::error::ArrowError;

use crate::bridge::{convert_scalar, ColumnarValue};
use crate::error::ConversionError;
use crate::value::Value;

pub use display::parse_udt_display;
pub use extract::{extract_list, extract_map, extract_struct, extract_value};

/// Builder for one column (or one nested child) of a record batch.
#[derive(Debug)]
pub enum ColumnBuilder {
    Scalar(ScalarColumn),
    List(ListColumn),
    Map(MapColumn),
    Struct(StructColumn),
}

#[derive(Debug)]
pub struct ScalarColumn {
    data_type: DataType,
    inner: ScalarInner,
}

#[derive(Debug)]
enum ScalarInner {
    Boolean(BooleanBuilder),
    Int8(Int8Builder),
    Int16(Int16Builder),
    Int32(Int32Builder),
    Int64(Int64Builder),
    Float32(Float32Builder),
    Float64(Float64Builder),
    Utf8(StringBuilder),
    Binary(BinaryBuilder),
    Date32(Date32Builder),
    Time64(Time64NanosecondBuilder),
    Timestamp(TimestampMillisecondBuilder),
    Decimal128(Decimal128Builder),
}

#[derive(Debug)]
pub struct ListColumn {
    item: FieldRef,
    offsets: Vec<i32>,
    validity: Vec<bool>,
    values: Box<ColumnBuilder>,
}

#[derive(Debug)]
pub struct MapColumn {
    entries: FieldRef,
    ordered: bool,
    entry_fields: Fields,
    offsets: Vec<i32>,
    validity: Vec<bool>,
    keys: Box<ColumnBuilder>,
    values: Box<ColumnBuilder>,
}

#[derive(Debug)]
pub struct StructColumn {
    fields: Fields,
    validity: Vec<bool>,
    children: Vec<ColumnBuilder>,
}

impl ColumnBuilder {
    /// Create a builder tree for `data_type`.
    ///
    /// Only the types produced by the type bridge are supported.
    pub fn try_new(data_type: &DataType) -> Result<Self, ConversionError> {
        let unsupported = || ConversionError::UnsupportedColumnType(data_type.to_string());

        let inner = match data_type {
            DataType::Boolean => ScalarInner::Boolean(BooleanBuilder::new()),
            DataType::Int8 => ScalarInner::Int8(Int8Builder::new()),
            DataType::Int16 => ScalarInner::Int16(Int16Builder::new()),
            DataType::Int32 => ScalarInner::Int32(Int32Builder::new()),
            DataType::Int64 => ScalarInner::Int64(Int64Builder::new()),
            DataType::Float32 => ScalarInner::Float32(Float32Builder::new()),
            DataType::Float64 => ScalarInner::Float64(Float64Builder::new()),
            DataType::Utf8 => ScalarInner::Utf8(StringBuilder::new()),
            DataType::Binary => ScalarInner::Binary(BinaryBuilder::new()),
            DataType::Date32 => ScalarInner::Date32(Date32Builder::new()),
            DataType::Time64(TimeUnit::Nanosecond) => {
                ScalarInner::Time64(Time64NanosecondBuilder::new())
            }
            DataType::Timestamp(TimeUnit::Millisecond, tz) => ScalarInner::Timestamp(
                TimestampMillisecondBuilder::new().with_timezone_opt(tz.clone()),
            ),
            DataType::Decimal128(precision, scale) => ScalarInner::Decimal128(
                Decimal128Builder::new()
                    .with_precision_and_scale(*precision, *scale)
                    .map_err(|_| unsupported())?,
            ),
            DataType::List(item) => {
                return Ok(Self::List(ListColumn {
                    item: item.clone(),
                    offsets: vec![0],
                    validity: Vec::new(),
                    values: Box::new(Self::try_new(item.data_type())?),
                }))
            }
            DataType::Map(entries, ordered) => {
                let DataType::Struct(entry_fields) = entries.data_type() else {
                    return Err(unsupported());
                };
                if entry_fields.len() != 2 {
                    return Err(unsupported());
                }
                return Ok(Self::Map(MapColumn {
                    entries: entries.clone(),
                    ordered: *ordered,
                    entry_fields: entry_fields.clone(),
                    offsets: vec![0],
                    validity: Vec::new(),
                    keys: Box::new(Self::try_new(entry_fields[0].data_type())?),
                    values: Box::new(Self::try_new(entry_fields[1].data_type())?),
                }));
            }
            DataType::Struct(fields) => {
                let children = fields
                    .iter()
                    .map(|f| Self::try_new(f.data_type()))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Self::Struct(StructColumn {
                    fields: fields.clone(),
                    validity: Vec::new(),
                    children,
                }));
            }
            _ => return Err(unsupported()),
        };

        Ok(Self::Scalar(ScalarColumn {
            data_type: data_type.clone(),
            inner,
        }))
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Scalar(s) => s.data_type.clone(),
            Self::List(l) => DataType::List(l.item.clone()),
            Self::Map(m) => DataType::Map(m.entries.clone(), m.ordered),
            Self::Struct(s) => DataType::Struct(s.fields.clone()),
        }
    }

    /// Number of slots appended since the last `finish`.
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(s) => s.len(),
            Self::List(l) => l.validity.len(),
            Self::Map(m) => m.validity.len(),
            Self::Struct(s) => s.validity.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append_null(&mut self) {
        match self {
            Self::Scalar(s) => s.append_null(),
            Self::List(l) => l.push_null(),
            Self::Map(m) => m.push_null(),
            Self::Struct(s) => s.push_null(),
        }
    }

    /// Append one value, dispatching on the builder's shape.
    pub fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        match self {
            Self::Scalar(s) => s.append(value),
            Self::List(l) => l.append(value),
            Self::Map(m) => m.append(value),
            Self::Struct(s) => s.append(value),
        }
    }

    /// Whether `value` can be stored without substitution. Used to drop map
    /// entries whose key would otherwise become null.
    pub fn accepts(&self, value: &Value) -> bool {
        !value.is_null() && self.fits(value)
    }

    /// Like [`accepts`](Self::accepts) but a null anywhere is fine, since
    /// nested children are nullable.
    fn fits(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            Self::Scalar(s) => convert_scalar(value, &s.data_type).is_ok(),
            Self::List(l) => match value {
                Value::List(items) => items.iter().all(|item| l.values.fits(item)),
                Value::Text(text) if is_float(l.item.data_type()) => {
                    parse_vector_literal(text).is_some()
                }
                _ => false,
            },
            Self::Map(m) => match value {
                Value::Map(pairs) => pairs
                    .iter()
                    .all(|(k, v)| m.keys.accepts(k) && m.values.fits(v)),
                Value::Struct(fields) => fields.iter().all(|(name, v)| {
                    m.keys.accepts(&Value::Text(name.clone())) && m.values.fits(v)
                }),
                _ => false,
            },
            Self::Struct(s) => match value {
                Value::Struct(pairs) => s.fits_named(|name| {
                    pairs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
                }),
                Value::Map(pairs) => s.fits_named(|name| {
                    pairs
                        .iter()
                        .find(|(k, _)| k.as_str() == Some(name))
                        .map(|(_, v)| v)
                }),
                Value::List(items) => s
                    .children
                    .iter()
                    .enumerate()
                    .all(|(idx, child)| child.fits(items.get(idx).unwrap_or(&Value::Null))),
                Value::Text(text) => parse_udt_display(text).is_some_and(|pairs| {
                    s.fits_named(|name| pairs.iter().find(|(n, _)| n == name).map(|(_, v)| v))
                }),
                _ => false,
            },
        }
    }

    /// Build the array from everything appended so far and reset. The
    /// builder is reset even when building fails.
    pub fn finish(&mut self) -> Result<ArrayRef, ArrowError> {
        match self {
            Self::Scalar(s) => Ok(s.finish()),
            Self::List(l) => l.finish(),
            Self::Map(m) => m.finish(),
            Self::Struct(s) => s.finish(),
        }
    }
}

impl ScalarColumn {
    fn len(&self) -> usize {
        match &self.inner {
            ScalarInner::Boolean(b) => b.len(),
            ScalarInner::Int8(b) => b.len(),
            ScalarInner::Int16(b) => b.len(),
            ScalarInner::Int32(b) => b.len(),
            ScalarInner::Int64(b) => b.len(),
            ScalarInner::Float32(b) => b.len(),
            ScalarInner::Float64(b) => b.len(),
            ScalarInner::Utf8(b) => b.len(),
            ScalarInner::Binary(b) => b.len(),
            ScalarInner::Date32(b) => b.len(),
            ScalarInner::Time64(b) => b.len(),
            ScalarInner::Timestamp(b) => b.len(),
            ScalarInner::Decimal128(b) => b.len(),
        }
    }

    fn append_null(&mut self) {
        match &mut self.inner {
            ScalarInner::Boolean(b) => b.append_null(),
            ScalarInner::Int8(b) => b.append_null(),
            ScalarInner::Int16(b) => b.append_null(),
            ScalarInner::Int32(b) => b.append_null(),
            ScalarInner::Int64(b) => b.append_null(),
            ScalarInner::Float32(b) => b.append_null(),
            ScalarInner::Float64(b) => b.append_null(),
            ScalarInner::Utf8(b) => b.append_null(),
            ScalarInner::Binary(b) => b.append_null(),
            ScalarInner::Date32(b) => b.append_null(),
            ScalarInner::Time64(b) => b.append_null(),
            ScalarInner::Timestamp(b) => b.append_null(),
            ScalarInner::Decimal128(b) => b.append_null(),
        }
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let native = match convert_scalar(value, &self.data_type) {
            Ok(native) => native,
            Err(err) => {
                self.append_null();
                return Err(err);
            }
        };

        let stored = match (&mut self.inner, native) {
            (_, ColumnarValue::Null) => false,
            (ScalarInner::Boolean(b), ColumnarValue::Boolean(v)) => {
                b.append_value(v);
                true
            }
            (ScalarInner::Int8(b), ColumnarValue::Int8(v)) => {
                b.append_value(v);
                true
            }
            (ScalarInner::Int16(b), ColumnarValue::Int16(v)) => {
                b.append_value(v);
                true
            }
            (ScalarInner::Int32(b), ColumnarValue::Int32(v)) => {
                b.append_value(v);
                true
            }
            (ScalarInner::Int64(b), ColumnarValue::Int64(v)) => {
                b.append_value(v);
                true
            }
            (ScalarInner::Float32(b), ColumnarValue::Float32(v)) => {
                b.append_value(v);
                true
            }
            (ScalarInner::Float64(b), ColumnarValue::Float64(v)) => {
                b.append_value(v);
                true
            }
            (ScalarInner::Utf8(b), ColumnarValue::Utf8(v)) => {
                b.append_value(v);
                true
            }
            (ScalarInner::Binary(b), ColumnarValue::Binary(v)) => {
                b.append_value(v);
                true
            }
            (ScalarInner::Date32(b), ColumnarValue::Date32(v)) => {
                b.append_value(v);
                true
            }
            (ScalarInner::Time64(b), ColumnarValue::Time64Nanos(v)) => {
                b.append_value(v);
                true
            }
            (ScalarInner::Timestamp(b), ColumnarValue::TimestampMillis(v)) => {
                b.append_value(v);
                true
            }
            (ScalarInner::Decimal128(b), ColumnarValue::Decimal128(v)) => {
                b.append_value(v);
                true
            }
            _ => false,
        };

        if !stored {
            self.append_null();
            if !value.is_null() {
                return Err(ConversionError::Unsupported {
                    from: value.tag(),
                    to: self.data_type.to_string(),
                });
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> ArrayRef {
        match &mut self.inner {
            ScalarInner::Boolean(b) => Arc::new(b.finish()),
            ScalarInner::Int8(b) => Arc::new(b.finish()),
            ScalarInner::Int16(b) => Arc::new(b.finish()),
            ScalarInner::Int32(b) => Arc::new(b.finish()),
            ScalarInner::Int64(b) => Arc::new(b.finish()),
            ScalarInner::Float32(b) => Arc::new(b.finish()),
            ScalarInner::Float64(b) => Arc::new(b.finish()),
            ScalarInner::Utf8(b) => Arc::new(b.finish()),
            ScalarInner::Binary(b) => Arc::new(b.finish()),
            ScalarInner::Date32(b) => Arc::new(b.finish()),
            ScalarInner::Time64(b) => Arc::new(b.finish()),
            ScalarInner::Timestamp(b) => Arc::new(b.finish()),
            ScalarInner::Decimal128(b) => Arc::new(b.finish()),
        }
    }
}

fn take_nulls(validity: &mut Vec<bool>) -> Option<NullBuffer> {
    let validity = std::mem::take(validity);
    if validity.iter().all(|v| *v) {
        None
    } else {
        Some(NullBuffer::from(validity))
    }
}

fn take_offsets(offsets: &mut Vec<i32>) -> OffsetBuffer<i32> {
    let taken = std::mem::replace(offsets, vec![0]);
    OffsetBuffer::new(ScalarBuffer::from(taken))
}

fn last_offset(offsets: &[i32]) -> i32 {
    offsets.last().copied().unwrap_or(0)
}

/// Finish every builder, resetting all of them even if one fails.
pub fn finish_all(builders: &mut [ColumnBuilder]) -> Result<Vec<ArrayRef>, ArrowError> {
    let results: Vec<_> = builders.iter_mut().map(ColumnBuilder::finish).collect();
    results.into_iter().collect()
}

fn keep_first(first: &mut Option<ConversionError>, result: Result<(), ConversionError>) {
    if let Err(err) = result {
        first.get_or_insert(err);
    }
}

fn into_result(first: Option<ConversionError>) -> Result<(), ConversionError> {
    match first {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

impl ListColumn {
    fn push_null(&mut self) {
        self.offsets.push(last_offset(&self.offsets));
        self.validity.push(false);
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let parsed;
        let items: &[Value] = match value {
            Value::Null => {
                self.push_null();
                return Ok(());
            }
            Value::List(items) => items,
            Value::Text(text) if is_float(self.item.data_type()) => {
                match parse_vector_literal(text) {
                    Some(values) => {
                        parsed = values;
                        &parsed
                    }
                    None => {
                        self.push_null();
                        return Err(ConversionError::Unparseable {
                            text: text.clone(),
                            to: "vector",
                        });
                    }
                }
            }
            other => {
                self.push_null();
                return Err(ConversionError::UnsupportedShape {
                    container: "list",
                    found: other.tag(),
                });
            }
        };

        let mut first = None;
        for item in items {
            keep_first(&mut first, self.values.append(item));
        }
        self.offsets
            .push(last_offset(&self.offsets) + items.len() as i32);
        self.validity.push(true);
        into_result(first)
    }

    fn finish(&mut self) -> Result<ArrayRef, ArrowError> {
        let offsets = take_offsets(&mut self.offsets);
        let nulls = take_nulls(&mut self.validity);
        let values = self.values.finish()?;
        Ok(Arc::new(ListArray::try_new(
            self.item.clone(),
            offsets,
            values,
            nulls,
        )?))
    }
}

fn is_float(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Float32 | DataType::Float64)
}

/// Parse the textual vector form `[0.12, 0.45, 0.78]`. Elements may be
/// separated by commas or whitespace.
pub fn parse_vector_literal(text: &str) -> Option<Vec<Value>> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .unwrap_or(trimmed);

    inner
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<f64>().ok().map(Value::Float64))
        .collect()
}

impl MapColumn {
    fn push_null(&mut self) {
        self.offsets.push(last_offset(&self.offsets));
        self.validity.push(false);
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let mut first = None;
        let mut count = 0i32;

        match value {
            Value::Null => {
                self.push_null();
                return Ok(());
            }
            Value::Map(pairs) => {
                for (key, val) in pairs {
                    if self.append_entry(key, val, &mut first) {
                        count += 1;
                    }
                }
            }
            // Name-keyed structs arrive from sources that only know string keys
            Value::Struct(fields) => {
                for (name, val) in fields {
                    if self.append_entry(&Value::Text(name.clone()), val, &mut first) {
                        count += 1;
                    }
                }
            }
            other => {
                self.push_null();
                return Err(ConversionError::UnsupportedShape {
                    container: "map",
                    found: other.tag(),
                });
            }
        }

        self.offsets.push(last_offset(&self.offsets) + count);
        self.validity.push(true);
        into_result(first)
    }

    fn append_entry(
        &mut self,
        key: &Value,
        value: &Value,
        first: &mut Option<ConversionError>,
    ) -> bool {
        if !self.keys.accepts(key) {
            first.get_or_insert(ConversionError::MapKeyDropped);
            return false;
        }
        keep_first(first, self.keys.append(key));
        keep_first(first, self.values.append(value));
        true
    }

    fn finish(&mut self) -> Result<ArrayRef, ArrowError> {
        let offsets = take_offsets(&mut self.offsets);
        let nulls = take_nulls(&mut self.validity);
        let keys = self.keys.finish();
        let values = self.values.finish();
        let entries = StructArray::try_new(self.entry_fields.clone(), vec![keys?, values?], None)?;
        Ok(Arc::new(MapArray::try_new(
            self.entries.clone(),
            offsets,
            entries,
            nulls,
            self.ordered,
        )?))
    }
}

impl StructColumn {
    fn push_null(&mut self) {
        for child in &mut self.children {
            child.append_null();
        }
        self.validity.push(false);
    }

    fn push_all_null_fields(&mut self) {
        for child in &mut self.children {
            child.append_null();
        }
        self.validity.push(true);
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        match value {
            Value::Null => {
                self.push_null();
                Ok(())
            }
            Value::Struct(pairs) => self.append_named(|name| {
                pairs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
            }),
            Value::Map(pairs) => self.append_named(|name| {
                pairs
                    .iter()
                    .find(|(k, _)| k.as_str() == Some(name))
                    .map(|(_, v)| v)
            }),
            // Tuples: trailing missing fields are null, excess values dropped
            Value::List(items) => {
                let mut first = None;
                for (idx, child) in self.children.iter_mut().enumerate() {
                    keep_first(&mut first, child.append(items.get(idx).unwrap_or(&Value::Null)));
                }
                self.validity.push(true);
                into_result(first)
            }
            Value::Text(text) => match parse_udt_display(text) {
                Some(pairs) => self.append_named(|name| {
                    pairs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
                }),
                None => {
                    self.push_all_null_fields();
                    Err(ConversionError::DisplayString(text.clone()))
                }
            },
            other => {
                self.push_null();
                Err(ConversionError::UnsupportedShape {
                    container: "struct",
                    found: other.tag(),
                })
            }
        }
    }

    fn fits_named<'a, F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        self.fields
            .iter()
            .zip(&self.children)
            .all(|(field, child)| child.fits(lookup(field.name()).unwrap_or(&Value::Null)))
    }

    fn append_named<'a, F>(&mut self, lookup: F) -> Result<(), ConversionError>
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        let mut first = None;
        for (field, child) in self.fields.iter().zip(self.children.iter_mut()) {
            let value = lookup(field.name()).unwrap_or(&Value::Null);
            keep_first(&mut first, child.append(value));
        }
        self.validity.push(true);
        into_result(first)
    }

    fn finish(&mut self) -> Result<ArrayRef, ArrowError> {
        let len = self.validity.len();
        let nulls = take_nulls(&mut self.validity);
        if self.children.is_empty() {
            return Ok(Arc::new(StructArray::new_empty_fields(len, nulls)));
        }
        let arrays = finish_all(&mut self.children)?;
        Ok(Arc::new(StructArray::try_new(
            self.fields.clone(),
            arrays,
            nulls,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::to_arrow_type;
    use crate::types::resolve;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::Int32Type;

    fn builder_for(text: &str) -> ColumnBuilder {
        ColumnBuilder::try_new(&to_arrow_type(&resolve(text).unwrap())).unwrap()
    }

    #[test]
    fn list_keeps_null_distinct_from_empty() {
        let mut builder = builder_for("list<text>");
        builder.append(&Value::from(vec!["a", "b"])).unwrap();
        builder.append(&Value::Null).unwrap();
        builder.append(&Value::List(vec![])).unwrap();

        let array = builder.finish().unwrap();
        let list = array.as_list::<i32>();
        assert_eq!(list.len(), 3);
        assert!(list.is_valid(0));
        assert!(list.is_null(1));
        assert!(list.is_valid(2));
        assert_eq!(list.value(2).len(), 0);
        assert_eq!(extract_value(array.as_ref(), 0), Value::from(vec!["a", "b"]));
    }

    #[test]
    fn list_rejects_unrecognized_shapes() {
        let mut builder = builder_for("list<int>");
        let err = builder.append(&Value::Bool(true)).unwrap_err();
        assert_eq!(
            err,
            ConversionError::UnsupportedShape {
                container: "list",
                found: crate::value::ValueTag::Bool
            }
        );
        assert_eq!(builder.len(), 1);
        assert!(builder.finish().unwrap().is_null(0));
    }

    #[test]
    fn bad_element_becomes_null_inside_list() {
        let mut builder = builder_for("list<int>");
        let err = builder
            .append(&Value::List(vec![Value::Int64(1), Value::from("x")]))
            .unwrap_err();
        assert!(matches!(err, ConversionError::Unparseable { .. }));

        let array = builder.finish().unwrap();
        assert_eq!(
            extract_value(array.as_ref(), 0),
            Value::List(vec![Value::Int64(1), Value::Null])
        );
    }

    #[test]
    fn vector_literal_into_float_list() {
        let mut builder = builder_for("vector<float,3>");
        builder.append(&Value::from("[0.5, 1.5 2.5]")).unwrap();
        let array = builder.finish().unwrap();
        assert_eq!(
            extract_value(array.as_ref(), 0),
            Value::List(vec![
                Value::Float64(0.5),
                Value::Float64(1.5),
                Value::Float64(2.5)
            ])
        );
    }

    #[test]
    fn map_drops_null_keys() {
        let mut builder = builder_for("map<text,int>");
        let value = Value::Map(vec![
            (Value::from("a"), Value::Int64(1)),
            (Value::Null, Value::Int64(2)),
            (Value::from("c"), Value::Null),
        ]);
        assert_eq!(builder.append(&value), Err(ConversionError::MapKeyDropped));
        builder.append(&Value::Null).unwrap();

        let array = builder.finish().unwrap();
        assert_eq!(
            extract_value(array.as_ref(), 0),
            Value::Map(vec![
                (Value::from("a"), Value::Int64(1)),
                (Value::from("c"), Value::Null),
            ])
        );
        assert_eq!(extract_value(array.as_ref(), 1), Value::Null);
    }

    #[test]
    fn map_drops_keys_of_the_wrong_shape() {
        let mut builder = builder_for("map<frozen<list<int>>,int>");
        let value = Value::Map(vec![
            (Value::Int64(5), Value::Int64(1)),
            (Value::from(vec![1i64, 2]), Value::Int64(2)),
            (Value::List(vec![Value::from("x")]), Value::Int64(3)),
            (Value::List(vec![Value::Null]), Value::Int64(4)),
        ]);
        assert_eq!(builder.append(&value), Err(ConversionError::MapKeyDropped));
        builder
            .append(&Value::Map(vec![(Value::from(vec![7i64]), Value::Int64(7))]))
            .unwrap();

        let array = builder.finish().unwrap();
        assert_eq!(
            extract_value(array.as_ref(), 0),
            Value::Map(vec![
                (Value::from(vec![1i64, 2]), Value::Int64(2)),
                (Value::List(vec![Value::Null]), Value::Int64(4)),
            ])
        );
        assert_eq!(
            extract_value(array.as_ref(), 1),
            Value::Map(vec![(Value::from(vec![7i64]), Value::Int64(7))])
        );
    }

    #[test]
    fn nested_key_shapes_are_checked_all_the_way_down() {
        let builder = builder_for("map<frozen<udt<a:int,b:list<int>>>,int>");
        let ColumnBuilder::Map(map) = &builder else {
            panic!("expected a map builder");
        };
        let good = Value::Struct(vec![
            ("a".into(), Value::Int64(1)),
            ("b".into(), Value::from(vec![2i64])),
        ]);
        let bad_child = Value::Struct(vec![
            ("a".into(), Value::Int64(1)),
            ("b".into(), Value::Int64(2)),
        ]);
        assert!(map.keys.accepts(&good));
        assert!(map.keys.accepts(&Value::from("{a: 1, b: null}")));
        assert!(!map.keys.accepts(&bad_child));
        assert!(!map.keys.accepts(&Value::from("not a udt")));
        assert!(!map.keys.accepts(&Value::Null));
    }

    #[test]
    fn struct_from_named_fields_positional_and_display() {
        let mut builder = builder_for("udt<street:text,zip:int>");
        builder
            .append(&Value::Struct(vec![
                ("zip".into(), Value::Int64(12345)),
                ("street".into(), Value::from("Main")),
            ]))
            .unwrap();
        builder
            .append(&Value::List(vec![Value::from("Elm")]))
            .unwrap();
        builder
            .append(&Value::from("{street: 'O''Hara', zip: 7}"))
            .unwrap();
        let err = builder.append(&Value::from("not a struct")).unwrap_err();
        assert!(matches!(err, ConversionError::DisplayString(_)));

        let array = builder.finish().unwrap();
        let expected = |street: Value, zip: Value| {
            Value::Struct(vec![("street".into(), street), ("zip".into(), zip)])
        };
        assert_eq!(
            extract_value(array.as_ref(), 0),
            expected(Value::from("Main"), Value::Int64(12345))
        );
        assert_eq!(
            extract_value(array.as_ref(), 1),
            expected(Value::from("Elm"), Value::Null)
        );
        assert_eq!(
            extract_value(array.as_ref(), 2),
            expected(Value::from("O'Hara"), Value::Int64(7))
        );
        // Unparseable display string keeps the row with all-null fields
        assert_eq!(
            extract_value(array.as_ref(), 3),
            expected(Value::Null, Value::Null)
        );
    }

    #[test]
    fn tuple_drops_excess_values() {
        let mut builder = builder_for("tuple<int,text>");
        builder
            .append(&Value::List(vec![
                Value::Int64(1),
                Value::from("a"),
                Value::from("extra"),
            ]))
            .unwrap();
        builder.append(&Value::Null).unwrap();

        let array = builder.finish().unwrap();
        let strukt = array.as_struct();
        assert_eq!(strukt.column(0).as_primitive::<Int32Type>().value(0), 1);
        assert!(strukt.is_null(1));
    }

    #[test]
    fn nested_two_levels() {
        let mut builder = builder_for("map<text,frozen<list<int>>>");
        let value = Value::Map(vec![(
            Value::from("k"),
            Value::List(vec![Value::Int64(1), Value::Int64(2)]),
        )]);
        builder.append(&value).unwrap();
        let array = builder.finish().unwrap();
        assert_eq!(extract_value(array.as_ref(), 0), value);
    }

    #[test]
    fn finish_resets_state() {
        let mut builder = builder_for("list<int>");
        builder.append(&Value::from(vec![1i64])).unwrap();
        assert_eq!(builder.finish().unwrap().len(), 1);
        assert!(builder.is_empty());
        builder.append(&Value::Null).unwrap();
        assert_eq!(builder.finish().unwrap().len(), 1);
    }

    #[test]
    fn unsupported_column_type() {
        assert!(matches!(
            ColumnBuilder::try_new(&DataType::Float16),
            Err(ConversionError::UnsupportedColumnType(_))
        ));
    }
}
