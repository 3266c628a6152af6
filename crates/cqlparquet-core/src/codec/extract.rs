//! Array -> [`Value`] extraction, the inverse of the builder tree.

use arrow::array::{Array, AsArray, FixedSizeListArray, ListArray, MapArray, StructArray};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Decimal128Type, Float32Type, Float64Type, Int16Type,
    Int32Type, Int64Type, Int8Type, Time32MillisecondType, Time32SecondType,
    Time64MicrosecondType, Time64NanosecondType, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use arrow::util::display::array_value_to_string;
use uuid::Uuid;

use crate::bridge::format_decimal;
use crate::value::Value;

/// Read the logical value at `row`, dispatching on the array's type.
pub fn extract_value(array: &dyn Array, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }

    match array.data_type() {
        DataType::Boolean => Value::Bool(array.as_boolean().value(row)),
        DataType::Int8 => Value::Int64(array.as_primitive::<Int8Type>().value(row) as i64),
        DataType::Int16 => Value::Int64(array.as_primitive::<Int16Type>().value(row) as i64),
        DataType::Int32 => Value::Int64(array.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => Value::Int64(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => Value::Int64(array.as_primitive::<UInt8Type>().value(row) as i64),
        DataType::UInt16 => Value::Int64(array.as_primitive::<UInt16Type>().value(row) as i64),
        DataType::UInt32 => Value::Int64(array.as_primitive::<UInt32Type>().value(row) as i64),
        DataType::UInt64 => {
            let v = array.as_primitive::<UInt64Type>().value(row);
            i64::try_from(v)
                .map(Value::Int64)
                .unwrap_or_else(|_| Value::Text(v.to_string()))
        }
        DataType::Float32 => Value::Float64(array.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => Value::Float64(array.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 => Value::Text(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::Text(array.as_string::<i64>().value(row).to_string()),
        DataType::Utf8View => Value::Text(array.as_string_view().value(row).to_string()),
        DataType::Binary => Value::Bytes(array.as_binary::<i32>().value(row).to_vec()),
        DataType::LargeBinary => Value::Bytes(array.as_binary::<i64>().value(row).to_vec()),
        DataType::BinaryView => Value::Bytes(array.as_binary_view().value(row).to_vec()),
        DataType::FixedSizeBinary(16) => {
            let bytes = array.as_fixed_size_binary().value(row);
            Uuid::from_slice(bytes)
                .map(Value::Uuid)
                .unwrap_or_else(|_| Value::Bytes(bytes.to_vec()))
        }
        DataType::FixedSizeBinary(_) => {
            Value::Bytes(array.as_fixed_size_binary().value(row).to_vec())
        }
        DataType::Date32 => or_display(
            array,
            row,
            array
                .as_primitive::<Date32Type>()
                .value_as_date(row)
                .map(Value::Date),
        ),
        DataType::Date64 => or_display(
            array,
            row,
            array
                .as_primitive::<Date64Type>()
                .value_as_date(row)
                .map(Value::Date),
        ),
        DataType::Time32(unit) => {
            let time = match unit {
                TimeUnit::Second => array.as_primitive::<Time32SecondType>().value_as_time(row),
                _ => array
                    .as_primitive::<Time32MillisecondType>()
                    .value_as_time(row),
            };
            or_display(array, row, time.map(Value::Time))
        }
        DataType::Time64(unit) => {
            let time = match unit {
                TimeUnit::Microsecond => array
                    .as_primitive::<Time64MicrosecondType>()
                    .value_as_time(row),
                _ => array
                    .as_primitive::<Time64NanosecondType>()
                    .value_as_time(row),
            };
            or_display(array, row, time.map(Value::Time))
        }
        DataType::Timestamp(unit, _) => {
            let naive = match unit {
                TimeUnit::Second => array
                    .as_primitive::<TimestampSecondType>()
                    .value_as_datetime(row),
                TimeUnit::Millisecond => array
                    .as_primitive::<TimestampMillisecondType>()
                    .value_as_datetime(row),
                TimeUnit::Microsecond => array
                    .as_primitive::<TimestampMicrosecondType>()
                    .value_as_datetime(row),
                TimeUnit::Nanosecond => array
                    .as_primitive::<TimestampNanosecondType>()
                    .value_as_datetime(row),
            };
            or_display(array, row, naive.map(|dt| Value::Timestamp(dt.and_utc())))
        }
        DataType::Decimal128(_, scale) => Value::Text(format_decimal(
            array.as_primitive::<Decimal128Type>().value(row),
            *scale,
        )),
        DataType::List(_) => extract_list(array.as_list::<i32>(), row),
        DataType::LargeList(_) => {
            let list = array.as_list::<i64>();
            let values = list.value(row);
            collect_items(values.as_ref())
        }
        DataType::FixedSizeList(_, _) => extract_fixed_list(array.as_fixed_size_list(), row),
        DataType::Map(_, _) => extract_map(array.as_map(), row),
        DataType::Struct(_) => extract_struct(array.as_struct(), row),
        _ => or_display(array, row, None),
    }
}

fn or_display(array: &dyn Array, row: usize, value: Option<Value>) -> Value {
    value.unwrap_or_else(|| {
        array_value_to_string(array, row)
            .map(Value::Text)
            .unwrap_or(Value::Null)
    })
}

fn collect_items(values: &dyn Array) -> Value {
    Value::List((0..values.len()).map(|i| extract_value(values, i)).collect())
}

pub fn extract_list(list: &ListArray, row: usize) -> Value {
    if list.is_null(row) {
        return Value::Null;
    }
    collect_items(list.value(row).as_ref())
}

fn extract_fixed_list(list: &FixedSizeListArray, row: usize) -> Value {
    collect_items(list.value(row).as_ref())
}

/// Entries with a null key are skipped.
pub fn extract_map(map: &MapArray, row: usize) -> Value {
    if map.is_null(row) {
        return Value::Null;
    }

    let entries = map.value(row);
    let keys = entries.column(0);
    let values = entries.column(1);
    let pairs = (0..entries.len())
        .filter_map(|i| {
            let key = extract_value(keys.as_ref(), i);
            if key.is_null() {
                return None;
            }
            Some((key, extract_value(values.as_ref(), i)))
        })
        .collect();
    Value::Map(pairs)
}

pub fn extract_struct(strukt: &StructArray, row: usize) -> Value {
    if strukt.is_null(row) {
        return Value::Null;
    }

    let fields = strukt
        .fields()
        .iter()
        .zip(strukt.columns())
        .map(|(field, column)| (field.name().clone(), extract_value(column.as_ref(), row)))
        .collect();
    Value::Struct(fields)
}
