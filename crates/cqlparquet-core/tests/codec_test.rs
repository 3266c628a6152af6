//! Builder tree -> arrays -> values, across every descriptor category.

use arrow::array::RecordBatch;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use cqlparquet_core::{
    arrow_schema, extract_value, reverse_map, ColumnBuilder, ColumnSchema, Value,
};
use uuid::Uuid;

fn schema() -> ColumnSchema {
    ColumnSchema::from_text(
        &[
            "id", "name", "score", "ratio", "flag", "payload", "born", "at", "seen", "price",
            "user_id", "addr", "tags", "uniq", "attrs", "point", "contact", "history",
        ],
        &[
            "int",
            "text",
            "bigint",
            "double",
            "boolean",
            "blob",
            "date",
            "time",
            "timestamp",
            "decimal",
            "uuid",
            "inet",
            "list<text>",
            "set<int>",
            "map<text,int>",
            "tuple<int,text>",
            "frozen<udt<email:text,phone:text>>",
            "map<text,frozen<list<int>>>",
        ],
    )
    .unwrap()
}

fn build(schema: &ColumnSchema, rows: &[Vec<Value>]) -> RecordBatch {
    let arrow = arrow_schema(schema);
    let mut builders: Vec<ColumnBuilder> = arrow
        .fields()
        .iter()
        .map(|f| ColumnBuilder::try_new(f.data_type()).unwrap())
        .collect();
    for row in rows {
        for (builder, value) in builders.iter_mut().zip(row) {
            builder.append(value).unwrap();
        }
    }
    let columns = builders.iter_mut().map(|b| b.finish().unwrap()).collect();
    RecordBatch::try_new(arrow, columns).unwrap()
}

#[test]
fn every_category_round_trips() {
    let schema = schema();
    let user = Uuid::from_u128(0xdead_beef);
    let seen = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
    let row = vec![
        Value::Int64(1),
        Value::from("alice"),
        Value::Int64(9_000_000_000),
        Value::Float64(0.25),
        Value::Bool(true),
        Value::Bytes(vec![1, 2, 3]),
        Value::Date(NaiveDate::from_ymd_opt(1990, 5, 17).unwrap()),
        Value::Time(NaiveTime::from_hms_milli_opt(12, 30, 5, 250).unwrap()),
        Value::Timestamp(seen),
        Value::from("19.99"),
        Value::Uuid(user),
        Value::from("10.0.0.1"),
        Value::from(vec!["a", "b"]),
        Value::from(vec![3i64, 1]),
        Value::Map(vec![(Value::from("k"), Value::Int64(7))]),
        Value::List(vec![Value::Int64(4), Value::from("four")]),
        Value::Struct(vec![
            ("email".into(), Value::from("a@example.com")),
            ("phone".into(), Value::Null),
        ]),
        Value::Map(vec![(Value::from("h"), Value::from(vec![1i64, 2]))]),
    ];
    let batch = build(&schema, &[row.clone()]);

    let read: Vec<Value> = batch
        .columns()
        .iter()
        .map(|c| extract_value(c.as_ref(), 0))
        .collect();

    // Documented lossy mappings: uuid as text, tuple as positional struct
    let mut expected = row;
    expected[10] = Value::Text(user.to_string());
    expected[15] = Value::Struct(vec![
        ("field0".into(), Value::Int64(4)),
        ("field1".into(), Value::from("four")),
    ]);
    assert_eq!(read, expected);
}

#[test]
fn null_columns_stay_null() {
    let schema = schema();
    let row = vec![Value::Null; schema.len()];
    let batch = build(&schema, &[row]);
    for column in batch.columns() {
        assert_eq!(extract_value(column.as_ref(), 0), Value::Null);
    }
}

#[test]
fn schema_text_survives_reverse_mapping() {
    let schema = schema();
    let arrow = arrow_schema(&schema);
    let names: Vec<String> = arrow
        .fields()
        .iter()
        .map(|f| reverse_map(f.data_type()))
        .collect();
    assert_eq!(names[0], "int");
    assert_eq!(names[10], "text");
    assert_eq!(names[13], "list<int>");
    assert_eq!(names[15], "tuple<int,text>");
    assert_eq!(names[16], "udt<email:text,phone:text>");

    // Feeding the reverse-mapped text back in reproduces the arrow schema
    let field_names: Vec<String> = arrow.fields().iter().map(|f| f.name().clone()).collect();
    let again = ColumnSchema::from_text(&field_names, &names).unwrap();
    assert_eq!(arrow_schema(&again), arrow);
}
