// cqlparquet-core - Platform-agnostic conversion logic
//
// This crate contains the PURE logic that bridges CQL row values to Arrow
// columnar arrays and back. No file I/O, no Parquet encoding.
//
// - types:  textual CQL type grammar -> TypeDescriptor
// - value:  tagged row value model handed over by the row source
// - bridge: TypeDescriptor <-> Arrow DataType, scalar conversions
// - codec:  nested list/map/struct builders and extraction

pub mod bridge;
pub mod codec;
mod error;
pub mod observer;
pub mod types;
pub mod value;

pub use bridge::{arrow_schema, convert_scalar, reverse_map, to_arrow_type, ColumnarValue};
pub use codec::{extract_value, finish_all, parse_udt_display, ColumnBuilder};
pub use error::{ConversionError, SchemaError, TypeError};
pub use observer::{CopyObserver, TracingObserver};
pub use types::{resolve, Column, ColumnSchema, TypeDescriptor};
pub use value::{Row, Value, ValueTag};
