//! Error types for type resolution and value conversion

use thiserror::Error;

use crate::value::ValueTag;

/// Malformed textual type descriptor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("empty type descriptor")]
    Empty,

    #[error("unbalanced brackets in type descriptor '{0}'")]
    Unbalanced(String),

    #[error("'{kind}' expects {expected} type parameter(s), found {found} in '{text}'")]
    Arity {
        kind: &'static str,
        expected: &'static str,
        found: usize,
        text: String,
    },

    #[error("invalid vector dimension '{0}'")]
    InvalidDimension(String),
}

/// Per-value conversion failure.
///
/// These are recoverable: the caller substitutes a null for the offending
/// value and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("cannot convert {from} value to {to}")]
    Unsupported { from: ValueTag, to: String },

    #[error("value {value} out of range for {to}")]
    OutOfRange { value: String, to: &'static str },

    #[error("cannot parse '{text}' as {to}")]
    Unparseable { text: String, to: &'static str },

    #[error("unsupported {container} value shape: {found}")]
    UnsupportedShape {
        container: &'static str,
        found: ValueTag,
    },

    #[error("unparseable struct display string '{0}'")]
    DisplayString(String),

    #[error("map entry with null or unconvertible key dropped")]
    MapKeyDropped,

    #[error("unsupported column type {0}")]
    UnsupportedColumnType(String),
}

/// Column schema construction failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("column names and types length mismatch: {names} != {types}")]
    LengthMismatch { names: usize, types: usize },
}
