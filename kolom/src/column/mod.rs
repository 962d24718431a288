//! Typed column codecs.
//!
//! A column type string is parsed once into a [`Column`] implementation by
//! [`new_column`], and the block codec only talks to the trait afterwards.
//! Wrapper types ([`Nullable`][nullable::Nullable], [`Array`][array::Array],
//! `Tuple`) own boxed inner columns and delegate element semantics to them.
use bytes::BytesMut;
use std::fmt;

use crate::{Value, io::Read, protocol::ProtocolError};

mod types;
mod numeric;
mod string;
mod date;
mod decimal;
mod enums;
mod nullable;
mod array;
mod tuple;

pub use types::new_column;

/// Column codec, holding the column data of one block.
pub trait Column: Send + Sync + fmt::Debug {
    /// Declared type string.
    fn type_name(&self) -> &str;

    /// Number of rows.
    fn rows(&self) -> usize;

    /// Append one value.
    ///
    /// On error, nothing is appended.
    fn append(&mut self, value: Value) -> Result<(), ValueError>;

    /// Append type default, used as placeholder under a null.
    fn append_default(&mut self);

    /// Read value at `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    fn value(&self, row: usize) -> Value;

    /// Write all rows in wire format.
    fn encode(&self, buf: &mut BytesMut);

    /// Read `rows` rows in wire format, appending them.
    fn decode(&mut self, read: &mut dyn Read, rows: usize) -> Result<(), ProtocolError>;

    /// Keep only the first `rows` rows.
    fn truncate(&mut self, rows: usize);

    /// Remove all rows, keeping the type.
    fn reset(&mut self) {
        self.truncate(0);
    }
}

/// An error when appending value into a column.
#[derive(Clone, PartialEq)]
pub enum ValueError {
    /// Value variant cannot be stored in this column.
    TypeMismatch {
        expected: String,
        found: &'static str,
    },
    /// Enum identifier not declared in the column type.
    UnknownEnum(String),
    /// Enum value not declared in the column type, as given by the caller.
    UnknownEnumValue(i128),
    /// Numeric value does not fit in the column type.
    OutOfRange,
    /// Value length does not match `FixedString(N)`.
    FixedStringLength {
        expected: usize,
        found: usize,
    },
    /// Tuple value arity does not match the column type.
    TupleLength {
        expected: usize,
        found: usize,
    },
}

impl ValueError {
    pub(crate) fn mismatch(expected: &str, value: &Value) -> Self {
        Self::TypeMismatch { expected: expected.to_owned(), found: value.kind() }
    }
}

impl std::error::Error for ValueError { }

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, found } => {
                write!(f, "cannot store {found} value in {expected}")
            },
            Self::UnknownEnum(name) => write!(f, "unknown enum identifier {name:?}"),
            Self::UnknownEnumValue(value) => write!(f, "unknown enum value {value}"),
            Self::OutOfRange => f.write_str("value out of range"),
            Self::FixedStringLength { expected, found } => {
                write!(f, "expected {expected} bytes fixed string, found {found} bytes")
            },
            Self::TupleLength { expected, found } => {
                write!(f, "expected tuple of {expected} elements, found {found}")
            },
        }
    }
}

impl fmt::Debug for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
pub(crate) mod test {
    use bytes::BytesMut;

    use super::*;

    /// Encode column, decode into a fresh column of the same type.
    pub(crate) fn reencode(col: &dyn Column) -> Box<dyn Column> {
        let mut buf = BytesMut::new();
        col.encode(&mut buf);

        let mut out = new_column(col.type_name()).unwrap();
        let mut read = &buf[..];
        out.decode(&mut read, col.rows()).unwrap();
        assert!(read.is_empty(), "{} left {} bytes", col.type_name(), read.len());
        out
    }

    pub(crate) fn values(col: &dyn Column) -> Vec<Value> {
        (0..col.rows()).map(|i| col.value(i)).collect()
    }

    #[test]
    fn failed_append_keeps_rows() {
        let mut col = new_column("Array(Nullable(UInt8))").unwrap();
        col.append(Value::Array(vec![Value::UInt8(1)])).unwrap();

        let err = col.append(Value::Array(vec![Value::UInt8(2), Value::Int32(300)]));
        assert_eq!(err, Err(ValueError::OutOfRange));
        assert_eq!(col.rows(), 1);
        assert_eq!(values(&*reencode(&*col)), [Value::Array(vec![Value::UInt8(1)])]);
    }
}
