//! Result row operation.
//!
//! - [`Row`]
//! - [`ColumnInfo`]
//! - [`FromRow`]
//! - [`Decode`]
//!
//! - [`Index`]
//! - [`DecodeError`]
use bytes::Bytes;
use std::{borrow::Cow, fmt, str::Utf8Error, string::FromUtf8Error, sync::Arc};

use crate::{Block, Decimal, Value, common::unit_error};

/// Name and declared type of a result column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnInfo {
    name: String,
    ty: String,
}

impl ColumnInfo {
    /// Schema of a block, shared by every row read from the same query.
    pub(crate) fn from_block(block: &Block) -> Arc<[ColumnInfo]> {
        block
            .columns()
            .map(|(name, data)| ColumnInfo { name: name.to_owned(), ty: data.type_name().to_owned() })
            .collect()
    }

    /// Returns column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared type, e.g. `Nullable(String)`.
    pub fn type_name(&self) -> &str {
        &self.ty
    }
}

/// Result row.
#[derive(Clone)]
pub struct Row {
    columns: Arc<[ColumnInfo]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[ColumnInfo]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len(), "row length missmatch with schema");
        Self { columns, values }
    }

    /// Returns `true` if row contains no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the raw value.
    pub fn get_value<I: Index>(&self, idx: I) -> Option<&Value> {
        let nth = idx.position(&self.columns).ok()?;
        self.values.get(nth)
    }

    /// Try get and decode column.
    pub fn try_get<I: Index, D: Decode>(&self, idx: I) -> Result<D, DecodeError> {
        let nth = idx.position(&self.columns)?;
        match self.values.get(nth) {
            Some(value) => D::decode(value.clone()),
            None => Err(DecodeError::IndexOutOfBounds(nth)),
        }
    }

    /// Try decode type using [`FromRow`] implementation.
    pub fn decode<D: FromRow>(self) -> Result<D, DecodeError> {
        D::from_row(self)
    }
}

impl IntoIterator for Row {
    type Item = Value;

    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.columns.iter().map(|c| &c.name).zip(&self.values))
            .finish()
    }
}

// ===== Traits =====

/// Type that can be constructed from a row.
pub trait FromRow: Sized {
    /// Construct self from row.
    fn from_row(row: Row) -> Result<Self, DecodeError>;
}

impl FromRow for Row {
    fn from_row(row: Row) -> Result<Self, DecodeError> {
        Ok(row)
    }
}

impl FromRow for () {
    fn from_row(_: Row) -> Result<Self, DecodeError> {
        Ok(())
    }
}

impl FromRow for Vec<Value> {
    fn from_row(row: Row) -> Result<Self, DecodeError> {
        Ok(row.values)
    }
}

macro_rules! from_row_tuple {
    ($($t:ident $i:literal),*) => {
        impl<$($t),*> FromRow for ($($t),*,)
        where
            $($t: Decode),*
        {
            fn from_row(row: Row) -> Result<Self, DecodeError> {
                let mut values = row.into_iter();
                Ok((
                    $($t::decode(values.next().ok_or(DecodeError::IndexOutOfBounds($i))?)?),*,
                ))
            }
        }
    };
}

from_row_tuple!(T0 0);
from_row_tuple!(T0 0, T1 1);
from_row_tuple!(T0 0, T1 1, T2 2);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6, T7 7);

/// A type that can be constructed from [`Value`].
pub trait Decode: Sized {
    /// Try decode self from value.
    fn decode(value: Value) -> Result<Self, DecodeError>;
}

impl Decode for Value {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        Ok(value)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Null => Ok(None),
            value => T::decode(value).map(Some),
        }
    }
}

impl Decode for () {
    fn decode(_: Value) -> Result<Self, DecodeError> {
        Ok(())
    }
}

impl Decode for bool {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Bool(v) => Ok(v),
            Value::UInt8(v) => Ok(v != 0),
            value => Err(DecodeError::mismatch("bool", &value)),
        }
    }
}

macro_rules! decode_int {
    ($($ty:ty),*) => {$(
        impl Decode for $ty {
            fn decode(value: Value) -> Result<Self, DecodeError> {
                match value.as_i128() {
                    Some(v) => v.try_into().map_err(|_| DecodeError::OutOfRange(stringify!($ty))),
                    None => Err(DecodeError::mismatch(stringify!($ty), &value)),
                }
            }
        }
    )*};
}

decode_int!(i8, i16, i32, i64, i128, u8, u16, u32, u64);

impl Decode for u128 {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::UInt128(v) | Value::Uuid(v) => Ok(v),
            value => match value.as_i128() {
                Some(v) => v.try_into().map_err(|_| DecodeError::OutOfRange("u128")),
                None => Err(DecodeError::mismatch("u128", &value)),
            },
        }
    }
}

impl Decode for f32 {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Float32(v) => Ok(v),
            value => Err(DecodeError::mismatch("f32", &value)),
        }
    }
}

impl Decode for f64 {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Float64(v) => Ok(v),
            Value::Float32(v) => Ok(v.into()),
            value => Err(DecodeError::mismatch("f64", &value)),
        }
    }
}

impl Decode for Bytes {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::String(b) | Value::FixedString(b) => Ok(b),
            value => Err(DecodeError::mismatch("Bytes", &value)),
        }
    }
}

impl Decode for String {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::String(b) | Value::FixedString(b) => Ok(String::from_utf8(b.into())?),
            Value::Enum { name, .. } => Ok(name),
            value => Err(DecodeError::mismatch("String", &value)),
        }
    }
}

impl Decode for Decimal {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Decimal(v) => Ok(v),
            value => match value.as_i128() {
                Some(v) => Ok(Decimal::new(v, 0)),
                None => Err(DecodeError::mismatch("Decimal", &value)),
            },
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Array(values) => values.into_iter().map(T::decode).collect(),
            value => Err(DecodeError::mismatch("Vec", &value)),
        }
    }
}

/// Type that can be used for indexing column.
pub trait Index: Sized + sealed::Sealed {
    /// Returns the nth column.
    fn position(self, columns: &[ColumnInfo]) -> Result<usize, DecodeError>;
}

impl Index for usize {
    fn position(self, columns: &[ColumnInfo]) -> Result<usize, DecodeError> {
        match self < columns.len() {
            true => Ok(self),
            false => Err(DecodeError::IndexOutOfBounds(self)),
        }
    }
}

impl Index for &str {
    fn position(self, columns: &[ColumnInfo]) -> Result<usize, DecodeError> {
        match columns.iter().position(|c| c.name == self) {
            Some(nth) => Ok(nth),
            None => Err(DecodeError::ColumnNotFound(String::from(self).into())),
        }
    }
}

mod sealed {
    pub trait Sealed { }
    impl Sealed for usize { }
    impl Sealed for &str { }
}

unit_error! {
    /// An error when try to [`fetch_one`][crate::query::Query::fetch_one] and not returns any row.
    pub struct RowNotFound("row not found");
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for DecodeError {
            fn from($pat: $ty) -> Self {
                $body
            }
        }
    };
}

/// An error when decoding row value.
#[derive(Clone, PartialEq)]
pub enum DecodeError {
    /// Server returns non utf8 string.
    Utf8(Utf8Error),
    /// Column requested not found.
    ColumnNotFound(Cow<'static,str>),
    /// Index requested is out of bounds.
    IndexOutOfBounds(usize),
    /// Value cannot be decoded into the requested type.
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// Value does not fit the requested type.
    OutOfRange(&'static str),
    /// Row is null.
    Null,
}

impl DecodeError {
    pub(crate) fn mismatch(expected: &'static str, value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            value => Self::TypeMismatch { expected, found: value.kind() },
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to decode value, ")?;
        match self {
            Self::Utf8(e) => write!(f, "{e}"),
            Self::ColumnNotFound(name) => write!(f, "column not found: {name:?}"),
            Self::IndexOutOfBounds(u) => write!(f, "index out of bounds: {u:?}"),
            Self::TypeMismatch { expected, found } => write!(f, "cannot decode {found} into {expected}"),
            Self::OutOfRange(ty) => write!(f, "value out of range for {ty}"),
            Self::Null => write!(f, "unexpected NULL value"),
        }
    }
}

from!(<Utf8Error>e => Self::Utf8(e));
from!(<FromUtf8Error>e => Self::Utf8(e.utf8_error()));

impl std::error::Error for DecodeError { }

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
