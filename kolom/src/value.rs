//! Dynamically typed cell value.
use bytes::Bytes;
use std::fmt;

use crate::ext::FmtExt;

/// A single cell of a column.
///
/// This is what columns accept on append and hand out on read. Integer
/// variants are accepted by any integer column as long as the value fits.
#[derive(Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    UInt128(u128),
    Float32(f32),
    Float64(f64),
    String(Bytes),
    FixedString(Bytes),
    Uuid(u128),
    /// Days since unix epoch.
    Date(u16),
    /// Days since unix epoch, signed.
    Date32(i32),
    /// Seconds since unix epoch.
    DateTime(u32),
    /// Ticks of `10^-precision` seconds since unix epoch, and the precision.
    DateTime64(i64, u8),
    Enum {
        name: String,
        value: i16,
    },
    Decimal(Decimal),
    Array(Vec<Value>),
    Tuple(Vec<Value>),
}

impl Value {
    /// Variant name, used in error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int8(_) => "Int8",
            Value::Int16(_) => "Int16",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::Int128(_) => "Int128",
            Value::UInt8(_) => "UInt8",
            Value::UInt16(_) => "UInt16",
            Value::UInt32(_) => "UInt32",
            Value::UInt64(_) => "UInt64",
            Value::UInt128(_) => "UInt128",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::String(_) => "String",
            Value::FixedString(_) => "FixedString",
            Value::Uuid(_) => "UUID",
            Value::Date(_) => "Date",
            Value::Date32(_) => "Date32",
            Value::DateTime(_) => "DateTime",
            Value::DateTime64(..) => "DateTime64",
            Value::Enum { .. } => "Enum",
            Value::Decimal(_) => "Decimal",
            Value::Array(_) => "Array",
            Value::Tuple(_) => "Tuple",
        }
    }

    /// Returns `true` if value is [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer representation of integer-like variants.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Value::Bool(v) => Some(v as i128),
            Value::Int8(v) => Some(v.into()),
            Value::Int16(v) => Some(v.into()),
            Value::Int32(v) => Some(v.into()),
            Value::Int64(v) => Some(v.into()),
            Value::Int128(v) => Some(v),
            Value::UInt8(v) => Some(v.into()),
            Value::UInt16(v) => Some(v.into()),
            Value::UInt32(v) => Some(v.into()),
            Value::UInt64(v) => Some(v.into()),
            Value::UInt128(v) => v.try_into().ok(),
            _ => None,
        }
    }

    /// Bytes of string-like variants.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(b) | Value::FixedString(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => fmt::Debug::fmt(v, f),
            Value::Int8(v) => fmt::Debug::fmt(v, f),
            Value::Int16(v) => fmt::Debug::fmt(v, f),
            Value::Int32(v) => fmt::Debug::fmt(v, f),
            Value::Int64(v) => fmt::Debug::fmt(v, f),
            Value::Int128(v) => fmt::Debug::fmt(v, f),
            Value::UInt8(v) => fmt::Debug::fmt(v, f),
            Value::UInt16(v) => fmt::Debug::fmt(v, f),
            Value::UInt32(v) => fmt::Debug::fmt(v, f),
            Value::UInt64(v) => fmt::Debug::fmt(v, f),
            Value::UInt128(v) => fmt::Debug::fmt(v, f),
            Value::Float32(v) => fmt::Debug::fmt(v, f),
            Value::Float64(v) => fmt::Debug::fmt(v, f),
            Value::String(v) | Value::FixedString(v) => fmt::Debug::fmt(&v.lossy(), f),
            Value::Uuid(v) => write!(f, "{}", Uuid(*v)),
            Value::Date(v) => write!(f, "Date({v})"),
            Value::Date32(v) => write!(f, "Date32({v})"),
            Value::DateTime(v) => write!(f, "DateTime({v})"),
            Value::DateTime64(v, p) => write!(f, "DateTime64({v}, {p})"),
            Value::Enum { name, value } => write!(f, "{name:?}={value}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Array(v) => f.debug_list().entries(v).finish(),
            Value::Tuple(v) => {
                let mut t = f.debug_tuple("");
                for v in v {
                    t.field(v);
                }
                t.finish()
            },
        }
    }
}

/// Fixed point number, `value * 10^-scale`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Decimal {
    pub value: i128,
    pub scale: u8,
}

impl Decimal {
    pub const fn new(value: i128, scale: u8) -> Self {
        Self { value, scale }
    }

    /// Convert to another scale.
    ///
    /// Returns `None` on overflow, or when downscaling would drop non zero digits.
    pub fn rescale(self, scale: u8) -> Option<i128> {
        use std::cmp::Ordering::*;
        match self.scale.cmp(&scale) {
            Equal => Some(self.value),
            Less => 10i128
                .checked_pow((scale - self.scale) as u32)
                .and_then(|m| self.value.checked_mul(m)),
            Greater => {
                let d = 10i128.checked_pow((self.scale - scale) as u32)?;
                (self.value % d == 0).then(|| self.value / d)
            },
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.value);
        }
        let sign = if self.value < 0 { "-" } else { "" };
        let abs = self.value.unsigned_abs();
        let d = 10u128.pow(self.scale as u32);
        write!(f, "{sign}{}.{:0width$}", abs / d, abs % d, width = self.scale as usize)
    }
}

/// Hyphenated uuid formatting.
struct Uuid(u128);

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        for (i, byte) in b.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
