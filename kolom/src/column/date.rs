//! Date and time columns.
//!
//! Timezone in `DateTime('tz')` only affects presentation, it is kept in the
//! type name and values are always unix based.
use bytes::{BufMut, BytesMut};

use super::{Column, ValueError, numeric::{Primitive, integer}};
use crate::{Value, Decimal, io::Read, protocol::ProtocolError};

pub(crate) struct Date;

impl Primitive for Date {
    type Native = u16;

    const SIZE: usize = 2;

    fn from_value(value: &Value) -> Option<Result<u16, ValueError>> {
        match *value {
            Value::Date(v) => Some(Ok(v)),
            Value::Date32(v) => Some(u16::try_from(v).map_err(|_| ValueError::OutOfRange)),
            _ => None,
        }
    }

    fn to_value(native: u16) -> Value {
        Value::Date(native)
    }

    fn put(native: u16, buf: &mut BytesMut) {
        buf.put_u16_le(native);
    }

    fn get(bytes: &[u8]) -> u16 {
        u16::from_le_bytes([bytes[0], bytes[1]])
    }
}

pub(crate) struct Date32;

impl Primitive for Date32 {
    type Native = i32;

    const SIZE: usize = 4;

    fn from_value(value: &Value) -> Option<Result<i32, ValueError>> {
        match *value {
            Value::Date(v) => Some(Ok(v.into())),
            Value::Date32(v) => Some(Ok(v)),
            _ => None,
        }
    }

    fn to_value(native: i32) -> Value {
        Value::Date32(native)
    }

    fn put(native: i32, buf: &mut BytesMut) {
        buf.put_i32_le(native);
    }

    fn get(bytes: &[u8]) -> i32 {
        i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

pub(crate) struct DateTime;

impl Primitive for DateTime {
    type Native = u32;

    const SIZE: usize = 4;

    fn from_value(value: &Value) -> Option<Result<u32, ValueError>> {
        match *value {
            Value::DateTime(v) => Some(Ok(v)),
            Value::DateTime64(v, p) => Some(
                Decimal::new(v.into(), p)
                    .rescale(0)
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or(ValueError::OutOfRange),
            ),
            _ => integer(value),
        }
    }

    fn to_value(native: u32) -> Value {
        Value::DateTime(native)
    }

    fn put(native: u32, buf: &mut BytesMut) {
        buf.put_u32_le(native);
    }

    fn get(bytes: &[u8]) -> u32 {
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

/// `DateTime64(P[, 'tz'])`, `i64` ticks of `10^-P` seconds.
#[derive(Debug)]
pub(crate) struct DateTime64 {
    ty: String,
    precision: u8,
    data: Vec<i64>,
}

impl DateTime64 {
    pub(crate) fn new(ty: impl Into<String>, precision: u8) -> Self {
        Self { ty: ty.into(), precision, data: Vec::new() }
    }

    fn convert(&self, value: &Value) -> Result<i64, ValueError> {
        let (v, p) = match *value {
            Value::DateTime64(v, p) => (i128::from(v), p),
            Value::DateTime(v) => (i128::from(v), 0),
            _ => return Err(ValueError::mismatch(&self.ty, value)),
        };
        Decimal::new(v, p)
            .rescale(self.precision)
            .and_then(|v| i64::try_from(v).ok())
            .ok_or(ValueError::OutOfRange)
    }
}

impl Column for DateTime64 {
    fn type_name(&self) -> &str {
        &self.ty
    }

    fn rows(&self) -> usize {
        self.data.len()
    }

    fn append(&mut self, value: Value) -> Result<(), ValueError> {
        let v = self.convert(&value)?;
        self.data.push(v);
        Ok(())
    }

    fn append_default(&mut self) {
        self.data.push(0);
    }

    fn value(&self, row: usize) -> Value {
        Value::DateTime64(self.data[row], self.precision)
    }

    fn encode(&self, buf: &mut BytesMut) {
        for &v in &self.data {
            buf.put_i64_le(v);
        }
    }

    fn decode(&mut self, read: &mut dyn Read, rows: usize) -> Result<(), ProtocolError> {
        let len = rows.checked_mul(8).ok_or(ProtocolError::TooManyRows(rows as u64))?;
        let bytes = read.read_slice(len)?;
        self.data.extend(bytes.chunks_exact(8).map(|b| {
            i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        }));
        Ok(())
    }

    fn truncate(&mut self, rows: usize) {
        self.data.truncate(rows);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::column::{new_column, test::{reencode, values}};

    #[test]
    fn datetime64_precision() {
        let mut col = new_column("DateTime64(3, 'Asia/Jakarta')").unwrap();
        col.append(Value::DateTime(1_700_000_000)).unwrap();
        col.append(Value::DateTime64(1_700_000_000_123_456, 6)).unwrap_err();
        col.append(Value::DateTime64(1_700_000_000_123_000, 6)).unwrap();

        assert_eq!(
            values(&*reencode(&*col)),
            [
                Value::DateTime64(1_700_000_000_000, 3),
                Value::DateTime64(1_700_000_000_123, 3),
            ]
        );
    }

    #[test]
    fn dates() {
        let mut col = new_column("Date").unwrap();
        col.append(Value::Date(19000)).unwrap();
        assert_eq!(col.append(Value::Date32(-1)), Err(ValueError::OutOfRange));

        let mut col32 = new_column("Date32").unwrap();
        col32.append(Value::Date(19000)).unwrap();
        col32.append(Value::Date32(-1)).unwrap();

        assert_eq!(values(&*reencode(&*col)), [Value::Date(19000)]);
        assert_eq!(values(&*reencode(&*col32)), [Value::Date32(19000), Value::Date32(-1)]);
    }
}
