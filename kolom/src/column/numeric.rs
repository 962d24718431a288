//! Fixed width little endian columns.
use bytes::{BufMut, BytesMut};
use std::{fmt, marker::PhantomData};

use super::{Column, ValueError};
use crate::{Value, io::Read, protocol::ProtocolError};

/// Fixed width element type.
pub(crate) trait Primitive: Send + Sync + 'static {
    type Native: Copy + Default + Send + Sync + fmt::Debug;

    const SIZE: usize;

    /// Returns `None` when the variant does not belong in this column.
    fn from_value(value: &Value) -> Option<Result<Self::Native, ValueError>>;

    fn to_value(native: Self::Native) -> Value;

    fn put(native: Self::Native, buf: &mut BytesMut);

    /// `bytes` is exactly `SIZE` long.
    fn get(bytes: &[u8]) -> Self::Native;
}

/// Column of [`Primitive`] elements.
pub(crate) struct Fixed<P: Primitive> {
    ty: String,
    data: Vec<P::Native>,
    _p: PhantomData<P>,
}

impl<P: Primitive> Fixed<P> {
    pub(crate) fn new(ty: impl Into<String>) -> Self {
        Self { ty: ty.into(), data: Vec::new(), _p: PhantomData }
    }
}

impl<P: Primitive> Column for Fixed<P> {
    fn type_name(&self) -> &str {
        &self.ty
    }

    fn rows(&self) -> usize {
        self.data.len()
    }

    fn append(&mut self, value: Value) -> Result<(), ValueError> {
        match P::from_value(&value) {
            Some(native) => {
                self.data.push(native?);
                Ok(())
            },
            None => Err(ValueError::mismatch(&self.ty, &value)),
        }
    }

    fn append_default(&mut self) {
        self.data.push(P::Native::default());
    }

    fn value(&self, row: usize) -> Value {
        P::to_value(self.data[row])
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.data.len() * P::SIZE);
        for &native in &self.data {
            P::put(native, buf);
        }
    }

    fn decode(&mut self, read: &mut dyn Read, rows: usize) -> Result<(), ProtocolError> {
        let len = rows
            .checked_mul(P::SIZE)
            .ok_or(ProtocolError::TooManyRows(rows as u64))?;
        let bytes = read.read_slice(len)?;
        self.data.extend(bytes.chunks_exact(P::SIZE).map(P::get));
        Ok(())
    }

    fn truncate(&mut self, rows: usize) {
        self.data.truncate(rows);
    }
}

impl<P: Primitive> fmt::Debug for Fixed<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fixed")
            .field("ty", &self.ty)
            .field("data", &self.data)
            .finish()
    }
}

/// Convert any integer-like value into `T`.
pub(crate) fn integer<T: TryFrom<i128>>(value: &Value) -> Option<Result<T, ValueError>> {
    let int = value.as_i128()?;
    Some(T::try_from(int).map_err(|_| ValueError::OutOfRange))
}

macro_rules! integer {
    ($($marker:ident($native:ty)),* $(,)?) => {$(
        pub(crate) struct $marker;

        impl Primitive for $marker {
            type Native = $native;

            const SIZE: usize = size_of::<$native>();

            fn from_value(value: &Value) -> Option<Result<$native, ValueError>> {
                integer(value)
            }

            fn to_value(native: $native) -> Value {
                Value::$marker(native)
            }

            fn put(native: $native, buf: &mut BytesMut) {
                buf.put_slice(&native.to_le_bytes());
            }

            fn get(bytes: &[u8]) -> $native {
                let mut le = [0u8; size_of::<$native>()];
                le.copy_from_slice(bytes);
                <$native>::from_le_bytes(le)
            }
        }
    )*};
}

integer! {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
}

pub(crate) struct UInt128;

impl Primitive for UInt128 {
    type Native = u128;

    const SIZE: usize = 16;

    fn from_value(value: &Value) -> Option<Result<u128, ValueError>> {
        match value {
            Value::UInt128(v) => Some(Ok(*v)),
            _ => integer(value),
        }
    }

    fn to_value(native: u128) -> Value {
        Value::UInt128(native)
    }

    fn put(native: u128, buf: &mut BytesMut) {
        buf.put_u128_le(native);
    }

    fn get(bytes: &[u8]) -> u128 {
        let mut le = [0u8; 16];
        le.copy_from_slice(bytes);
        u128::from_le_bytes(le)
    }
}

pub(crate) struct Float32;

impl Primitive for Float32 {
    type Native = f32;

    const SIZE: usize = 4;

    fn from_value(value: &Value) -> Option<Result<f32, ValueError>> {
        match *value {
            Value::Float32(v) => Some(Ok(v)),
            Value::Float64(v) => Some(Ok(v as f32)),
            _ => value.as_i128().map(|v| Ok(v as f32)),
        }
    }

    fn to_value(native: f32) -> Value {
        Value::Float32(native)
    }

    fn put(native: f32, buf: &mut BytesMut) {
        buf.put_f32_le(native);
    }

    fn get(bytes: &[u8]) -> f32 {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

pub(crate) struct Float64;

impl Primitive for Float64 {
    type Native = f64;

    const SIZE: usize = 8;

    fn from_value(value: &Value) -> Option<Result<f64, ValueError>> {
        match *value {
            Value::Float32(v) => Some(Ok(v.into())),
            Value::Float64(v) => Some(Ok(v)),
            _ => value.as_i128().map(|v| Ok(v as f64)),
        }
    }

    fn to_value(native: f64) -> Value {
        Value::Float64(native)
    }

    fn put(native: f64, buf: &mut BytesMut) {
        buf.put_f64_le(native);
    }

    fn get(bytes: &[u8]) -> f64 {
        let mut le = [0u8; 8];
        le.copy_from_slice(bytes);
        f64::from_le_bytes(le)
    }
}

pub(crate) struct Bool;

impl Primitive for Bool {
    type Native = bool;

    const SIZE: usize = 1;

    fn from_value(value: &Value) -> Option<Result<bool, ValueError>> {
        match value.as_i128()? {
            0 => Some(Ok(false)),
            1 => Some(Ok(true)),
            _ => Some(Err(ValueError::OutOfRange)),
        }
    }

    fn to_value(native: bool) -> Value {
        Value::Bool(native)
    }

    fn put(native: bool, buf: &mut BytesMut) {
        buf.put_u8(native as u8);
    }

    fn get(bytes: &[u8]) -> bool {
        bytes[0] != 0
    }
}

/// Two little endian `u64` halves, high half first.
pub(crate) struct Uuid;

impl Primitive for Uuid {
    type Native = u128;

    const SIZE: usize = 16;

    fn from_value(value: &Value) -> Option<Result<u128, ValueError>> {
        match value {
            Value::Uuid(v) => Some(Ok(*v)),
            Value::FixedString(b) | Value::String(b) => Some(
                <[u8; 16]>::try_from(&b[..])
                    .map(u128::from_be_bytes)
                    .map_err(|_| ValueError::FixedStringLength { expected: 16, found: b.len() }),
            ),
            _ => None,
        }
    }

    fn to_value(native: u128) -> Value {
        Value::Uuid(native)
    }

    fn put(native: u128, buf: &mut BytesMut) {
        buf.put_u64_le((native >> 64) as u64);
        buf.put_u64_le(native as u64);
    }

    fn get(bytes: &[u8]) -> u128 {
        let (hi, lo) = bytes.split_at(8);
        let hi = u64::from_le_bytes([hi[0], hi[1], hi[2], hi[3], hi[4], hi[5], hi[6], hi[7]]);
        let lo = u64::from_le_bytes([lo[0], lo[1], lo[2], lo[3], lo[4], lo[5], lo[6], lo[7]]);
        (u128::from(hi) << 64) | u128::from(lo)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::column::test::{reencode, values};

    #[test]
    fn integer_widening() {
        let mut col = Fixed::<Int64>::new("Int64");
        col.append(Value::Int8(-3)).unwrap();
        col.append(Value::UInt32(7)).unwrap();
        assert_eq!(values(&*reencode(&col)), [Value::Int64(-3), Value::Int64(7)]);

        let mut col = Fixed::<UInt8>::new("UInt8");
        assert_eq!(col.append(Value::Int16(256)), Err(ValueError::OutOfRange));
        assert_eq!(col.append(Value::Int8(-1)), Err(ValueError::OutOfRange));
        assert!(matches!(
            col.append(Value::Float32(1.0)),
            Err(ValueError::TypeMismatch { found: "Float32", .. })
        ));
        assert_eq!(col.rows(), 0);
    }

    #[test]
    fn little_endian() {
        let mut col = Fixed::<UInt32>::new("UInt32");
        col.append(Value::UInt32(0x0102_0304)).unwrap();
        let mut buf = BytesMut::new();
        col.encode(&mut buf);
        assert_eq!(&buf[..], [4, 3, 2, 1]);
    }

    #[test]
    fn uuid_halves() {
        let mut col = Fixed::<Uuid>::new("UUID");
        col.append(Value::Uuid(0x0011223344556677_8899aabbccddeeff)).unwrap();
        let mut buf = BytesMut::new();
        col.encode(&mut buf);
        assert_eq!(&buf[..8], 0x0011223344556677u64.to_le_bytes());
        assert_eq!(&buf[8..], 0x8899aabbccddeeffu64.to_le_bytes());
        assert_eq!(values(&*reencode(&col)), [Value::Uuid(0x0011223344556677_8899aabbccddeeff)]);
    }

    #[test]
    fn floats_and_bool() {
        let mut col = Fixed::<Float64>::new("Float64");
        col.append(Value::Float64(1.5)).unwrap();
        col.append(Value::Int32(2)).unwrap();
        assert_eq!(values(&*reencode(&col)), [Value::Float64(1.5), Value::Float64(2.0)]);

        let mut col = Fixed::<Bool>::new("Bool");
        col.append(Value::Bool(true)).unwrap();
        col.append(Value::UInt8(0)).unwrap();
        assert_eq!(col.append(Value::UInt8(2)), Err(ValueError::OutOfRange));
        assert_eq!(values(&*reencode(&col)), [Value::Bool(true), Value::Bool(false)]);
    }
}
