//! `String` and `FixedString(N)`.
use bytes::{BufMut, Bytes, BytesMut};

use super::{Column, ValueError};
use crate::{Value, ext::{BufMutExt, ReadExt}, io::Read, protocol::ProtocolError};

/// Varint length prefixed bytes, not required to be utf8.
#[derive(Debug, Default)]
pub(crate) struct StringColumn {
    data: Vec<Bytes>,
}

impl Column for StringColumn {
    fn type_name(&self) -> &str {
        "String"
    }

    fn rows(&self) -> usize {
        self.data.len()
    }

    fn append(&mut self, value: Value) -> Result<(), ValueError> {
        match value {
            Value::String(b) | Value::FixedString(b) => {
                self.data.push(b);
                Ok(())
            },
            Value::Enum { name, .. } => {
                self.data.push(name.into());
                Ok(())
            },
            value => Err(ValueError::mismatch("String", &value)),
        }
    }

    fn append_default(&mut self) {
        self.data.push(Bytes::new());
    }

    fn value(&self, row: usize) -> Value {
        Value::String(self.data[row].clone())
    }

    fn encode(&self, buf: &mut BytesMut) {
        for b in &self.data {
            buf.put_binary(b);
        }
    }

    fn decode(&mut self, read: &mut dyn Read, rows: usize) -> Result<(), ProtocolError> {
        self.data.reserve(rows.min(1 << 16));
        for _ in 0..rows {
            let b = read.get_binary()?;
            self.data.push(Bytes::copy_from_slice(b));
        }
        Ok(())
    }

    fn truncate(&mut self, rows: usize) {
        self.data.truncate(rows);
    }
}

/// Exactly `N` bytes per row, no prefix.
#[derive(Debug)]
pub(crate) struct FixedStringColumn {
    ty: String,
    size: usize,
    data: BytesMut,
}

impl FixedStringColumn {
    pub(crate) fn new(ty: impl Into<String>, size: usize) -> Self {
        Self { ty: ty.into(), size, data: BytesMut::new() }
    }
}

impl Column for FixedStringColumn {
    fn type_name(&self) -> &str {
        &self.ty
    }

    fn rows(&self) -> usize {
        self.data.len().checked_div(self.size).unwrap_or(0)
    }

    /// Shorter values are zero padded, longer values are rejected.
    fn append(&mut self, value: Value) -> Result<(), ValueError> {
        let Some(b) = value.as_bytes() else {
            return Err(ValueError::mismatch(&self.ty, &value));
        };
        if b.len() > self.size {
            return Err(ValueError::FixedStringLength { expected: self.size, found: b.len() });
        }
        self.data.put_slice(b);
        self.data.put_bytes(0, self.size - b.len());
        Ok(())
    }

    fn append_default(&mut self) {
        self.data.put_bytes(0, self.size);
    }

    fn value(&self, row: usize) -> Value {
        let start = row * self.size;
        Value::FixedString(Bytes::copy_from_slice(&self.data[start..start + self.size]))
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.data);
    }

    fn decode(&mut self, read: &mut dyn Read, rows: usize) -> Result<(), ProtocolError> {
        let len = rows
            .checked_mul(self.size)
            .ok_or(ProtocolError::TooManyRows(rows as u64))?;
        self.data.put_slice(read.read_slice(len)?);
        Ok(())
    }

    fn truncate(&mut self, rows: usize) {
        self.data.truncate(rows * self.size);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::column::test::{reencode, values};

    #[test]
    fn string_roundtrip() {
        let mut col = StringColumn::default();
        col.append(Value::String("".into())).unwrap();
        col.append(Value::String("kolom".into())).unwrap();
        col.append(Value::String(Bytes::from_static(&[0xff, 0x00]))).unwrap();

        let mut buf = BytesMut::new();
        col.encode(&mut buf);
        assert_eq!(&buf[..], b"\x00\x05kolom\x02\xff\x00");

        assert_eq!(values(&*reencode(&col)), values(&col));
    }

    #[test]
    fn fixed_string_padding() {
        let mut col = FixedStringColumn::new("FixedString(4)", 4);
        col.append(Value::String("ab".into())).unwrap();
        assert_eq!(
            col.append(Value::String("abcde".into())),
            Err(ValueError::FixedStringLength { expected: 4, found: 5 })
        );
        assert_eq!(col.rows(), 1);
        assert_eq!(values(&*reencode(&col)), [Value::FixedString(Bytes::from_static(b"ab\0\0"))]);
    }

    #[test]
    fn huge_length() {
        let mut buf = BytesMut::new();
        buf.put_uvarint(1 << 40);
        buf.put_slice(b"short");

        let mut col = StringColumn::default();
        let mut read = &buf[..];
        assert!(matches!(
            col.decode(&mut read, 1),
            Err(ProtocolError::TooLong(n)) if n == 1 << 40
        ));
        assert_eq!(col.rows(), 0);
    }
}
