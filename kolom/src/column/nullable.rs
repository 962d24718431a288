use bytes::{BufMut, BytesMut};

use super::{Column, ValueError};
use crate::{Value, io::Read, protocol::ProtocolError};

/// `Nullable(T)`: a null map byte per row, then the inner payload with
/// placeholders at null positions.
#[derive(Debug)]
pub(crate) struct Nullable {
    ty: String,
    nulls: Vec<u8>,
    inner: Box<dyn Column>,
}

impl Nullable {
    pub(crate) fn new(ty: impl Into<String>, inner: Box<dyn Column>) -> Self {
        Self { ty: ty.into(), nulls: Vec::new(), inner }
    }
}

impl Column for Nullable {
    fn type_name(&self) -> &str {
        &self.ty
    }

    fn rows(&self) -> usize {
        self.nulls.len()
    }

    fn append(&mut self, value: Value) -> Result<(), ValueError> {
        match value {
            Value::Null => {
                self.inner.append_default();
                self.nulls.push(1);
            },
            value => {
                self.inner.append(value)?;
                self.nulls.push(0);
            },
        }
        Ok(())
    }

    fn append_default(&mut self) {
        self.inner.append_default();
        self.nulls.push(1);
    }

    fn value(&self, row: usize) -> Value {
        match self.nulls[row] {
            0 => self.inner.value(row),
            _ => Value::Null,
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.nulls);
        self.inner.encode(buf);
    }

    fn decode(&mut self, read: &mut dyn Read, rows: usize) -> Result<(), ProtocolError> {
        self.nulls.extend_from_slice(read.read_slice(rows)?);
        self.inner.decode(read, rows)
    }

    fn truncate(&mut self, rows: usize) {
        self.nulls.truncate(rows);
        self.inner.truncate(rows);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::column::{new_column, test::{reencode, values}};

    #[test]
    fn roundtrip() {
        let mut col = new_column("Nullable(String)").unwrap();
        col.append(Value::String("a".into())).unwrap();
        col.append(Value::Null).unwrap();
        col.append(Value::String("c".into())).unwrap();

        let mut buf = BytesMut::new();
        col.encode(&mut buf);
        assert_eq!(&buf[..], b"\x00\x01\x00\x01a\x00\x01c");

        assert_eq!(
            values(&*reencode(&*col)),
            [Value::String("a".into()), Value::Null, Value::String("c".into())]
        );
    }

    #[test]
    fn null_into_plain_column() {
        let mut col = new_column("UInt8").unwrap();
        assert!(matches!(col.append(Value::Null), Err(ValueError::TypeMismatch { found: "Null", .. })));
    }
}
