use bytes::{BufMut, BytesMut};

use super::{Column, ValueError};
use crate::{Value, block::MAX_ROWS, ext::ReadExt, io::Read, protocol::ProtocolError};

/// `Array(T)`: cumulative `u64` end offsets per row, then the flattened
/// inner payload of `last offset` values.
#[derive(Debug)]
pub(crate) struct Array {
    ty: String,
    offsets: Vec<u64>,
    inner: Box<dyn Column>,
}

impl Array {
    pub(crate) fn new(ty: impl Into<String>, inner: Box<dyn Column>) -> Self {
        Self { ty: ty.into(), offsets: Vec::new(), inner }
    }

    fn last(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(0)
    }
}

impl Column for Array {
    fn type_name(&self) -> &str {
        &self.ty
    }

    fn rows(&self) -> usize {
        self.offsets.len()
    }

    fn append(&mut self, value: Value) -> Result<(), ValueError> {
        let Value::Array(items) = value else {
            return Err(ValueError::mismatch(&self.ty, &value));
        };

        let start = self.inner.rows();
        for item in items {
            if let Err(err) = self.inner.append(item) {
                self.inner.truncate(start);
                return Err(err);
            }
        }

        self.offsets.push(self.inner.rows() as u64);
        Ok(())
    }

    fn append_default(&mut self) {
        self.offsets.push(self.last());
    }

    fn value(&self, row: usize) -> Value {
        let start = match row {
            0 => 0,
            _ => self.offsets[row - 1] as usize,
        };
        let end = self.offsets[row] as usize;
        Value::Array((start..end).map(|i| self.inner.value(i)).collect())
    }

    fn encode(&self, buf: &mut BytesMut) {
        for &offset in &self.offsets {
            buf.put_u64_le(offset);
        }
        self.inner.encode(buf);
    }

    fn decode(&mut self, read: &mut dyn Read, rows: usize) -> Result<(), ProtocolError> {
        // offsets on the wire are relative to this decode call
        let base = self.last();
        let mut previous = 0;
        for _ in 0..rows {
            let offset = read.get_u64_le()?;
            if offset > MAX_ROWS {
                return Err(ProtocolError::TooManyRows(offset));
            }
            if offset < previous {
                return Err(ProtocolError::Offsets { previous, found: offset });
            }
            previous = offset;
            self.offsets.push(base + offset);
        }

        let items = usize::try_from(previous).map_err(|_| ProtocolError::TooManyRows(previous))?;
        self.inner.decode(read, items)
    }

    fn truncate(&mut self, rows: usize) {
        self.offsets.truncate(rows);
        let items = self.last() as usize;
        self.inner.truncate(items);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::column::{new_column, test::{reencode, values}};

    fn ints(v: &[i32]) -> Value {
        Value::Array(v.iter().map(|&i| Value::Int32(i)).collect())
    }

    #[test]
    fn roundtrip() {
        let mut col = new_column("Array(Int32)").unwrap();
        col.append(ints(&[1, 2])).unwrap();
        col.append(ints(&[])).unwrap();
        col.append(ints(&[3])).unwrap();

        let mut buf = BytesMut::new();
        col.encode(&mut buf);
        assert_eq!(&buf[..8], 2u64.to_le_bytes());
        assert_eq!(&buf[8..16], 2u64.to_le_bytes());
        assert_eq!(&buf[16..24], 3u64.to_le_bytes());
        assert_eq!(buf.len(), 24 + 3 * 4);

        assert_eq!(values(&*reencode(&*col)), [ints(&[1, 2]), ints(&[]), ints(&[3])]);
    }

    #[test]
    fn nested() {
        let mut col = new_column("Array(Array(Nullable(Int32)))").unwrap();
        let row = Value::Array(vec![
            ints(&[1]),
            Value::Array(vec![Value::Null, Value::Int32(2)]),
            ints(&[]),
        ]);
        col.append(row.clone()).unwrap();
        col.append(Value::Array(vec![])).unwrap();

        assert_eq!(values(&*reencode(&*col)), [row, Value::Array(vec![])]);
    }

    #[test]
    fn decreasing_offsets() {
        let mut buf = BytesMut::new();
        buf.put_u64_le(2);
        buf.put_u64_le(1);
        buf.put_bytes(0, 8);

        let mut col = new_column("Array(UInt32)").unwrap();
        let mut read = &buf[..];
        assert!(matches!(
            col.decode(&mut read, 2),
            Err(ProtocolError::Offsets { previous: 2, found: 1 })
        ));
    }

    #[test]
    fn huge_offset() {
        let mut buf = BytesMut::new();
        buf.put_u64_le(1 << 40);

        let mut col = new_column("Array(UInt8)").unwrap();
        let mut read = &buf[..];
        assert!(matches!(
            col.decode(&mut read, 1),
            Err(ProtocolError::TooManyRows(n)) if n == 1 << 40
        ));
    }
}
