//! `Enum8` and `Enum16`.
use bytes::{BufMut, BytesMut};

use super::{Column, ValueError};
use crate::{Value, io::Read, protocol::ProtocolError};

#[derive(Debug)]
pub(crate) struct EnumColumn {
    ty: String,
    wide: bool,
    /// Declaration order.
    variants: Vec<(String, i16)>,
    data: Vec<i16>,
}

impl EnumColumn {
    /// `wide` for `Enum16`.
    pub(crate) fn new(ty: impl Into<String>, wide: bool, variants: Vec<(String, i16)>) -> Self {
        Self { ty: ty.into(), wide, variants, data: Vec::new() }
    }

    fn by_name(&self, name: &[u8]) -> Result<i16, ValueError> {
        self.variants
            .iter()
            .find(|(n, _)| n.as_bytes() == name)
            .map(|(_, v)| *v)
            .ok_or_else(|| ValueError::UnknownEnum(String::from_utf8_lossy(name).into_owned()))
    }

    fn name_of(&self, value: i16) -> Option<&str> {
        self.variants.iter().find(|(_, v)| *v == value).map(|(n, _)| n.as_str())
    }
}

impl Column for EnumColumn {
    fn type_name(&self) -> &str {
        &self.ty
    }

    fn rows(&self) -> usize {
        self.data.len()
    }

    /// Accept identifier as string, or declared numeric value.
    fn append(&mut self, value: Value) -> Result<(), ValueError> {
        let v = match &value {
            Value::String(name) => self.by_name(name)?,
            Value::Enum { name, .. } => self.by_name(name.as_bytes())?,
            _ => {
                let Some(int) = value.as_i128() else {
                    return Err(ValueError::mismatch(&self.ty, &value));
                };
                i16::try_from(int)
                    .ok()
                    .filter(|v| self.name_of(*v).is_some())
                    .ok_or(ValueError::UnknownEnumValue(int))?
            },
        };
        self.data.push(v);
        Ok(())
    }

    fn append_default(&mut self) {
        // placeholder only, never read back
        let first = self.variants.first().map(|(_, v)| *v).unwrap_or_default();
        self.data.push(first);
    }

    fn value(&self, row: usize) -> Value {
        let value = self.data[row];
        let name = self.name_of(value).unwrap_or_default().to_owned();
        Value::Enum { name, value }
    }

    fn encode(&self, buf: &mut BytesMut) {
        for &v in &self.data {
            match self.wide {
                true => buf.put_i16_le(v),
                false => buf.put_i8(v as i8),
            }
        }
    }

    fn decode(&mut self, read: &mut dyn Read, rows: usize) -> Result<(), ProtocolError> {
        let width = if self.wide { 2 } else { 1 };
        let len = rows.checked_mul(width).ok_or(ProtocolError::TooManyRows(rows as u64))?;
        let bytes = read.read_slice(len)?;

        let start = self.data.len();
        self.data.extend(bytes.chunks_exact(width).map(|b| match self.wide {
            true => i16::from_le_bytes([b[0], b[1]]),
            false => b[0] as i8 as i16,
        }));

        if self.data[start..].iter().any(|&v| self.name_of(v).is_none()) {
            self.data.truncate(start);
            return Err(ProtocolError::InvalidValue("undeclared enum value"));
        }
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

    fn variant(name: &str, value: i16) -> Value {
        Value::Enum { name: name.into(), value }
    }

    #[test]
    fn append_by_ident_and_value() {
        let mut col = new_column("Enum8('a' = 1, 'b' = 2, 'it\\'s' = -3)").unwrap();
        col.append(Value::String("b".into())).unwrap();
        col.append(Value::Int8(1)).unwrap();
        col.append(Value::String("it's".into())).unwrap();

        assert_eq!(
            values(&*reencode(&*col)),
            [variant("b", 2), variant("a", 1), variant("it's", -3)]
        );
    }

    #[test]
    fn unknown() {
        let mut col = new_column("Enum16('x' = 1000)").unwrap();
        assert_eq!(col.append(Value::String("y".into())), Err(ValueError::UnknownEnum("y".into())));
        assert_eq!(col.append(Value::Int16(1)), Err(ValueError::UnknownEnumValue(1)));
        assert_eq!(col.append(Value::Int32(70_000)), Err(ValueError::UnknownEnumValue(70_000)));
        assert_eq!(col.append(Value::UInt64(u64::MAX)), Err(ValueError::UnknownEnumValue(u64::MAX.into())));
        assert_eq!(col.rows(), 0);
        col.append(Value::Int16(1000)).unwrap();

        let mut buf = BytesMut::new();
        col.encode(&mut buf);
        assert_eq!(&buf[..], 1000i16.to_le_bytes());
    }

    #[test]
    fn undeclared_value_on_wire() {
        let mut col = new_column("Enum8('a' = 1)").unwrap();
        let mut read = &[1u8, 2][..];
        assert!(col.decode(&mut read, 2).is_err());
        assert_eq!(col.rows(), 0);
    }
}
