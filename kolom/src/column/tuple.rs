use bytes::BytesMut;

use super::{Column, ValueError};
use crate::{Value, io::Read, protocol::ProtocolError};

/// `Tuple(T1, T2, ..)`. Each element is encoded as a whole column, one
/// after another. Element names only live in the type string.
#[derive(Debug)]
pub(crate) struct Tuple {
    ty: String,
    elements: Vec<Box<dyn Column>>,
}

impl Tuple {
    pub(crate) fn new(ty: impl Into<String>, elements: Vec<Box<dyn Column>>) -> Self {
        Self { ty: ty.into(), elements }
    }
}

impl Column for Tuple {
    fn type_name(&self) -> &str {
        &self.ty
    }

    fn rows(&self) -> usize {
        self.elements.first().map(|e| e.rows()).unwrap_or(0)
    }

    fn append(&mut self, value: Value) -> Result<(), ValueError> {
        let Value::Tuple(items) = value else {
            return Err(ValueError::mismatch(&self.ty, &value));
        };
        if items.len() != self.elements.len() {
            return Err(ValueError::TupleLength { expected: self.elements.len(), found: items.len() });
        }

        let rows = self.rows();
        for (i, item) in items.into_iter().enumerate() {
            if let Err(err) = self.elements[i].append(item) {
                for e in &mut self.elements[..i] {
                    e.truncate(rows);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn append_default(&mut self) {
        for e in &mut self.elements {
            e.append_default();
        }
    }

    fn value(&self, row: usize) -> Value {
        Value::Tuple(self.elements.iter().map(|e| e.value(row)).collect())
    }

    fn encode(&self, buf: &mut BytesMut) {
        for e in &self.elements {
            e.encode(buf);
        }
    }

    fn decode(&mut self, read: &mut dyn Read, rows: usize) -> Result<(), ProtocolError> {
        for e in &mut self.elements {
            e.decode(read, rows)?;
        }
        Ok(())
    }

    fn truncate(&mut self, rows: usize) {
        for e in &mut self.elements {
            e.truncate(rows);
        }
    }
}
