//! `Decimal(P, S)`, stored as `Int32`, `Int64` or `Int128` depending on `P`.
use bytes::{BufMut, BytesMut};

use super::{Column, ValueError};
use crate::{Decimal, Value, io::Read, protocol::ProtocolError};

/// Maximum supported precision, `Decimal256` is not supported.
pub(crate) const MAX_PRECISION: u8 = 38;

#[derive(Debug)]
pub(crate) struct DecimalColumn {
    ty: String,
    precision: u8,
    scale: u8,
    data: Vec<i128>,
}

impl DecimalColumn {
    /// `precision` is in `1..=38` and `scale <= precision`.
    pub(crate) fn new(ty: impl Into<String>, precision: u8, scale: u8) -> Self {
        Self { ty: ty.into(), precision, scale, data: Vec::new() }
    }

    /// Wire width in bytes.
    fn width(&self) -> usize {
        match self.precision {
            ..=9 => 4,
            ..=18 => 8,
            _ => 16,
        }
    }

    fn convert(&self, value: &Value) -> Result<i128, ValueError> {
        let float = |f: f64| {
            let f = (f * 10f64.powi(self.scale.into())).round();
            (f.is_finite() && f.abs() < 1e38).then_some(f as i128)
        };

        let scaled = match *value {
            Value::Decimal(d) => d.rescale(self.scale),
            Value::Float32(f) => float(f.into()),
            Value::Float64(f) => float(f),
            _ => match value.as_i128() {
                Some(int) => Decimal::new(int, 0).rescale(self.scale),
                None => return Err(ValueError::mismatch(&self.ty, value)),
            },
        };

        let bound = 10i128.pow(self.precision.into());
        match scaled {
            Some(v) if -bound < v && v < bound => Ok(v),
            _ => Err(ValueError::OutOfRange),
        }
    }
}

impl Column for DecimalColumn {
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
        Value::Decimal(Decimal::new(self.data[row], self.scale))
    }

    fn encode(&self, buf: &mut BytesMut) {
        let width = self.width();
        for &v in &self.data {
            // values are bounded by precision so the low bytes carry the sign
            buf.put_slice(&v.to_le_bytes()[..width]);
        }
    }

    fn decode(&mut self, read: &mut dyn Read, rows: usize) -> Result<(), ProtocolError> {
        let width = self.width();
        let len = rows.checked_mul(width).ok_or(ProtocolError::TooManyRows(rows as u64))?;
        let bytes = read.read_slice(len)?;
        self.data.extend(bytes.chunks_exact(width).map(|b| match width {
            4 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]).into(),
            8 => i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]).into(),
            _ => {
                let mut le = [0u8; 16];
                le.copy_from_slice(b);
                i128::from_le_bytes(le)
            },
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
    fn width_by_precision() {
        for (ty, width) in [
            ("Decimal(9, 2)", 4),
            ("Decimal(18,4)", 8),
            ("Decimal(38, 10)", 16),
            ("Decimal32(2)", 4),
            ("Decimal64(3)", 8),
            ("Decimal128(5)", 16),
        ] {
            let mut col = new_column(ty).unwrap();
            col.append(Value::Int32(-1)).unwrap();
            let mut buf = BytesMut::new();
            col.encode(&mut buf);
            assert_eq!(buf.len(), width, "{ty}");
            assert!(buf.iter().all(|&b| b != 0), "{ty} sign extended");
        }
    }

    #[test]
    fn roundtrip() {
        let mut col = new_column("Decimal(9, 2)").unwrap();
        col.append(Value::Decimal(Decimal::new(12345, 2))).unwrap();
        col.append(Value::Decimal(Decimal::new(-5, 1))).unwrap();
        col.append(Value::Float64(0.125)).unwrap();
        col.append(Value::Int64(7)).unwrap();

        assert_eq!(
            values(&*reencode(&*col)),
            [
                Value::Decimal(Decimal::new(12345, 2)),
                Value::Decimal(Decimal::new(-50, 2)),
                Value::Decimal(Decimal::new(13, 2)),
                Value::Decimal(Decimal::new(700, 2)),
            ]
        );
    }

    #[test]
    fn precision_overflow() {
        let mut col = new_column("Decimal(4, 2)").unwrap();
        assert_eq!(col.append(Value::Int32(100)), Err(ValueError::OutOfRange));
        assert_eq!(col.append(Value::Decimal(Decimal::new(1, 3))), Err(ValueError::OutOfRange));
        col.append(Value::Decimal(Decimal::new(9999, 2))).unwrap();
    }

    #[test]
    fn unsupported_precision() {
        assert!(new_column("Decimal(76, 2)").is_err());
        assert!(new_column("Decimal(5, 6)").is_err());
    }
}
