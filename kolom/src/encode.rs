//! Rust type to [`Value`] conversion.
//!
//! - [`Encode`]
//! - [`EncodeRow`]
use bytes::Bytes;

use crate::{Decimal, Value};

/// Value that can be appended into a column.
pub trait Encode {
    fn encode(self) -> Value;
}

impl Encode for Value {
    fn encode(self) -> Value {
        self
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(self) -> Value {
        match self {
            Some(v) => v.encode(),
            None => Value::Null,
        }
    }
}

macro_rules! encode {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl Encode for $ty {
            fn encode(self) -> Value {
                Value::$variant(self.into())
            }
        }
    )*};
}

encode! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    i128 => Int128,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    u128 => UInt128,
    f32 => Float32,
    f64 => Float64,
    Bytes => String,
    String => String,
    Decimal => Decimal,
}

impl Encode for &str {
    fn encode(self) -> Value {
        Value::String(Bytes::copy_from_slice(self.as_bytes()))
    }
}

impl Encode for &[u8] {
    fn encode(self) -> Value {
        Value::String(Bytes::copy_from_slice(self))
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(self) -> Value {
        Value::Array(self.into_iter().map(Encode::encode).collect())
    }
}

/// A row that can be appended into a batch.
pub trait EncodeRow {
    /// Values of the row, one per column.
    fn encode_row(self) -> Vec<Value>;
}

impl EncodeRow for Vec<Value> {
    fn encode_row(self) -> Vec<Value> {
        self
    }
}

impl<T: Encode, const N: usize> EncodeRow for [T; N] {
    fn encode_row(self) -> Vec<Value> {
        self.into_iter().map(Encode::encode).collect()
    }
}

macro_rules! encode_row_tuple {
    ($($t:ident $i:tt),*) => {
        impl<$($t),*> EncodeRow for ($($t),*,)
        where
            $($t: Encode),*
        {
            fn encode_row(self) -> Vec<Value> {
                vec![$(self.$i.encode()),*]
            }
        }
    };
}

encode_row_tuple!(T0 0);
encode_row_tuple!(T0 0, T1 1);
encode_row_tuple!(T0 0, T1 1, T2 2);
encode_row_tuple!(T0 0, T1 1, T2 2, T3 3);
encode_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4);
encode_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5);
encode_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6);
encode_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6, T7 7);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_row() {
        let row = (1u8, "a", Some(2.5f64), None::<i32>, vec![1u16, 2]).encode_row();
        assert_eq!(row, [
            Value::UInt8(1),
            Value::String("a".into()),
            Value::Float64(2.5),
            Value::Null,
            Value::Array(vec![Value::UInt16(1), Value::UInt16(2)]),
        ]);
        assert_eq!([1i64, 2].encode_row(), [Value::Int64(1), Value::Int64(2)]);
    }
}
