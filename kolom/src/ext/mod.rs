use bytes::BufMut;

use crate::{io::Read, protocol::ProtocolError};

/// Longest LEB128 encoding of a `u64`.
const MAX_VARINT_LEN: usize = 10;

/// Longest accepted length prefixed value, the server default
/// `format_binary_max_string_size`.
pub const MAX_BINARY_LEN: u64 = 1 << 30;

/// Primitive decoding on top of [`Read`].
///
/// All fixed width integer is little endian.
pub trait ReadExt: Read {
    fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.read_slice(1)?[0])
    }

    fn get_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.get_u8()? != 0)
    }

    fn get_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_slice(N)?);
        Ok(array)
    }

    fn get_i32_le(&mut self) -> Result<i32, ProtocolError> {
        self.get_array().map(i32::from_le_bytes)
    }

    fn get_u32_le(&mut self) -> Result<u32, ProtocolError> {
        self.get_array().map(u32::from_le_bytes)
    }

    fn get_u64_le(&mut self) -> Result<u64, ProtocolError> {
        self.get_array().map(u64::from_le_bytes)
    }

    /// Unsigned LEB128.
    fn get_uvarint(&mut self) -> Result<u64, ProtocolError> {
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.get_u8()?;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::VarintOverflow)
    }

    /// Varint length prefixed bytes.
    fn get_binary(&mut self) -> Result<&[u8], ProtocolError> {
        let len = self.get_uvarint()?;
        if len > MAX_BINARY_LEN {
            return Err(ProtocolError::TooLong(len));
        }
        let len = usize::try_from(len).map_err(|_| ProtocolError::VarintOverflow)?;
        self.read_slice(len)
    }

    /// Varint length prefixed utf8 string.
    fn get_string(&mut self) -> Result<String, ProtocolError> {
        let bytes = self.get_binary()?;
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }
}

impl<R: Read + ?Sized> ReadExt for R { }

/// Primitive encoding on top of [`BufMut`].
pub trait BufMutExt: BufMut {
    /// Unsigned LEB128.
    fn put_uvarint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.put_u8((value as u8) | 0x80);
            value >>= 7;
        }
        self.put_u8(value as u8);
    }

    fn put_bool(&mut self, value: bool) {
        self.put_u8(value as u8);
    }

    /// Varint length prefixed bytes.
    fn put_binary(&mut self, bytes: &[u8]) {
        self.put_uvarint(bytes.len() as u64);
        self.put_slice(bytes);
    }

    /// Varint length prefixed string.
    fn put_string(&mut self, string: &str) {
        self.put_binary(string.as_bytes());
    }
}

impl<B: BufMut + ?Sized> BufMutExt for B { }

/// Helper trait to [`Display`][std::fmt::Display] bytes.
pub trait FmtExt {
    /// Lossy [`Display`][std::fmt::Display] bytes.
    fn lossy(&self) -> LossyFmt<'_>;
}

/// Lossy [`Display`][std::fmt::Display] implementation for bytes.
pub struct LossyFmt<'a>(pub &'a [u8]);

impl FmtExt for [u8] {
    fn lossy(&self) -> LossyFmt<'_> {
        LossyFmt(self)
    }
}

impl std::fmt::Display for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn uvarint() {
        for value in [0u64, 1, 127, 128, 300, 54460, u32::MAX as u64, u64::MAX] {
            let mut buf = vec![];
            buf.put_uvarint(value);
            let mut read = &buf[..];
            assert_eq!(read.get_uvarint().unwrap(), value);
            assert!(read.is_empty());
        }

        // 300 is the classic two byte example
        let mut buf = vec![];
        buf.put_uvarint(300);
        assert_eq!(buf, [0xac, 0x02]);
    }

    #[test]
    fn uvarint_overflow() {
        let buf = [0xffu8; 11];
        assert!(matches!((&buf[..]).get_uvarint(), Err(ProtocolError::VarintOverflow)));
    }

    #[test]
    fn short_read_is_incomplete() {
        let mut buf = vec![];
        buf.put_string("clickhouse");
        let mut read = &buf[..4];
        assert!(matches!(read.get_string(), Err(ProtocolError::Incomplete)));
    }
}
