//! Wire decoding source.
use crate::protocol::ProtocolError;

/// A source of bytes for wire decoding.
///
/// Decoding is attempted against whatever is buffered. When the buffer runs
/// short, implementor returns [`ProtocolError::Incomplete`] and the caller is
/// expected to read more from the socket and retry from the start.
pub trait Read {
    /// Take exactly `n` bytes.
    fn read_slice(&mut self, n: usize) -> Result<&[u8], ProtocolError>;
}

impl<'a> Read for &'a [u8] {
    fn read_slice(&mut self, n: usize) -> Result<&[u8], ProtocolError> {
        let buf: &'a [u8] = *self;
        if buf.len() < n {
            return Err(ProtocolError::Incomplete);
        }
        let (head, tail) = buf.split_at(n);
        *self = tail;
        Ok(head)
    }
}

impl<R: Read + ?Sized> Read for &mut R {
    fn read_slice(&mut self, n: usize) -> Result<&[u8], ProtocolError> {
        R::read_slice(self, n)
    }
}
