use super::read_frame;
use crate::{io::Read, protocol::ProtocolError};

/// Streaming frame reader for the block decoder.
///
/// Frames are pulled lazily from the raw input as the decoder asks for bytes,
/// so one block may span any number of frames.
pub struct Decompress<'a> {
    raw: &'a [u8],
    plain: Vec<u8>,
    pos: usize,
}

impl<'a> Decompress<'a> {
    pub fn new(raw: &'a [u8]) -> Self {
        Self { raw, plain: Vec::new(), pos: 0 }
    }

    /// Returns the raw input after the last consumed frame.
    ///
    /// Fails if decompressed bytes are left unread.
    pub fn finish(self) -> Result<&'a [u8], ProtocolError> {
        match self.plain.len() - self.pos {
            0 => Ok(self.raw),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }
}

impl Read for Decompress<'_> {
    fn read_slice(&mut self, n: usize) -> Result<&[u8], ProtocolError> {
        while self.plain.len() - self.pos < n {
            let frame = read_frame(&mut self.raw)?;
            if self.pos == self.plain.len() {
                self.plain = frame;
            } else {
                self.plain.drain(..self.pos);
                self.plain.extend_from_slice(&frame);
            }
            self.pos = 0;
        }

        let start = self.pos;
        self.pos += n;
        Ok(&self.plain[start..self.pos])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compress::{Method, compress_into};
    use bytes::BytesMut;

    #[test]
    fn read_across_frames() {
        let mut raw = BytesMut::new();
        compress_into(Method::Lz4, b"hello ", &mut raw).unwrap();
        compress_into(Method::None, b"world", &mut raw).unwrap();
        raw.extend_from_slice(b"rest");

        let mut read = Decompress::new(&raw);
        assert_eq!(read.read_slice(3).unwrap(), b"hel");
        assert_eq!(read.read_slice(6).unwrap(), b"lo wor");
        assert_eq!(read.read_slice(2).unwrap(), b"ld");
        assert_eq!(read.finish().unwrap(), b"rest");
    }

    #[test]
    fn leftover_plaintext() {
        let mut raw = BytesMut::new();
        compress_into(Method::Lz4, b"hello", &mut raw).unwrap();

        let mut read = Decompress::new(&raw);
        read.read_slice(2).unwrap();
        assert!(matches!(read.finish(), Err(ProtocolError::TrailingBytes(3))));
    }
}
