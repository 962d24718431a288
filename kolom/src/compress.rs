//! Compression framing for block payloads.
//!
//! ```text
//! | checksum | method | compressed size | uncompressed size | payload
//! |----------|--------|-----------------|-------------------|--------
//! |   16B    |   u8   |     u32 LE      |      u32 LE       |   ..
//! ```
//!
//! `compressed size` counts the method and both sizes (9 bytes) plus the
//! payload. The checksum is CityHash128 v1.0.2 over everything after itself.
use bytes::{BufMut, Bytes, BytesMut};
use std::{fmt, io, str::FromStr};

use crate::{ext::ReadExt, io::Read, protocol::ProtocolError};

mod decompress;

pub use decompress::Decompress;

/// Checksum length.
pub const CHECKSUM_SIZE: usize = 16;

/// Method and both sizes.
pub const HEADER_SIZE: usize = 9;

/// Maximum plaintext carried by one written frame.
pub const MAX_FRAME_SIZE: usize = 1 << 20;

/// Maximum plaintext accepted from one read frame.
///
/// Larger than [`MAX_FRAME_SIZE`]: the server sizes its frames by its own
/// `max_compress_block_size` setting, which users may raise above the 1 MiB
/// default. Frames claiming more are rejected before any allocation.
const MAX_UNCOMPRESSED_SIZE: u32 = 128 << 20;

/// Block compression method.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Method {
    /// Frames carry plain bytes, still checksummed.
    None,
    Lz4,
    #[cfg(feature = "zstd")]
    Zstd,
}

impl Method {
    /// Method tag written in frame header.
    pub const fn tag(self) -> u8 {
        match self {
            Method::None => 0x02,
            Method::Lz4 => 0x82,
            #[cfg(feature = "zstd")]
            Method::Zstd => 0x90,
        }
    }

    /// Method from frame header tag.
    pub const fn from_tag(tag: u8) -> Option<Method> {
        match tag {
            0x02 => Some(Method::None),
            0x82 => Some(Method::Lz4),
            #[cfg(feature = "zstd")]
            0x90 => Some(Method::Zstd),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Method::None => "none",
            Method::Lz4 => "lz4",
            #[cfg(feature = "zstd")]
            Method::Zstd => "zstd",
        }
    }
}

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Method::None),
            "lz4" => Ok(Method::Lz4),
            #[cfg(feature = "zstd")]
            "zstd" => Ok(Method::Zstd),
            _ => Err(UnknownMethod),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

crate::common::unit_error! {
    /// Compression method name is not recognized.
    pub struct UnknownMethod("unknown compression method");
}

/// Frame checksum of `data`.
pub fn checksum(data: &[u8]) -> u128 {
    cityhash_rs::cityhash_102_128(data).rotate_right(64)
}

/// Compress `plain` into one or more frames.
pub fn compress(method: Method, plain: &[u8]) -> io::Result<Bytes> {
    let mut out = BytesMut::with_capacity(plain.len() / 2 + CHECKSUM_SIZE + HEADER_SIZE);
    compress_into(method, plain, &mut out)?;
    Ok(out.freeze())
}

/// Compress `plain` and append the frames to `out`.
///
/// Each frame carry at most [`MAX_FRAME_SIZE`] plaintext bytes.
pub fn compress_into(method: Method, plain: &[u8], out: &mut BytesMut) -> io::Result<()> {
    for chunk in plain.chunks(MAX_FRAME_SIZE) {
        let payload = match method {
            Method::None => chunk.to_vec(),
            Method::Lz4 => lz4_flex::block::compress(chunk),
            #[cfg(feature = "zstd")]
            Method::Zstd => zstd::bulk::compress(chunk, zstd::DEFAULT_COMPRESSION_LEVEL)?,
        };

        let start = out.len();
        out.put_bytes(0, CHECKSUM_SIZE);
        out.put_u8(method.tag());
        out.put_u32_le((HEADER_SIZE + payload.len()) as u32);
        out.put_u32_le(chunk.len() as u32);
        out.put_slice(&payload);

        let sum = checksum(&out[start + CHECKSUM_SIZE..]);
        out[start..start + CHECKSUM_SIZE].copy_from_slice(&sum.to_le_bytes());
    }
    Ok(())
}

/// Decompress exactly one frame.
///
/// The checksum is verified over the whole `frame` before any header field
/// is trusted.
pub fn decompress(frame: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if frame.len() < CHECKSUM_SIZE + HEADER_SIZE {
        return Err(ProtocolError::Incomplete);
    }

    let (mut sum, body) = frame.split_at(CHECKSUM_SIZE);
    let expected = u128::from_le_bytes(sum.get_array()?);
    let found = checksum(body);
    if expected != found {
        return Err(ProtocolError::Checksum { expected, found });
    }

    let mut header = body;
    let (tag, compressed, uncompressed) = read_header(&mut header)?;
    if compressed as usize != body.len() {
        return Err(ProtocolError::FrameSize { compressed, uncompressed });
    }

    decode_payload(tag, header, uncompressed)
}

/// Read one frame off `read`, as part of a frame stream.
pub(crate) fn read_frame(read: &mut &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut cursor = *read;
    let expected = u128::from_le_bytes(cursor.get_array()?);

    let mut body = cursor;
    let (tag, compressed, uncompressed) = read_header(&mut cursor)?;
    let body = body.read_slice(compressed as usize)?;

    let found = checksum(body);
    if expected != found {
        return Err(ProtocolError::Checksum { expected, found });
    }

    let plain = decode_payload(tag, &body[HEADER_SIZE..], uncompressed)?;
    let rest: &[u8] = *read;
    *read = &rest[CHECKSUM_SIZE + compressed as usize..];
    Ok(plain)
}

fn read_header(read: &mut &[u8]) -> Result<(u8, u32, u32), ProtocolError> {
    let tag = read.get_u8()?;
    let compressed = read.get_u32_le()?;
    let uncompressed = read.get_u32_le()?;

    if (compressed as usize) < HEADER_SIZE
        || uncompressed > MAX_UNCOMPRESSED_SIZE
        || compressed as usize - HEADER_SIZE > compress_bound(uncompressed as usize)
    {
        return Err(ProtocolError::FrameSize { compressed, uncompressed });
    }

    Ok((tag, compressed, uncompressed))
}

/// Upper bound of a payload carrying `size` plain bytes, covering both codecs
/// worst case expansion.
fn compress_bound(size: usize) -> usize {
    size + size / 128 + 128
}

fn decode_payload(tag: u8, payload: &[u8], uncompressed: u32) -> Result<Vec<u8>, ProtocolError> {
    let size = uncompressed as usize;
    let plain = match Method::from_tag(tag) {
        Some(Method::None) => payload.to_vec(),
        Some(Method::Lz4) => lz4_flex::block::decompress(payload, size)
            .map_err(|e| ProtocolError::Codec(e.to_string()))?,
        #[cfg(feature = "zstd")]
        Some(Method::Zstd) => zstd::bulk::decompress(payload, size)
            .map_err(|e| ProtocolError::Codec(e.to_string()))?,
        None => return Err(ProtocolError::UnknownCompression(tag)),
    };

    if plain.len() != size {
        return Err(ProtocolError::Codec(format!(
            "expected {size} bytes, decompressed {}",
            plain.len()
        )));
    }

    Ok(plain)
}
