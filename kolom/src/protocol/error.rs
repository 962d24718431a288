//! Protocol error
use std::{fmt, str::Utf8Error};

use super::server;

/// An error when translating bytes from the server.
///
/// Any protocol error leaves the connection in an unknown position of the
/// stream, so the connection is closed afterwards.
pub enum ProtocolError {
    /// Not enough bytes buffered yet.
    ///
    /// Transports handle this by reading more from the socket, it is never
    /// returned from a connection operation.
    Incomplete,
    /// Server sent a packet that is not expected in the current phase.
    Unexpected {
        found: u64,
        phase: &'static str,
    },
    /// Varint longer than 10 bytes, or larger than addressable.
    VarintOverflow,
    /// Server sent non utf8 string where string is required.
    Utf8(Utf8Error),
    /// Type string cannot be parsed into a column.
    InvalidType {
        ty: String,
        reason: &'static str,
    },
    /// Column uses custom serialization.
    CustomSerialization(String),
    /// Block announce more row than sanity ceiling.
    TooManyRows(u64),
    /// Length prefix larger than sanity ceiling.
    TooLong(u64),
    /// Array offsets is decreasing.
    Offsets {
        previous: u64,
        found: u64,
    },
    /// Invalid value for the declared column type.
    InvalidValue(&'static str),
    /// Compression frame checksum missmatch.
    Checksum {
        expected: u128,
        found: u128,
    },
    /// Compression method tag unknown or disabled.
    UnknownCompression(u8),
    /// Compression frame sizes out of bounds.
    FrameSize {
        compressed: u32,
        uncompressed: u32,
    },
    /// Compression codec failed to decompress payload.
    Codec(String),
    /// Decompressed bytes remain after block is decoded.
    TrailingBytes(usize),
}

impl ProtocolError {
    pub(crate) fn unexpected(found: u64, phase: &'static str) -> ProtocolError {
        Self::Unexpected { found, phase }
    }

    pub(crate) fn invalid_type(ty: &str, reason: &'static str) -> ProtocolError {
        Self::InvalidType { ty: ty.to_owned(), reason }
    }

    /// Returns `true` if this is only a short buffer.
    pub(crate) fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete)
    }
}

impl From<Utf8Error> for ProtocolError {
    fn from(value: Utf8Error) -> Self {
        Self::Utf8(value)
    }
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete => f.write_str("unexpected end of packet"),
            Self::Unexpected { found, phase } => write!(
                f,
                "unexpected packet `{}` in `{phase}`",
                server::packet_name(*found),
            ),
            Self::VarintOverflow => f.write_str("varint overflow"),
            Self::Utf8(e) => write!(f, "{e}"),
            Self::InvalidType { ty, reason } => write!(f, "invalid column type {ty:?}: {reason}"),
            Self::CustomSerialization(name) => {
                write!(f, "custom serialization for column {name:?} is not supported")
            },
            Self::TooManyRows(n) => write!(f, "block announce {n} rows, exceeding sanity limit"),
            Self::TooLong(n) => write!(f, "length prefix {n} exceeding sanity limit"),
            Self::Offsets { previous, found } => {
                write!(f, "array offset decreased from {previous} to {found}")
            },
            Self::InvalidValue(e) => write!(f, "invalid value: {e}"),
            Self::Checksum { expected, found } => {
                write!(f, "compression checksum missmatch, expected {expected:032x} found {found:032x}")
            },
            Self::UnknownCompression(tag) => write!(f, "unknown compression method 0x{tag:02x}"),
            Self::FrameSize { compressed, uncompressed } => write!(
                f,
                "compression frame size out of bounds, compressed {compressed} uncompressed {uncompressed}"
            ),
            Self::Codec(e) => write!(f, "failed to decompress: {e}"),
            Self::TrailingBytes(n) => write!(f, "{n} decompressed bytes left after block"),
        }
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
