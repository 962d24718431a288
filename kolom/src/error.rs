//! `kolom` error types.
use std::{backtrace::Backtrace, fmt, io};

use crate::{
    block::BlockError,
    batch::AlreadySent,
    connection::{ConnectionClosed, ParseError},
    pool::PoolError,
    protocol::{Exception, ProtocolError},
    row::{DecodeError, RowNotFound},
    transport::Timeout,
};

/// A specialized [`Result`] type for `kolom` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `kolom` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Returns `true` if a deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout(_) | ErrorKind::Pool(PoolError::AcquireTimeout))
    }

    /// Returns the server exception, if any.
    pub fn as_exception(&self) -> Option<&Exception> {
        match &self.kind {
            ErrorKind::Database(e) => Some(e),
            _ => None,
        }
    }

    /// Returns `true` if the connection that produced this error can no
    /// longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Protocol(_)
                | ErrorKind::Io(_)
                | ErrorKind::Database(_)
                | ErrorKind::Timeout(_)
                | ErrorKind::ConnectionClosed(_)
        )
    }

    pub(crate) fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// All possible error kind from `kolom` library.
pub enum ErrorKind {
    Config(ParseError),
    Protocol(ProtocolError),
    Io(io::Error),
    Database(Exception),
    Timeout(Timeout),
    Block(BlockError),
    Pool(PoolError),
    AlreadySent(AlreadySent),
    ConnectionClosed(ConnectionClosed),
    RowNotFound(RowNotFound),
    Decode(DecodeError),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<std::io::Error>e => ErrorKind::Io(e));
from!(<Exception>e => ErrorKind::Database(e));
from!(<Timeout>e => ErrorKind::Timeout(e));
from!(<BlockError>e => ErrorKind::Block(e));
from!(<PoolError>e => ErrorKind::Pool(e));
from!(<AlreadySent>e => ErrorKind::AlreadySent(e));
from!(<ConnectionClosed>e => ErrorKind::ConnectionClosed(e));
from!(<RowNotFound>e => ErrorKind::RowNotFound(e));
from!(<DecodeError>e => ErrorKind::Decode(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => fmt::Display::fmt(e, f),
            Self::Protocol(e) => fmt::Display::fmt(e, f),
            Self::Io(e) => fmt::Display::fmt(e, f),
            Self::Database(e) => fmt::Display::fmt(e, f),
            Self::Timeout(e) => fmt::Display::fmt(e, f),
            Self::Block(e) => fmt::Display::fmt(e, f),
            Self::Pool(e) => fmt::Display::fmt(e, f),
            Self::AlreadySent(e) => fmt::Display::fmt(e, f),
            Self::ConnectionClosed(e) => fmt::Display::fmt(e, f),
            Self::RowNotFound(e) => fmt::Display::fmt(e, f),
            Self::Decode(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
