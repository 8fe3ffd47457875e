//! `cassa` error types.
use std::{backtrace::Backtrace, fmt, io};

use crate::{
    connection::config::ConfigError,
    cql::decode::DecodeError,
    protocol::response::{ProtocolError, ResponseError},
    retry::NoHostAvailable,
};

/// A specialized [`Result`] for `cassa` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible errors from the `cassa` driver.
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

    /// Attach additional context to this error.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// All possible error kinds from the `cassa` driver.
pub enum ErrorKind {
    /// Caller-visible invalid input: missing type hint, wrong parameter arity, bad option.
    Argument(String),
    /// Auth required but no provider configured, or the server rejected credentials.
    Authentication(String),
    /// All planned hosts were exhausted.
    NoHostAvailable(NoHostAvailable),
    /// All connections to the chosen host are at the in-flight cap.
    BusyConnection,
    /// The per-host read timeout tripped before a response arrived.
    OperationTimedOut,
    /// The server reported an error response.
    Response(ResponseError),
    /// Malformed or truncated bytes from the server.
    Decoding(DecodeError),
    /// A frame could not be parsed into a known message.
    Protocol(ProtocolError),
    /// A configuration value could not be parsed.
    Config(ConfigError),
    /// The operation was attempted on a closed or closing session.
    Shutdown,
    /// A transport-level I/O failure.
    Io(io::Error),
    /// An invariant the driver itself should guarantee was violated.
    Internal(String),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                Self {
                    context: String::new(),
                    backtrace: Backtrace::capture(),
                    kind: $body,
                }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<io::Error>e => ErrorKind::Io(e));
from!(<DecodeError>e => ErrorKind::Decoding(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<ResponseError>e => ErrorKind::Response(e));
from!(<ConfigError>e => ErrorKind::Config(e));
from!(<NoHostAvailable>e => ErrorKind::NoHostAvailable(e));

impl Error {
    pub fn argument(message: impl Into<String>) -> Self {
        ErrorKind::Argument(message.into()).into()
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ErrorKind::Internal(message.into()).into()
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        ErrorKind::Authentication(message.into()).into()
    }

    pub fn shutdown() -> Self {
        ErrorKind::Shutdown.into()
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\nStack backtrace:\n")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{backtrace}")?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind {}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument(msg) => write!(f, "argument error: {msg}"),
            Self::Authentication(msg) => write!(f, "authentication error: {msg}"),
            Self::NoHostAvailable(e) => e.fmt(f),
            Self::BusyConnection => write!(f, "all connections to host are busy"),
            Self::OperationTimedOut => write!(f, "operation timed out"),
            Self::Response(e) => e.fmt(f),
            Self::Decoding(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Config(e) => e.fmt(f),
            Self::Shutdown => write!(f, "session is shutting down or shut down"),
            Self::Io(e) => e.fmt(f),
            Self::Internal(msg) => write!(f, "internal driver error: {msg}"),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
