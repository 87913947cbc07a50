//! Error taxonomy.
//!
//! - [`TransportError`]: transport construction, accept and close failures
//! - [`BindError`]: a raw connection could not become a multiplexed session
//! - [`HandlerError`]: a connect callback rejected a namespace join
//! - [`EmitError`]: an outbound event could not be queued on a connection
//! - [`Error`]: umbrella type handed to namespace error callbacks
//!
//! Every type exposes a stable `code()` used for metric labels and logs.

use thiserror::Error;

/// Transport is closed.
pub const TRANSPORT_CLOSED: &str = "TRANSPORT_CLOSED";
/// Transport options were rejected.
pub const TRANSPORT_INVALID_CONFIG: &str = "TRANSPORT_INVALID_CONFIG";
/// Transport I/O failure.
pub const TRANSPORT_IO: &str = "TRANSPORT_IO";
/// Any other transport failure.
pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";
/// Namespace handshake failed.
pub const BIND_HANDSHAKE: &str = "BIND_HANDSHAKE";
/// Protocol negotiation failed.
pub const BIND_UNSUPPORTED_PROTOCOL: &str = "BIND_UNSUPPORTED_PROTOCOL";
/// Connect callback rejected the join.
pub const HANDLER_REJECTED: &str = "HANDLER_REJECTED";
/// Connection closed before the event could be sent.
pub const EMIT_CLOSED: &str = "EMIT_CLOSED";
/// Connection send queue is full.
pub const EMIT_FULL: &str = "EMIT_FULL";

/// Failure reported by the underlying transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport has been closed; no further connections will arrive.
    #[error("transport closed")]
    Closed,
    /// The transport could not be built from the given options.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
    /// I/O failure while accepting or closing.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Transport-specific failure.
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Closed => TRANSPORT_CLOSED,
            Self::InvalidConfig(_) => TRANSPORT_INVALID_CONFIG,
            Self::Io(_) => TRANSPORT_IO,
            Self::Other(_) => TRANSPORT_ERROR,
        }
    }

    /// Whether this error means the transport was shut down deliberately.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// A raw connection could not be upgraded into a usable session.
#[derive(Debug, Error)]
pub enum BindError {
    /// Malformed or rejected namespace handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// The peer speaks a protocol revision this server does not.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),
    /// The connection failed underneath the binder.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl BindError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Handshake(_) => BIND_HANDSHAKE,
            Self::UnsupportedProtocol(_) => BIND_UNSUPPORTED_PROTOCOL,
            Self::Transport(err) => err.code(),
        }
    }
}

/// Returned by a connect callback to refuse a namespace join.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    /// Human-readable reason, forwarded to the peer by the binder.
    pub message: String,
}

impl HandlerError {
    /// Create a handler error with the given reason.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        HANDLER_REJECTED
    }
}

/// An outbound event could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EmitError {
    /// The connection is gone.
    #[error("connection closed")]
    Closed,
    /// The connection's send queue is full.
    #[error("send queue full")]
    Full,
}

impl EmitError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Closed => EMIT_CLOSED,
            Self::Full => EMIT_FULL,
        }
    }
}

/// Error delivered to a namespace's error callback.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Connection binding failure.
    #[error(transparent)]
    Bind(#[from] BindError),
    /// Connect callback rejection.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl Error {
    /// Machine-readable error code of the wrapped error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(err) => err.code(),
            Self::Bind(err) => err.code(),
            Self::Handler(err) => err.code(),
        }
    }
}
