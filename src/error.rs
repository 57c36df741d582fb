//! Error types untuk courier.
//!
//! Dua kelas error:
//! - Per-message / per-call: lokal, koneksi tetap hidup
//! - Transport-level: fatal untuk satu koneksi (teardown penuh)

use std::io;

use thiserror::Error;

/// Main error type for every courier operation.
///
/// `Clone` because teardown hands the same error to every pending callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// Frame body could not be decoded (empty, not JSON, wrong field types).
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Decoded body matches none of call / notify / reply.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Route has the wrong segment count or names no registered handler.
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    /// The invoked handler failed.
    #[error("{0}")]
    HandlerFailure(String),

    /// Error string carried back in a reply from the peer.
    #[error("{0}")]
    Remote(String),

    /// No reply arrived before the call deadline.
    #[error("rpc time out")]
    Timeout,

    /// Socket-level failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// No traffic for longer than the idle timeout.
    #[error("connection timed out")]
    ConnectionTimeout,

    /// Peer hung up, or the connection was closed locally.
    #[error("connection closed")]
    ConnectionClosed,

    /// Frame length outside what this side accepts or can encode.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// The per-connection call id counter would wrap around.
    #[error("call id space exhausted")]
    CallIdExhausted,
}

impl RpcError {
    /// Transport-level errors tear the whole connection down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RpcError::Connection(_)
                | RpcError::ConnectionTimeout
                | RpcError::ConnectionClosed
                | RpcError::FrameTooLarge { .. }
        )
    }
}

impl From<io::Error> for RpcError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => RpcError::ConnectionClosed,
            io::ErrorKind::TimedOut => RpcError::ConnectionTimeout,
            _ => RpcError::Connection(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::MalformedMessage(err.to_string())
    }
}

/// Failure raised by an application handler.
///
/// The message travels back verbatim as the reply's `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
