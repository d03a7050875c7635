//! Error types for session operations.

use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Session errors.
///
/// One error value is broadcast to every dependent of a closing session
/// (streams, observers, queued requests), so the type is `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Handshake failed before encryption was established (0x01).
    #[error("Handshake failed")]
    HandshakeFailed,

    /// Handshake did not complete in time (0x02).
    #[error("Handshake timed out")]
    HandshakeTimedOut,

    /// Connection closed (0x03).
    #[error("Connection closed (by peer: {by_peer})")]
    ConnectionClosed {
        /// Whether the peer initiated the close.
        by_peer: bool,
    },

    /// Peer sent a public reset (0x04).
    #[error("Public reset received")]
    PublicReset,

    /// Reading from the transport failed (0x05).
    #[error("Read error: {0}")]
    ReadError(String),

    /// Admission ceiling reached (0x06).
    ///
    /// Never surfaced to callers of `request_stream`; the request is queued instead.
    #[error("Stream limit reached")]
    StreamLimitReached,

    /// Session destroyed with work outstanding (0x07).
    #[error("Session aborted")]
    Aborted,

    /// Network idle timeout reported by the transport (0x08).
    #[error("Network idle timeout")]
    IdleTimeout,

    /// Operation not valid in the current state (0x09).
    #[error("Invalid state")]
    InvalidState,

    /// Stream was closed locally (0x0A).
    #[error("Stream closed")]
    StreamClosed,

    /// Transport refused an operation (0x0B).
    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Stable diagnostic code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::HandshakeFailed => ErrorCode::HandshakeFailed,
            Self::HandshakeTimedOut => ErrorCode::HandshakeTimedOut,
            Self::ConnectionClosed { .. } => ErrorCode::ConnectionClosed,
            Self::PublicReset => ErrorCode::PublicReset,
            Self::ReadError(_) => ErrorCode::ReadError,
            Self::StreamLimitReached => ErrorCode::StreamLimitReached,
            Self::Aborted => ErrorCode::Aborted,
            Self::IdleTimeout => ErrorCode::IdleTimeout,
            Self::InvalidState => ErrorCode::InvalidState,
            Self::StreamClosed => ErrorCode::StreamClosed,
            Self::Transport(_) => ErrorCode::Transport,
        }
    }
}

/// Diagnostic error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// Handshake failed (0x01).
    HandshakeFailed = 0x01,
    /// Handshake timed out (0x02).
    HandshakeTimedOut = 0x02,
    /// Connection closed (0x03).
    ConnectionClosed = 0x03,
    /// Public reset (0x04).
    PublicReset = 0x04,
    /// Read error (0x05).
    ReadError = 0x05,
    /// Stream limit reached (0x06).
    StreamLimitReached = 0x06,
    /// Aborted (0x07).
    Aborted = 0x07,
    /// Idle timeout (0x08).
    IdleTimeout = 0x08,
    /// Invalid state (0x09).
    InvalidState = 0x09,
    /// Stream closed (0x0A).
    StreamClosed = 0x0A,
    /// Transport error (0x0B).
    Transport = 0x0B,
}

impl ErrorCode {
    /// Convert to numeric form.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Convert from numeric form.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::HandshakeFailed),
            0x02 => Some(Self::HandshakeTimedOut),
            0x03 => Some(Self::ConnectionClosed),
            0x04 => Some(Self::PublicReset),
            0x05 => Some(Self::ReadError),
            0x06 => Some(Self::StreamLimitReached),
            0x07 => Some(Self::Aborted),
            0x08 => Some(Self::IdleTimeout),
            0x09 => Some(Self::InvalidState),
            0x0A => Some(Self::StreamClosed),
            0x0B => Some(Self::Transport),
            _ => None,
        }
    }
}
