//! Crypto handshake driver seam and handshake lifecycle tracking.
//!
//! The handshake algorithm itself lives outside this crate. The session only
//! starts it, queries it, and reacts to the ordered events it reports.

use crate::pool::CertificateInfo;
use crate::Result;
use serde::Serialize;
use std::fmt;

/// Negotiated transport version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct QuicVersion(pub u32);

impl fmt::Display for QuicVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Lifecycle events reported by the crypto handshake driver, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeEvent {
    /// First flight sent.
    Started,
    /// Keys are available; data may be sent at reduced assurance.
    EncryptionEstablished,
    /// Handshake fully confirmed. Fires at most once.
    HandshakeConfirmed,
    /// Handshake failed.
    Failed,
}

/// Handshake progress as seen by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeState {
    /// `connect()` not called yet.
    NotStarted,
    /// Handshake in flight.
    Started,
    /// Encryption established, not confirmed.
    EncryptionEstablished,
    /// Confirmed (terminal success).
    Confirmed,
    /// Failed (terminal).
    Failed,
}

impl HandshakeState {
    fn rank(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Started => 1,
            Self::EncryptionEstablished => 2,
            Self::Confirmed | Self::Failed => 3,
        }
    }

    /// Whether no further event can change this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    /// Apply an event. Returns the new state, or `None` when the event would
    /// move the handshake backwards or out of a terminal state.
    pub fn advance(self, event: HandshakeEvent) -> Option<Self> {
        if self.is_terminal() {
            return None;
        }
        let next = match event {
            HandshakeEvent::Started => Self::Started,
            HandshakeEvent::EncryptionEstablished => Self::EncryptionEstablished,
            HandshakeEvent::HandshakeConfirmed => Self::Confirmed,
            HandshakeEvent::Failed => return Some(Self::Failed),
        };
        (next.rank() > self.rank()).then_some(next)
    }
}

/// Crypto handshake driver consumed by the session.
///
/// Exclusively owned by one session. Implementations report progress by
/// having their owner call `Session::on_handshake_event`; they must not call
/// back into the session from inside these methods.
pub trait CryptoHandshake {
    /// Start the handshake.
    ///
    /// # Errors
    ///
    /// Returns `Error::HandshakeFailed` if the first flight cannot be produced.
    fn connect(&mut self) -> Result<()>;

    /// Continue a handshake that was started on behalf of an earlier caller.
    ///
    /// # Errors
    ///
    /// Returns `Error::HandshakeFailed` if the handshake can no longer progress.
    fn resume(&mut self) -> Result<()>;

    /// Whether 1-RTT (or 0-RTT) keys are available.
    fn is_encryption_established(&self) -> bool;

    /// Whether the handshake is fully confirmed.
    fn is_handshake_confirmed(&self) -> bool;

    /// Stream ceiling advertised by the peer, once known.
    fn negotiated_max_streams(&self) -> Option<usize>;

    /// Negotiated transport version, once known.
    fn negotiated_version(&self) -> Option<QuicVersion>;

    /// Verified peer certificate, once available.
    fn peer_certificate(&self) -> Option<CertificateInfo>;
}
