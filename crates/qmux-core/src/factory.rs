//! Notifications from a session to the pool that owns it.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique key identifying a session to its factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionKey(u64);

impl SessionKey {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Pool or owner of sessions.
///
/// All calls except `on_closed` happen synchronously on the session's stack.
/// `on_closed` is posted to a later turn, so the factory may drop the session
/// from inside it.
pub trait SessionFactory {
    /// The session accepts no new work; stop routing requests to it.
    fn on_going_away(&self, session: SessionKey);

    /// The session has no open streams. A hint for reuse or eviction.
    fn on_idle(&self, _session: SessionKey) {}

    /// The session has fully closed.
    fn on_closed(&self, session: SessionKey);

    /// The handshake was confirmed. Returning `true` claims further handling
    /// and suppresses the observer fan-out for this event.
    fn on_handshake_confirmed(&self, _session: SessionKey, _packet_loss_rate: f32) -> bool {
        false
    }
}

/// Why a session will not be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledReason {
    /// Not disabled.
    #[default]
    None,
    /// Idle timeout fired while streams were open.
    TimeoutWithOpenStreams,
    /// Public reset received after the handshake was confirmed.
    PostHandshakeReset,
    /// Connection closed before the handshake was confirmed.
    HandshakeNeverConfirmed,
}
