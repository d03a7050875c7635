//! Session shutdown state machine.
//!
//! `Active -> GoingAway -> Closed(source) -> Drained`. Every transition
//! function reports whether it moved the state, so re-entering a state that
//! was already passed is a no-op rather than something to count.

use serde::Serialize;

/// Who initiated the close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseSource {
    /// Closed by the local owner.
    Local,
    /// Closed by the peer.
    Peer,
    /// Closed because of a transport or handshake failure.
    Error,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "source")]
pub enum Lifecycle {
    /// Accepting new streams.
    Active,
    /// No new streams; existing ones may finish.
    GoingAway,
    /// Dependents are being failed.
    Closed(CloseSource),
    /// All dependents failed and the transport stopped.
    Drained(CloseSource),
}

impl Lifecycle {
    /// Whether no new outgoing streams may be created.
    pub fn is_going_away(self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Whether a close has begun.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed(_) | Self::Drained(_))
    }

    /// Whether shutdown has finished.
    pub fn is_drained(self) -> bool {
        matches!(self, Self::Drained(_))
    }

    /// Close source, once closing has begun.
    pub fn close_source(self) -> Option<CloseSource> {
        match self {
            Self::Closed(source) | Self::Drained(source) => Some(source),
            _ => None,
        }
    }

    /// `Active -> GoingAway`. Returns `true` if the state changed.
    pub fn go_away(&mut self) -> bool {
        if *self != Self::Active {
            return false;
        }
        *self = Self::GoingAway;
        true
    }

    /// `GoingAway -> Closed`. Returns `true` if the state changed.
    ///
    /// # Panics
    ///
    /// Panics if called on an `Active` session; callers go away first.
    pub fn close(&mut self, source: CloseSource) -> bool {
        match *self {
            Self::Active => panic!("session closed without going away first"),
            Self::GoingAway => {
                *self = Self::Closed(source);
                true
            }
            Self::Closed(_) | Self::Drained(_) => false,
        }
    }

    /// `Closed -> Drained`. Returns `true` if the state changed.
    pub fn drain(&mut self) -> bool {
        match *self {
            Self::Closed(source) => {
                *self = Self::Drained(source);
                true
            }
            _ => false,
        }
    }
}
