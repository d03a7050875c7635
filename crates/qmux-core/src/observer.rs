//! Session lifecycle observers.

use crate::session::{SessionCell, SessionRef};
use crate::Error;
use std::rc::Weak;

/// Identifier of a registered observer.
pub(crate) type ObserverId = u64;

/// Receives session lifecycle notifications.
///
/// The session holds observers weakly. Callbacks may unregister observers
/// (including the one being notified) or drop the session.
pub trait SessionObserver {
    /// The handshake was confirmed. May be delivered more than once over the
    /// observer's lifetime, never after `on_session_closed`.
    fn on_handshake_confirmed(&self);

    /// The session closed. Delivered exactly once, and last.
    fn on_session_closed(&self, error: &Error);
}

/// Registration of an observer on a session.
///
/// Dropping the handle unregisters the observer.
#[derive(Debug)]
pub struct ObserverHandle {
    session: Weak<SessionCell>,
    id: Option<ObserverId>,
}

impl ObserverHandle {
    pub(crate) fn registered(session: Weak<SessionCell>, id: ObserverId) -> Self {
        Self {
            session,
            id: Some(id),
        }
    }

    /// Handle for an observer that was closed at registration time.
    pub(crate) fn closed() -> Self {
        Self {
            session: Weak::new(),
            id: None,
        }
    }

    /// Whether the observer is still in the session's observer set.
    pub fn is_registered(&self) -> bool {
        match (self.id, self.session.upgrade()) {
            (Some(id), Some(session)) => SessionRef::from_rc(session).has_observer(id),
            _ => false,
        }
    }

    /// Remove the observer from the session. No further notifications are delivered.
    pub fn unregister(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(session) = self.session.upgrade() {
            SessionRef::from_rc(session).remove_observer(id);
        }
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.detach();
    }
}
