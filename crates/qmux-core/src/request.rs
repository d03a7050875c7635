//! Cancellable requests for new outgoing streams.

use crate::session::{Admission, SessionCell, SessionRef};
use crate::stream::Stream;
use crate::{Error, Result};
use std::future::Future;
use std::pin::Pin;
use std::rc::Weak;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Identifier linking a queued request to its session queue entry.
pub(crate) type RequestId = u64;

/// Observable request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Not started.
    Idle,
    /// Queued behind the admission ceiling.
    Pending,
    /// Resolved with a stream.
    Completed,
    /// Resolved with an error.
    Failed,
    /// Cancelled before resolution.
    Cancelled,
}

enum RequestState {
    Idle,
    Pending {
        id: RequestId,
        rx: oneshot::Receiver<Result<Stream>>,
    },
    Completed,
    Failed,
    Cancelled,
}

/// A request for a new stream on a session.
///
/// Awaiting the request starts it if needed. A request dropped or cancelled
/// while pending leaves the session queue and is never completed.
pub struct StreamRequest {
    session: Weak<SessionCell>,
    state: RequestState,
}

impl StreamRequest {
    pub(crate) fn new(session: Weak<SessionCell>) -> Self {
        Self {
            session,
            state: RequestState::Idle,
        }
    }

    /// Current state.
    pub fn status(&self) -> RequestStatus {
        match self.state {
            RequestState::Idle => RequestStatus::Idle,
            RequestState::Pending { .. } => RequestStatus::Pending,
            RequestState::Completed => RequestStatus::Completed,
            RequestState::Failed => RequestStatus::Failed,
            RequestState::Cancelled => RequestStatus::Cancelled,
        }
    }

    /// Ask the session for a stream.
    ///
    /// Returns `Poll::Ready` when the request resolved immediately and
    /// `Poll::Pending` when it was queued; await the request to obtain the
    /// stream later.
    ///
    /// Starting a request that is not idle yields `Error::InvalidState`.
    pub fn start(&mut self) -> Poll<Result<Stream>> {
        if !matches!(self.state, RequestState::Idle) {
            return Poll::Ready(Err(Error::InvalidState));
        }
        let Some(session) = self.session.upgrade() else {
            return self.resolve(Err(Error::Aborted));
        };
        match SessionRef::from_rc(session).request_stream() {
            Ok(Admission::Ready(stream)) => self.resolve(Ok(stream)),
            Ok(Admission::Queued { id, rx }) => {
                self.state = RequestState::Pending { id, rx };
                Poll::Pending
            }
            Err(error) => self.resolve(Err(error)),
        }
    }

    /// Withdraw a pending request. No-op in any other state.
    pub fn cancel(&mut self) {
        let RequestState::Pending { id, .. } = self.state else {
            return;
        };
        self.state = RequestState::Cancelled;
        if let Some(session) = self.session.upgrade() {
            SessionRef::from_rc(session).cancel_request(id);
        }
    }

    fn resolve(&mut self, result: Result<Stream>) -> Poll<Result<Stream>> {
        self.state = match result {
            Ok(_) => RequestState::Completed,
            Err(_) => RequestState::Failed,
        };
        Poll::Ready(result)
    }
}

impl Future for StreamRequest {
    type Output = Result<Stream>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if matches!(this.state, RequestState::Idle) {
            if let Poll::Ready(result) = this.start() {
                return Poll::Ready(result);
            }
        }
        match &mut this.state {
            RequestState::Pending { rx, .. } => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => this.resolve(result),
                // The session dropped the queue entry without resolving it.
                Poll::Ready(Err(_)) => this.resolve(Err(Error::Aborted)),
                Poll::Pending => Poll::Pending,
            },
            RequestState::Cancelled => Poll::Ready(Err(Error::Aborted)),
            _ => Poll::Ready(Err(Error::InvalidState)),
        }
    }
}

impl Drop for StreamRequest {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRequest")
            .field("status", &self.status())
            .finish()
    }
}
