//! Streams multiplexed over a session.
//!
//! The session's stream map owns the registration of every open stream; a
//! [`Stream`] is the caller's handle onto it. Handles never keep the session
//! alive: once the session is gone, every operation fails.

use crate::session::{SessionCell, SessionRef};
use crate::{Error, Result};
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::poll_fn;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

/// Stream identifier. Unique within a session, never reused.
pub type StreamId = u64;

/// Stream states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamState {
    /// Open for reading and writing.
    Open,
    /// Closed by the local owner or reset by the peer.
    Closed,
    /// Failed by the session.
    Failed(Error),
}

/// State shared between the session's stream map and the caller's handle.
#[derive(Debug)]
pub(crate) struct StreamShared {
    id: StreamId,
    state: StreamState,
    recv: VecDeque<Bytes>,
    fin_received: bool,
    fin_sent: bool,
    read_waker: Option<Waker>,
}

impl StreamShared {
    pub(crate) fn new(id: StreamId) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            id,
            state: StreamState::Open,
            recv: VecDeque::new(),
            fin_received: false,
            fin_sent: false,
            read_waker: None,
        }))
    }

    pub(crate) fn id(&self) -> StreamId {
        self.id
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state == StreamState::Open
    }

    /// Both directions finished cleanly.
    pub(crate) fn is_complete(&self) -> bool {
        self.fin_sent && self.fin_received
    }

    /// Append data received from the peer.
    pub(crate) fn deliver(&mut self, data: Bytes, fin: bool) {
        if !self.is_open() || self.fin_received {
            return;
        }
        if !data.is_empty() {
            self.recv.push_back(data);
        }
        self.fin_received |= fin;
        self.wake();
    }

    /// Fail the stream so in-flight and future I/O observe `error`.
    pub(crate) fn fail(&mut self, error: &Error) {
        if self.is_open() {
            self.state = StreamState::Failed(error.clone());
        }
        self.wake();
    }

    pub(crate) fn mark_closed(&mut self) {
        if self.is_open() {
            self.state = StreamState::Closed;
        }
        self.wake();
    }

    fn check_writable(&self) -> Result<()> {
        match &self.state {
            StreamState::Failed(error) => Err(error.clone()),
            StreamState::Closed => Err(Error::StreamClosed),
            StreamState::Open if self.fin_sent => Err(Error::StreamClosed),
            StreamState::Open => Ok(()),
        }
    }

    fn poll_read(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<Bytes>>> {
        if let Some(data) = self.recv.pop_front() {
            return Poll::Ready(Ok(Some(data)));
        }
        match &self.state {
            StreamState::Failed(error) => Poll::Ready(Err(error.clone())),
            StreamState::Closed => Poll::Ready(Err(Error::StreamClosed)),
            StreamState::Open if self.fin_received => Poll::Ready(Ok(None)),
            StreamState::Open => {
                self.read_waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }

    fn wake(&mut self) {
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }
}

/// Caller handle for a bidirectional stream.
///
/// Dropping the handle closes the stream and frees its admission slot.
#[derive(Debug)]
pub struct Stream {
    shared: Rc<RefCell<StreamShared>>,
    session: Weak<SessionCell>,
}

impl Stream {
    pub(crate) fn new(shared: Rc<RefCell<StreamShared>>, session: Weak<SessionCell>) -> Self {
        Self { shared, session }
    }

    /// Get stream ID.
    pub fn id(&self) -> StreamId {
        self.shared.borrow().id
    }

    /// Whether the stream is still open.
    pub fn is_open(&self) -> bool {
        self.shared.borrow().is_open()
    }

    /// The error the session failed this stream with, if any.
    pub fn error(&self) -> Option<Error> {
        match &self.shared.borrow().state {
            StreamState::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Queue data for sending.
    ///
    /// # Errors
    ///
    /// Returns the session's close error if the stream was failed,
    /// `Error::StreamClosed` after `close`/`finish`, or `Error::Aborted` if
    /// the session no longer exists.
    pub fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send(data.into(), false)
    }

    /// Send FIN. No further writes are accepted.
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write).
    pub fn finish(&self) -> Result<()> {
        self.send(Bytes::new(), true)
    }

    fn send(&self, data: Bytes, fin: bool) -> Result<()> {
        self.shared.borrow().check_writable()?;
        let session = self.session()?;
        let id = self.id();
        session.write_stream(id, data, fin)?;
        if fin {
            self.shared.borrow_mut().fin_sent = true;
        }
        Ok(())
    }

    /// Poll for the next chunk of received data.
    ///
    /// Resolves to `Ok(None)` once the peer finished the stream.
    pub fn poll_read(&self, cx: &mut Context<'_>) -> Poll<Result<Option<Bytes>>> {
        self.shared.borrow_mut().poll_read(cx)
    }

    /// Receive the next chunk of data.
    ///
    /// # Errors
    ///
    /// Returns the error the session failed the stream with, or
    /// `Error::StreamClosed` if the stream was closed or reset.
    pub async fn read(&self) -> Result<Option<Bytes>> {
        poll_fn(|cx| self.poll_read(cx)).await
    }

    /// Close the stream, releasing its admission slot.
    pub fn close(&self) {
        let was_open = {
            let mut shared = self.shared.borrow_mut();
            let was_open = shared.is_open();
            shared.mark_closed();
            was_open
        };
        if !was_open {
            return;
        }
        if let Some(session) = self.session.upgrade() {
            SessionRef::from_rc(session).close_stream(self.id());
        }
    }

    fn session(&self) -> Result<SessionRef> {
        self.session
            .upgrade()
            .map(SessionRef::from_rc)
            .ok_or(Error::Aborted)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::task::noop_waker;

    fn poll(shared: &Rc<RefCell<StreamShared>>) -> Poll<Result<Option<Bytes>>> {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        shared.borrow_mut().poll_read(&mut cx)
    }

    #[test]
    fn test_read_delivers_in_order_then_fin() {
        let shared = StreamShared::new(1);
        assert!(poll(&shared).is_pending());

        shared.borrow_mut().deliver(Bytes::from_static(b"hello"), false);
        shared.borrow_mut().deliver(Bytes::from_static(b"world"), true);

        assert_eq!(poll(&shared), Poll::Ready(Ok(Some(Bytes::from_static(b"hello")))));
        assert_eq!(poll(&shared), Poll::Ready(Ok(Some(Bytes::from_static(b"world")))));
        assert_eq!(poll(&shared), Poll::Ready(Ok(None)));
    }

    #[test]
    fn test_data_after_fin_is_dropped() {
        let shared = StreamShared::new(1);
        shared.borrow_mut().deliver(Bytes::new(), true);
        shared.borrow_mut().deliver(Bytes::from_static(b"late"), false);
        assert_eq!(poll(&shared), Poll::Ready(Ok(None)));
    }

    #[test]
    fn test_failure_is_observed_by_reader_and_writer() {
        let shared = StreamShared::new(3);
        shared
            .borrow_mut()
            .fail(&Error::ConnectionClosed { by_peer: true });
        assert_eq!(
            poll(&shared),
            Poll::Ready(Err(Error::ConnectionClosed { by_peer: true }))
        );
        assert_eq!(
            shared.borrow().check_writable(),
            Err(Error::ConnectionClosed { by_peer: true })
        );
    }

    #[test]
    fn test_buffered_data_is_readable_before_failure() {
        let shared = StreamShared::new(5);
        shared
            .borrow_mut()
            .deliver(Bytes::from_static(b"partial"), false);
        shared.borrow_mut().fail(&Error::PublicReset);
        assert_eq!(
            poll(&shared),
            Poll::Ready(Ok(Some(Bytes::from_static(b"partial"))))
        );
        assert_eq!(poll(&shared), Poll::Ready(Err(Error::PublicReset)));
    }

    #[test]
    fn test_close_does_not_override_failure() {
        let shared = StreamShared::new(7);
        shared.borrow_mut().fail(&Error::Aborted);
        shared.borrow_mut().mark_closed();
        assert_eq!(poll(&shared), Poll::Ready(Err(Error::Aborted)));
    }
}
