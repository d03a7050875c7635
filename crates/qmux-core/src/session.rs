//! Client session: handshake relay, stream admission and shutdown.
//!
//! Implements:
//! - Stream admission against the peer-negotiated ceiling, with a FIFO queue
//!   of pending requests
//! - Handshake readiness (confirmed, optimistic 0-RTT, or pending)
//! - Observer fan-out on handshake confirmation and close
//! - Layered shutdown: going away, close, drain
//!
//! Everything runs on one cooperative event loop. The session never calls
//! out to observers, requests, streams or the factory while its own state is
//! borrowed: collections are snapshotted or taken first, so any callback may
//! re-enter the session or drop it.

use crate::config::SessionConfig;
use crate::factory::{DisabledReason, SessionFactory, SessionKey};
use crate::handshake::{CryptoHandshake, HandshakeEvent, HandshakeState};
use crate::lifecycle::{CloseSource, Lifecycle};
use crate::observer::{ObserverHandle, ObserverId, SessionObserver};
use crate::pool::{self, AllowAll, TransportSecurityPolicy};
use crate::request::{RequestId, StreamRequest};
use crate::server_id::{PrivacyMode, ServerId};
use crate::snapshot::SessionSnapshot;
use crate::stream::{Stream, StreamId, StreamShared};
use crate::task::{TaskRunner, TimerHandle};
use crate::transport::{PacketTransport, TransportEvent};
use crate::{Error, Result};
use bytes::Bytes;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, trace, warn};

pub(crate) type SessionCell = RefCell<SessionInner>;

/// Result of starting (or resuming) the crypto handshake.
#[derive(Debug)]
pub enum ConnectStatus {
    /// Usable now: confirmed, or optimistically ready within the 0-RTT window.
    Ready,
    /// Await the confirmation.
    Pending(HandshakeConfirmation),
}

/// Resolves once the handshake is confirmed (or, when confirmation is not
/// required, once encryption is established), or fails when the session
/// closes first.
#[derive(Debug)]
pub struct HandshakeConfirmation {
    rx: oneshot::Receiver<Result<()>>,
}

impl Future for HandshakeConfirmation {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(Error::Aborted)))
    }
}

/// Outcome of an admission check for a new stream.
pub(crate) enum Admission {
    Ready(Stream),
    Queued {
        id: RequestId,
        rx: oneshot::Receiver<Result<Stream>>,
    },
}

struct QueuedRequest {
    id: RequestId,
    tx: oneshot::Sender<Result<Stream>>,
}

pub(crate) struct SessionInner {
    key: SessionKey,
    server_id: ServerId,
    config: SessionConfig,
    this: Weak<SessionCell>,
    crypto: Box<dyn CryptoHandshake>,
    transport: Box<dyn PacketTransport>,
    runner: Rc<dyn TaskRunner>,
    factory: Option<Weak<dyn SessionFactory>>,
    security_policy: Rc<dyn TransportSecurityPolicy>,

    lifecycle: Lifecycle,
    drained: watch::Sender<bool>,
    handshake: HandshakeState,
    connected: bool,
    goaway_received: bool,
    transport_closed: bool,
    close_error: Option<Error>,
    disabled_reason: DisabledReason,

    dynamic_streams: BTreeMap<StreamId, Rc<RefCell<StreamShared>>>,
    next_stream_id: StreamId,
    num_total_streams: u64,
    max_open_streams: usize,

    stream_requests: VecDeque<QueuedRequest>,
    next_request_id: RequestId,

    observers: BTreeMap<ObserverId, Weak<dyn SessionObserver>>,
    next_observer_id: ObserverId,

    confirmation: Option<oneshot::Sender<Result<()>>>,
    zero_rtt_timer: Option<TimerHandle>,
    zero_rtt_expired: bool,
}

impl SessionInner {
    /// Stream admission preconditions. The first failing check decides the error.
    fn check_admission(&self) -> Result<()> {
        if !self.crypto.is_encryption_established() {
            return Err(Error::ConnectionClosed { by_peer: false });
        }
        if self.goaway_received {
            return Err(Error::ConnectionClosed { by_peer: true });
        }
        if !self.connected || !self.transport.is_connected() {
            return Err(Error::ConnectionClosed { by_peer: false });
        }
        if self.lifecycle.is_going_away() {
            return Err(Error::ConnectionClosed { by_peer: false });
        }
        Ok(())
    }

    fn has_capacity(&self) -> bool {
        self.dynamic_streams.len() < self.max_open_streams
    }

    fn create_stream(&mut self) -> Stream {
        let id = self.next_stream_id;
        self.next_stream_id += self.config.stream_id_increment;
        self.num_total_streams += 1;
        let shared = StreamShared::new(id);
        self.dynamic_streams.insert(id, Rc::clone(&shared));
        debug!(session = %self.key, stream_id = id, open = self.dynamic_streams.len(), "stream created");
        Stream::new(shared, self.this.clone())
    }

    /// Pop the oldest queued request and create its stream, if admission allows.
    fn admit_next(&mut self) -> Option<(QueuedRequest, Stream)> {
        if self.stream_requests.is_empty() || self.check_admission().is_err() || !self.has_capacity()
        {
            return None;
        }
        let request = self.stream_requests.pop_front()?;
        let stream = self.create_stream();
        Some((request, stream))
    }

    fn factory(&self) -> Option<Rc<dyn SessionFactory>> {
        self.factory.as_ref().and_then(Weak::upgrade)
    }

    fn closed_error(&self) -> Error {
        self.close_error
            .clone()
            .unwrap_or(Error::ConnectionClosed {
                by_peer: self.goaway_received,
            })
    }
}

/// Shared reference to session state, used by the session and by the
/// handles (streams, requests, observers) that hold it weakly.
#[derive(Clone)]
pub(crate) struct SessionRef(Rc<SessionCell>);

impl SessionRef {
    pub(crate) fn from_rc(rc: Rc<SessionCell>) -> Self {
        Self(rc)
    }

    fn inner(&self) -> Ref<'_, SessionInner> {
        self.0.borrow()
    }

    fn inner_mut(&self) -> RefMut<'_, SessionInner> {
        self.0.borrow_mut()
    }

    fn weak(&self) -> Weak<SessionCell> {
        Rc::downgrade(&self.0)
    }

    // === Stream admission ===

    pub(crate) fn request_stream(&self) -> Result<Admission> {
        let mut inner = self.inner_mut();
        inner.check_admission()?;
        if inner.has_capacity() {
            return Ok(Admission::Ready(inner.create_stream()));
        }
        let id = inner.next_request_id;
        inner.next_request_id += 1;
        let (tx, rx) = oneshot::channel();
        inner.stream_requests.push_back(QueuedRequest { id, tx });
        debug!(
            session = %inner.key,
            request_id = id,
            queued = inner.stream_requests.len(),
            "{}, request queued",
            Error::StreamLimitReached
        );
        Ok(Admission::Queued { id, rx })
    }

    pub(crate) fn cancel_request(&self, id: RequestId) {
        let mut inner = self.inner_mut();
        if let Some(pos) = inner.stream_requests.iter().position(|r| r.id == id) {
            inner.stream_requests.remove(pos);
            trace!(session = %inner.key, request_id = id, "request cancelled");
        }
    }

    /// Satisfy queued requests while admission slots are free.
    fn process_pending_requests(&self) {
        loop {
            let Some((request, stream)) = self.inner_mut().admit_next() else {
                return;
            };
            trace!(request_id = request.id, stream_id = stream.id(), "queued request admitted");
            // A refused send drops the stream here, which closes it and
            // re-enters this function for the next request.
            let _ = request.tx.send(Ok(stream));
        }
    }

    /// Local close of a stream by its handle.
    pub(crate) fn close_stream(&self, id: StreamId) {
        {
            let mut inner = self.inner_mut();
            let complete = match inner.dynamic_streams.get(&id) {
                Some(shared) => shared.borrow().is_complete(),
                None => return,
            };
            if !complete && !inner.transport_closed {
                inner.transport.reset_stream(id, &Error::StreamClosed);
            }
        }
        self.on_stream_closed(id);
    }

    /// Remove a stream, reuse its slot for the oldest queued request, and
    /// report idleness when nothing remains open.
    pub(crate) fn on_stream_closed(&self, id: StreamId) {
        let removed = self.inner_mut().dynamic_streams.remove(&id);
        let Some(shared) = removed else {
            return;
        };
        shared.borrow_mut().mark_closed();
        trace!(stream_id = id, "stream closed");

        self.process_pending_requests();

        let idle = {
            let inner = self.inner();
            inner.dynamic_streams.is_empty().then(|| (inner.factory(), inner.key))
        };
        if let Some((Some(factory), key)) = idle {
            debug!(session = %key, "session idle");
            factory.on_idle(key);
        }
    }

    pub(crate) fn write_stream(&self, id: StreamId, data: Bytes, fin: bool) -> Result<()> {
        let mut inner = self.inner_mut();
        if !inner.dynamic_streams.contains_key(&id) {
            return Err(Error::StreamClosed);
        }
        if inner.transport_closed || !inner.connected {
            return Err(inner.closed_error());
        }
        inner.transport.write_stream(id, data, fin)
    }

    // === Observers ===

    pub(crate) fn has_observer(&self, id: ObserverId) -> bool {
        self.inner().observers.contains_key(&id)
    }

    pub(crate) fn remove_observer(&self, id: ObserverId) {
        self.inner_mut().observers.remove(&id);
    }

    fn notify_observers_confirmed(&self) {
        let snapshot: Vec<(ObserverId, Weak<dyn SessionObserver>)> = self
            .inner()
            .observers
            .iter()
            .map(|(id, observer)| (*id, observer.clone()))
            .collect();
        for (id, observer) in snapshot {
            // Skip observers removed by an earlier callback in this fan-out.
            if !self.has_observer(id) {
                continue;
            }
            match observer.upgrade() {
                Some(observer) => observer.on_handshake_confirmed(),
                None => self.remove_observer(id),
            }
        }
    }

    // === Shutdown ===

    /// `Active -> GoingAway`, telling the factory. Returns `true` if the
    /// state changed.
    fn go_away(&self) -> bool {
        let factory = {
            let mut inner = self.inner_mut();
            if !inner.lifecycle.go_away() {
                return false;
            }
            info!(session = %inner.key, "session going away");
            inner.factory().map(|factory| (factory, inner.key))
        };
        if let Some((factory, key)) = factory {
            factory.on_going_away(key);
        }
        true
    }

    /// Going away outside a close: queued requests can never be admitted, so
    /// fail them now.
    fn go_away_and_fail_requests(&self, by_peer: bool) {
        if !self.go_away() {
            return;
        }
        self.fail_queued_requests(&Error::ConnectionClosed { by_peer });
    }

    fn close_all_streams(&self, error: &Error) {
        let streams = std::mem::take(&mut self.inner_mut().dynamic_streams);
        for (id, shared) in streams {
            trace!(stream_id = id, error = %error, "failing stream");
            shared.borrow_mut().fail(error);
        }
    }

    fn close_all_observers(&self, error: &Error) {
        let observers = std::mem::take(&mut self.inner_mut().observers);
        for observer in observers.into_values() {
            if let Some(observer) = observer.upgrade() {
                observer.on_session_closed(error);
            }
        }
    }

    fn fail_queued_requests(&self, error: &Error) {
        let requests = std::mem::take(&mut self.inner_mut().stream_requests);
        for request in requests {
            let _ = request.tx.send(Err(error.clone()));
        }
    }

    fn fail_confirmation(&self, error: &Error) {
        let confirmation = {
            let mut inner = self.inner_mut();
            if let Some(timer) = inner.zero_rtt_timer.take() {
                timer.cancel();
            }
            inner.confirmation.take()
        };
        if let Some(tx) = confirmation {
            let _ = tx.send(Err(error.clone()));
        }
    }

    fn close_transport(&self, error: &Error) {
        let mut inner = self.inner_mut();
        inner.connected = false;
        if !inner.transport_closed {
            inner.transport_closed = true;
            inner.transport.close(error);
        }
    }

    /// Close the session and broadcast `error` to every dependent.
    pub(crate) fn close_session(&self, error: Error, source: CloseSource) {
        if self.inner().lifecycle.is_closed() {
            return;
        }
        self.go_away();
        {
            let mut inner = self.inner_mut();
            // The factory may have torn the session down while being told it
            // is going away.
            if !inner.lifecycle.close(source) {
                return;
            }
            info!(session = %inner.key, error = %error, ?source, "closing session");
            inner.close_error = Some(error.clone());
        }
        self.fail_confirmation(&error);
        self.close_all_streams(&error);
        self.close_all_observers(&error);
        self.fail_queued_requests(&error);
        self.close_transport(&error);

        let notify = {
            let mut inner = self.inner_mut();
            if !inner.lifecycle.drain() {
                // Drained by a teardown that ran inside one of the callbacks.
                return;
            }
            inner.drained.send_replace(true);
            debug!(session = %inner.key, "session drained");
            inner
                .factory
                .clone()
                .map(|factory| (Rc::clone(&inner.runner), factory, inner.key))
        };
        if let Some((runner, factory, key)) = notify {
            runner.post(Box::new(move || {
                if let Some(factory) = factory.upgrade() {
                    factory.on_closed(key);
                }
            }));
        }
    }

    /// Forced teardown when the owner drops the session: finish whatever
    /// shutdown steps remain, without notifying the factory.
    fn teardown(&self) {
        let error = {
            let mut inner = self.inner_mut();
            if inner.lifecycle.is_drained() {
                return;
            }
            inner.lifecycle.go_away();
            if inner.lifecycle.close(CloseSource::Local) {
                inner.close_error = Some(Error::Aborted);
                debug!(session = %inner.key, "session destroyed while active");
            }
            inner.close_error.clone().unwrap_or(Error::Aborted)
        };
        self.fail_confirmation(&error);
        self.close_all_streams(&error);
        self.close_all_observers(&error);
        self.fail_queued_requests(&error);
        self.close_transport(&error);

        let mut inner = self.inner_mut();
        inner.lifecycle.drain();
        inner.drained.send_replace(true);
        debug_assert!(inner.lifecycle.is_drained());
        debug_assert!(inner.dynamic_streams.is_empty());
        debug_assert!(inner.observers.is_empty());
        debug_assert!(inner.stream_requests.is_empty());
    }

    // === Handshake ===

    fn on_zero_rtt_timeout(&self) {
        let mut inner = self.inner_mut();
        inner.zero_rtt_timer = None;
        if inner.handshake != HandshakeState::Confirmed {
            warn!(session = %inner.key, "0-RTT grace period expired before confirmation");
            inner.zero_rtt_expired = true;
        }
    }
}

/// Client session multiplexing streams over one connection.
///
/// Dropping the session tears it down: open streams, observers and queued
/// requests are failed with `Error::Aborted` (or the close error, if a close
/// was in progress).
pub struct Session {
    core: SessionRef,
}

impl Session {
    /// Create a session with the default configuration.
    pub fn new(
        server_id: ServerId,
        crypto: Box<dyn CryptoHandshake>,
        transport: Box<dyn PacketTransport>,
        runner: Rc<dyn TaskRunner>,
    ) -> Self {
        Self::build(server_id, SessionConfig::default(), crypto, transport, runner)
    }

    /// Create a session with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` if the configuration is invalid.
    pub fn with_config(
        server_id: ServerId,
        config: SessionConfig,
        crypto: Box<dyn CryptoHandshake>,
        transport: Box<dyn PacketTransport>,
        runner: Rc<dyn TaskRunner>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(server_id, config, crypto, transport, runner))
    }

    fn build(
        server_id: ServerId,
        config: SessionConfig,
        crypto: Box<dyn CryptoHandshake>,
        transport: Box<dyn PacketTransport>,
        runner: Rc<dyn TaskRunner>,
    ) -> Self {
        let key = SessionKey::next();
        debug!(session = %key, server = %server_id, "session created");
        let rc = Rc::new_cyclic(|this| {
            RefCell::new(SessionInner {
                key,
                server_id,
                this: this.clone(),
                crypto,
                transport,
                runner,
                factory: None,
                security_policy: Rc::new(AllowAll),
                lifecycle: Lifecycle::Active,
                drained: watch::Sender::new(false),
                handshake: HandshakeState::NotStarted,
                connected: true,
                goaway_received: false,
                transport_closed: false,
                close_error: None,
                disabled_reason: DisabledReason::None,
                dynamic_streams: BTreeMap::new(),
                next_stream_id: config.first_outgoing_stream_id,
                num_total_streams: 0,
                max_open_streams: config.max_open_streams,
                stream_requests: VecDeque::new(),
                next_request_id: 1,
                observers: BTreeMap::new(),
                next_observer_id: 1,
                confirmation: None,
                zero_rtt_timer: None,
                zero_rtt_expired: false,
                config,
            })
        });
        Self {
            core: SessionRef(rc),
        }
    }

    /// Report lifecycle events to `factory`. The session holds it weakly.
    pub fn set_factory<F: SessionFactory + 'static>(&self, factory: &Rc<F>) {
        let factory: Weak<F> = Rc::downgrade(factory);
        let factory: Weak<dyn SessionFactory> = factory;
        self.core.inner_mut().factory = Some(factory);
    }

    /// Replace the transport-security policy used by [`can_pool`](Self::can_pool).
    pub fn set_security_policy(&self, policy: Rc<dyn TransportSecurityPolicy>) {
        self.core.inner_mut().security_policy = policy;
    }

    /// Factory key.
    pub fn key(&self) -> SessionKey {
        self.core.inner().key
    }

    /// Server this session was opened for.
    pub fn server_id(&self) -> ServerId {
        self.core.inner().server_id.clone()
    }

    // === Handshake ===

    /// Start the crypto handshake.
    ///
    /// Returns `Ready` if the handshake is already confirmed, or if
    /// confirmation is not required, encryption is established and the 0-RTT
    /// grace period has not expired (arming the grace timer). Otherwise
    /// returns a confirmation to await.
    ///
    /// # Errors
    ///
    /// Returns the close error if the session has closed,
    /// `Error::InvalidState` if a confirmation is already outstanding, or the
    /// driver's error if the handshake cannot start.
    pub fn crypto_connect(&self) -> Result<ConnectStatus> {
        let mut inner = self.core.inner_mut();
        if inner.lifecycle.is_closed() {
            return Err(inner.closed_error());
        }
        if inner.confirmation.is_some() {
            return Err(Error::InvalidState);
        }
        inner.crypto.connect()?;
        if inner.crypto.is_handshake_confirmed() {
            return Ok(ConnectStatus::Ready);
        }
        if !inner.config.require_confirmation
            && inner.crypto.is_encryption_established()
            && !inner.zero_rtt_expired
        {
            if inner.zero_rtt_timer.is_none() {
                let session = inner.this.clone();
                let timer = inner.runner.post_delayed(
                    inner.config.zero_rtt_grace,
                    Box::new(move || {
                        if let Some(session) = session.upgrade() {
                            SessionRef(session).on_zero_rtt_timeout();
                        }
                    }),
                );
                debug!(session = %inner.key, grace = ?inner.config.zero_rtt_grace, "0-RTT ready, grace timer armed");
                inner.zero_rtt_timer = Some(timer);
            }
            return Ok(ConnectStatus::Ready);
        }
        Ok(ConnectStatus::Pending(Self::register_confirmation(&mut inner)))
    }

    /// Continue a handshake started on behalf of an earlier caller.
    ///
    /// # Errors
    ///
    /// Returns `Error::HandshakeFailed` if the connection is gone, or
    /// `Error::InvalidState` if a confirmation is already outstanding.
    pub fn resume_crypto_connect(&self) -> Result<ConnectStatus> {
        let mut inner = self.core.inner_mut();
        if inner.crypto.is_handshake_confirmed() {
            return Ok(ConnectStatus::Ready);
        }
        if inner.lifecycle.is_closed() || !inner.connected || !inner.transport.is_connected() {
            return Err(Error::HandshakeFailed);
        }
        if inner.confirmation.is_some() {
            return Err(Error::InvalidState);
        }
        inner.crypto.resume()?;
        Ok(ConnectStatus::Pending(Self::register_confirmation(&mut inner)))
    }

    fn register_confirmation(inner: &mut SessionInner) -> HandshakeConfirmation {
        let (tx, rx) = oneshot::channel();
        inner.confirmation = Some(tx);
        trace!(session = %inner.key, "waiting for handshake confirmation");
        HandshakeConfirmation { rx }
    }

    /// Relay a handshake lifecycle event from the crypto driver.
    pub fn on_handshake_event(&self, event: HandshakeEvent) {
        let (callback, confirmed) = {
            let mut inner = self.core.inner_mut();
            if inner.lifecycle.is_closed() {
                trace!(session = %inner.key, ?event, "handshake event after close ignored");
                return;
            }
            let Some(next) = inner.handshake.advance(event) else {
                warn!(session = %inner.key, ?event, state = ?inner.handshake, "out-of-order handshake event ignored");
                return;
            };
            inner.handshake = next;
            debug!(session = %inner.key, ?event, "handshake event");
            match event {
                HandshakeEvent::Started => return,
                HandshakeEvent::Failed => (None, false),
                HandshakeEvent::EncryptionEstablished => {
                    let callback = if inner.config.require_confirmation {
                        None
                    } else {
                        inner.confirmation.take()
                    };
                    (callback, false)
                }
                HandshakeEvent::HandshakeConfirmed => {
                    if let Some(timer) = inner.zero_rtt_timer.take() {
                        timer.cancel();
                    }
                    if let Some(negotiated) = inner.crypto.negotiated_max_streams() {
                        if negotiated > inner.max_open_streams {
                            debug!(session = %inner.key, from = inner.max_open_streams, to = negotiated, "stream ceiling raised");
                            inner.max_open_streams = negotiated;
                        }
                    }
                    (inner.confirmation.take(), true)
                }
            }
        };

        if event == HandshakeEvent::Failed {
            self.core.close_session(Error::HandshakeFailed, CloseSource::Error);
            return;
        }
        if let Some(tx) = callback {
            let _ = tx.send(Ok(()));
        }
        if !confirmed {
            return;
        }

        self.core.process_pending_requests();

        let claim = {
            let inner = self.core.inner();
            inner
                .factory()
                .map(|factory| (factory, inner.key, inner.transport.packet_loss_rate()))
        };
        let claimed = match claim {
            Some((factory, key, loss)) => factory.on_handshake_confirmed(key, loss),
            None => false,
        };
        if !claimed {
            self.core.notify_observers_confirmed();
        }
    }

    // === Transport ===

    /// Relay a connection-level event from the packet transport.
    pub fn on_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionClosed { error, from_peer } => {
                let error = {
                    let mut inner = self.core.inner_mut();
                    if inner.lifecycle.is_closed() {
                        return;
                    }
                    inner.connected = false;
                    let confirmed = inner.handshake == HandshakeState::Confirmed;
                    inner.disabled_reason = match &error {
                        Error::IdleTimeout if confirmed && !inner.dynamic_streams.is_empty() => {
                            DisabledReason::TimeoutWithOpenStreams
                        }
                        Error::PublicReset if confirmed => DisabledReason::PostHandshakeReset,
                        _ if !confirmed => DisabledReason::HandshakeNeverConfirmed,
                        _ => DisabledReason::None,
                    };
                    let encrypted = inner.crypto.is_encryption_established();
                    match error {
                        Error::IdleTimeout if !confirmed => Error::HandshakeTimedOut,
                        Error::ConnectionClosed { .. } if !encrypted => Error::HandshakeFailed,
                        Error::ConnectionClosed { .. } => Error::ConnectionClosed {
                            by_peer: from_peer,
                        },
                        other => other,
                    }
                };
                let source = if from_peer {
                    CloseSource::Peer
                } else {
                    CloseSource::Error
                };
                self.core.close_session(error, source);
            }
            TransportEvent::ReadError(reason) => {
                warn!(session = %self.key(), %reason, "read error");
                self.core
                    .close_session(Error::ReadError(reason), CloseSource::Error);
            }
            TransportEvent::GoAwayReceived => {
                {
                    let mut inner = self.core.inner_mut();
                    if inner.goaway_received {
                        return;
                    }
                    inner.goaway_received = true;
                }
                self.core.go_away_and_fail_requests(true);
            }
        }
    }

    /// Deliver stream data received from the peer.
    pub fn on_stream_data(&self, id: StreamId, data: Bytes, fin: bool) {
        let shared = self.core.inner().dynamic_streams.get(&id).cloned();
        match shared {
            Some(shared) => shared.borrow_mut().deliver(data, fin),
            None => trace!(stream_id = id, "data for unknown stream dropped"),
        }
    }

    /// The peer reset a stream.
    pub fn on_stream_reset(&self, id: StreamId) {
        let shared = self.core.inner().dynamic_streams.get(&id).cloned();
        if let Some(shared) = shared {
            shared.borrow_mut().fail(&Error::StreamClosed);
            self.core.on_stream_closed(id);
        }
    }

    /// Send an unreliable datagram.
    ///
    /// # Errors
    ///
    /// Returns the close error if the session is going away or closed, or the
    /// transport's error.
    pub fn send_datagram(&self, datagram: Bytes) -> Result<()> {
        let mut inner = self.core.inner_mut();
        if inner.lifecycle.is_going_away() || !inner.connected {
            return Err(inner.closed_error());
        }
        inner.transport.send_datagram(datagram)
    }

    // === Streams ===

    /// Create a request for a new stream. Await it (or call
    /// [`StreamRequest::start`]) to run admission.
    pub fn request_stream(&self) -> StreamRequest {
        StreamRequest::new(self.core.weak())
    }

    /// Open streams.
    pub fn open_stream_count(&self) -> usize {
        self.core.inner().dynamic_streams.len()
    }

    /// Streams ever created. Never decreases.
    pub fn total_stream_count(&self) -> u64 {
        self.core.inner().num_total_streams
    }

    /// Current admission ceiling.
    pub fn max_open_streams(&self) -> usize {
        self.core.inner().max_open_streams
    }

    /// Requests queued behind the ceiling.
    pub fn pending_request_count(&self) -> usize {
        self.core.inner().stream_requests.len()
    }

    // === Observers ===

    /// Register an observer.
    ///
    /// On a session that is already going away the observer is not
    /// registered; it receives `on_session_closed` immediately instead.
    pub fn register_observer<O: SessionObserver + 'static>(
        &self,
        observer: &Rc<O>,
    ) -> ObserverHandle {
        let error = {
            let mut inner = self.core.inner_mut();
            if !inner.lifecycle.is_going_away() {
                let id = inner.next_observer_id;
                inner.next_observer_id += 1;
                let observer: Weak<O> = Rc::downgrade(observer);
                let observer: Weak<dyn SessionObserver> = observer;
                inner.observers.insert(id, observer);
                return ObserverHandle::registered(self.core.weak(), id);
            }
            inner.closed_error()
        };
        observer.on_session_closed(&error);
        ObserverHandle::closed()
    }

    /// Remove an observer. Equivalent to dropping its handle.
    pub fn unregister_observer(&self, handle: ObserverHandle) {
        handle.unregister();
    }

    /// Registered observers.
    pub fn observer_count(&self) -> usize {
        self.core.inner().observers.len()
    }

    // === Lifecycle ===

    /// Stop accepting new streams and tell the factory. Queued requests are
    /// failed. Idempotent.
    pub fn mark_going_away(&self) {
        self.core.go_away_and_fail_requests(false);
    }

    /// Close the session locally, failing every dependent with `error`.
    /// Idempotent.
    pub fn close(&self, error: Error) {
        self.core.close_session(error, CloseSource::Local);
    }

    /// Whether new streams are refused.
    pub fn is_going_away(&self) -> bool {
        self.core.inner().lifecycle.is_going_away()
    }

    /// Whether the transport is connected.
    pub fn is_connected(&self) -> bool {
        let inner = self.core.inner();
        inner.connected && inner.transport.is_connected()
    }

    /// Whether shutdown has finished.
    pub fn is_drained(&self) -> bool {
        self.core.inner().lifecycle.is_drained()
    }

    /// Resolves once shutdown has finished, immediately if it already has.
    pub async fn drained(&self) {
        let mut drained = self.core.inner().drained.subscribe();
        // Only fails if the session is gone, which also means drained.
        let _ = drained.wait_for(|done| *done).await;
    }

    /// Lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.core.inner().lifecycle
    }

    /// Handshake progress.
    pub fn handshake_state(&self) -> HandshakeState {
        self.core.inner().handshake
    }

    /// Why the session will not be reused.
    pub fn disabled_reason(&self) -> DisabledReason {
        self.core.inner().disabled_reason
    }

    // === Pooling and diagnostics ===

    /// Whether this session may serve requests for `hostname`.
    pub fn can_pool(&self, hostname: &str, privacy_mode: PrivacyMode) -> bool {
        let inner = self.core.inner();
        let certificate = inner.crypto.peer_certificate();
        pool::can_pool(
            &inner.server_id,
            certificate.as_ref(),
            inner.security_policy.as_ref(),
            hostname,
            privacy_mode,
        )
    }

    /// Read-only view of the session state.
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.core.inner();
        SessionSnapshot {
            key: inner.key,
            server_id: inner.server_id.clone(),
            lifecycle: inner.lifecycle,
            handshake: inner.handshake,
            version: inner.crypto.negotiated_version(),
            connection_id: inner.transport.connection_id(),
            peer_address: inner.transport.peer_address(),
            connected: inner.connected && inner.transport.is_connected(),
            secure: inner.crypto.peer_certificate().is_some(),
            open_streams: inner.dynamic_streams.len(),
            active_streams: inner.dynamic_streams.keys().copied().collect(),
            total_streams: inner.num_total_streams,
            max_open_streams: inner.max_open_streams,
            pending_requests: inner.stream_requests.len(),
            observers: inner.observers.len(),
            disabled_reason: inner.disabled_reason,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.core.teardown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.core.inner();
        f.debug_struct("Session")
            .field("key", &inner.key)
            .field("server_id", &inner.server_id)
            .field("lifecycle", &inner.lifecycle)
            .field("open_streams", &inner.dynamic_streams.len())
            .finish()
    }
}
