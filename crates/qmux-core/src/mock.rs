//! Mock implementations for testing.
//!
//! Every mock is a cheap `Clone` over shared state: hand one clone to the
//! session and keep another to drive and inspect it. Behavior is
//! deterministic; timers run on a virtual clock.
//!
//! # Example
//!
//! ```
//! use qmux_core::mock::{MockCryptoHandshake, MockTransport, ManualTaskRunner};
//! use qmux_core::{PrivacyMode, ServerId, Session};
//! use std::rc::Rc;
//!
//! let crypto = MockCryptoHandshake::established();
//! let transport = MockTransport::new();
//! let runner = ManualTaskRunner::new();
//! let session = Session::new(
//!     ServerId::new("example.com", 443, PrivacyMode::Disabled),
//!     Box::new(crypto.clone()),
//!     Box::new(transport.clone()),
//!     Rc::new(runner.clone()),
//! );
//! assert!(session.is_connected());
//! ```

use crate::factory::{SessionFactory, SessionKey};
use crate::handshake::{CryptoHandshake, QuicVersion};
use crate::observer::SessionObserver;
use crate::pool::CertificateInfo;
use crate::stream::StreamId;
use crate::task::{Task, TaskRunner, TimerHandle};
use crate::transport::{ConnectionId, PacketTransport};
use crate::{Error, Result};
use bytes::Bytes;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

/// Callback run after a recorded event.
type Hook<E> = Rc<dyn Fn(&E)>;

// === Crypto ===

#[derive(Default)]
struct CryptoState {
    encrypted: Cell<bool>,
    confirmed: Cell<bool>,
    max_streams: Cell<Option<usize>>,
    version: Cell<Option<QuicVersion>>,
    certificate: RefCell<Option<CertificateInfo>>,
    connect_error: RefCell<Option<Error>>,
    connects: Cell<usize>,
    resumes: Cell<usize>,
}

/// Mock crypto handshake driver.
///
/// Flags are set directly by the test; the session only reads them.
#[derive(Clone, Default)]
pub struct MockCryptoHandshake {
    state: Rc<CryptoState>,
}

impl MockCryptoHandshake {
    /// Driver with nothing established.
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver with encryption already established (0-RTT capable).
    pub fn established() -> Self {
        let crypto = Self::new();
        crypto.set_encryption_established(true);
        crypto
    }

    /// Driver with the handshake already confirmed.
    pub fn confirmed() -> Self {
        let crypto = Self::new();
        crypto.set_handshake_confirmed(true);
        crypto
    }

    /// Set whether encryption is established.
    pub fn set_encryption_established(&self, established: bool) {
        self.state.encrypted.set(established);
    }

    /// Set whether the handshake is confirmed. Confirmation implies encryption.
    pub fn set_handshake_confirmed(&self, confirmed: bool) {
        self.state.confirmed.set(confirmed);
        if confirmed {
            self.state.encrypted.set(true);
        }
    }

    /// Stream ceiling the peer will have negotiated.
    pub fn set_negotiated_max_streams(&self, max_streams: usize) {
        self.state.max_streams.set(Some(max_streams));
    }

    /// Negotiated protocol version.
    pub fn set_version(&self, version: QuicVersion) {
        self.state.version.set(Some(version));
    }

    /// Certificate the peer presented.
    pub fn set_peer_certificate(&self, certificate: CertificateInfo) {
        *self.state.certificate.borrow_mut() = Some(certificate);
    }

    /// Make the next `connect`/`resume` fail with `error`.
    pub fn fail_next_connect(&self, error: Error) {
        *self.state.connect_error.borrow_mut() = Some(error);
    }

    /// Number of `connect` calls.
    pub fn connect_calls(&self) -> usize {
        self.state.connects.get()
    }

    /// Number of `resume` calls.
    pub fn resume_calls(&self) -> usize {
        self.state.resumes.get()
    }

    fn take_error(&self) -> Result<()> {
        match self.state.connect_error.borrow_mut().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl CryptoHandshake for MockCryptoHandshake {
    fn connect(&mut self) -> Result<()> {
        self.state.connects.set(self.state.connects.get() + 1);
        self.take_error()
    }

    fn resume(&mut self) -> Result<()> {
        self.state.resumes.set(self.state.resumes.get() + 1);
        self.take_error()
    }

    fn is_encryption_established(&self) -> bool {
        self.state.encrypted.get()
    }

    fn is_handshake_confirmed(&self) -> bool {
        self.state.confirmed.get()
    }

    fn negotiated_max_streams(&self) -> Option<usize> {
        self.state.max_streams.get()
    }

    fn negotiated_version(&self) -> Option<QuicVersion> {
        self.state.version.get()
    }

    fn peer_certificate(&self) -> Option<CertificateInfo> {
        self.state.certificate.borrow().clone()
    }
}

// === Transport ===

/// A stream write recorded by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamWrite {
    /// Stream written to.
    pub id: StreamId,
    /// Payload.
    pub data: Bytes,
    /// Whether FIN was set.
    pub fin: bool,
}

struct TransportState {
    connected: Cell<bool>,
    connection_id: Cell<ConnectionId>,
    peer_address: Cell<Option<SocketAddr>>,
    loss_rate: Cell<f32>,
    write_error: RefCell<Option<Error>>,
    datagrams: RefCell<Vec<Bytes>>,
    writes: RefCell<Vec<StreamWrite>>,
    resets: RefCell<Vec<(StreamId, Error)>>,
    closes: RefCell<Vec<Error>>,
}

/// Mock packet transport that records every intent it receives.
#[derive(Clone)]
pub struct MockTransport {
    state: Rc<TransportState>,
}

impl MockTransport {
    /// Connected transport with connection id 1.
    pub fn new() -> Self {
        Self {
            state: Rc::new(TransportState {
                connected: Cell::new(true),
                connection_id: Cell::new(1),
                peer_address: Cell::new(None),
                loss_rate: Cell::new(0.0),
                write_error: RefCell::new(None),
                datagrams: RefCell::new(Vec::new()),
                writes: RefCell::new(Vec::new()),
                resets: RefCell::new(Vec::new()),
                closes: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Simulate connectivity changes.
    pub fn set_connected(&self, connected: bool) {
        self.state.connected.set(connected);
    }

    /// Set the reported connection id.
    pub fn set_connection_id(&self, id: ConnectionId) {
        self.state.connection_id.set(id);
    }

    /// Set the reported peer address.
    pub fn set_peer_address(&self, addr: SocketAddr) {
        self.state.peer_address.set(Some(addr));
    }

    /// Set the reported packet loss rate.
    pub fn set_packet_loss_rate(&self, rate: f32) {
        self.state.loss_rate.set(rate);
    }

    /// Make the next write or datagram fail with `error`.
    pub fn fail_next_write(&self, error: Error) {
        *self.state.write_error.borrow_mut() = Some(error);
    }

    /// Datagrams sent so far.
    pub fn datagrams(&self) -> Vec<Bytes> {
        self.state.datagrams.borrow().clone()
    }

    /// Stream writes so far.
    pub fn writes(&self) -> Vec<StreamWrite> {
        self.state.writes.borrow().clone()
    }

    /// Stream resets so far.
    pub fn resets(&self) -> Vec<(StreamId, Error)> {
        self.state.resets.borrow().clone()
    }

    /// Close requests so far.
    pub fn closes(&self) -> Vec<Error> {
        self.state.closes.borrow().clone()
    }

    fn take_error(&self) -> Result<()> {
        match self.state.write_error.borrow_mut().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketTransport for MockTransport {
    fn send_datagram(&mut self, datagram: Bytes) -> Result<()> {
        self.take_error()?;
        self.state.datagrams.borrow_mut().push(datagram);
        Ok(())
    }

    fn write_stream(&mut self, id: StreamId, data: Bytes, fin: bool) -> Result<()> {
        self.take_error()?;
        self.state
            .writes
            .borrow_mut()
            .push(StreamWrite { id, data, fin });
        Ok(())
    }

    fn reset_stream(&mut self, id: StreamId, error: &Error) {
        self.state.resets.borrow_mut().push((id, error.clone()));
    }

    fn close(&mut self, reason: &Error) {
        self.state.connected.set(false);
        self.state.closes.borrow_mut().push(reason.clone());
    }

    fn is_connected(&self) -> bool {
        self.state.connected.get()
    }

    fn connection_id(&self) -> ConnectionId {
        self.state.connection_id.get()
    }

    fn peer_address(&self) -> Option<SocketAddr> {
        self.state.peer_address.get()
    }

    fn packet_loss_rate(&self) -> f32 {
        self.state.loss_rate.get()
    }
}

// === Task runner ===

struct Timer {
    deadline: Duration,
    seq: u64,
    handle: TimerHandle,
    task: Task,
}

#[derive(Default)]
struct RunnerState {
    now: Cell<Duration>,
    next_seq: Cell<u64>,
    ready: RefCell<VecDeque<Task>>,
    timers: RefCell<Vec<Timer>>,
}

/// Task runner driven by hand on a virtual clock.
///
/// Posted tasks run on [`run_until_idle`](Self::run_until_idle); delayed
/// tasks run once [`advance`](Self::advance) moves the clock past their
/// deadline.
#[derive(Clone, Default)]
pub struct ManualTaskRunner {
    state: Rc<RunnerState>,
}

impl ManualTaskRunner {
    /// Runner at virtual time zero with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.state.now.get()
    }

    /// Run posted tasks, including tasks they post, until none remain.
    /// Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.state.ready.borrow_mut().pop_front();
            let Some(task) = next else {
                return ran;
            };
            task();
            ran += 1;
        }
    }

    /// Move the clock forward by `delay`, running due timers in deadline
    /// order and draining posted tasks after each.
    pub fn advance(&self, delay: Duration) {
        let target = self.now() + delay;
        self.run_until_idle();
        while let Some(timer) = self.pop_due(target) {
            self.state.now.set(timer.deadline);
            if !timer.handle.is_cancelled() {
                (timer.task)();
            }
            self.run_until_idle();
        }
        self.state.now.set(target);
    }

    /// Tasks and live timers still waiting to run.
    pub fn pending(&self) -> usize {
        let live = self
            .state
            .timers
            .borrow()
            .iter()
            .filter(|timer| !timer.handle.is_cancelled())
            .count();
        self.state.ready.borrow().len() + live
    }

    fn pop_due(&self, target: Duration) -> Option<Timer> {
        let mut timers = self.state.timers.borrow_mut();
        let index = timers
            .iter()
            .enumerate()
            .filter(|(_, timer)| timer.deadline <= target)
            .min_by_key(|(_, timer)| (timer.deadline, timer.seq))
            .map(|(index, _)| index)?;
        Some(timers.swap_remove(index))
    }
}

impl TaskRunner for ManualTaskRunner {
    fn post(&self, task: Task) {
        self.state.ready.borrow_mut().push_back(task);
    }

    fn post_delayed(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let seq = self.state.next_seq.get();
        self.state.next_seq.set(seq + 1);
        self.state.timers.borrow_mut().push(Timer {
            deadline: self.now() + delay,
            seq,
            handle: handle.clone(),
            task,
        });
        handle
    }
}

// === Factory ===

/// Factory notification recorded by [`RecordingFactory`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FactoryEvent {
    /// `on_going_away`.
    GoingAway(SessionKey),
    /// `on_idle`.
    Idle(SessionKey),
    /// `on_closed`.
    Closed(SessionKey),
    /// `on_handshake_confirmed` with the reported loss rate.
    HandshakeConfirmed(SessionKey, f32),
}

/// Session factory that records notifications.
#[derive(Default)]
pub struct RecordingFactory {
    events: RefCell<Vec<FactoryEvent>>,
    claim_confirmation: Cell<bool>,
    hook: RefCell<Option<Hook<FactoryEvent>>>,
}

impl RecordingFactory {
    /// Factory that records and never claims confirmation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim (or stop claiming) handshake confirmations, suppressing
    /// observer fan-out.
    pub fn set_claim_confirmation(&self, claim: bool) {
        self.claim_confirmation.set(claim);
    }

    /// Run `hook` after every recorded event. The hook may re-enter the session.
    pub fn on_event(&self, hook: impl Fn(&FactoryEvent) + 'static) {
        *self.hook.borrow_mut() = Some(Rc::new(hook));
    }

    /// Events so far.
    pub fn events(&self) -> Vec<FactoryEvent> {
        self.events.borrow().clone()
    }

    /// Number of events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&FactoryEvent) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| predicate(e)).count()
    }

    fn record(&self, event: FactoryEvent) {
        self.events.borrow_mut().push(event);
        let hook = self.hook.borrow().clone();
        if let Some(hook) = hook {
            hook(&event);
        }
    }
}

impl SessionFactory for RecordingFactory {
    fn on_going_away(&self, session: SessionKey) {
        self.record(FactoryEvent::GoingAway(session));
    }

    fn on_idle(&self, session: SessionKey) {
        self.record(FactoryEvent::Idle(session));
    }

    fn on_closed(&self, session: SessionKey) {
        self.record(FactoryEvent::Closed(session));
    }

    fn on_handshake_confirmed(&self, session: SessionKey, packet_loss_rate: f32) -> bool {
        self.record(FactoryEvent::HandshakeConfirmed(session, packet_loss_rate));
        self.claim_confirmation.get()
    }
}

// === Observer ===

/// Observer notification recorded by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    /// `on_handshake_confirmed`.
    HandshakeConfirmed,
    /// `on_session_closed`.
    SessionClosed(Error),
}

/// Session observer that records notifications.
#[derive(Default)]
pub struct RecordingObserver {
    events: RefCell<Vec<ObserverEvent>>,
    hook: RefCell<Option<Hook<ObserverEvent>>>,
}

impl RecordingObserver {
    /// Empty observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` after every recorded event. The hook may re-enter the session.
    pub fn on_event(&self, hook: impl Fn(&ObserverEvent) + 'static) {
        *self.hook.borrow_mut() = Some(Rc::new(hook));
    }

    /// Events so far.
    pub fn events(&self) -> Vec<ObserverEvent> {
        self.events.borrow().clone()
    }

    /// Number of `on_handshake_confirmed` calls.
    pub fn confirmations(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| **e == ObserverEvent::HandshakeConfirmed)
            .count()
    }

    /// Errors passed to `on_session_closed`.
    pub fn close_errors(&self) -> Vec<Error> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                ObserverEvent::SessionClosed(error) => Some(error.clone()),
                ObserverEvent::HandshakeConfirmed => None,
            })
            .collect()
    }

    fn record(&self, event: ObserverEvent) {
        self.events.borrow_mut().push(event.clone());
        let hook = self.hook.borrow().clone();
        if let Some(hook) = hook {
            hook(&event);
        }
    }
}

impl SessionObserver for RecordingObserver {
    fn on_handshake_confirmed(&self) {
        self.record(ObserverEvent::HandshakeConfirmed);
    }

    fn on_session_closed(&self, error: &Error) {
        self.record(ObserverEvent::SessionClosed(error.clone()));
    }
}
