//! Client session layer for a multiplexed QUIC-style transport.
//!
//! This crate owns the per-connection session state machine:
//! - Stream admission against the negotiated ceiling, with FIFO queuing
//! - Handshake readiness, including optimistic 0-RTT within a grace period
//! - Observer and factory notification across going-away, close and drain
//! - Pooling checks for reusing a session across hostnames
//!
//! Packet I/O, cryptography and scheduling sit behind the
//! [`PacketTransport`], [`CryptoHandshake`] and [`TaskRunner`] traits. The
//! session is single-threaded (`!Send`) and runs on one cooperative event
//! loop; see `qmux-runtime` for a tokio integration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod factory;
pub mod handshake;
pub mod lifecycle;
pub mod mock;
pub mod observer;
pub mod pool;
pub mod request;
pub mod server_id;
pub mod session;
pub mod snapshot;
pub mod stream;
pub mod task;
pub mod transport;

pub use config::SessionConfig;
pub use error::{Error, ErrorCode, Result};
pub use factory::{DisabledReason, SessionFactory, SessionKey};
pub use handshake::{CryptoHandshake, HandshakeEvent, HandshakeState, QuicVersion};
pub use lifecycle::{CloseSource, Lifecycle};
pub use observer::{ObserverHandle, SessionObserver};
pub use pool::{CertificateInfo, TransportSecurityPolicy};
pub use request::{RequestStatus, StreamRequest};
pub use server_id::{PrivacyMode, ServerId};
pub use session::{ConnectStatus, HandshakeConfirmation, Session};
pub use snapshot::SessionSnapshot;
pub use stream::{Stream, StreamId};
pub use task::{Task, TaskRunner, TimerHandle};
pub use transport::{ConnectionId, PacketTransport, TransportEvent};
