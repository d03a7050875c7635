//! Read-only diagnostic view of a session.

use crate::factory::{DisabledReason, SessionKey};
use crate::handshake::{HandshakeState, QuicVersion};
use crate::lifecycle::Lifecycle;
use crate::server_id::ServerId;
use crate::stream::StreamId;
use crate::transport::ConnectionId;
use serde::Serialize;
use std::net::SocketAddr;

/// Point-in-time session state for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Factory key.
    pub key: SessionKey,
    /// Server the session was opened for.
    pub server_id: ServerId,
    /// Lifecycle state.
    pub lifecycle: Lifecycle,
    /// Handshake progress.
    pub handshake: HandshakeState,
    /// Negotiated version, once known.
    pub version: Option<QuicVersion>,
    /// Transport connection id.
    pub connection_id: ConnectionId,
    /// Remote address, once known.
    pub peer_address: Option<SocketAddr>,
    /// Whether the transport is connected.
    pub connected: bool,
    /// Whether the peer presented a certificate.
    pub secure: bool,
    /// Currently open streams.
    pub open_streams: usize,
    /// Ids of the open streams, ascending.
    pub active_streams: Vec<StreamId>,
    /// Streams ever created.
    pub total_streams: u64,
    /// Current admission ceiling.
    pub max_open_streams: usize,
    /// Requests queued behind the ceiling.
    pub pending_requests: usize,
    /// Registered observers.
    pub observers: usize,
    /// Why the session will not be reused.
    pub disabled_reason: DisabledReason,
}

impl SessionSnapshot {
    /// Render as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        // Every field serializes infallibly.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
