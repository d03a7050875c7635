//! Packet transport seam.
//!
//! Packet encoding, congestion control and loss recovery live behind this
//! trait. The session forwards intent (send, close) and reacts to the
//! connection-level events the transport reports.

use crate::stream::StreamId;
use crate::{Error, Result};
use bytes::Bytes;
use std::net::SocketAddr;

/// Connection identifier used for diagnostics.
pub type ConnectionId = u64;

/// Connection-level events reported by the packet transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection closed.
    ConnectionClosed {
        /// Why it closed.
        error: Error,
        /// Whether the peer initiated the close.
        from_peer: bool,
    },
    /// Reading from the socket failed.
    ReadError(String),
    /// Peer will not accept further streams from us.
    GoAwayReceived,
}

/// Packet transport consumed by the session.
///
/// Exclusively owned by one session. After `close()` the transport must not
/// report further events. Implementations must not call back into the
/// session from inside these methods.
pub trait PacketTransport {
    /// Send an unreliable datagram on the connection.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the datagram cannot be queued.
    fn send_datagram(&mut self, datagram: Bytes) -> Result<()>;

    /// Queue stream data for sending.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the data cannot be queued.
    fn write_stream(&mut self, id: StreamId, data: Bytes, fin: bool) -> Result<()>;

    /// Abandon a stream, telling the peer why.
    fn reset_stream(&mut self, id: StreamId, error: &Error);

    /// Close the connection.
    fn close(&mut self, reason: &Error);

    /// Whether the connection is still up. `false` is terminal.
    fn is_connected(&self) -> bool;

    /// Connection identifier.
    fn connection_id(&self) -> ConnectionId;

    /// Remote address, once known.
    fn peer_address(&self) -> Option<SocketAddr>;

    /// Measured packet loss rate in `[0, 1]`.
    fn packet_loss_rate(&self) -> f32;
}
