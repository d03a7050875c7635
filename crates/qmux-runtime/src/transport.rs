//! Packet transport that forwards session intents over a channel.
//!
//! The session only expresses intent (send this, reset that, close). The
//! packet engine on the other end of the channel does the actual I/O and
//! reports back through [`SessionInput`](crate::SessionInput).

use bytes::Bytes;
use qmux_core::{ConnectionId, Error, PacketTransport, Result, StreamId};
use std::cell::Cell;
use std::net::SocketAddr;
use std::rc::Rc;
use tokio::sync::mpsc;
use tracing::debug;

/// Intent emitted by the session towards the packet engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send an unreliable datagram.
    Datagram(Bytes),
    /// Write stream data.
    StreamData {
        /// Target stream.
        id: StreamId,
        /// Payload.
        data: Bytes,
        /// Whether this finishes the stream.
        fin: bool,
    },
    /// Abort a stream.
    ResetStream {
        /// Target stream.
        id: StreamId,
        /// Why.
        error: Error,
    },
    /// Close the connection.
    Close(Error),
}

/// Connection statistics the packet engine updates in place.
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    loss_rate: Rc<Cell<f32>>,
}

impl TransportStats {
    /// Record the measured packet loss rate.
    pub fn set_packet_loss_rate(&self, rate: f32) {
        self.loss_rate.set(rate);
    }

    /// Last recorded packet loss rate.
    pub fn packet_loss_rate(&self) -> f32 {
        self.loss_rate.get()
    }
}

/// [`PacketTransport`] backed by an unbounded channel.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Outbound>,
    connection_id: ConnectionId,
    peer_address: Option<SocketAddr>,
    stats: TransportStats,
    closed: bool,
}

impl ChannelTransport {
    /// Create a transport and the receiver for its outbound intents.
    pub fn new(
        connection_id: ConnectionId,
        peer_address: Option<SocketAddr>,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            tx,
            connection_id,
            peer_address,
            stats: TransportStats::default(),
            closed: false,
        };
        (transport, rx)
    }

    /// Shared statistics handle for the packet engine.
    pub fn stats(&self) -> TransportStats {
        self.stats.clone()
    }

    fn send(&self, outbound: Outbound) -> Result<()> {
        if self.closed {
            return Err(Error::Transport("transport closed".into()));
        }
        self.tx
            .send(outbound)
            .map_err(|_| Error::Transport("packet engine gone".into()))
    }
}

impl PacketTransport for ChannelTransport {
    fn send_datagram(&mut self, datagram: Bytes) -> Result<()> {
        self.send(Outbound::Datagram(datagram))
    }

    fn write_stream(&mut self, id: StreamId, data: Bytes, fin: bool) -> Result<()> {
        self.send(Outbound::StreamData { id, data, fin })
    }

    fn reset_stream(&mut self, id: StreamId, error: &Error) {
        let _ = self.send(Outbound::ResetStream {
            id,
            error: error.clone(),
        });
    }

    fn close(&mut self, reason: &Error) {
        if self.closed {
            return;
        }
        debug!(connection_id = self.connection_id, %reason, "closing transport");
        let _ = self.send(Outbound::Close(reason.clone()));
        self.closed = true;
    }

    fn is_connected(&self) -> bool {
        !self.closed && !self.tx.is_closed()
    }

    fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    fn peer_address(&self) -> Option<SocketAddr> {
        self.peer_address
    }

    fn packet_loss_rate(&self) -> f32 {
        self.stats.packet_loss_rate()
    }
}
