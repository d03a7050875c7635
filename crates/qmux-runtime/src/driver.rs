//! Feeds collaborator events into a session.

use crate::error::{Error, Result};
use bytes::Bytes;
use qmux_core::{HandshakeEvent, Session, StreamId, TransportEvent};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Event from the crypto driver or packet engine, addressed to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// Handshake progress.
    Handshake(HandshakeEvent),
    /// Connection-level transport event.
    Transport(TransportEvent),
    /// Data received on a stream.
    StreamData {
        /// Stream the data arrived on.
        id: StreamId,
        /// Payload.
        data: Bytes,
        /// Whether the peer finished the stream.
        fin: bool,
    },
    /// The peer reset a stream.
    StreamReset(StreamId),
}

/// Apply one input to `session`.
pub fn dispatch(session: &Session, input: SessionInput) {
    trace!(session = %session.key(), ?input, "dispatching input");
    match input {
        SessionInput::Handshake(event) => session.on_handshake_event(event),
        SessionInput::Transport(event) => session.on_transport_event(event),
        SessionInput::StreamData { id, data, fin } => session.on_stream_data(id, data, fin),
        SessionInput::StreamReset(id) => session.on_stream_reset(id),
    }
}

/// Dispatch inputs into `session` until it drains.
///
/// Runs alongside the tasks using the session (for example under
/// `tokio::join!` inside a `LocalSet`) and returns as soon as the session
/// drains, whoever closed it. If the input channel closes first, the
/// session is closed with `ConnectionClosed` and [`Error::InputClosed`] is
/// returned.
///
/// # Errors
///
/// Returns [`Error::InputClosed`] if every input sender was dropped before
/// the session drained.
pub async fn drive(
    session: &Session,
    mut inputs: mpsc::UnboundedReceiver<SessionInput>,
) -> Result<()> {
    let drained = session.drained();
    tokio::pin!(drained);
    loop {
        tokio::select! {
            biased;
            () = &mut drained => break,
            input = inputs.recv() => {
                let Some(input) = input else {
                    debug!(session = %session.key(), "input channel closed");
                    session.close(qmux_core::Error::ConnectionClosed { by_peer: false });
                    return Err(Error::InputClosed);
                };
                dispatch(session, input);
            }
        }
    }
    debug!(session = %session.key(), "session drained");
    Ok(())
}
