//! Session configuration.

use crate::{Error, Result};
use std::time::Duration;

/// Default ceiling on simultaneously open outgoing streams.
pub const DEFAULT_MAX_OPEN_STREAMS: usize = 100;

/// Default 0-RTT grace period.
pub const DEFAULT_ZERO_RTT_GRACE: Duration = Duration::from_secs(2);

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Initial admission ceiling, raised at handshake confirmation if the
    /// peer negotiated a larger value.
    pub max_open_streams: usize,
    /// Wait for full handshake confirmation before reporting ready.
    pub require_confirmation: bool,
    /// How long optimistic (0-RTT) readiness is offered before confirmation.
    pub zero_rtt_grace: Duration,
    /// First client-originated stream id.
    pub first_outgoing_stream_id: u64,
    /// Distance between consecutive client-originated stream ids.
    pub stream_id_increment: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_open_streams: DEFAULT_MAX_OPEN_STREAMS,
            require_confirmation: false,
            zero_rtt_grace: DEFAULT_ZERO_RTT_GRACE,
            first_outgoing_stream_id: 1,
            stream_id_increment: 2,
        }
    }
}

impl SessionConfig {
    /// Check the configuration for values the session cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` for a zero stream ceiling or a zero id increment.
    pub fn validate(&self) -> Result<()> {
        if self.max_open_streams == 0 || self.stream_id_increment == 0 {
            return Err(Error::InvalidState);
        }
        Ok(())
    }
}
