//! Identity of the remote endpoint a session is connected to.

use serde::Serialize;
use std::fmt;

/// Whether requests on a session may carry user-identifying state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyMode {
    /// Normal requests.
    Disabled,
    /// Requests that must not share identity with normal ones.
    Enabled,
}

/// Server identifier: host, port and privacy mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ServerId {
    /// Hostname the session was opened for.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Privacy mode of the session.
    pub privacy_mode: PrivacyMode,
}

impl ServerId {
    /// Create a server identifier.
    pub fn new(host: impl Into<String>, port: u16, privacy_mode: PrivacyMode) -> Self {
        Self {
            host: host.into(),
            port,
            privacy_mode,
        }
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)?;
        if self.privacy_mode == PrivacyMode::Enabled {
            write!(f, "/private")?;
        }
        Ok(())
    }
}
