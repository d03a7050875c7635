//! Tokio integration for the qmux session layer.
//!
//! Implements:
//! - [`TokioTaskRunner`]: deferred tasks and timers on a `LocalSet`
//! - [`ChannelTransport`]: session intents forwarded to a packet engine
//! - [`drive`]: handshake and transport events fed into a session
//!
//! Sessions are `!Send`; run everything here on a single-threaded runtime
//! or inside a `LocalSet`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod driver;
pub mod error;
pub mod runner;
pub mod transport;

pub use driver::{dispatch, drive, SessionInput};
pub use error::{Error, Result};
pub use runner::TokioTaskRunner;
pub use transport::{ChannelTransport, Outbound, TransportStats};
