//! Runtime integration errors.

use thiserror::Error;

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Runtime errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Session error from core.
    #[error("Session error: {0}")]
    Session(#[from] qmux_core::Error),

    /// The input channel closed before the session finished.
    #[error("Input channel closed before the session drained")]
    InputClosed,
}
