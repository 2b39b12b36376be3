//! Error types for the dhtsim environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A hash string or byte slice could not be decoded
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// The clock reported a time that cannot be represented
    #[error("Clock error: {0}")]
    ClockError(String),
}

impl EnvError {
    /// Creates an invalid hash error.
    pub fn invalid_hash(msg: impl Into<String>) -> Self {
        Self::InvalidHash(msg.into())
    }
}
