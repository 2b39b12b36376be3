//! Harness errors.

use dhtsim_core::CellError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("No agent with index {0}")]
    UnknownAgent(usize),

    #[error("Cell error: {0}")]
    Cell(#[from] CellError),

    /// Pending workflows kept producing work past the round limit
    #[error("Network did not settle within {0} rounds")]
    Unsettled(usize),

    /// A scenario expectation did not hold
    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion(msg.into())
    }
}

/// Fails with an assertion error unless `cond` holds.
pub fn ensure(cond: bool, msg: impl Into<String>) -> Result<(), SimError> {
    if cond {
        Ok(())
    } else {
        Err(SimError::assertion(msg))
    }
}
