//! Error taxonomy for cells, workflows and host functions.

use dhtsim_env::{AnyDhtHash, EnvError};
use thiserror::Error;

/// Errors surfaced to the direct caller of a workflow.
///
/// None of these leave partial state behind: a workflow only replaces the
/// cell state after it finishes successfully.
#[derive(Debug, Error)]
pub enum CellError {
    /// The caller holds no capability grant for the function
    #[error("Unauthorized zome call: {zome}/{fn_name}")]
    Unauthorized { zome: String, fn_name: String },

    /// A new record failed structural or business validation
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Validation could not retrieve these dependencies at this time
    #[error("Could not validate a new record due to missing dependencies: {0:?}")]
    DependencyMissing(Vec<AnyDhtHash>),

    /// The cascade exhausted every source
    #[error("Not found: {0}")]
    NotFound(AnyDhtHash),

    #[error("Invalid DNA: {0}")]
    InvalidDna(String),

    #[error("There is no zome with the name {0} in this DNA")]
    ZomeNotFound(String),

    #[error("There is no function with the name {fn_name} in zome {zome}")]
    FunctionNotFound { zome: String, fn_name: String },

    /// The application function itself failed
    #[error("Zome function error: {0}")]
    HostFn(#[from] HostFnError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Environment error: {0}")]
    Env(#[from] EnvError),
}

impl CellError {
    /// True for errors that may succeed once network state advances.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CellError::DependencyMissing(_))
    }
}

/// Errors raised by application code through the host function API.
#[derive(Debug, Error)]
pub enum HostFnError {
    #[error("Entry def {0} is not defined in this zome")]
    EntryDefNotFound(String),

    #[error("Link type {0} is not defined in this zome")]
    LinkTypeNotFound(String),

    /// A referenced record could not be retrieved
    #[error("Could not find {0}")]
    NotFound(AnyDhtHash),

    /// The referenced record exists but cannot be the target of this call
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Environment error: {0}")]
    Env(#[from] EnvError),

    /// Application-level failure (bad payload, business precondition)
    #[error("{0}")]
    Guest(String),
}

impl HostFnError {
    pub fn guest(msg: impl Into<String>) -> Self {
        Self::Guest(msg.into())
    }
}
