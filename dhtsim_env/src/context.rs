//! Core environment context trait for dhtsim cells.

use crate::error::EnvError;
use crate::types::Timestamp;
use ed25519_dalek::SigningKey;
use std::time::{Duration, SystemTime};

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" so that cells can run both as a
/// live process and inside the deterministic simulation harness.
///
/// # Implementations
///
/// - **Production**: `SystemContext` - wraps the OS clock and `OsRng`
/// - **Simulation**: `SimContext` - virtual clock and `ChaCha8Rng(seed)`
///
/// # Determinism
///
/// Action timestamps and agent keys are the only sources of
/// non-determinism in a cell, and both come from here.
pub trait SimulationContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time used to stamp new actions.
    fn system_time(&self) -> SystemTime;

    /// Wall-clock time as an action timestamp.
    fn timestamp(&self) -> Result<Timestamp, EnvError> {
        Timestamp::try_from(self.system_time())
    }

    /// Generates a keypair from a seed extension.
    ///
    /// Seeded implementations combine the global seed with `seed_extension`
    /// to derive unique but reproducible agent identities.
    fn derive_signing_key(&self, seed_extension: u64) -> SigningKey;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
