//! Production implementation of SimulationContext backed by the OS.

use crate::SimulationContext;
use ed25519_dalek::SigningKey;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Production context backed by the system clock and OS entropy.
pub struct SystemContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl SystemContext {
    /// Creates a new SystemContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across cells.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for SystemContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationContext for SystemContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    fn derive_signing_key(&self, _seed_extension: u64) -> SigningKey {
        use rand::rngs::OsRng;
        SigningKey::generate(&mut OsRng)
    }

    fn seed(&self) -> u64 {
        0
    }
}
