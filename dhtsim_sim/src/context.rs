//! Simulation context implementing SimulationContext for deterministic runs.

use dhtsim_env::SimulationContext;
use ed25519_dalek::SigningKey;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Simulation context backed by a virtual clock and seeded keys.
///
/// Time only moves when the harness advances it, so action timestamps and
/// therefore action hashes are identical across runs with the same seed.
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,

    /// Epoch offset (virtual time 0 maps to this wall-clock time)
    epoch: SystemTime,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
            epoch: UNIX_EPOCH + Duration::from_secs(1704067200), // 2024-01-01 00:00:00 UTC
        }
    }

    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    pub fn advance_time(&self, duration: Duration) {
        let mut time = self
            .virtual_time_ns
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *time += duration.as_nanos() as u64;
    }

    pub fn time_ns(&self) -> u64 {
        *self
            .virtual_time_ns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            epoch: self.epoch,
        }
    }
}

impl SimulationContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    fn derive_signing_key(&self, seed_extension: u64) -> SigningKey {
        let combined_seed = self.seed.wrapping_mul(0x517cc1b727220a95) ^ seed_extension;
        let mut key_rng = ChaCha8Rng::seed_from_u64(combined_seed);
        SigningKey::generate(&mut key_rng)
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_millis(3));
        assert_eq!(ctx.now(), Duration::from_millis(3));
        assert_eq!(
            ctx.timestamp().unwrap().as_micros(),
            1_704_067_200_000_000 + 3_000
        );
    }

    #[test]
    fn test_sim_context_deterministic_keys() {
        let ctx1 = SimContext::new(42);
        let ctx2 = SimContext::new(42);

        assert_eq!(
            ctx1.derive_signing_key(1).to_bytes(),
            ctx2.derive_signing_key(1).to_bytes()
        );
        assert_ne!(
            ctx1.derive_signing_key(1).to_bytes(),
            ctx1.derive_signing_key(2).to_bytes()
        );
    }

    #[test]
    fn test_sim_context_clone_shares_time() {
        let ctx1 = SimContext::new(42);
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));
        assert_eq!(ctx1.now(), ctx2.now());
    }
}
