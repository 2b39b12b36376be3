//! Deterministic agent identities for simulation.

use dhtsim_env::{AgentPubKey, SimulationContext};
use ed25519_dalek::SigningKey;
use std::collections::HashMap;
use std::sync::Arc;

/// Hands out agent keys derived from a context's seed.
///
/// Keys are:
/// - Deterministic: same seed always produces the same agents
/// - Isolated: adding agents never changes existing agents' keys
pub struct DeterministicKeyProvider<Ctx: SimulationContext> {
    ctx: Arc<Ctx>,

    /// Cache of generated keys by agent index
    key_cache: HashMap<u64, SigningKey>,
}

impl<Ctx: SimulationContext> DeterministicKeyProvider<Ctx> {
    pub fn new(ctx: Arc<Ctx>) -> Self {
        Self {
            ctx,
            key_cache: HashMap::new(),
        }
    }

    /// Signing key for an agent index.
    pub fn agent_key(&mut self, agent_id: u64) -> SigningKey {
        let ctx = &self.ctx;
        self.key_cache
            .entry(agent_id)
            .or_insert_with(|| ctx.derive_signing_key(agent_id))
            .clone()
    }

    pub fn agent_pub_key(&mut self, agent_id: u64) -> AgentPubKey {
        AgentPubKey::from_signing_key(&self.agent_key(agent_id))
    }

    pub fn generate_agent_pub_keys(&mut self, num_agents: usize) -> Vec<AgentPubKey> {
        (0..num_agents as u64)
            .map(|id| self.agent_pub_key(id))
            .collect()
    }
}
