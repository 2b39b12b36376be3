//! Bootstrap service: the process-wide directory of announced cells.
//!
//! Neighborhoods are computed with the XOR metric over agent keys. Ties
//! cannot change the order between runs: equal distances fall back to the
//! agent key's byte order.

use crate::network::CellPeer;
use dhtsim_env::{AgentPubKey, AnyDhtHash, CellId, DnaHash};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

type DnaCells = BTreeMap<AgentPubKey, Arc<dyn CellPeer>>;

#[derive(Default)]
pub struct BootstrapService {
    cells: RwLock<BTreeMap<DnaHash, DnaCells>>,
}

impl BootstrapService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Registers a cell. Returns false if it was already announced.
    pub fn announce(&self, cell: Arc<dyn CellPeer>) -> bool {
        let cell_id = cell.cell_id();
        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        let dna_cells = cells.entry(cell_id.dna_hash).or_default();
        if dna_cells.contains_key(&cell_id.agent_pub_key) {
            return false;
        }
        dna_cells.insert(cell_id.agent_pub_key, cell);
        debug!("Announced {} ({} cells in DNA)", cell_id, dna_cells.len());
        true
    }

    pub fn peer(&self, cell_id: &CellId) -> Option<Arc<dyn CellPeer>> {
        let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
        cells
            .get(&cell_id.dna_hash)?
            .get(&cell_id.agent_pub_key)
            .cloned()
    }

    /// Announced agents of a DNA, in key order.
    pub fn agents(&self, dna_hash: &DnaHash) -> Vec<AgentPubKey> {
        let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
        cells
            .get(dna_hash)
            .map(|dna_cells| dna_cells.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Up to `count` agents ordered by ascending distance to `basis`.
    pub fn closest_neighbors(
        &self,
        dna_hash: &DnaHash,
        basis: &AnyDhtHash,
        count: usize,
        excluding: &[AgentPubKey],
    ) -> Vec<AgentPubKey> {
        let mut agents: Vec<AgentPubKey> = self
            .agents(dna_hash)
            .into_iter()
            .filter(|agent| !excluding.contains(agent))
            .collect();
        agents.sort_by_key(|agent| (agent.distance(basis), *agent.bytes()));
        agents.truncate(count);
        agents
    }

    /// Every other agent ordered by descending distance to `from`.
    pub fn farthest_peers(
        &self,
        dna_hash: &DnaHash,
        from: &AgentPubKey,
        excluding: &[AgentPubKey],
    ) -> Vec<AgentPubKey> {
        let mut agents: Vec<AgentPubKey> = self
            .agents(dna_hash)
            .into_iter()
            .filter(|agent| agent != from && !excluding.contains(agent))
            .collect();
        agents.sort_by_key(|agent| (agent.distance(from), *agent.bytes()));
        agents.reverse();
        agents
    }

    /// Handles of the closest cells to `basis`.
    pub fn get_neighborhood(
        &self,
        dna_hash: &DnaHash,
        basis: &AnyDhtHash,
        count: usize,
        excluding: &[AgentPubKey],
    ) -> Vec<Arc<dyn CellPeer>> {
        self.closest_neighbors(dna_hash, basis, count, excluding)
            .into_iter()
            .filter_map(|agent| self.peer(&CellId::new(*dna_hash, agent)))
            .collect()
    }

    pub fn get_far_known_peers(
        &self,
        dna_hash: &DnaHash,
        from: &AgentPubKey,
        excluding: &[AgentPubKey],
    ) -> Vec<Arc<dyn CellPeer>> {
        self.farthest_peers(dna_hash, from, excluding)
            .into_iter()
            .filter_map(|agent| self.peer(&CellId::new(*dna_hash, agent)))
            .collect()
    }
}

impl std::fmt::Debug for BootstrapService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
        let counts: BTreeMap<_, _> = cells.iter().map(|(dna, c)| (*dna, c.len())).collect();
        f.debug_struct("BootstrapService")
            .field("cells", &counts)
            .finish()
    }
}
