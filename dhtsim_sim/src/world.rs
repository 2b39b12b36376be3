//! SimWorld - N cells sharing one DNA and one bootstrap service.

use crate::context::SimContext;
use crate::error::SimError;
use crate::exporter::{AgentExport, SimExport};
use crate::keys::DeterministicKeyProvider;

use dhtsim_core::{
    BadAgentConfig, BootstrapService, CapSecret, Cell, DhtSummary, NetworkConfig, SimulatedDna,
    Workflow,
};
use dhtsim_env::{AgentPubKey, SimulationContext};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Rounds `settle` runs before giving up.
pub const MAX_SETTLE_ROUNDS: usize = 64;

/// Virtual time between harness steps.
const STEP: Duration = Duration::from_millis(1);

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of cells to spawn
    pub num_agents: usize,

    pub network: NetworkConfig,

    /// Misbehaviour per agent index; absent agents are honest
    pub bad_agents: BTreeMap<usize, BadAgentConfig>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_agents: 3,
            network: NetworkConfig::default(),
            bad_agents: BTreeMap::new(),
        }
    }
}

impl SimConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_agents(mut self, num_agents: usize) -> Self {
        self.num_agents = num_agents;
        self
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    pub fn with_bad_agent(mut self, index: usize, config: BadAgentConfig) -> Self {
        self.bad_agents.insert(index, config);
        self
    }
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    pub bootstrap: Arc<BootstrapService>,

    pub dna: Arc<SimulatedDna>,

    cells: Vec<Arc<Cell<SimContext>>>,
}

impl SimWorld {
    /// Spawns `config.num_agents` cells with deterministic keys.
    pub fn new(config: SimConfig, dna: SimulatedDna) -> Result<Self, SimError> {
        let context = SimContext::shared(config.seed);
        let mut keys = DeterministicKeyProvider::new(context.clone());
        let bootstrap = BootstrapService::shared();
        let dna = Arc::new(dna);

        let cells = (0..config.num_agents)
            .map(|index| {
                let bad_agent = config
                    .bad_agents
                    .get(&index)
                    .cloned()
                    .unwrap_or_else(BadAgentConfig::honest);
                if !bad_agent.is_honest() {
                    info!("Agent {} misbehaves: {:?}", index, bad_agent);
                }
                Cell::spawn(
                    context.clone(),
                    dna.clone(),
                    keys.agent_pub_key(index as u64),
                    bootstrap.clone(),
                    config.network,
                    bad_agent,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "SimWorld ready: {} cells, seed={}, redundancy={}",
            cells.len(),
            context.seed(),
            config.network.redundancy_factor
        );
        Ok(Self {
            config,
            context,
            bootstrap,
            dna,
            cells,
        })
    }

    pub fn cells(&self) -> &[Arc<Cell<SimContext>>] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Result<&Arc<Cell<SimContext>>, SimError> {
        self.cells.get(index).ok_or(SimError::UnknownAgent(index))
    }

    pub fn agent(&self, index: usize) -> Result<AgentPubKey, SimError> {
        Ok(*self.cell(index)?.agent_pub_key())
    }

    /// Calls a function on an agent's own cell, as that agent.
    pub async fn call_zome_fn(
        &self,
        index: usize,
        zome: &str,
        fn_name: &str,
        payload: Value,
    ) -> Result<Value, SimError> {
        let caller = self.agent(index)?;
        self.call_zome_fn_as(index, caller, zome, fn_name, payload, None)
            .await
    }

    /// Calls a function on cell `target` with an arbitrary provenance.
    pub async fn call_zome_fn_as(
        &self,
        target: usize,
        provenance: AgentPubKey,
        zome: &str,
        fn_name: &str,
        payload: Value,
        cap_secret: Option<CapSecret>,
    ) -> Result<Value, SimError> {
        self.context.advance_time(STEP);
        let cell = self.cell(target)?;
        Ok(cell
            .call_zome_fn(zome, fn_name, payload, provenance, cap_secret)
            .await?)
    }

    /// Drives every cell's pending workflows, round-robin, until none are left.
    ///
    /// Once idle, ops still awaiting dependencies are revalidated; this stops
    /// when a revalidation pass leaves the number of waiting ops unchanged.
    ///
    /// Returns the number of rounds that did work.
    pub async fn settle(&self) -> Result<usize, SimError> {
        let mut last_awaiting = None;
        for round in 0..MAX_SETTLE_ROUNDS {
            let mut ran = 0;
            for cell in &self.cells {
                self.context.advance_time(STEP);
                ran += cell.run_pending().await;
            }
            debug!("settle round {}: {} workflows", round, ran);
            if ran > 0 || self.cells.iter().any(|cell| cell.has_pending()) {
                continue;
            }

            let awaiting = self.awaiting_ops();
            if awaiting == 0 || last_awaiting == Some(awaiting) {
                return Ok(round);
            }
            debug!("revalidating {} ops awaiting dependencies", awaiting);
            last_awaiting = Some(awaiting);
            for cell in &self.cells {
                if !cell.state().dht.validation_limbo().is_empty() {
                    cell.enqueue(Workflow::ValidateDhtOps);
                }
            }
        }
        Err(SimError::Unsettled(MAX_SETTLE_ROUNDS))
    }

    /// Ops sitting in validation limbo across all cells.
    pub fn awaiting_ops(&self) -> usize {
        self.cells
            .iter()
            .map(|cell| cell.state().dht.validation_limbo().len())
            .sum()
    }

    /// Background workflow failures across all cells.
    pub fn failed_workflows(&self) -> usize {
        self.cells.iter().map(|cell| cell.failed_workflows()).sum()
    }

    /// Summary of everything integrated anywhere in the network.
    pub fn summary(&self) -> DhtSummary {
        let dumps: Vec<_> = self.cells.iter().map(|cell| cell.dht_ops_dump()).collect();
        DhtSummary::from_dumps(&dumps)
    }

    pub fn export(&self, scenario: &str) -> SimExport {
        let mut export = SimExport::new(scenario, self.config.seed);
        for (index, cell) in self.cells.iter().enumerate() {
            export.add_agent(AgentExport {
                index,
                agent_pub_key: *cell.agent_pub_key(),
                failed_workflows: cell.failed_workflows(),
                source_chain: cell.source_chain_records(),
                dht_ops: cell.dht_ops_dump(),
            });
        }
        export.summary = self.summary().counts();
        export
    }
}

/// Decodes a zome function's JSON result.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, SimError> {
    Ok(serde_json::from_value(value)?)
}
