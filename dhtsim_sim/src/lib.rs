//! dhtsim Deterministic Simulation Harness
//!
//! Runs many cells of one DNA in a single process where every source of
//! non-determinism is pinned:
//! - **Time**: a virtual clock that moves only when the harness steps it
//! - **Identity**: agent keys derived from the master seed
//! - **Scheduling**: pending workflows are drained round-robin, one cell at a time
//!
//! Two runs with the same seed produce the same chains, op hashes and ledgers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── SimWorld ────────────────────────────┐
//! │  SimContext (virtual clock)      DeterministicKeyProvider        │
//! │                                                                  │
//! │  ┌────────┐      ┌────────┐      ┌────────┐                      │
//! │  │ Cell 0 │◄────►│ Cell 1 │◄────►│ Cell 2 │   ...                │
//! │  └───┬────┘      └───┬────┘      └───┬────┘                      │
//! │      └───────────────┴───────┬───────┘                           │
//! │                      BootstrapService                            │
//! └──────────────────────────────────────────────────────────────────┘
//!          ▲ scenarios drive calls, settle() drains workflows
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dhtsim_sim::{demo_dna, SimConfig, SimWorld};
//!
//! let world = SimWorld::new(SimConfig::default().with_agents(3), demo_dna("net"))?;
//! world.call_zome_fn(0, "demo", "create_entry", json!({"content": "hi"})).await?;
//! world.settle().await?;
//! ```

mod context;
mod demo_dna;
mod error;
mod exporter;
mod keys;
mod runner;
pub mod scenarios;
mod world;

pub use context::SimContext;
pub use demo_dna::{demo_dna, demo_zome, DEMO_DNA_NAME, DEMO_LINK, DEMO_ZOME};
pub use error::SimError;
pub use exporter::{AgentExport, SimExport};
pub use keys::DeterministicKeyProvider;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{decode, SimConfig, SimWorld, MAX_SETTLE_ROUNDS};
