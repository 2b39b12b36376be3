//! dhtsim Environment Abstraction Layer
//!
//! This crate provides the primitives every dhtsim cell is built on:
//! - Typed content hashes and agent/DNA identities (`HoloHash`, `CellId`)
//! - The XOR distance metric used for neighborhood selection
//! - Time and key derivation behind the `SimulationContext` trait
//!
//! Running the same cells under `SimContext` (from `dhtsim_sim`) with the
//! same seed reproduces every action hash, op hash and neighbor set.
//!
//! # Example
//!
//! ```ignore
//! use dhtsim_env::{AgentPubKey, SimulationContext, SystemContext};
//!
//! let ctx = SystemContext::shared();
//! let agent = AgentPubKey::from_signing_key(&ctx.derive_signing_key(0));
//! ```

mod context;
mod error;
mod system;
mod types;

pub use context::SimulationContext;
pub use error::EnvError;
pub use system::SystemContext;
pub use types::{
    ActionHash, AgentPubKey, AnyDhtHash, CellId, DhtDistance, DhtOpHash, DnaHash, EntryHash,
    HashType, HoloHash, Timestamp, HASH_LEN,
};
