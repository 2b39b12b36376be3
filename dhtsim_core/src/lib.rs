//! dhtsim Core - Per-cell workflow engine for a simulated distributed ledger
//!
//! A cell is one agent running one DNA. It keeps a private append-only
//! source chain and holds its share of a replicated hash table. This crate
//! covers:
//! 1. **Committing**: zome calls run on a working copy of the chain, are
//!    validated record by record, and replace the chain in one swap
//! 2. **Replicating**: committed records become DHT ops, published to the
//!    agents closest to each op's basis
//! 3. **Retrieving**: the cascade answers gets from local state first and
//!    falls back to neighbors found through the bootstrap service
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── Cell ─────────────────────────┐
//! │  Workflow queue ──► Workspace (copy of CellState)      │
//! │      │                  │                              │
//! │      │        ┌─────────┴──────────┐                   │
//! │      │        │ sys / app          │                   │
//! │      │        │ validation         │──► Cascade ───────┼──► neighbors
//! │      │        └────────────────────┘                   │   (CellPeer)
//! │      ▼                                                 │
//! │  ChainStore (chain + CAS)     DhtStore (op ledgers)    │
//! └────────────────────────────────────────────────────────┘
//!                         ▲
//!               BootstrapService (announce, neighborhoods)
//! ```

pub mod action;
pub mod bad_agent;
pub mod bootstrap;
pub mod cap_grant;
pub mod cascade;
pub mod cell;
pub mod dht_op;
pub mod dna;
pub mod entry;
pub mod error;
pub mod hashing;
pub mod host_fn;
pub mod metadata;
pub mod network;
pub mod record;
pub mod state;
pub mod summary;
pub mod workflows;

// Re-export key types for convenience
pub use action::{Action, ActionContent, ActionType, LinkTag, SignedActionHashed};
pub use bad_agent::BadAgentConfig;
pub use bootstrap::BootstrapService;
pub use cap_grant::{CapAccess, CapSecret, ChainGrantLookup, GrantLookup, GrantedFunctions, ZomeCallCapGrant};
pub use cascade::Cascade;
pub use cell::Cell;
pub use dht_op::{produce_ops_from_record, DhtOp, DhtOpType};
pub use dna::{EntryDef, SimulatedDna, SimulatedZome, ValidateCallbackResult, ZomeFn};
pub use entry::{AppEntryType, Entry, EntryType, EntryVisibility};
pub use error::{CellError, HostFnError};
pub use host_fn::{AgentInfo, HostFnContext};
pub use metadata::{EntryDhtStatus, Link};
pub use network::{CellPeer, Details, GetOptions, GetStrategy, NetworkConfig, NetworkHandle};
pub use record::{Record, RecordEntry};
pub use state::{CellState, ChainStore, DhtOpsDump, DhtStore, ValidationStatus};
pub use summary::{DhtSummary, DhtSummaryCounts};
pub use workflows::{CallZomeFnInput, ValidationOutcome, Workflow};
