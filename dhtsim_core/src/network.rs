//! In-process network seam between cells.
//!
//! Cells never hold references to each other. Every cross-cell call goes
//! through a [`CellPeer`] handle looked up in the [`BootstrapService`].

use crate::bootstrap::BootstrapService;
use crate::dht_op::DhtOp;
use crate::entry::Entry;
use crate::metadata::{EntryDhtStatus, Link};
use crate::record::Record;
use async_trait::async_trait;
use dhtsim_env::{ActionHash, AgentPubKey, AnyDhtHash, CellId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// How hard a get tries to see the latest state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GetStrategy {
    /// First content found wins; may miss recent updates and deletes
    #[default]
    Contents,
    /// Merge the answers of every authority queried
    Latest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetOptions {
    pub strategy: GetStrategy,
}

impl GetOptions {
    pub fn contents() -> Self {
        Self {
            strategy: GetStrategy::Contents,
        }
    }

    pub fn latest() -> Self {
        Self {
            strategy: GetStrategy::Latest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDetails {
    pub record: Record,
    pub deletes: Vec<ActionHash>,
    pub updates: Vec<ActionHash>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDetails {
    pub entry: Entry,
    /// Actions that created this entry
    pub actions: Vec<ActionHash>,
    pub deletes: Vec<ActionHash>,
    pub updates: Vec<ActionHash>,
    pub entry_dht_status: EntryDhtStatus,
}

/// What an authority knows about a hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Details {
    Record(RecordDetails),
    Entry(EntryDetails),
}

impl Details {
    /// Union of two answers about the same hash.
    ///
    /// Mismatched kinds keep `self`.
    pub fn merge(self, other: Details) -> Details {
        match (self, other) {
            (Details::Record(mut a), Details::Record(b)) => {
                a.deletes = union(a.deletes, b.deletes);
                a.updates = union(a.updates, b.updates);
                if a.record.entry().is_none() && b.record.entry().is_some() {
                    a.record = b.record;
                }
                Details::Record(a)
            }
            (Details::Entry(mut a), Details::Entry(b)) => {
                a.actions = union(a.actions, b.actions);
                a.deletes = union(a.deletes, b.deletes);
                a.updates = union(a.updates, b.updates);
                // A Dead verdict from either authority stands.
                if b.entry_dht_status == EntryDhtStatus::Dead {
                    a.entry_dht_status = EntryDhtStatus::Dead;
                }
                Details::Entry(a)
            }
            (a, _) => a,
        }
    }

    pub fn record(&self) -> Option<&Record> {
        match self {
            Details::Record(details) => Some(&details.record),
            Details::Entry(_) => None,
        }
    }

    pub fn entry(&self) -> Option<&Entry> {
        match self {
            Details::Record(details) => details.record.entry(),
            Details::Entry(details) => Some(&details.entry),
        }
    }
}

fn union(a: Vec<ActionHash>, b: Vec<ActionHash>) -> Vec<ActionHash> {
    a.into_iter()
        .chain(b)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// A link together with the DeleteLink actions an authority knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDetails {
    pub link: Link,
    pub removes: Vec<ActionHash>,
}

/// The calls one cell can make on another.
#[async_trait]
pub trait CellPeer: Send + Sync {
    fn cell_id(&self) -> CellId;

    /// Answers a get as an authority for `hash`.
    async fn handle_get(&self, hash: AnyDhtHash, options: GetOptions) -> Option<Details>;

    async fn handle_get_links(&self, base: AnyDhtHash) -> Vec<LinkDetails>;

    /// Receives ops to hold. Processing happens in a later workflow.
    async fn handle_publish(&self, from: AgentPubKey, ops: Vec<DhtOp>);
}

/// Tuning for gets and publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// How many agents each op is published to
    pub redundancy_factor: usize,

    /// How many neighbors a get queries
    pub get_fanout: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            redundancy_factor: 3,
            get_fanout: 3,
        }
    }
}

impl NetworkConfig {
    pub fn with_redundancy_factor(mut self, redundancy_factor: usize) -> Self {
        self.redundancy_factor = redundancy_factor;
        self
    }

    pub fn with_get_fanout(mut self, get_fanout: usize) -> Self {
        self.get_fanout = get_fanout;
        self
    }
}

/// A cell's view of the network.
#[derive(Clone)]
pub struct NetworkHandle {
    cell_id: CellId,
    bootstrap: Arc<BootstrapService>,
    config: NetworkConfig,
}

impl NetworkHandle {
    pub fn new(cell_id: CellId, bootstrap: Arc<BootstrapService>, config: NetworkConfig) -> Self {
        Self {
            cell_id,
            bootstrap,
            config,
        }
    }

    pub fn cell_id(&self) -> &CellId {
        &self.cell_id
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn bootstrap(&self) -> &Arc<BootstrapService> {
        &self.bootstrap
    }

    /// Other agents to ask about `basis`, closest first.
    pub fn get_targets(&self, basis: &AnyDhtHash) -> Vec<Arc<dyn CellPeer>> {
        self.bootstrap.get_neighborhood(
            &self.cell_id.dna_hash,
            basis,
            self.config.get_fanout,
            &[self.cell_id.agent_pub_key],
        )
    }

    /// Agents responsible for holding ops on `basis`, this agent included.
    pub fn publish_targets(&self, basis: &AnyDhtHash) -> Vec<Arc<dyn CellPeer>> {
        self.bootstrap.get_neighborhood(
            &self.cell_id.dna_hash,
            basis,
            self.config.redundancy_factor,
            &[],
        )
    }
}

impl std::fmt::Debug for NetworkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkHandle")
            .field("cell_id", &self.cell_id)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionContent, SignedActionHashed};
    use dhtsim_env::{HashType, HoloHash, Timestamp};
    use serde_json::json;

    fn h(s: &[u8]) -> ActionHash {
        HoloHash::digest(HashType::Action, s)
    }

    fn entry_details(actions: Vec<ActionHash>, deletes: Vec<ActionHash>, live: bool) -> Details {
        Details::Entry(EntryDetails {
            entry: Entry::App(json!("x")),
            actions,
            deletes,
            updates: vec![],
            entry_dht_status: if live {
                EntryDhtStatus::Live
            } else {
                EntryDhtStatus::Dead
            },
        })
    }

    #[test]
    fn test_merge_entry_details_unions_and_keeps_dead() {
        let merged = entry_details(vec![h(b"a")], vec![], true)
            .merge(entry_details(vec![h(b"a")], vec![h(b"d")], false));
        match merged {
            Details::Entry(details) => {
                assert_eq!(details.actions, vec![h(b"a")]);
                assert_eq!(details.deletes, vec![h(b"d")]);
                assert_eq!(details.entry_dht_status, EntryDhtStatus::Dead);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_merge_record_details_unions_deletes() {
        let action = Action {
            author: HoloHash::digest(HashType::Agent, b"a"),
            timestamp: Timestamp::from_micros(0),
            action_seq: 0,
            prev_action: None,
            content: ActionContent::Delete {
                deletes_address: h(b"x"),
                deletes_entry_address: HoloHash::digest(HashType::Entry, b"x"),
            },
        };
        let record = Record::new(SignedActionHashed::sign(action).unwrap(), None);
        let a = Details::Record(RecordDetails {
            record: record.clone(),
            deletes: vec![h(b"1")],
            updates: vec![],
        });
        let b = Details::Record(RecordDetails {
            record,
            deletes: vec![h(b"2"), h(b"1")],
            updates: vec![h(b"u")],
        });
        match a.merge(b) {
            Details::Record(details) => {
                assert_eq!(details.deletes.len(), 2);
                assert_eq!(details.updates, vec![h(b"u")]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
