//! Cell state: the private chain, the content store and the op ledgers.
//!
//! # Copy-on-write
//!
//! ```text
//! CellState { chain: Arc<ChainStore>, dht: Arc<DhtStore> }
//!                  │
//!      WorkingChain::fork ──► owned ChainStore (appends happen here)
//!                  │
//!      WorkingChain::commit ──► new Arc<ChainStore>, swapped in one step
//! ```
//!
//! The committed `ChainStore` is never mutated while a working copy exists;
//! a failed call simply drops its working copy.

use crate::action::{Action, ActionContent, SignedActionHashed};
use crate::dht_op::DhtOp;
use crate::entry::Entry;
use crate::error::CellError;
use crate::metadata::DhtMetadata;
use crate::record::Record;
use dhtsim_env::{ActionHash, AgentPubKey, AnyDhtHash, DhtOpHash, EntryHash, HoloHash, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// CONTENT STORE
// ============================================================================

/// Content-addressed store of actions and entries. Append-only.
#[derive(Debug, Clone, Default)]
pub struct Cas {
    actions: BTreeMap<ActionHash, SignedActionHashed>,
    entries: BTreeMap<EntryHash, Entry>,
}

impl Cas {
    pub fn put_action(&mut self, action: SignedActionHashed) {
        self.actions.entry(action.hash).or_insert(action);
    }

    pub fn put_entry(&mut self, hash: EntryHash, entry: Entry) {
        self.entries.entry(hash).or_insert(entry);
    }

    pub fn get_action(&self, hash: &ActionHash) -> Option<&SignedActionHashed> {
        self.actions.get(hash)
    }

    pub fn get_entry(&self, hash: &EntryHash) -> Option<&Entry> {
        self.entries.get(hash)
    }

    pub fn contains(&self, hash: &HoloHash) -> bool {
        self.actions.contains_key(hash) || self.entries.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.actions.len() + self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// CHAIN STORE
// ============================================================================

/// An agent's source chain plus the CAS it lives in.
#[derive(Debug, Clone, Default)]
pub struct ChainStore {
    source_chain: Vec<ActionHash>,
    cas: Cas,
}

impl ChainStore {
    pub fn source_chain(&self) -> &[ActionHash] {
        &self.source_chain
    }

    pub fn cas(&self) -> &Cas {
        &self.cas
    }

    pub(crate) fn cas_mut(&mut self) -> &mut Cas {
        &mut self.cas
    }

    pub fn chain_len(&self) -> usize {
        self.source_chain.len()
    }

    pub fn chain_head(&self) -> Option<&ActionHash> {
        self.source_chain.last()
    }

    /// Full record for an action in the CAS, entry included when stored.
    pub fn get_record(&self, action_hash: &ActionHash) -> Option<Record> {
        let signed = self.cas.get_action(action_hash)?;
        let entry = signed
            .action
            .entry_data()
            .and_then(|(entry_hash, _)| self.cas.get_entry(entry_hash))
            .cloned();
        Some(Record::new(signed.clone(), entry))
    }

    /// Records of the source chain, in chain order.
    pub fn records(&self) -> Vec<Record> {
        self.source_chain
            .iter()
            .filter_map(|hash| self.get_record(hash))
            .collect()
    }

    /// True if every action links to its predecessor.
    pub fn is_well_linked(&self) -> bool {
        let mut prev: Option<&ActionHash> = None;
        for (seq, hash) in self.source_chain.iter().enumerate() {
            let Some(signed) = self.cas.get_action(hash) else {
                return false;
            };
            if signed.action.action_seq as usize != seq || signed.action.prev_action.as_ref() != prev
            {
                return false;
            }
            prev = Some(hash);
        }
        true
    }
}

// ============================================================================
// WORKING CHAIN
// ============================================================================

/// Isolated, appendable copy of a committed chain.
#[derive(Debug, Clone)]
pub struct WorkingChain {
    author: AgentPubKey,
    base_len: usize,
    base_head: Option<ActionHash>,
    store: ChainStore,
}

impl WorkingChain {
    pub fn fork(committed: &Arc<ChainStore>, author: AgentPubKey) -> Self {
        Self {
            author,
            base_len: committed.chain_len(),
            base_head: committed.chain_head().copied(),
            store: (**committed).clone(),
        }
    }

    pub fn author(&self) -> &AgentPubKey {
        &self.author
    }

    pub fn store(&self) -> &ChainStore {
        &self.store
    }

    /// Appends a new action at the head, linking it to the current head.
    pub fn append(
        &mut self,
        content: ActionContent,
        entry: Option<Entry>,
        timestamp: Timestamp,
    ) -> Result<ActionHash, CellError> {
        if let Some(entry) = &entry {
            let expected = content_entry_hash(&content);
            let actual = entry.hash()?;
            if expected != Some(actual) {
                return Err(CellError::InvalidRecord(format!(
                    "entry {} does not match the action's entry hash",
                    actual
                )));
            }
            self.store.cas.put_entry(actual, entry.clone());
        }

        let action = Action {
            author: self.author,
            timestamp,
            action_seq: self.store.chain_len() as u32,
            prev_action: self.store.chain_head().copied(),
            content,
        };
        let signed = SignedActionHashed::sign(action)?;
        let hash = signed.hash;
        self.store.cas.put_action(signed);
        self.store.source_chain.push(hash);
        Ok(hash)
    }

    pub fn head_changed(&self) -> bool {
        self.store.chain_head() != self.base_head.as_ref()
    }

    /// Records appended since the fork, in chain order.
    pub fn new_records(&self) -> Vec<Record> {
        self.store.source_chain[self.base_len..]
            .iter()
            .filter_map(|hash| self.store.get_record(hash))
            .collect()
    }

    pub fn commit(self) -> Arc<ChainStore> {
        Arc::new(self.store)
    }
}

fn content_entry_hash(content: &ActionContent) -> Option<EntryHash> {
    match content {
        ActionContent::Create { entry_hash, .. } | ActionContent::Update { entry_hash, .. } => {
            Some(*entry_hash)
        }
        _ => None,
    }
}

// ============================================================================
// OP LEDGERS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthoredOp {
    pub op: DhtOp,
    pub basis: AnyDhtHash,
    pub published: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationLimboStatus {
    Pending,
    /// Validation could not retrieve these hashes on the last attempt
    AwaitingDeps(Vec<AnyDhtHash>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationLimboOp {
    pub op: DhtOp,
    pub basis: AnyDhtHash,
    pub from_agent: Option<AgentPubKey>,
    pub status: ValidationLimboStatus,
    pub num_tries: u32,
    pub time_added: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Valid,
    Rejected(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationLimboOp {
    pub op: DhtOp,
    pub basis: AnyDhtHash,
    pub validation_status: ValidationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegratedOp {
    pub op: DhtOp,
    pub basis: AnyDhtHash,
    pub validation_status: ValidationStatus,
    pub when_integrated: Timestamp,
}

/// Ops this cell authored or holds for its neighborhood.
///
/// An op moves validation limbo → integration limbo → integrated and is
/// never removed once integrated.
#[derive(Debug, Clone, Default)]
pub struct DhtStore {
    pub(crate) authored: BTreeMap<DhtOpHash, AuthoredOp>,
    pub(crate) validation_limbo: BTreeMap<DhtOpHash, ValidationLimboOp>,
    pub(crate) integration_limbo: BTreeMap<DhtOpHash, IntegrationLimboOp>,
    pub(crate) integrated: BTreeMap<DhtOpHash, IntegratedOp>,
    pub(crate) metadata: DhtMetadata,
}

impl DhtStore {
    /// True if the op is already held in any of the holding ledgers.
    pub fn holds_op(&self, hash: &DhtOpHash) -> bool {
        self.validation_limbo.contains_key(hash)
            || self.integration_limbo.contains_key(hash)
            || self.integrated.contains_key(hash)
    }

    pub fn authored(&self) -> &BTreeMap<DhtOpHash, AuthoredOp> {
        &self.authored
    }

    pub fn validation_limbo(&self) -> &BTreeMap<DhtOpHash, ValidationLimboOp> {
        &self.validation_limbo
    }

    pub fn integration_limbo(&self) -> &BTreeMap<DhtOpHash, IntegrationLimboOp> {
        &self.integration_limbo
    }

    pub fn integrated(&self) -> &BTreeMap<DhtOpHash, IntegratedOp> {
        &self.integrated
    }

    pub fn metadata(&self) -> &DhtMetadata {
        &self.metadata
    }
}

/// Everything a cell owns, as two swappable handles.
#[derive(Debug, Clone, Default)]
pub struct CellState {
    pub chain: Arc<ChainStore>,
    pub dht: Arc<DhtStore>,
}

/// Read-only dump of every op ledger, for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhtOpsDump {
    pub authored: Vec<AuthoredOp>,
    pub validation_limbo: Vec<ValidationLimboOp>,
    pub integration_limbo: Vec<IntegrationLimboOp>,
    pub integrated: Vec<IntegratedOp>,
}

impl From<&DhtStore> for DhtOpsDump {
    fn from(store: &DhtStore) -> Self {
        Self {
            authored: store.authored.values().cloned().collect(),
            validation_limbo: store.validation_limbo.values().cloned().collect(),
            integration_limbo: store.integration_limbo.values().cloned().collect(),
            integrated: store.integrated.values().cloned().collect(),
        }
    }
}
