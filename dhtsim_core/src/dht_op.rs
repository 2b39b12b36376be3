//! DHT operations: the replicated facts derived from each action.
//!
//! Every op has a **basis**, the hash whose neighborhood is responsible for
//! holding it. Deriving ops is a pure function of the record, so authoring
//! the same action twice always yields the same op hashes.

use crate::action::{Action, ActionContent, SignedActionHashed};
use crate::error::CellError;
use crate::hashing::hash_of;
use crate::record::{Record, RecordEntry};
use dhtsim_env::{ActionHash, AnyDhtHash, DhtOpHash, HashType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DhtOpType {
    StoreRecord,
    StoreEntry,
    RegisterAgentActivity,
    RegisterUpdatedContent,
    RegisterUpdatedRecord,
    RegisterDeletedBy,
    RegisterDeletedEntryAction,
    RegisterAddLink,
    RegisterRemoveLink,
}

/// A single replicated operation.
///
/// Ops are built only by [`produce_ops_from_record`]; ops received from peers
/// are checked with [`DhtOp::basis`] before they are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhtOp {
    op_type: DhtOpType,
    signed_action: SignedActionHashed,
    entry: RecordEntry,
}

impl DhtOp {
    pub fn op_type(&self) -> DhtOpType {
        self.op_type
    }

    pub fn signed_action(&self) -> &SignedActionHashed {
        &self.signed_action
    }

    pub fn action(&self) -> &Action {
        &self.signed_action.action
    }

    pub fn action_hash(&self) -> &ActionHash {
        &self.signed_action.hash
    }

    pub fn entry(&self) -> &RecordEntry {
        &self.entry
    }

    /// Identity of the op: its type plus the action it was derived from.
    pub fn hash(&self) -> Result<DhtOpHash, serde_json::Error> {
        hash_of(HashType::DhtOp, &(self.op_type, self.signed_action.hash))
    }

    /// The hash whose neighborhood holds this op.
    ///
    /// `None` when the op type does not fit the action variant, which only
    /// happens for malformed ops received from a peer.
    pub fn basis(&self) -> Option<AnyDhtHash> {
        let action = self.action();
        match (self.op_type, &action.content) {
            (DhtOpType::StoreRecord, _) => Some(self.signed_action.hash),
            (DhtOpType::RegisterAgentActivity, _) => Some(action.author),
            (DhtOpType::StoreEntry, ActionContent::Create { entry_hash, .. })
            | (DhtOpType::StoreEntry, ActionContent::Update { entry_hash, .. }) => Some(*entry_hash),
            (
                DhtOpType::RegisterUpdatedContent,
                ActionContent::Update {
                    original_entry_address,
                    ..
                },
            ) => Some(*original_entry_address),
            (
                DhtOpType::RegisterUpdatedRecord,
                ActionContent::Update {
                    original_action_address,
                    ..
                },
            ) => Some(*original_action_address),
            (DhtOpType::RegisterDeletedBy, ActionContent::Delete { deletes_address, .. })
            | (
                DhtOpType::RegisterDeletedEntryAction,
                ActionContent::Delete { deletes_address, .. },
            ) => Some(*deletes_address),
            (DhtOpType::RegisterAddLink, ActionContent::CreateLink { base_address, .. })
            | (DhtOpType::RegisterRemoveLink, ActionContent::DeleteLink { base_address, .. }) => {
                Some(*base_address)
            }
            _ => None,
        }
    }

    /// The record this op carries, for validation.
    pub fn to_record(&self) -> Record {
        Record {
            signed_action: self.signed_action.clone(),
            entry: self.entry.clone(),
        }
    }
}

fn op(op_type: DhtOpType, record: &Record, entry: RecordEntry) -> DhtOp {
    DhtOp {
        op_type,
        signed_action: record.signed_action.clone(),
        entry,
    }
}

/// Derives the full op set for one record.
pub fn produce_ops_from_record(record: &Record) -> Result<Vec<DhtOp>, CellError> {
    let action = record.action();
    let public_entry = match action.entry_data() {
        Some((_, entry_type)) if entry_type.is_public() => match record.entry() {
            Some(entry) => Some(RecordEntry::Present(entry.clone())),
            None => {
                return Err(CellError::InvalidRecord(format!(
                    "action {} references a public entry that is not present",
                    record.action_hash()
                )))
            }
        },
        _ => None,
    };

    let store_record_entry = match (action.entry_data(), &public_entry) {
        (None, _) => RecordEntry::NotApplicable,
        (Some(_), Some(entry)) => entry.clone(),
        (Some(_), None) => RecordEntry::Hidden,
    };

    let mut ops = vec![
        op(DhtOpType::StoreRecord, record, store_record_entry),
        op(
            DhtOpType::RegisterAgentActivity,
            record,
            RecordEntry::NotApplicable,
        ),
    ];

    match &action.content {
        ActionContent::Create { .. } => {
            if let Some(entry) = public_entry {
                ops.push(op(DhtOpType::StoreEntry, record, entry));
            }
        }
        ActionContent::Update { .. } => {
            if let Some(entry) = public_entry.clone() {
                ops.push(op(DhtOpType::StoreEntry, record, entry));
            }
            ops.push(op(
                DhtOpType::RegisterUpdatedContent,
                record,
                public_entry.unwrap_or(RecordEntry::Hidden),
            ));
            ops.push(op(
                DhtOpType::RegisterUpdatedRecord,
                record,
                RecordEntry::NotApplicable,
            ));
        }
        ActionContent::Delete { .. } => {
            ops.push(op(
                DhtOpType::RegisterDeletedBy,
                record,
                RecordEntry::NotApplicable,
            ));
            ops.push(op(
                DhtOpType::RegisterDeletedEntryAction,
                record,
                RecordEntry::NotApplicable,
            ));
        }
        ActionContent::CreateLink { .. } => {
            ops.push(op(
                DhtOpType::RegisterAddLink,
                record,
                RecordEntry::NotApplicable,
            ));
        }
        ActionContent::DeleteLink { .. } => {
            ops.push(op(
                DhtOpType::RegisterRemoveLink,
                record,
                RecordEntry::NotApplicable,
            ));
        }
    }

    Ok(ops)
}
