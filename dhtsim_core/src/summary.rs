//! Network-wide summary built from any collection of ops, for display.

use crate::action::SignedActionHashed;
use crate::dht_op::DhtOp;
use crate::entry::Entry;
use crate::metadata::{DhtMetadata, EntryDhtStatus, Link};
use crate::record::RecordEntry;
use crate::state::{DhtOpsDump, ValidationStatus};
use dhtsim_env::{ActionHash, AnyDhtHash, EntryHash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct DhtSummary {
    actions: BTreeMap<ActionHash, SignedActionHashed>,
    entries: BTreeMap<EntryHash, Entry>,
    metadata: DhtMetadata,
}

/// Counts for reports and exports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhtSummaryCounts {
    pub actions: usize,
    pub entries: usize,
    pub deleted_actions: usize,
}

impl DhtSummary {
    pub fn from_ops<'a>(ops: impl IntoIterator<Item = &'a DhtOp>) -> Self {
        let mut summary = Self::default();
        for op in ops {
            summary.add(op);
        }
        summary
    }

    /// Summary over the ops several cells integrated as valid.
    pub fn from_dumps<'a>(dumps: impl IntoIterator<Item = &'a DhtOpsDump>) -> Self {
        Self::from_ops(dumps.into_iter().flat_map(|dump| {
            dump.integrated
                .iter()
                .filter(|i| i.validation_status == ValidationStatus::Valid)
                .map(|i| &i.op)
        }))
    }

    fn add(&mut self, op: &DhtOp) {
        self.actions
            .entry(*op.action_hash())
            .or_insert_with(|| op.signed_action().clone());
        if let (RecordEntry::Present(entry), Some((entry_hash, _))) =
            (op.entry(), op.action().entry_data())
        {
            self.entries.entry(*entry_hash).or_insert_with(|| entry.clone());
        }
        self.metadata.register(op);
    }

    pub fn action(&self, hash: &ActionHash) -> Option<&SignedActionHashed> {
        self.actions.get(hash)
    }

    pub fn entry(&self, hash: &EntryHash) -> Option<&Entry> {
        self.entries.get(hash)
    }

    pub fn actions_by_entry(&self, hash: &EntryHash) -> Vec<ActionHash> {
        self.metadata.actions_for_entry(hash)
    }

    pub fn updates_of(&self, hash: &ActionHash) -> Vec<ActionHash> {
        self.metadata.updates_of_action(hash)
    }

    pub fn deletes_of(&self, hash: &ActionHash) -> Vec<ActionHash> {
        self.metadata.deletes_of(hash)
    }

    pub fn live_links(&self, base: &AnyDhtHash) -> Vec<Link> {
        self.metadata.live_links(base)
    }

    /// Links on `base` with the DeleteLinks that removed them.
    pub fn links(&self, base: &AnyDhtHash) -> Vec<(Link, Vec<ActionHash>)> {
        self.metadata.links_with_removals(base)
    }

    pub fn is_action_deleted(&self, hash: &ActionHash) -> bool {
        self.metadata.is_action_deleted(hash)
    }

    /// True if every known action creating the entry is deleted.
    pub fn is_entry_deleted(&self, hash: &EntryHash) -> bool {
        self.metadata.entry_dht_status(hash) == Some(EntryDhtStatus::Dead)
    }

    pub fn counts(&self) -> DhtSummaryCounts {
        DhtSummaryCounts {
            actions: self.actions.len(),
            entries: self.entries.len(),
            deleted_actions: self
                .actions
                .keys()
                .filter(|hash| self.is_action_deleted(hash))
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionContent};
    use crate::dht_op::produce_ops_from_record;
    use crate::entry::{AppEntryType, EntryType, EntryVisibility};
    use crate::record::Record;
    use dhtsim_env::{HashType, HoloHash, Timestamp};
    use serde_json::json;

    #[test]
    fn test_summary_tracks_deleted_entries() {
        let author = HoloHash::digest(HashType::Agent, b"a");
        let entry = Entry::App(json!({"content": "x"}));
        let entry_hash = entry.hash().unwrap();
        let create = Record::new(
            SignedActionHashed::sign(Action {
                author,
                timestamp: Timestamp::from_micros(1),
                action_seq: 0,
                prev_action: None,
                content: ActionContent::Create {
                    entry_type: EntryType::App(AppEntryType {
                        zome_index: 0,
                        entry_def_id: "post".into(),
                        visibility: EntryVisibility::Public,
                    }),
                    entry_hash,
                },
            })
            .unwrap(),
            Some(entry.clone()),
        );
        let delete = Record::new(
            SignedActionHashed::sign(Action {
                author,
                timestamp: Timestamp::from_micros(2),
                action_seq: 1,
                prev_action: Some(*create.action_hash()),
                content: ActionContent::Delete {
                    deletes_address: *create.action_hash(),
                    deletes_entry_address: entry_hash,
                },
            })
            .unwrap(),
            None,
        );

        let mut ops = produce_ops_from_record(&create).unwrap();
        let summary = DhtSummary::from_ops(&ops);
        assert_eq!(summary.entry(&entry_hash), Some(&entry));
        assert!(!summary.is_entry_deleted(&entry_hash));

        ops.extend(produce_ops_from_record(&delete).unwrap());
        let summary = DhtSummary::from_ops(&ops);
        assert!(summary.is_action_deleted(create.action_hash()));
        assert!(summary.is_entry_deleted(&entry_hash));
        assert_eq!(
            summary.counts(),
            DhtSummaryCounts {
                actions: 2,
                entries: 1,
                deleted_actions: 1
            }
        );
    }
}
