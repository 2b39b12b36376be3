//! DHT metadata: the queryable index built from integrated ops.

use crate::action::{ActionContent, LinkTag};
use crate::dht_op::{DhtOp, DhtOpType};
use dhtsim_env::{ActionHash, AgentPubKey, AnyDhtHash, EntryHash, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A link as registered at its base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub base: AnyDhtHash,
    pub target: AnyDhtHash,
    pub zome_index: u8,
    pub link_type: String,
    pub tag: LinkTag,
    pub author: AgentPubKey,
    pub timestamp: Timestamp,

    /// Hash of the CreateLink action; identifies the link
    pub create_link_hash: ActionHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryDhtStatus {
    /// At least one action creating the entry is not deleted
    Live,
    Dead,
}

#[derive(Debug, Clone, Default)]
pub struct DhtMetadata {
    /// actions held through a StoreRecord op
    stored_records: BTreeSet<ActionHash>,
    actions_by_entry: BTreeMap<EntryHash, BTreeSet<ActionHash>>,
    /// deleted action → deleting actions
    action_deletes: BTreeMap<ActionHash, BTreeSet<ActionHash>>,
    /// original action → updating actions
    action_updates: BTreeMap<ActionHash, BTreeSet<ActionHash>>,
    /// original entry → updating actions
    entry_updates: BTreeMap<EntryHash, BTreeSet<ActionHash>>,
    links: BTreeMap<AnyDhtHash, BTreeMap<ActionHash, Link>>,
    /// create-link action → delete-link actions
    removed_links: BTreeMap<ActionHash, BTreeSet<ActionHash>>,
    /// author → (seq → action)
    activity: BTreeMap<AgentPubKey, BTreeMap<u32, ActionHash>>,
}

impl DhtMetadata {
    /// Indexes a valid op. Registering the same op twice is a no-op.
    pub fn register(&mut self, op: &DhtOp) {
        let hash = *op.action_hash();
        let action = op.action();
        match (op.op_type(), &action.content) {
            (DhtOpType::StoreEntry, _) => {
                if let Some((entry_hash, _)) = action.entry_data() {
                    self.actions_by_entry
                        .entry(*entry_hash)
                        .or_default()
                        .insert(hash);
                }
            }
            (DhtOpType::StoreRecord, _) => {
                self.stored_records.insert(hash);
            }
            (DhtOpType::RegisterAgentActivity, _) => {
                self.activity
                    .entry(action.author)
                    .or_default()
                    .insert(action.action_seq, hash);
            }
            (
                DhtOpType::RegisterUpdatedContent,
                ActionContent::Update {
                    original_entry_address,
                    ..
                },
            ) => {
                self.entry_updates
                    .entry(*original_entry_address)
                    .or_default()
                    .insert(hash);
            }
            (
                DhtOpType::RegisterUpdatedRecord,
                ActionContent::Update {
                    original_action_address,
                    ..
                },
            ) => {
                self.action_updates
                    .entry(*original_action_address)
                    .or_default()
                    .insert(hash);
            }
            (DhtOpType::RegisterDeletedBy, ActionContent::Delete { deletes_address, .. })
            | (
                DhtOpType::RegisterDeletedEntryAction,
                ActionContent::Delete { deletes_address, .. },
            ) => {
                self.action_deletes
                    .entry(*deletes_address)
                    .or_default()
                    .insert(hash);
            }
            (
                DhtOpType::RegisterAddLink,
                ActionContent::CreateLink {
                    base_address,
                    target_address,
                    zome_index,
                    link_type,
                    tag,
                },
            ) => {
                self.links.entry(*base_address).or_default().insert(
                    hash,
                    Link {
                        base: *base_address,
                        target: *target_address,
                        zome_index: *zome_index,
                        link_type: link_type.clone(),
                        tag: tag.clone(),
                        author: action.author,
                        timestamp: action.timestamp,
                        create_link_hash: hash,
                    },
                );
            }
            (
                DhtOpType::RegisterRemoveLink,
                ActionContent::DeleteLink {
                    link_add_address, ..
                },
            ) => {
                self.removed_links
                    .entry(*link_add_address)
                    .or_default()
                    .insert(hash);
            }
            // Mismatched op/action pairs never pass validation.
            _ => {}
        }
    }

    /// True if this cell is an authority for the record of `action_hash`.
    pub fn holds_record(&self, action_hash: &ActionHash) -> bool {
        self.stored_records.contains(action_hash)
    }

    /// True if this cell is an authority for `entry_hash`.
    pub fn holds_entry(&self, entry_hash: &EntryHash) -> bool {
        self.actions_by_entry
            .get(entry_hash)
            .map(|actions| !actions.is_empty())
            .unwrap_or(false)
    }

    pub fn is_action_deleted(&self, action_hash: &ActionHash) -> bool {
        self.action_deletes
            .get(action_hash)
            .map(|deletes| !deletes.is_empty())
            .unwrap_or(false)
    }

    pub fn deletes_of(&self, action_hash: &ActionHash) -> Vec<ActionHash> {
        set_to_vec(self.action_deletes.get(action_hash))
    }

    pub fn updates_of_action(&self, action_hash: &ActionHash) -> Vec<ActionHash> {
        set_to_vec(self.action_updates.get(action_hash))
    }

    pub fn updates_of_entry(&self, entry_hash: &EntryHash) -> Vec<ActionHash> {
        set_to_vec(self.entry_updates.get(entry_hash))
    }

    pub fn actions_for_entry(&self, entry_hash: &EntryHash) -> Vec<ActionHash> {
        set_to_vec(self.actions_by_entry.get(entry_hash))
    }

    /// `None` if no action creating the entry has been integrated.
    pub fn entry_dht_status(&self, entry_hash: &EntryHash) -> Option<EntryDhtStatus> {
        let actions = self.actions_by_entry.get(entry_hash)?;
        if actions.iter().any(|hash| !self.is_action_deleted(hash)) {
            Some(EntryDhtStatus::Live)
        } else {
            Some(EntryDhtStatus::Dead)
        }
    }

    /// Links on `base` whose CreateLink has not been removed.
    pub fn live_links(&self, base: &AnyDhtHash) -> Vec<Link> {
        self.links
            .get(base)
            .map(|links| {
                links
                    .values()
                    .filter(|link| {
                        self.removed_links
                            .get(&link.create_link_hash)
                            .map(|removes| removes.is_empty())
                            .unwrap_or(true)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every link ever registered on `base` and the removals known for each.
    pub fn links_with_removals(&self, base: &AnyDhtHash) -> Vec<(Link, Vec<ActionHash>)> {
        self.links
            .get(base)
            .map(|links| {
                links
                    .values()
                    .map(|link| {
                        let removes = set_to_vec(self.removed_links.get(&link.create_link_hash));
                        (link.clone(), removes)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// An agent's registered activity, in sequence order.
    pub fn agent_activity(&self, agent: &AgentPubKey) -> Vec<ActionHash> {
        self.activity
            .get(agent)
            .map(|by_seq| by_seq.values().copied().collect())
            .unwrap_or_default()
    }
}

fn set_to_vec(set: Option<&BTreeSet<ActionHash>>) -> Vec<ActionHash> {
    set.map(|s| s.iter().copied().collect()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, SignedActionHashed};
    use crate::dht_op::produce_ops_from_record;
    use crate::entry::{AppEntryType, Entry, EntryType, EntryVisibility};
    use crate::record::Record;
    use dhtsim_env::{HashType, HoloHash};
    use serde_json::json;

    fn record(seq: u32, content: ActionContent, entry: Option<Entry>) -> Record {
        let action = Action {
            author: HoloHash::digest(HashType::Agent, b"alice"),
            timestamp: Timestamp::from_micros(seq as i64),
            action_seq: seq,
            prev_action: None,
            content,
        };
        Record::new(SignedActionHashed::sign(action).unwrap(), entry)
    }

    fn register_all(meta: &mut DhtMetadata, record: &Record) {
        for op in produce_ops_from_record(record).unwrap() {
            meta.register(&op);
            meta.register(&op);
        }
    }

    #[test]
    fn test_delete_marks_entry_dead() {
        let entry = Entry::App(json!({"content": "hi"}));
        let entry_hash = entry.hash().unwrap();
        let create = record(
            0,
            ActionContent::Create {
                entry_type: EntryType::App(AppEntryType {
                    zome_index: 0,
                    entry_def_id: "post".into(),
                    visibility: EntryVisibility::Public,
                }),
                entry_hash,
            },
            Some(entry),
        );
        let mut meta = DhtMetadata::default();
        register_all(&mut meta, &create);
        assert_eq!(meta.entry_dht_status(&entry_hash), Some(EntryDhtStatus::Live));

        let delete = record(
            1,
            ActionContent::Delete {
                deletes_address: *create.action_hash(),
                deletes_entry_address: entry_hash,
            },
            None,
        );
        register_all(&mut meta, &delete);

        assert!(meta.is_action_deleted(create.action_hash()));
        assert_eq!(meta.deletes_of(create.action_hash()).len(), 1);
        assert_eq!(meta.entry_dht_status(&entry_hash), Some(EntryDhtStatus::Dead));
        assert_eq!(meta.agent_activity(&create.action().author).len(), 2);
    }

    #[test]
    fn test_delete_link_hides_link() {
        let base = HoloHash::digest(HashType::Entry, b"base");
        let create_link = record(
            0,
            ActionContent::CreateLink {
                base_address: base,
                target_address: HoloHash::digest(HashType::Entry, b"target"),
                zome_index: 0,
                link_type: "follows".into(),
                tag: LinkTag::from("t"),
            },
            None,
        );
        let mut meta = DhtMetadata::default();
        register_all(&mut meta, &create_link);
        assert_eq!(meta.live_links(&base).len(), 1);

        let delete_link = record(
            1,
            ActionContent::DeleteLink {
                base_address: base,
                link_add_address: *create_link.action_hash(),
            },
            None,
        );
        register_all(&mut meta, &delete_link);
        assert!(meta.live_links(&base).is_empty());
        assert_eq!(meta.links_with_removals(&base)[0].1.len(), 1);
    }

    #[test]
    fn test_authority_follows_op_type() {
        let entry = Entry::App(json!({"content": "hi"}));
        let entry_hash = entry.hash().unwrap();
        let create = record(
            0,
            ActionContent::Create {
                entry_type: EntryType::App(AppEntryType {
                    zome_index: 0,
                    entry_def_id: "post".into(),
                    visibility: EntryVisibility::Public,
                }),
                entry_hash,
            },
            Some(entry),
        );
        let ops = produce_ops_from_record(&create).unwrap();
        let only = |op_type: DhtOpType| {
            let mut meta = DhtMetadata::default();
            for op in ops.iter().filter(|op| op.op_type() == op_type) {
                meta.register(op);
            }
            meta
        };

        let activity = only(DhtOpType::RegisterAgentActivity);
        assert!(!activity.holds_record(create.action_hash()));
        assert!(!activity.holds_entry(&entry_hash));

        let store_record = only(DhtOpType::StoreRecord);
        assert!(store_record.holds_record(create.action_hash()));
        assert!(!store_record.holds_entry(&entry_hash));

        let store_entry = only(DhtOpType::StoreEntry);
        assert!(!store_entry.holds_record(create.action_hash()));
        assert!(store_entry.holds_entry(&entry_hash));
    }
}
