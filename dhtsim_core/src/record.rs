//! Records: the unit exchanged between peers.

use crate::action::{Action, SignedActionHashed};
use crate::entry::Entry;
use dhtsim_env::ActionHash;
use serde::{Deserialize, Serialize};

/// The entry half of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordEntry {
    Present(Entry),
    /// The action has an entry but it is private to the author
    Hidden,
    /// The action carries no entry (links, deletes)
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub signed_action: SignedActionHashed,
    pub entry: RecordEntry,
}

impl Record {
    pub fn new(signed_action: SignedActionHashed, entry: Option<Entry>) -> Self {
        let entry = match entry {
            Some(entry) => RecordEntry::Present(entry),
            None => RecordEntry::NotApplicable,
        };
        Self {
            signed_action,
            entry,
        }
    }

    pub fn action(&self) -> &Action {
        &self.signed_action.action
    }

    pub fn action_hash(&self) -> &ActionHash {
        &self.signed_action.hash
    }

    pub fn entry(&self) -> Option<&Entry> {
        match &self.entry {
            RecordEntry::Present(entry) => Some(entry),
            _ => None,
        }
    }

    /// Copy suitable for sending to other agents: private entries hidden.
    pub fn without_private_entry(&self) -> Self {
        let private = self
            .action()
            .entry_data()
            .map(|(_, entry_type)| !entry_type.is_public())
            .unwrap_or(false);
        if private {
            Self {
                signed_action: self.signed_action.clone(),
                entry: RecordEntry::Hidden,
            }
        } else {
            self.clone()
        }
    }
}
