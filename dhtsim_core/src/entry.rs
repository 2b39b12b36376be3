//! Entries: the opaque application payloads referenced by actions.

use crate::cap_grant::ZomeCallCapGrant;
use crate::hashing::hash_of;
use dhtsim_env::{AgentPubKey, EntryHash, HashType};
use serde::{Deserialize, Serialize};

/// Whether an entry is gossiped to the DHT or stays on the author's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryVisibility {
    Public,
    Private,
}

/// An application-defined entry type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppEntryType {
    /// Index of the zome that defines the type
    pub zome_index: u8,

    /// Entry def id within that zome
    pub entry_def_id: String,

    pub visibility: EntryVisibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    App(AppEntryType),
    AgentPubKey,
    CapGrant,
}

impl EntryType {
    pub fn visibility(&self) -> EntryVisibility {
        match self {
            EntryType::App(app) => app.visibility,
            EntryType::AgentPubKey => EntryVisibility::Public,
            EntryType::CapGrant => EntryVisibility::Private,
        }
    }

    pub fn is_public(&self) -> bool {
        self.visibility() == EntryVisibility::Public
    }

    /// True if `entry` is the kind of content this type describes.
    pub fn matches(&self, entry: &Entry) -> bool {
        matches!(
            (self, entry),
            (EntryType::App(_), Entry::App(_))
                | (EntryType::AgentPubKey, Entry::Agent(_))
                | (EntryType::CapGrant, Entry::CapGrant(_))
        )
    }
}

/// Immutable entry content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry_type", content = "content")]
pub enum Entry {
    App(serde_json::Value),
    Agent(AgentPubKey),
    CapGrant(ZomeCallCapGrant),
}

impl Entry {
    /// Content hash of the entry.
    ///
    /// An agent entry's hash is the agent key itself, retyped.
    pub fn hash(&self) -> Result<EntryHash, serde_json::Error> {
        match self {
            Entry::Agent(agent) => Ok(agent.retype(HashType::Entry)),
            _ => hash_of(HashType::Entry, self),
        }
    }

    /// The application payload, if this is an app entry.
    pub fn as_app(&self) -> Option<&serde_json::Value> {
        match self {
            Entry::App(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dhtsim_env::HoloHash;
    use serde_json::json;

    #[test]
    fn test_agent_entry_hash_is_agent_key() {
        let agent = HoloHash::digest(HashType::Agent, b"alice");
        let hash = Entry::Agent(agent).hash().unwrap();
        assert_eq!(hash.bytes(), agent.bytes());
        assert_eq!(hash.hash_type(), HashType::Entry);
    }

    #[test]
    fn test_entry_type_matches() {
        let app = EntryType::App(AppEntryType {
            zome_index: 0,
            entry_def_id: "post".into(),
            visibility: EntryVisibility::Public,
        });
        assert!(app.matches(&Entry::App(json!("hi"))));
        assert!(!EntryType::CapGrant.matches(&Entry::App(json!("hi"))));
        assert!(!EntryType::CapGrant.is_public());
    }
}
