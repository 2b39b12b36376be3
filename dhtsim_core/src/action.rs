//! Actions: immutable records of state changes on an agent's chain.

use crate::entry::EntryType;
use crate::hashing::hash_of;
use dhtsim_env::{ActionHash, AgentPubKey, AnyDhtHash, EntryHash, HashType, HoloHash, Timestamp};
use serde::{Deserialize, Serialize};

/// Opaque bytes attached to a link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkTag(pub Vec<u8>);

impl LinkTag {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }
}

impl From<&str> for LinkTag {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    Create,
    Update,
    Delete,
    CreateLink,
    DeleteLink,
}

/// Variant-specific part of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActionContent {
    Create {
        entry_type: EntryType,
        entry_hash: EntryHash,
    },
    Update {
        original_action_address: ActionHash,
        original_entry_address: EntryHash,
        entry_type: EntryType,
        entry_hash: EntryHash,
    },
    Delete {
        deletes_address: ActionHash,
        deletes_entry_address: EntryHash,
    },
    CreateLink {
        base_address: AnyDhtHash,
        target_address: AnyDhtHash,
        zome_index: u8,
        link_type: String,
        tag: LinkTag,
    },
    DeleteLink {
        base_address: AnyDhtHash,
        link_add_address: ActionHash,
    },
}

/// An action as authored on a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub author: AgentPubKey,
    pub timestamp: Timestamp,

    /// Position on the author's chain, starting at 0
    pub action_seq: u32,

    /// Hash of the action at `action_seq - 1`; `None` only at the chain origin
    pub prev_action: Option<ActionHash>,

    pub content: ActionContent,
}

impl Action {
    pub fn action_type(&self) -> ActionType {
        match self.content {
            ActionContent::Create { .. } => ActionType::Create,
            ActionContent::Update { .. } => ActionType::Update,
            ActionContent::Delete { .. } => ActionType::Delete,
            ActionContent::CreateLink { .. } => ActionType::CreateLink,
            ActionContent::DeleteLink { .. } => ActionType::DeleteLink,
        }
    }

    /// Entry hash and type for actions that carry an entry.
    pub fn entry_data(&self) -> Option<(&EntryHash, &EntryType)> {
        match &self.content {
            ActionContent::Create {
                entry_hash,
                entry_type,
            }
            | ActionContent::Update {
                entry_hash,
                entry_type,
                ..
            } => Some((entry_hash, entry_type)),
            _ => None,
        }
    }

    pub fn hash(&self) -> Result<ActionHash, serde_json::Error> {
        hash_of(HashType::Action, self)
    }
}

/// Stub signature: structurally present and bound to (author, action hash),
/// but not cryptographic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    pub const LEN: usize = 64;

    pub fn stub(author: &AgentPubKey, action_hash: &ActionHash) -> Self {
        let mut bytes = Vec::with_capacity(Self::LEN);
        let mut seed = Vec::with_capacity(64);
        seed.extend_from_slice(author.bytes());
        seed.extend_from_slice(action_hash.bytes());
        let first = HoloHash::digest(HashType::Agent, &seed);
        let second = HoloHash::digest(HashType::Agent, first.bytes());
        bytes.extend_from_slice(first.bytes());
        bytes.extend_from_slice(second.bytes());
        Self(bytes)
    }
}

/// An action together with its hash and signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedActionHashed {
    pub action: Action,
    pub hash: ActionHash,
    pub signature: Signature,
}

impl SignedActionHashed {
    /// Hashes and signs an action.
    pub fn sign(action: Action) -> Result<Self, serde_json::Error> {
        let hash = action.hash()?;
        let signature = Signature::stub(&action.author, &hash);
        Ok(Self {
            action,
            hash,
            signature,
        })
    }

    pub fn author(&self) -> &AgentPubKey {
        &self.action.author
    }

    /// True if the stored hash is the hash of the stored action.
    pub fn hash_matches(&self) -> Result<bool, serde_json::Error> {
        Ok(self.action.hash()? == self.hash)
    }

    /// True if the signature is present and bound to author and hash.
    pub fn signature_matches(&self) -> bool {
        self.signature.0.len() == Signature::LEN
            && self.signature == Signature::stub(&self.action.author, &self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{AppEntryType, EntryVisibility};

    fn sample_action(seq: u32, prev: Option<ActionHash>) -> Action {
        Action {
            author: HoloHash::digest(HashType::Agent, b"alice"),
            timestamp: Timestamp::from_micros(10),
            action_seq: seq,
            prev_action: prev,
            content: ActionContent::Create {
                entry_type: EntryType::App(AppEntryType {
                    zome_index: 0,
                    entry_def_id: "post".into(),
                    visibility: EntryVisibility::Public,
                }),
                entry_hash: HoloHash::digest(HashType::Entry, b"hi"),
            },
        }
    }

    #[test]
    fn test_signed_action_verifies() {
        let signed = SignedActionHashed::sign(sample_action(0, None)).unwrap();
        assert!(signed.hash_matches().unwrap());
        assert!(signed.signature_matches());
    }

    #[test]
    fn test_tampered_action_fails_hash_check() {
        let mut signed = SignedActionHashed::sign(sample_action(0, None)).unwrap();
        signed.action.action_seq = 5;
        assert!(!signed.hash_matches().unwrap());
    }

    #[test]
    fn test_json_round_trip_keeps_hash() {
        let first = SignedActionHashed::sign(sample_action(0, None)).unwrap();
        let second = SignedActionHashed::sign(sample_action(1, Some(first.hash))).unwrap();
        let json = serde_json::to_string(&second).unwrap();
        let back: SignedActionHashed = serde_json::from_str(&json).unwrap();
        assert_eq!(back.action.prev_action, Some(first.hash));
        assert!(back.hash_matches().unwrap());
    }
}
