//! Capability grants for zome calls.
//!
//! The author of a chain may always call its own functions. Any other caller
//! needs a live `CapGrant` entry on that chain that covers the function and
//! whose access rule the caller satisfies.

use crate::action::ActionContent;
use crate::entry::{Entry, EntryType};
use crate::state::ChainStore;
use dhtsim_env::{ActionHash, AgentPubKey, CellId, HashType, HoloHash};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Shared secret presented by callers of transferable/assigned grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapSecret(pub [u8; 32]);

impl CapSecret {
    /// Derives a secret from arbitrary seed material.
    pub fn derive(seed: &[u8]) -> Self {
        Self(*HoloHash::digest(HashType::Entry, seed).bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapAccess {
    Unrestricted,
    Transferable {
        secret: CapSecret,
    },
    Assigned {
        secret: CapSecret,
        assignees: BTreeSet<AgentPubKey>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantedFunctions {
    All,
    /// (zome, function) pairs
    Listed(BTreeSet<(String, String)>),
}

impl GrantedFunctions {
    pub fn covers(&self, zome: &str, fn_name: &str) -> bool {
        match self {
            GrantedFunctions::All => true,
            GrantedFunctions::Listed(fns) => fns.contains(&(zome.to_string(), fn_name.to_string())),
        }
    }
}

/// A grant stored as a private entry on the grantor's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZomeCallCapGrant {
    pub tag: String,
    pub access: CapAccess,
    pub functions: GrantedFunctions,
}

impl ZomeCallCapGrant {
    pub fn is_valid(
        &self,
        zome: &str,
        fn_name: &str,
        provenance: &AgentPubKey,
        secret: Option<&CapSecret>,
    ) -> bool {
        if !self.functions.covers(zome, fn_name) {
            return false;
        }
        match &self.access {
            CapAccess::Unrestricted => true,
            CapAccess::Transferable { secret: expected } => secret == Some(expected),
            CapAccess::Assigned {
                secret: expected,
                assignees,
            } => secret == Some(expected) && assignees.contains(provenance),
        }
    }
}

/// A zome call awaiting authorization.
#[derive(Debug, Clone, Copy)]
pub struct GrantRequest<'a> {
    pub cell_id: &'a CellId,
    pub zome: &'a str,
    pub fn_name: &'a str,
    pub provenance: &'a AgentPubKey,
    pub cap_secret: Option<&'a CapSecret>,
}

/// Decides whether a caller may invoke a function on a cell.
pub trait GrantLookup: Send + Sync {
    fn has_valid_grant(&self, chain: &ChainStore, request: &GrantRequest<'_>) -> bool;
}

/// Default lookup: author grant, then live grants on the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainGrantLookup;

impl GrantLookup for ChainGrantLookup {
    fn has_valid_grant(&self, chain: &ChainStore, request: &GrantRequest<'_>) -> bool {
        if request.provenance == &request.cell_id.agent_pub_key {
            return true;
        }

        let actions: Vec<_> = chain
            .source_chain()
            .iter()
            .filter_map(|hash| chain.cas().get_action(hash))
            .collect();

        let deleted: HashSet<ActionHash> = actions
            .iter()
            .filter_map(|signed| match &signed.action.content {
                ActionContent::Delete {
                    deletes_address, ..
                } => Some(*deletes_address),
                _ => None,
            })
            .collect();

        actions.iter().any(|signed| {
            let Some((entry_hash, EntryType::CapGrant)) = signed.action.entry_data() else {
                return false;
            };
            if deleted.contains(&signed.hash) {
                return false;
            }
            match chain.cas().get_entry(entry_hash) {
                Some(Entry::CapGrant(grant)) => grant.is_valid(
                    request.zome,
                    request.fn_name,
                    request.provenance,
                    request.cap_secret,
                ),
                _ => false,
            }
        })
    }
}
