//! Host functions: what application code may do during a zome call.
//!
//! Every write goes to the call's working chain. Nothing is visible to the
//! cell, or to anyone else, until the call validates and commits.

use crate::action::{ActionContent, LinkTag};
use crate::cap_grant::ZomeCallCapGrant;
use crate::cascade::Cascade;
use crate::dna::SimulatedDna;
use crate::entry::{Entry, EntryType};
use crate::error::HostFnError;
use crate::metadata::Link;
use crate::network::{Details, GetOptions, NetworkHandle};
use crate::record::Record;
use crate::state::{DhtStore, WorkingChain};
use dhtsim_env::{
    ActionHash, AgentPubKey, AnyDhtHash, CellId, EntryHash, HashType, SimulationContext, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_initial_pubkey: AgentPubKey,
    pub chain_head: Option<(ActionHash, u32)>,
}

/// Execution context handed to a zome function.
pub struct HostFnContext {
    cell_id: CellId,
    zome_index: u8,
    provenance: AgentPubKey,
    chain: WorkingChain,
    dht: Arc<DhtStore>,
    network: NetworkHandle,
    dna: Arc<SimulatedDna>,
    ctx: Arc<dyn SimulationContext>,
}

impl HostFnContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cell_id: CellId,
        zome_index: u8,
        provenance: AgentPubKey,
        chain: WorkingChain,
        dht: Arc<DhtStore>,
        network: NetworkHandle,
        dna: Arc<SimulatedDna>,
        ctx: Arc<dyn SimulationContext>,
    ) -> Self {
        Self {
            cell_id,
            zome_index,
            provenance,
            chain,
            dht,
            network,
            dna,
            ctx,
        }
    }

    /// Ends the call, returning the working chain with everything appended.
    pub fn into_chain(self) -> WorkingChain {
        self.chain
    }

    /// The agent that made the call.
    pub fn provenance(&self) -> &AgentPubKey {
        &self.provenance
    }

    pub fn dna(&self) -> &SimulatedDna {
        &self.dna
    }

    fn cascade(&self) -> Cascade<'_> {
        Cascade::new(self.chain.store(), Some(&*self.dht), &self.network)
    }

    /// Clock reading, never earlier than the chain head.
    fn next_timestamp(&self) -> Result<Timestamp, HostFnError> {
        let now = self.ctx.timestamp()?;
        let head = self
            .chain
            .store()
            .chain_head()
            .and_then(|hash| self.chain.store().cas().get_action(hash))
            .map(|signed| signed.action.timestamp);
        Ok(match head {
            Some(head) if head > now => head,
            _ => now,
        })
    }

    fn append(
        &mut self,
        content: ActionContent,
        entry: Option<Entry>,
    ) -> Result<ActionHash, HostFnError> {
        let timestamp = self.next_timestamp()?;
        self.chain
            .append(content, entry, timestamp)
            .map_err(|e| HostFnError::guest(e.to_string()))
    }

    pub fn agent_info(&self) -> AgentInfo {
        let store = self.chain.store();
        AgentInfo {
            agent_initial_pubkey: self.cell_id.agent_pub_key,
            chain_head: store
                .chain_head()
                .map(|hash| (*hash, store.chain_len() as u32 - 1)),
        }
    }

    pub fn hash_entry(&self, entry: &Entry) -> Result<EntryHash, HostFnError> {
        Ok(entry.hash()?)
    }

    /// Creates an app entry of a type defined by the calling zome.
    pub fn create_entry(
        &mut self,
        entry_def_id: &str,
        content: serde_json::Value,
    ) -> Result<ActionHash, HostFnError> {
        let app_type = self
            .dna
            .app_entry_type(self.zome_index, entry_def_id)
            .ok_or_else(|| HostFnError::EntryDefNotFound(entry_def_id.to_string()))?;
        let entry = Entry::App(content);
        let entry_hash = entry.hash()?;
        self.append(
            ActionContent::Create {
                entry_type: EntryType::App(app_type),
                entry_hash,
            },
            Some(entry),
        )
    }

    /// Replaces the entry of a Create or Update, keeping its entry type.
    pub async fn update_entry(
        &mut self,
        original_action_hash: ActionHash,
        content: serde_json::Value,
    ) -> Result<ActionHash, HostFnError> {
        let original = self
            .cascade()
            .retrieve_action(&original_action_hash, &GetOptions::contents())
            .await
            .ok_or(HostFnError::NotFound(original_action_hash))?;
        let (original_entry_address, entry_type) = original
            .action
            .entry_data()
            .map(|(hash, entry_type)| (*hash, entry_type.clone()))
            .ok_or_else(|| {
                HostFnError::InvalidTarget(format!(
                    "{} is not an action that created an entry",
                    original_action_hash
                ))
            })?;

        let entry = Entry::App(content);
        let entry_hash = entry.hash()?;
        self.append(
            ActionContent::Update {
                original_action_address: original_action_hash,
                original_entry_address,
                entry_type,
                entry_hash,
            },
            Some(entry),
        )
    }

    pub async fn delete_entry(
        &mut self,
        deletes_address: ActionHash,
    ) -> Result<ActionHash, HostFnError> {
        let deleted = self
            .cascade()
            .retrieve_action(&deletes_address, &GetOptions::contents())
            .await
            .ok_or(HostFnError::NotFound(deletes_address))?;
        let deletes_entry_address = deleted
            .action
            .entry_data()
            .map(|(hash, _)| *hash)
            .ok_or_else(|| {
                HostFnError::InvalidTarget(format!(
                    "tried to delete {} which has no entry",
                    deletes_address
                ))
            })?;

        self.append(
            ActionContent::Delete {
                deletes_address,
                deletes_entry_address,
            },
            None,
        )
    }

    pub fn create_link(
        &mut self,
        base_address: AnyDhtHash,
        target_address: AnyDhtHash,
        link_type: &str,
        tag: LinkTag,
    ) -> Result<ActionHash, HostFnError> {
        let defined = self
            .dna
            .zome_by_index(self.zome_index)
            .map(|zome| zome.has_link_type(link_type))
            .unwrap_or(false);
        if !defined {
            return Err(HostFnError::LinkTypeNotFound(link_type.to_string()));
        }
        self.append(
            ActionContent::CreateLink {
                base_address,
                target_address,
                zome_index: self.zome_index,
                link_type: link_type.to_string(),
                tag,
            },
            None,
        )
    }

    pub async fn delete_link(
        &mut self,
        link_add_address: ActionHash,
    ) -> Result<ActionHash, HostFnError> {
        let create_link = self
            .cascade()
            .retrieve_action(&link_add_address, &GetOptions::contents())
            .await
            .ok_or(HostFnError::NotFound(link_add_address))?;
        let base_address = match create_link.action.content {
            ActionContent::CreateLink { base_address, .. } => base_address,
            _ => {
                return Err(HostFnError::InvalidTarget(format!(
                    "{} is not a CreateLink",
                    link_add_address
                )))
            }
        };
        self.append(
            ActionContent::DeleteLink {
                base_address,
                link_add_address,
            },
            None,
        )
    }

    /// Record for an action hash, or for the first action creating an entry hash.
    pub async fn get(
        &self,
        hash: AnyDhtHash,
        options: GetOptions,
    ) -> Result<Option<Record>, HostFnError> {
        let cascade = self.cascade();
        match hash.hash_type() {
            HashType::Action => Ok(cascade.retrieve_record(&hash, &options).await),
            HashType::Entry => {
                let Some(Details::Entry(details)) = cascade.retrieve(&hash, &options).await else {
                    return Ok(None);
                };
                for action_hash in &details.actions {
                    if let Some(record) = cascade.retrieve_record(action_hash, &options).await {
                        return Ok(Some(record));
                    }
                }
                Ok(None)
            }
            other => Err(HostFnError::InvalidTarget(format!(
                "cannot get a {:?} hash",
                other
            ))),
        }
    }

    pub async fn get_details(&self, hash: AnyDhtHash) -> Result<Option<Details>, HostFnError> {
        match hash.hash_type() {
            HashType::Action | HashType::Entry => {
                Ok(self.cascade().retrieve(&hash, &GetOptions::latest()).await)
            }
            other => Err(HostFnError::InvalidTarget(format!(
                "cannot get details of a {:?} hash",
                other
            ))),
        }
    }

    /// Live links on `base`, optionally restricted to one link type.
    pub async fn get_links(
        &self,
        base: AnyDhtHash,
        link_type: Option<&str>,
    ) -> Result<Vec<Link>, HostFnError> {
        let links = self.cascade().get_links(&base).await;
        Ok(links
            .into_iter()
            .filter(|link| link_type.map(|t| link.link_type == t).unwrap_or(true))
            .collect())
    }

    /// Own chain, including records appended during this call.
    pub fn query(&self) -> Vec<Record> {
        self.chain.store().records()
    }

    pub fn create_cap_grant(&mut self, grant: ZomeCallCapGrant) -> Result<ActionHash, HostFnError> {
        let entry = Entry::CapGrant(grant);
        let entry_hash = entry.hash()?;
        self.append(
            ActionContent::Create {
                entry_type: EntryType::CapGrant,
                entry_hash,
            },
            Some(entry),
        )
    }
}

impl std::fmt::Debug for HostFnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFnContext")
            .field("cell_id", &self.cell_id)
            .field("zome_index", &self.zome_index)
            .field("chain_len", &self.chain.store().chain_len())
            .finish()
    }
}
