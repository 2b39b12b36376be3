//! Cascade: resolves hashes locally first, then from neighbors.
//!
//! # Strategies
//!
//! - **Contents**: local answer if any, otherwise the first neighbor that
//!   answers. Neighbor queries run concurrently.
//! - **Latest**: local answer merged with every queried neighbor's answer.
//!
//! "Not found" means every reachable source was asked. Nothing here retries.

use crate::action::SignedActionHashed;
use crate::entry::Entry;
use crate::metadata::{EntryDhtStatus, Link};
use crate::network::{
    CellPeer, Details, EntryDetails, GetOptions, GetStrategy, LinkDetails, NetworkHandle,
    RecordDetails,
};
use crate::record::Record;
use crate::state::{ChainStore, DhtStore};
use dhtsim_env::{AnyDhtHash, HashType};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// What this cell itself can say about `hash`.
///
/// Only answers for its own chain and for what its integrated StoreRecord
/// or StoreEntry ops make it an authority of.
///
/// With `reveal_private` unset, private entries are withheld, which is how
/// a cell answers other agents.
pub fn authority_get(
    chain: &ChainStore,
    dht: Option<&DhtStore>,
    hash: &AnyDhtHash,
    reveal_private: bool,
) -> Option<Details> {
    let metadata = dht.map(|d| d.metadata());
    match hash.hash_type() {
        HashType::Action => {
            let authored = chain.source_chain().contains(hash);
            if !authored && !metadata.map(|m| m.holds_record(hash)).unwrap_or(false) {
                return None;
            }
            let record = chain.get_record(hash)?;
            let record = if reveal_private {
                record
            } else {
                record.without_private_entry()
            };
            Some(Details::Record(RecordDetails {
                record,
                deletes: metadata.map(|m| m.deletes_of(hash)).unwrap_or_default(),
                updates: metadata.map(|m| m.updates_of_action(hash)).unwrap_or_default(),
            }))
        }
        HashType::Entry => {
            let entry = chain.cas().get_entry(hash)?.clone();

            let mut actions: Vec<_> = metadata
                .map(|m| m.actions_for_entry(hash))
                .unwrap_or_default();
            for action_hash in chain.source_chain() {
                let creates_entry = chain
                    .cas()
                    .get_action(action_hash)
                    .and_then(|signed| signed.action.entry_data())
                    .map(|(entry_hash, _)| entry_hash == hash)
                    .unwrap_or(false);
                if creates_entry && !actions.contains(action_hash) {
                    actions.push(*action_hash);
                }
            }

            // Holding the content through another op type is not authority.
            if actions.is_empty() {
                return None;
            }

            if !reveal_private {
                let private = actions.iter().any(|a| {
                    chain
                        .cas()
                        .get_action(a)
                        .and_then(|s| s.action.entry_data().map(|(_, t)| !t.is_public()))
                        .unwrap_or(false)
                });
                if private {
                    return None;
                }
            }

            let deletes: Vec<_> = actions
                .iter()
                .flat_map(|a| metadata.map(|m| m.deletes_of(a)).unwrap_or_default())
                .collect();
            let entry_dht_status = metadata
                .and_then(|m| m.entry_dht_status(hash))
                .unwrap_or(EntryDhtStatus::Live);
            Some(Details::Entry(EntryDetails {
                entry,
                actions,
                deletes,
                updates: metadata.map(|m| m.updates_of_entry(hash)).unwrap_or_default(),
                entry_dht_status,
            }))
        }
        // Agent keys are their own agent entry.
        HashType::Agent => Some(Details::Entry(EntryDetails {
            entry: Entry::Agent(*hash),
            actions: Vec::new(),
            deletes: Vec::new(),
            updates: Vec::new(),
            entry_dht_status: EntryDhtStatus::Live,
        })),
        HashType::Dna | HashType::DhtOp => None,
    }
}

/// Links this cell holds on `base`, with their known removals.
pub fn authority_get_links(dht: &DhtStore, base: &AnyDhtHash) -> Vec<LinkDetails> {
    dht.metadata()
        .links_with_removals(base)
        .into_iter()
        .map(|(link, removes)| LinkDetails { link, removes })
        .collect()
}

/// Retrieval over one cell's state plus the network.
pub struct Cascade<'a> {
    chain: &'a ChainStore,
    dht: Option<&'a DhtStore>,
    network: &'a NetworkHandle,
}

impl<'a> Cascade<'a> {
    pub fn new(chain: &'a ChainStore, dht: Option<&'a DhtStore>, network: &'a NetworkHandle) -> Self {
        Self {
            chain,
            dht,
            network,
        }
    }

    /// Details for any hash under the given strategy.
    pub async fn retrieve(&self, hash: &AnyDhtHash, options: &GetOptions) -> Option<Details> {
        let local = authority_get(self.chain, self.dht, hash, true);
        match options.strategy {
            GetStrategy::Contents => match local {
                Some(details) => Some(details),
                None => self.first_from_neighbors(hash, options).await,
            },
            GetStrategy::Latest => {
                let mut merged = local;
                for details in self.all_from_neighbors(hash, options).await {
                    merged = Some(match merged {
                        Some(current) => current.merge(details),
                        None => details,
                    });
                }
                merged
            }
        }
    }

    pub async fn retrieve_record(
        &self,
        action_hash: &AnyDhtHash,
        options: &GetOptions,
    ) -> Option<Record> {
        if action_hash.hash_type() != HashType::Action {
            return None;
        }
        match self.retrieve(action_hash, options).await? {
            Details::Record(details) => Some(details.record),
            Details::Entry(_) => None,
        }
    }

    pub async fn retrieve_action(
        &self,
        action_hash: &AnyDhtHash,
        options: &GetOptions,
    ) -> Option<SignedActionHashed> {
        self.retrieve_record(action_hash, options)
            .await
            .map(|record| record.signed_action)
    }

    /// Entry content for an agent, entry or action hash.
    ///
    /// For an action hash this is the entry the action created.
    pub async fn retrieve_entry(&self, hash: &AnyDhtHash, options: &GetOptions) -> Option<Entry> {
        match hash.hash_type() {
            HashType::Agent => Some(Entry::Agent(*hash)),
            HashType::Entry => self.retrieve(hash, options).await?.entry().cloned(),
            HashType::Action => self.retrieve_record(hash, options).await?.entry().cloned(),
            HashType::Dna | HashType::DhtOp => None,
        }
    }

    /// Live links on `base`, merged from this cell and its neighbors.
    pub async fn get_links(&self, base: &AnyDhtHash) -> Vec<Link> {
        let mut all: BTreeMap<_, LinkDetails> = BTreeMap::new();
        let mut absorb = |details: Vec<LinkDetails>| {
            for d in details {
                let hash = d.link.create_link_hash;
                match all.get_mut(&hash) {
                    Some(existing) => {
                        for remove in d.removes {
                            if !existing.removes.contains(&remove) {
                                existing.removes.push(remove);
                            }
                        }
                    }
                    None => {
                        all.insert(hash, d);
                    }
                }
            }
        };

        if let Some(dht) = self.dht {
            absorb(authority_get_links(dht, base));
        }
        let peers = self.network.get_targets(base);
        let mut queries: FuturesUnordered<_> = peers
            .iter()
            .map(|peer| peer.handle_get_links(*base))
            .collect();
        while let Some(details) = queries.next().await {
            absorb(details);
        }

        let mut links: Vec<Link> = all
            .into_values()
            .filter(|d| d.removes.is_empty())
            .map(|d| d.link)
            .collect();
        links.sort_by_key(|link| (link.timestamp, link.create_link_hash));
        links
    }

    async fn first_from_neighbors(&self, hash: &AnyDhtHash, options: &GetOptions) -> Option<Details> {
        let peers = self.network.get_targets(hash);
        debug!("Asking {} neighbors for {}", peers.len(), hash);
        let mut queries = Self::query(&peers, hash, options);
        while let Some(answer) = queries.next().await {
            if answer.is_some() {
                return answer;
            }
        }
        None
    }

    async fn all_from_neighbors(&self, hash: &AnyDhtHash, options: &GetOptions) -> Vec<Details> {
        let peers = self.network.get_targets(hash);
        let queries = Self::query(&peers, hash, options);
        queries.filter_map(|answer| async move { answer }).collect().await
    }

    fn query<'p>(
        peers: &'p [Arc<dyn CellPeer>],
        hash: &AnyDhtHash,
        options: &GetOptions,
    ) -> FuturesUnordered<futures::future::BoxFuture<'p, Option<Details>>> {
        peers
            .iter()
            .map(|peer| peer.handle_get(*hash, *options))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionContent;
    use crate::bootstrap::BootstrapService;
    use crate::dht_op::DhtOp;
    use crate::entry::{AppEntryType, EntryType, EntryVisibility};
    use crate::network::NetworkConfig;
    use crate::state::WorkingChain;
    use async_trait::async_trait;
    use dhtsim_env::{AgentPubKey, CellId, DnaHash, HoloHash, Timestamp};
    use serde_json::json;

    /// A neighbor answering from a fixed chain.
    struct ChainPeer {
        cell_id: CellId,
        chain: ChainStore,
    }

    #[async_trait]
    impl CellPeer for ChainPeer {
        fn cell_id(&self) -> CellId {
            self.cell_id
        }

        async fn handle_get(&self, hash: AnyDhtHash, _options: GetOptions) -> Option<Details> {
            authority_get(&self.chain, None, &hash, false)
        }

        async fn handle_get_links(&self, _base: AnyDhtHash) -> Vec<LinkDetails> {
            Vec::new()
        }

        async fn handle_publish(&self, _from: AgentPubKey, _ops: Vec<DhtOp>) {}
    }

    fn dna() -> DnaHash {
        HoloHash::digest(HashType::Dna, b"dna")
    }

    fn agent(name: &[u8]) -> AgentPubKey {
        HoloHash::digest(HashType::Agent, name)
    }

    fn chain_with(author: AgentPubKey, content: &str, visibility: EntryVisibility) -> (ChainStore, AnyDhtHash) {
        let committed = Arc::new(ChainStore::default());
        let mut working = WorkingChain::fork(&committed, author);
        let entry = Entry::App(json!({ "content": content }));
        let entry_hash = entry.hash().unwrap();
        working
            .append(
                ActionContent::Create {
                    entry_type: EntryType::App(AppEntryType {
                        zome_index: 0,
                        entry_def_id: "post".into(),
                        visibility,
                    }),
                    entry_hash,
                },
                Some(entry),
                Timestamp::from_micros(1),
            )
            .unwrap();
        let chain = (*working.commit()).clone();
        (chain, entry_hash)
    }

    fn network_with_peer(peer_chain: ChainStore) -> NetworkHandle {
        let bootstrap = BootstrapService::shared();
        bootstrap.announce(Arc::new(ChainPeer {
            cell_id: CellId::new(dna(), agent(b"bob")),
            chain: peer_chain,
        }));
        NetworkHandle::new(
            CellId::new(dna(), agent(b"alice")),
            bootstrap,
            NetworkConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_contents_falls_back_to_neighbor() {
        let (bob_chain, entry_hash) = chain_with(agent(b"bob"), "hi", EntryVisibility::Public);
        let network = network_with_peer(bob_chain);
        let local = ChainStore::default();
        let cascade = Cascade::new(&local, None, &network);

        let entry = cascade
            .retrieve_entry(&entry_hash, &GetOptions::contents())
            .await;
        assert_eq!(entry, Some(Entry::App(json!({ "content": "hi" }))));
    }

    #[tokio::test]
    async fn test_private_entry_not_served_to_others() {
        let (bob_chain, entry_hash) = chain_with(agent(b"bob"), "secret", EntryVisibility::Private);
        let action_hash = *bob_chain.chain_head().unwrap();
        let network = network_with_peer(bob_chain);
        let local = ChainStore::default();
        let cascade = Cascade::new(&local, None, &network);

        assert!(cascade
            .retrieve_entry(&entry_hash, &GetOptions::contents())
            .await
            .is_none());
        let record = cascade
            .retrieve_record(&action_hash, &GetOptions::contents())
            .await
            .unwrap();
        assert!(record.entry().is_none());
    }

    #[tokio::test]
    async fn test_not_found_after_all_sources() {
        let network = network_with_peer(ChainStore::default());
        let local = ChainStore::default();
        let cascade = Cascade::new(&local, None, &network);
        let missing = HoloHash::digest(HashType::Action, b"missing");

        assert!(cascade
            .retrieve(&missing, &GetOptions::latest())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_agent_hash_resolves_to_agent_entry() {
        let network = network_with_peer(ChainStore::default());
        let local = ChainStore::default();
        let cascade = Cascade::new(&local, None, &network);

        let entry = cascade
            .retrieve_entry(&agent(b"carol"), &GetOptions::contents())
            .await;
        assert_eq!(entry, Some(Entry::Agent(agent(b"carol"))));
    }

    #[tokio::test]
    async fn test_activity_holder_defers_to_record_authority() {
        let (bob_chain, entry_hash) = chain_with(agent(b"bob"), "hi", EntryVisibility::Public);
        let action_hash = *bob_chain.chain_head().unwrap();
        let record = bob_chain.get_record(&action_hash).unwrap();
        let ops = crate::dht_op::produce_ops_from_record(&record).unwrap();

        // Alice integrated only the activity op but still has the action in her CAS.
        let mut local = ChainStore::default();
        local.cas_mut().put_action(record.signed_action.clone());
        local
            .cas_mut()
            .put_entry(entry_hash, record.entry().cloned().unwrap());
        let mut dht = DhtStore::default();
        for op in ops
            .iter()
            .filter(|op| op.op_type() == crate::dht_op::DhtOpType::RegisterAgentActivity)
        {
            dht.metadata.register(op);
        }

        assert!(authority_get(&local, Some(&dht), &action_hash, true).is_none());
        assert!(authority_get(&local, Some(&dht), &entry_hash, true).is_none());

        let network = network_with_peer(bob_chain);
        let cascade = Cascade::new(&local, Some(&dht), &network);
        let fetched = cascade
            .retrieve_record(&action_hash, &GetOptions::contents())
            .await
            .unwrap();
        assert_eq!(fetched.entry(), record.entry());
        let details = cascade
            .retrieve(&entry_hash, &GetOptions::contents())
            .await
            .unwrap();
        match details {
            Details::Entry(entry_details) => assert_eq!(entry_details.actions, vec![action_hash]),
            Details::Record(_) => panic!("expected entry details"),
        }
    }
}
