//! Cell: one agent running one DNA, and the engine that runs its workflows.
//!
//! # Locking
//!
//! ```text
//!   workflow lock (tokio Mutex<CellState>)   held for a whole workflow
//!   view          (RwLock<CellState>)        swapped after each success
//!   pending       (Mutex<VecDeque>)          follow-ups and incoming ops
//! ```
//!
//! Peers only ever read `view` and push onto `pending`, so a cell waiting
//! on a neighbor never blocks that neighbor's own workflows.

use crate::bad_agent::BadAgentConfig;
use crate::bootstrap::BootstrapService;
use crate::cap_grant::{CapSecret, ChainGrantLookup, GrantLookup};
use crate::cascade::{authority_get, authority_get_links};
use crate::dht_op::DhtOp;
use crate::dna::SimulatedDna;
use crate::entry::Entry;
use crate::error::CellError;
use crate::metadata::EntryDhtStatus;
use crate::network::{CellPeer, Details, GetOptions, LinkDetails, NetworkConfig, NetworkHandle};
use crate::record::Record;
use crate::state::{CellState, DhtOpsDump};
use crate::workflows::{CallZomeFnInput, Workflow, Workspace};
use async_trait::async_trait;
use dhtsim_env::{ActionHash, AgentPubKey, AnyDhtHash, CellId, EntryHash, SimulationContext};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

pub struct Cell<Ctx: SimulationContext> {
    cell_id: CellId,
    ctx: Arc<Ctx>,
    dna: Arc<SimulatedDna>,
    network: NetworkHandle,
    bad_agent: BadAgentConfig,
    grants: Arc<dyn GrantLookup>,

    /// Committed state; the lock serializes workflows
    state: tokio::sync::Mutex<CellState>,

    /// Last committed state, readable without the workflow lock
    view: RwLock<CellState>,

    pending: Mutex<VecDeque<Workflow>>,

    /// Follow-up workflows that returned an error
    failed_workflows: AtomicUsize,
}

impl<Ctx: SimulationContext> Cell<Ctx> {
    /// Creates a cell and announces it to the bootstrap service.
    pub fn spawn(
        ctx: Arc<Ctx>,
        dna: Arc<SimulatedDna>,
        agent_pub_key: AgentPubKey,
        bootstrap: Arc<BootstrapService>,
        network_config: NetworkConfig,
        bad_agent: BadAgentConfig,
    ) -> Result<Arc<Self>, CellError> {
        dna.check_zome_count()?;
        let cell_id = CellId::new(dna.dna_hash()?, agent_pub_key);
        let cell = Arc::new(Self {
            cell_id,
            ctx,
            dna,
            network: NetworkHandle::new(cell_id, bootstrap.clone(), network_config),
            bad_agent,
            grants: Arc::new(ChainGrantLookup),
            state: tokio::sync::Mutex::new(CellState::default()),
            view: RwLock::new(CellState::default()),
            pending: Mutex::new(VecDeque::new()),
            failed_workflows: AtomicUsize::new(0),
        });
        bootstrap.announce(cell.clone());
        info!("Cell {} joined", cell_id);
        Ok(cell)
    }

    pub fn cell_id(&self) -> &CellId {
        &self.cell_id
    }

    pub fn agent_pub_key(&self) -> &AgentPubKey {
        &self.cell_id.agent_pub_key
    }

    pub fn bad_agent(&self) -> &BadAgentConfig {
        &self.bad_agent
    }

    /// Runs one workflow to completion against this cell.
    ///
    /// The state is replaced only if the workflow succeeds. Follow-ups are
    /// queued, not run.
    pub async fn execute(&self, workflow: Workflow) -> Result<serde_json::Value, CellError> {
        let name = workflow.name();
        let mut state = self.state.lock().await;

        let mut ws = Workspace {
            cell_id: self.cell_id,
            state: state.clone(),
            dna: self.dna.clone(),
            network: self.network.clone(),
            bad_agent: self.bad_agent.clone(),
            grants: self.grants.clone(),
            ctx: self.ctx.clone(),
        };
        debug!("{}: running {}", self.cell_id, name);
        let output = workflow.run(&mut ws).await?;

        *state = ws.state;
        *self.view.write().unwrap_or_else(PoisonError::into_inner) = state.clone();
        drop(state);

        if !output.triggers.is_empty() {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.extend(output.triggers);
        }
        Ok(output.result)
    }

    /// Calls a zome function on this cell.
    pub async fn call_zome_fn(
        &self,
        zome: &str,
        fn_name: &str,
        payload: serde_json::Value,
        provenance: AgentPubKey,
        cap_secret: Option<CapSecret>,
    ) -> Result<serde_json::Value, CellError> {
        let mut input = CallZomeFnInput::new(zome, fn_name, payload, provenance);
        input.cap_secret = cap_secret;
        self.execute(Workflow::CallZomeFn(input)).await
    }

    pub fn enqueue(&self, workflow: Workflow) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(workflow);
    }

    pub fn has_pending(&self) -> bool {
        !self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Runs queued workflows, including ones they queue, until none are left.
    ///
    /// Errors have no caller to return to; they are logged and counted.
    pub async fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(workflow) = next else {
                return ran;
            };
            let name = workflow.name();
            if let Err(e) = self.execute(workflow).await {
                self.failed_workflows.fetch_add(1, Ordering::Relaxed);
                warn!("{}: {} failed: {}", self.cell_id, name, e);
            }
            ran += 1;
        }
    }

    pub fn failed_workflows(&self) -> usize {
        self.failed_workflows.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> CellState {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ------------------------------------------------------------------
    // Read-only views
    // ------------------------------------------------------------------

    /// Committed source chain, in order.
    pub fn source_chain_records(&self) -> Vec<Record> {
        self.snapshot().chain.records()
    }

    pub fn dht_ops_dump(&self) -> DhtOpsDump {
        DhtOpsDump::from(&*self.snapshot().dht)
    }

    pub fn entry(&self, hash: &EntryHash) -> Option<Entry> {
        self.snapshot().chain.cas().get_entry(hash).cloned()
    }

    /// True once a delete of the action has been integrated here.
    pub fn is_action_deleted(&self, hash: &ActionHash) -> bool {
        self.snapshot().dht.metadata().is_action_deleted(hash)
    }

    /// True once every action this cell knows creating the entry is deleted.
    pub fn is_entry_deleted(&self, hash: &EntryHash) -> bool {
        self.snapshot().dht.metadata().entry_dht_status(hash) == Some(EntryDhtStatus::Dead)
    }

    pub fn state(&self) -> CellState {
        self.snapshot()
    }
}

#[async_trait]
impl<Ctx: SimulationContext> CellPeer for Cell<Ctx> {
    fn cell_id(&self) -> CellId {
        self.cell_id
    }

    async fn handle_get(&self, hash: AnyDhtHash, _options: GetOptions) -> Option<Details> {
        let state = self.snapshot();
        authority_get(&state.chain, Some(&*state.dht), &hash, false)
    }

    async fn handle_get_links(&self, base: AnyDhtHash) -> Vec<LinkDetails> {
        authority_get_links(&self.snapshot().dht, &base)
    }

    async fn handle_publish(&self, from: AgentPubKey, ops: Vec<DhtOp>) {
        self.enqueue(Workflow::IncomingDhtOps { from, ops });
    }
}

impl<Ctx: SimulationContext> std::fmt::Debug for Cell<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("cell_id", &self.cell_id)
            .field("bad_agent", &self.bad_agent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionContent, LinkTag};
    use crate::cap_grant::{CapAccess, GrantedFunctions, ZomeCallCapGrant};
    use crate::dht_op::DhtOpType;
    use crate::dna::{EntryDef, SimulatedZome, ValidateCallbackResult};
    use crate::error::HostFnError;
    use crate::host_fn::HostFnContext;
    use dhtsim_env::{HashType, HoloHash, SystemContext};
    use futures::future::BoxFuture;
    use serde_json::{json, Value};

    fn create(ctx: &mut HostFnContext, payload: Value) -> BoxFuture<'_, Result<Value, HostFnError>> {
        Box::pin(async move {
            let hash = ctx.create_entry("post", payload)?;
            Ok(serde_json::to_value(hash)?)
        })
    }

    fn create_twice(
        ctx: &mut HostFnContext,
        payload: Value,
    ) -> BoxFuture<'_, Result<Value, HostFnError>> {
        Box::pin(async move {
            ctx.create_entry("post", json!({"content": "first"}))?;
            ctx.create_entry("post", payload)?;
            Ok(Value::Null)
        })
    }

    fn read_only(ctx: &mut HostFnContext, _: Value) -> BoxFuture<'_, Result<Value, HostFnError>> {
        Box::pin(async move { Ok(json!(ctx.query().len())) })
    }

    fn delete(ctx: &mut HostFnContext, payload: Value) -> BoxFuture<'_, Result<Value, HostFnError>> {
        Box::pin(async move {
            let target: ActionHash = serde_json::from_value(payload)?;
            Ok(serde_json::to_value(ctx.delete_entry(target).await?)?)
        })
    }

    fn link(ctx: &mut HostFnContext, payload: Value) -> BoxFuture<'_, Result<Value, HostFnError>> {
        Box::pin(async move {
            let target: AnyDhtHash = serde_json::from_value(payload)?;
            let base = *ctx.provenance();
            Ok(serde_json::to_value(ctx.create_link(
                base,
                target,
                "to",
                LinkTag::from("t"),
            )?)?)
        })
    }

    fn grant(ctx: &mut HostFnContext, _: Value) -> BoxFuture<'_, Result<Value, HostFnError>> {
        Box::pin(async move {
            let hash = ctx.create_cap_grant(ZomeCallCapGrant {
                tag: "read".into(),
                access: CapAccess::Unrestricted,
                functions: GrantedFunctions::Listed(
                    [("posts".to_string(), "read_only".to_string())].into_iter().collect(),
                ),
            })?;
            Ok(serde_json::to_value(hash)?)
        })
    }

    fn reject_empty(record: &Record, _: &SimulatedDna) -> ValidateCallbackResult {
        match record.entry().and_then(|e| e.as_app()) {
            Some(value) if value["content"] == "" => {
                ValidateCallbackResult::Invalid("empty content".into())
            }
            _ => ValidateCallbackResult::Valid,
        }
    }

    fn dna() -> Arc<SimulatedDna> {
        Arc::new(
            SimulatedDna::new("cell-test").with_zome(
                SimulatedZome::new("posts")
                    .with_entry_def(EntryDef::public("post"))
                    .with_link_type("to")
                    .with_function("create", create)
                    .with_function("create_twice", create_twice)
                    .with_function("read_only", read_only)
                    .with_function("delete", delete)
                    .with_function("link", link)
                    .with_function("grant", grant)
                    .with_validate(reject_empty),
            ),
        )
    }

    fn agent(i: u64) -> AgentPubKey {
        HoloHash::digest(HashType::Agent, &i.to_le_bytes())
    }

    fn cells(n: u64, bad_agent: BadAgentConfig) -> Vec<Arc<Cell<SystemContext>>> {
        let ctx = SystemContext::shared();
        let bootstrap = BootstrapService::shared();
        let dna = dna();
        (0..n)
            .map(|i| {
                Cell::spawn(
                    ctx.clone(),
                    dna.clone(),
                    agent(i),
                    bootstrap.clone(),
                    NetworkConfig::default().with_redundancy_factor(n as usize),
                    bad_agent.clone(),
                )
                .unwrap()
            })
            .collect()
    }

    async fn settle(cells: &[Arc<Cell<SystemContext>>]) {
        for _ in 0..20 {
            let mut ran = 0;
            for cell in cells {
                ran += cell.run_pending().await;
            }
            if ran == 0 {
                return;
            }
        }
    }

    async fn call(cell: &Cell<SystemContext>, f: &str, payload: Value) -> Result<Value, CellError> {
        cell.call_zome_fn("posts", f, payload, *cell.agent_pub_key(), None)
            .await
    }

    #[tokio::test]
    async fn test_create_hi() {
        let cells = cells(1, BadAgentConfig::default());
        let alice = &cells[0];

        call(alice, "create", json!({"content": "hi"})).await.unwrap();
        let records = alice.source_chain_records();
        assert_eq!(records.len(), 1);

        let entry = Entry::App(json!({"content": "hi"}));
        let entry_hash = entry.hash().unwrap();
        assert_eq!(alice.entry(&entry_hash), Some(entry));

        assert!(alice.has_pending());
        alice.run_pending().await;
        let store_entry: Vec<_> = alice
            .dht_ops_dump()
            .authored
            .into_iter()
            .filter(|a| a.op.op_type() == DhtOpType::StoreEntry)
            .collect();
        assert_eq!(store_entry.len(), 1);
        assert_eq!(store_entry[0].basis, entry_hash);
        assert_eq!(alice.failed_workflows(), 0);
    }

    #[tokio::test]
    async fn test_invalid_record_leaves_state_untouched() {
        let cells = cells(1, BadAgentConfig::default());
        let alice = &cells[0];
        call(alice, "create", json!({"content": "kept"})).await.unwrap();
        let before = alice.state();

        let result = call(alice, "create_twice", json!({"content": ""})).await;
        assert!(matches!(result, Err(CellError::InvalidRecord(_))));

        let after = alice.state();
        assert_eq!(after.chain.chain_len(), before.chain.chain_len());
        assert_eq!(after.chain.cas().len(), before.chain.cas().len());
        assert!(Arc::ptr_eq(&after.chain, &before.chain));
    }

    #[tokio::test]
    async fn test_no_writes_no_effects() {
        let cells = cells(1, BadAgentConfig::default());
        let alice = &cells[0];
        assert_eq!(call(alice, "read_only", Value::Null).await.unwrap(), json!(0));
        assert!(!alice.has_pending());
    }

    #[tokio::test]
    async fn test_unknown_function() {
        let cells = cells(1, BadAgentConfig::default());
        let result = call(&cells[0], "nope", Value::Null).await;
        assert!(matches!(result, Err(CellError::FunctionNotFound { .. })));
        let result = cells[0]
            .call_zome_fn("other", "create", Value::Null, *cells[0].agent_pub_key(), None)
            .await;
        assert!(matches!(result, Err(CellError::ZomeNotFound(_))));
    }

    #[tokio::test]
    async fn test_grants_gate_other_callers() {
        let cells = cells(1, BadAgentConfig::default());
        let alice = &cells[0];
        let bob = agent(99);

        let denied = alice
            .call_zome_fn("posts", "read_only", Value::Null, bob, None)
            .await;
        assert!(matches!(denied, Err(CellError::Unauthorized { .. })));

        call(alice, "grant", Value::Null).await.unwrap();
        let allowed = alice
            .call_zome_fn("posts", "read_only", Value::Null, bob, None)
            .await;
        assert_eq!(allowed.unwrap(), json!(1));

        let still_denied = alice
            .call_zome_fn("posts", "create", json!({"content": "x"}), bob, None)
            .await;
        assert!(matches!(still_denied, Err(CellError::Unauthorized { .. })));
    }

    #[test]
    fn test_spawn_rejects_unaddressable_zomes() {
        let dna = (0..=crate::dna::MAX_ZOMES).fold(SimulatedDna::new("wide"), |dna, i| {
            dna.with_zome(SimulatedZome::new(format!("z{}", i)))
        });
        let result = Cell::spawn(
            SystemContext::shared(),
            Arc::new(dna),
            agent(0),
            BootstrapService::shared(),
            NetworkConfig::default(),
            BadAgentConfig::default(),
        );
        assert!(matches!(result, Err(CellError::InvalidDna(_))));
    }

    #[tokio::test]
    async fn test_peer_delete_reaches_author() {
        let cells = cells(2, BadAgentConfig::default());
        let (alice, bob) = (&cells[0], &cells[1]);

        let create: ActionHash =
            serde_json::from_value(call(alice, "create", json!({"content": "E"})).await.unwrap())
                .unwrap();
        settle(&cells).await;

        call(bob, "delete", serde_json::to_value(create).unwrap())
            .await
            .unwrap();
        settle(&cells).await;

        let deleted_entry_action = bob
            .dht_ops_dump()
            .authored
            .into_iter()
            .find(|a| a.op.op_type() == DhtOpType::RegisterDeletedEntryAction)
            .unwrap();
        assert_eq!(deleted_entry_action.basis, create);
        assert!(alice.is_action_deleted(&create));

        let entry_hash = alice
            .source_chain_records()
            .iter()
            .find(|r| r.action_hash() == &create)
            .and_then(|r| r.action().entry_data().map(|(hash, _)| *hash))
            .unwrap();
        assert!(alice.is_entry_deleted(&entry_hash));
        assert_eq!(alice.failed_workflows() + bob.failed_workflows(), 0);
    }

    #[tokio::test]
    async fn test_link_to_missing_target_is_dependency_missing() {
        let cells = cells(2, BadAgentConfig::default());
        let alice = &cells[0];
        let nowhere = HoloHash::digest(HashType::Entry, b"nowhere");

        let result = call(alice, "link", serde_json::to_value(nowhere).unwrap()).await;
        match result {
            Err(e @ CellError::DependencyMissing(_)) => assert!(e.is_retryable()),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(alice.source_chain_records().len(), 0);
    }

    #[tokio::test]
    async fn test_link_to_agent_commits() {
        let cells = cells(2, BadAgentConfig::default());
        let alice = &cells[0];
        let bob_key = *cells[1].agent_pub_key();

        call(alice, "link", serde_json::to_value(bob_key).unwrap())
            .await
            .unwrap();
        let head = alice.source_chain_records().pop().unwrap();
        assert!(matches!(head.action().content, ActionContent::CreateLink { .. }));
    }

    #[tokio::test]
    async fn test_bad_agent_skips_app_validation_but_peers_reject() {
        let honest = cells(1, BadAgentConfig::default());
        assert!(call(&honest[0], "create", json!({"content": ""})).await.is_err());

        let ctx = SystemContext::shared();
        let bootstrap = BootstrapService::shared();
        let dna = dna();
        let config = NetworkConfig::default().with_redundancy_factor(2);
        let mallory = Cell::spawn(
            ctx.clone(),
            dna.clone(),
            agent(0),
            bootstrap.clone(),
            config,
            BadAgentConfig::default().with_disable_validation_before_publish(true),
        )
        .unwrap();
        let carol = Cell::spawn(ctx, dna, agent(1), bootstrap, config, BadAgentConfig::default())
            .unwrap();

        call(&mallory, "create", json!({"content": ""})).await.unwrap();
        let cells = vec![mallory.clone(), carol.clone()];
        settle(&cells).await;

        let dump = carol.dht_ops_dump();
        assert!(!dump.integrated.is_empty());
        assert!(dump
            .integrated
            .iter()
            .any(|op| matches!(op.validation_status, crate::state::ValidationStatus::Rejected(_))));
    }

    #[tokio::test]
    async fn test_concurrent_calls_serialize() {
        let cells = cells(1, BadAgentConfig::default());
        let alice = cells[0].clone();

        let calls = (0..8).map(|i| {
            let alice = alice.clone();
            tokio::spawn(async move {
                call(&alice, "create", json!({ "content": format!("c{i}") })).await
            })
        });
        for handle in futures::future::join_all(calls).await {
            handle.unwrap().unwrap();
        }

        let state = alice.state();
        assert_eq!(state.chain.chain_len(), 8);
        assert!(state.chain.is_well_linked());
    }
}
