//! Workflows: the units of work a cell runs, one at a time.
//!
//! ```text
//! call_zome_fn ──► produce_dht_ops ──► publish_dht_ops ──► (peers) incoming_dht_ops
//!                                                                │
//!                              integrate_dht_ops ◄── validate_dht_ops
//! ```
//!
//! A workflow receives a [`Workspace`] holding a private copy of the cell
//! state. The cell adopts that copy only if the workflow returns `Ok`.

mod app_validation;
mod call_zome_fn;
mod incoming_dht_ops;
mod integrate_dht_ops;
mod produce_dht_ops;
mod publish_dht_ops;
mod sys_validation;
mod validate_dht_ops;

pub use app_validation::{app_validate, zomes_for_action};
pub use call_zome_fn::{call_zome_fn_workflow, CallZomeFnInput};
pub use incoming_dht_ops::incoming_dht_ops_workflow;
pub use integrate_dht_ops::integrate_dht_ops_workflow;
pub use produce_dht_ops::produce_dht_ops_workflow;
pub use publish_dht_ops::publish_dht_ops_workflow;
pub use sys_validation::{sys_validate_op, sys_validate_record};
pub use validate_dht_ops::validate_dht_ops_workflow;

use crate::bad_agent::BadAgentConfig;
use crate::cap_grant::GrantLookup;
use crate::dht_op::DhtOp;
use crate::dna::{SimulatedDna, ValidateCallbackResult};
use crate::error::CellError;
use crate::network::NetworkHandle;
use crate::state::CellState;
use dhtsim_env::{AgentPubKey, AnyDhtHash, CellId, SimulationContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Verdict of a validation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Valid,
    Invalid(String),
    /// These hashes could not be retrieved from any source at this time
    Unresolved(Vec<AnyDhtHash>),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }
}

impl From<ValidateCallbackResult> for ValidationOutcome {
    fn from(result: ValidateCallbackResult) -> Self {
        match result {
            ValidateCallbackResult::Valid => ValidationOutcome::Valid,
            ValidateCallbackResult::Invalid(reason) => ValidationOutcome::Invalid(reason),
            ValidateCallbackResult::UnresolvedDependencies(deps) => {
                ValidationOutcome::Unresolved(deps)
            }
        }
    }
}

/// Everything a workflow may read or change.
pub struct Workspace {
    pub cell_id: CellId,
    /// Private copy; adopted by the cell only on success
    pub state: CellState,
    pub dna: Arc<SimulatedDna>,
    pub network: NetworkHandle,
    pub bad_agent: BadAgentConfig,
    pub grants: Arc<dyn GrantLookup>,
    pub ctx: Arc<dyn SimulationContext>,
}

/// Result value plus the follow-ups to enqueue on this cell.
#[derive(Debug, Default)]
pub struct WorkflowOutput {
    pub result: serde_json::Value,
    pub triggers: Vec<Workflow>,
}

impl WorkflowOutput {
    pub fn with_result(result: serde_json::Value) -> Self {
        Self {
            result,
            triggers: Vec::new(),
        }
    }

    pub fn trigger(mut self, workflow: Workflow) -> Self {
        self.triggers.push(workflow);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowKind {
    CallZomeFn,
    ProduceDhtOps,
    PublishDhtOps,
    IncomingDhtOps,
    ValidateDhtOps,
    IntegrateDhtOps,
}

#[derive(Debug, Clone)]
pub enum Workflow {
    CallZomeFn(CallZomeFnInput),
    ProduceDhtOps,
    PublishDhtOps,
    IncomingDhtOps { from: AgentPubKey, ops: Vec<DhtOp> },
    ValidateDhtOps,
    IntegrateDhtOps,
}

impl Workflow {
    pub fn kind(&self) -> WorkflowKind {
        match self {
            Workflow::CallZomeFn(_) => WorkflowKind::CallZomeFn,
            Workflow::ProduceDhtOps => WorkflowKind::ProduceDhtOps,
            Workflow::PublishDhtOps => WorkflowKind::PublishDhtOps,
            Workflow::IncomingDhtOps { .. } => WorkflowKind::IncomingDhtOps,
            Workflow::ValidateDhtOps => WorkflowKind::ValidateDhtOps,
            Workflow::IntegrateDhtOps => WorkflowKind::IntegrateDhtOps,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind() {
            WorkflowKind::CallZomeFn => "call_zome_fn",
            WorkflowKind::ProduceDhtOps => "produce_dht_ops",
            WorkflowKind::PublishDhtOps => "publish_dht_ops",
            WorkflowKind::IncomingDhtOps => "incoming_dht_ops",
            WorkflowKind::ValidateDhtOps => "validate_dht_ops",
            WorkflowKind::IntegrateDhtOps => "integrate_dht_ops",
        }
    }

    pub async fn run(self, ws: &mut Workspace) -> Result<WorkflowOutput, CellError> {
        match self {
            Workflow::CallZomeFn(input) => call_zome_fn_workflow(ws, input).await,
            Workflow::ProduceDhtOps => produce_dht_ops_workflow(ws),
            Workflow::PublishDhtOps => publish_dht_ops_workflow(ws).await,
            Workflow::IncomingDhtOps { from, ops } => incoming_dht_ops_workflow(ws, from, ops),
            Workflow::ValidateDhtOps => validate_dht_ops_workflow(ws).await,
            Workflow::IntegrateDhtOps => integrate_dht_ops_workflow(ws),
        }
    }
}
