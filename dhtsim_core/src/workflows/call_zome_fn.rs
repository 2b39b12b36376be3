//! The call workflow: authorize, run on a copy, validate, commit.

use super::{app_validate, sys_validate_record, ValidationOutcome, Workflow, WorkflowOutput, Workspace};
use crate::cap_grant::{CapSecret, GrantRequest};
use crate::cascade::Cascade;
use crate::error::CellError;
use crate::host_fn::HostFnContext;
use crate::state::WorkingChain;
use dhtsim_env::AgentPubKey;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallZomeFnInput {
    pub zome: String,
    pub fn_name: String,
    pub payload: serde_json::Value,
    pub provenance: AgentPubKey,
    pub cap_secret: Option<CapSecret>,
}

impl CallZomeFnInput {
    pub fn new(
        zome: impl Into<String>,
        fn_name: impl Into<String>,
        payload: serde_json::Value,
        provenance: AgentPubKey,
    ) -> Self {
        Self {
            zome: zome.into(),
            fn_name: fn_name.into(),
            payload,
            provenance,
            cap_secret: None,
        }
    }

    pub fn with_cap_secret(mut self, secret: CapSecret) -> Self {
        self.cap_secret = Some(secret);
        self
    }
}

/// Runs one zome function.
///
/// New records are validated in chain order and the first failure aborts
/// the call. Only a fully validated working chain replaces `ws.state.chain`.
pub async fn call_zome_fn_workflow(
    ws: &mut Workspace,
    input: CallZomeFnInput,
) -> Result<WorkflowOutput, CellError> {
    let request = GrantRequest {
        cell_id: &ws.cell_id,
        zome: &input.zome,
        fn_name: &input.fn_name,
        provenance: &input.provenance,
        cap_secret: input.cap_secret.as_ref(),
    };
    if !ws.grants.has_valid_grant(&ws.state.chain, &request) {
        return Err(CellError::Unauthorized {
            zome: input.zome,
            fn_name: input.fn_name,
        });
    }

    let (zome_index, zome) = ws
        .dna
        .zome(&input.zome)
        .ok_or_else(|| CellError::ZomeNotFound(input.zome.clone()))?;
    let zome_fn = *zome
        .zome_functions
        .get(&input.fn_name)
        .ok_or_else(|| CellError::FunctionNotFound {
            zome: input.zome.clone(),
            fn_name: input.fn_name.clone(),
        })?;

    let working = WorkingChain::fork(&ws.state.chain, ws.cell_id.agent_pub_key);
    let mut host = HostFnContext::new(
        ws.cell_id,
        zome_index,
        input.provenance,
        working,
        ws.state.dht.clone(),
        ws.network.clone(),
        ws.dna.clone(),
        ws.ctx.clone(),
    );
    let result = zome_fn(&mut host, input.payload).await?;
    let working = host.into_chain();

    if !working.head_changed() {
        return Ok(WorkflowOutput::with_result(result));
    }

    let new_records = working.new_records();
    debug!(
        "{}/{} wrote {} records, validating",
        input.zome,
        input.fn_name,
        new_records.len()
    );
    {
        let cascade = Cascade::new(working.store(), Some(&*ws.state.dht), &ws.network);
        for record in &new_records {
            reject_unless_valid(sys_validate_record(record, &cascade).await?)?;
            if !ws.bad_agent.disable_validation_before_publish {
                reject_unless_valid(app_validate(record, &ws.dna, &cascade).await)?;
            }
        }
    }

    ws.state.chain = working.commit();
    Ok(WorkflowOutput::with_result(result).trigger(Workflow::ProduceDhtOps))
}

fn reject_unless_valid(outcome: ValidationOutcome) -> Result<(), CellError> {
    match outcome {
        ValidationOutcome::Valid => Ok(()),
        ValidationOutcome::Invalid(reason) => {
            warn!("Rejecting new record: {}", reason);
            Err(CellError::InvalidRecord(reason))
        }
        ValidationOutcome::Unresolved(missing) => Err(CellError::DependencyMissing(missing)),
    }
}
