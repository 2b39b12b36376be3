//! Validates ops waiting in validation limbo.

use super::{app_validate, sys_validate_op, ValidationOutcome, Workflow, WorkflowOutput, Workspace};
use crate::cascade::Cascade;
use crate::error::CellError;
use crate::state::{IntegrationLimboOp, ValidationLimboStatus, ValidationStatus};
use dhtsim_env::DhtOpHash;
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs sys then app validation on every limbo op.
///
/// Ops with unresolved dependencies stay in limbo; the next run of this
/// workflow looks at them again.
pub async fn validate_dht_ops_workflow(ws: &mut Workspace) -> Result<WorkflowOutput, CellError> {
    let mut outcomes: Vec<(DhtOpHash, ValidationOutcome)> = Vec::new();
    {
        let cascade = Cascade::new(&ws.state.chain, Some(&*ws.state.dht), &ws.network);
        for (hash, limbo) in ws.state.dht.validation_limbo() {
            let mut outcome = sys_validate_op(&limbo.op, &cascade).await?;
            if outcome.is_valid() {
                outcome = app_validate(&limbo.op.to_record(), &ws.dna, &cascade).await;
            }
            outcomes.push((*hash, outcome));
        }
    }
    if outcomes.is_empty() {
        return Ok(WorkflowOutput::default());
    }

    let pretend_valid = ws.bad_agent.pretend_invalid_records_are_valid;
    let dht = Arc::make_mut(&mut ws.state.dht);
    let mut moved = 0;
    for (hash, outcome) in outcomes {
        let validation_status = match outcome {
            ValidationOutcome::Valid => ValidationStatus::Valid,
            ValidationOutcome::Invalid(_) if pretend_valid => ValidationStatus::Valid,
            ValidationOutcome::Invalid(reason) => {
                warn!("{}: rejecting op {}: {}", ws.cell_id, hash, reason);
                ValidationStatus::Rejected(reason)
            }
            ValidationOutcome::Unresolved(missing) => {
                if let Some(limbo) = dht.validation_limbo.get_mut(&hash) {
                    limbo.status = ValidationLimboStatus::AwaitingDeps(missing);
                    limbo.num_tries += 1;
                }
                continue;
            }
        };
        if let Some(limbo) = dht.validation_limbo.remove(&hash) {
            dht.integration_limbo.insert(
                hash,
                IntegrationLimboOp {
                    op: limbo.op,
                    basis: limbo.basis,
                    validation_status,
                },
            );
            moved += 1;
        }
    }

    debug!(
        "{}: {} ops validated, {} still waiting",
        ws.cell_id,
        moved,
        dht.validation_limbo.len()
    );
    if moved == 0 {
        return Ok(WorkflowOutput::default());
    }
    Ok(WorkflowOutput::default().trigger(Workflow::IntegrateDhtOps))
}
