//! Accepts ops published to this cell into validation limbo.

use super::{Workflow, WorkflowOutput, Workspace};
use crate::dht_op::DhtOp;
use crate::error::CellError;
use crate::state::{ValidationLimboOp, ValidationLimboStatus};
use dhtsim_env::AgentPubKey;
use std::sync::Arc;
use tracing::{debug, warn};

pub fn incoming_dht_ops_workflow(
    ws: &mut Workspace,
    from: AgentPubKey,
    ops: Vec<DhtOp>,
) -> Result<WorkflowOutput, CellError> {
    let time_added = ws.ctx.timestamp()?;
    let dht = Arc::make_mut(&mut ws.state.dht);

    let mut added = 0;
    for op in ops {
        let hash = op.hash()?;
        if dht.holds_op(&hash) {
            continue;
        }
        let Some(basis) = op.basis() else {
            warn!("Dropping malformed {:?} op from {}", op.op_type(), from);
            continue;
        };
        dht.validation_limbo.insert(
            hash,
            ValidationLimboOp {
                op,
                basis,
                from_agent: Some(from),
                status: ValidationLimboStatus::Pending,
                num_tries: 0,
                time_added,
            },
        );
        added += 1;
    }

    if added == 0 {
        return Ok(WorkflowOutput::default());
    }
    debug!("{}: {} ops from {} entered validation", ws.cell_id, added, from);
    Ok(WorkflowOutput::default().trigger(Workflow::ValidateDhtOps))
}
