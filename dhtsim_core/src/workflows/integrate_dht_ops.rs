//! Moves validated ops into the integrated store and indexes the valid ones.

use super::{WorkflowOutput, Workspace};
use crate::error::CellError;
use crate::record::RecordEntry;
use crate::state::{IntegratedOp, ValidationStatus};
use std::sync::Arc;
use tracing::debug;

pub fn integrate_dht_ops_workflow(ws: &mut Workspace) -> Result<WorkflowOutput, CellError> {
    if ws.state.dht.integration_limbo().is_empty() {
        return Ok(WorkflowOutput::default());
    }
    let when_integrated = ws.ctx.timestamp()?;

    let dht = Arc::make_mut(&mut ws.state.dht);
    let limbo = std::mem::take(&mut dht.integration_limbo);
    let count = limbo.len();
    let mut valid = Vec::new();
    for (hash, op) in limbo {
        if op.validation_status == ValidationStatus::Valid {
            dht.metadata.register(&op.op);
            valid.push(op.op.clone());
        }
        dht.integrated.insert(
            hash,
            IntegratedOp {
                op: op.op,
                basis: op.basis,
                validation_status: op.validation_status,
                when_integrated,
            },
        );
    }

    if !valid.is_empty() {
        let cas = Arc::make_mut(&mut ws.state.chain).cas_mut();
        for op in valid {
            if let RecordEntry::Present(entry) = op.entry() {
                if let Some((entry_hash, _)) = op.action().entry_data() {
                    cas.put_entry(*entry_hash, entry.clone());
                }
            }
            cas.put_action(op.signed_action().clone());
        }
    }

    debug!("{}: integrated {} ops", ws.cell_id, count);
    Ok(WorkflowOutput::default())
}
