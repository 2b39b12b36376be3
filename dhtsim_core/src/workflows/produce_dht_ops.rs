//! Derives ops for committed records and stores them as authored.

use super::{Workflow, WorkflowOutput, Workspace};
use crate::dht_op::produce_ops_from_record;
use crate::error::CellError;
use crate::state::AuthoredOp;
use std::sync::Arc;
use tracing::debug;

/// Adds the ops of every chain record not yet authored.
///
/// Ops are keyed by hash, so re-running over the whole chain is harmless.
pub fn produce_dht_ops_workflow(ws: &mut Workspace) -> Result<WorkflowOutput, CellError> {
    let mut produced = Vec::new();
    for record in ws.state.chain.records() {
        for op in produce_ops_from_record(&record)? {
            let hash = op.hash()?;
            if ws.state.dht.authored().contains_key(&hash) {
                continue;
            }
            let Some(basis) = op.basis() else {
                continue;
            };
            produced.push((hash, AuthoredOp {
                op,
                basis,
                published: false,
            }));
        }
    }

    if produced.is_empty() {
        return Ok(WorkflowOutput::default());
    }

    debug!("{}: produced {} ops", ws.cell_id, produced.len());
    let dht = Arc::make_mut(&mut ws.state.dht);
    dht.authored.extend(produced);
    Ok(WorkflowOutput::default().trigger(Workflow::PublishDhtOps))
}
