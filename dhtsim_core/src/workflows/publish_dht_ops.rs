//! Sends unpublished authored ops to the agents responsible for their basis.

use super::{WorkflowOutput, Workspace};
use crate::dht_op::DhtOp;
use crate::error::CellError;
use crate::network::CellPeer;
use dhtsim_env::{CellId, DhtOpHash};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub async fn publish_dht_ops_workflow(ws: &mut Workspace) -> Result<WorkflowOutput, CellError> {
    let unpublished: Vec<(DhtOpHash, DhtOp, _)> = ws
        .state
        .dht
        .authored()
        .iter()
        .filter(|(_, authored)| !authored.published)
        .map(|(hash, authored)| (*hash, authored.op.clone(), authored.basis))
        .collect();
    if unpublished.is_empty() {
        return Ok(WorkflowOutput::default());
    }

    let mut batches: BTreeMap<CellId, (Arc<dyn CellPeer>, Vec<DhtOp>)> = BTreeMap::new();
    for (_, op, basis) in &unpublished {
        for peer in ws.network.publish_targets(basis) {
            batches
                .entry(peer.cell_id())
                .or_insert_with(|| (peer.clone(), Vec::new()))
                .1
                .push(op.clone());
        }
    }

    info!(
        "{}: publishing {} ops to {} agents",
        ws.cell_id,
        unpublished.len(),
        batches.len()
    );
    let from = ws.cell_id.agent_pub_key;
    for (peer, ops) in batches.into_values() {
        peer.handle_publish(from, ops).await;
    }

    let dht = Arc::make_mut(&mut ws.state.dht);
    for (hash, _, _) in unpublished {
        if let Some(authored) = dht.authored.get_mut(&hash) {
            authored.published = true;
        }
    }
    Ok(WorkflowOutput::default())
}
