//! Deleting phase handler.
//!
//! Delete is idempotent: a cluster that is already gone, or disappears while
//! the operation is polled, counts as deleted.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use convoy_common::types::{ClusterId, ClusterPhase};
use convoy_common::Error;

use super::transition;
use crate::controller::ClusterReconciler;
use crate::operation::call;

/// Delete the cluster `id`
#[instrument(skip_all, fields(cluster = %id))]
pub async fn handle_deleting(
    reconciler: &ClusterReconciler,
    id: &ClusterId,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let cluster = id.to_string();

    let existing = reconciler
        .fetch(id, cancel)
        .await
        .map_err(|e| e.in_section(&cluster, "delete"))?;
    if existing.is_none() {
        info!("cluster already absent");
        return Ok(());
    }

    let phase = transition(id, ClusterPhase::Ready, ClusterPhase::Deleting)?;
    let config = reconciler.config();

    let handle = match call(
        "delete cluster",
        config.read_timeout(),
        cancel,
        reconciler.clusters().delete(id),
    )
    .await
    {
        Ok(handle) => handle,
        Err(e) if e.is_not_found() => {
            info!("cluster vanished before delete was accepted");
            transition(id, phase, ClusterPhase::Absent)?;
            return Ok(());
        }
        Err(e) => return Err(e.in_section(&cluster, "delete")),
    };

    match reconciler
        .waiter(config.delete_timeout())
        .wait(handle, cancel)
        .await
    {
        Ok(_) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.in_section(&cluster, "delete")),
    }

    transition(id, phase, ClusterPhase::Absent)?;
    info!("cluster deleted");
    Ok(())
}
