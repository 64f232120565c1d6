//! Creating phase handler.
//!
//! Guards against adopting an existing cluster, submits the full payload,
//! waits for it and re-reads the result. Nothing has converged before the
//! create completes, so any failure ends the invocation.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use convoy_common::types::{ClusterPhase, DesiredSpec, PoolWriteMode};
use convoy_common::Error;

use super::transition;
use crate::controller::{ClusterReconciler, ReconcileOutput};
use crate::operation::{call, OperationOutcome};
use crate::payload::expand_cluster;
use crate::secrets::SecretStore;

/// Create the cluster described by `desired`.
///
/// On success `secrets` holds every write-only value of `desired`.
#[instrument(skip_all, fields(cluster = %desired.id()))]
pub async fn handle_creating(
    reconciler: &ClusterReconciler,
    desired: &DesiredSpec,
    secrets: &mut SecretStore,
    cancel: &CancellationToken,
) -> Result<ReconcileOutput, Error> {
    let id = desired.id();
    let cluster = id.to_string();

    desired
        .validate(PoolWriteMode::Create)
        .map_err(|e| e.in_section(&cluster, "validation"))?;

    // Existence guard
    if reconciler
        .fetch(&id, cancel)
        .await
        .map_err(|e| e.in_section(&cluster, "existence check"))?
        .is_some()
    {
        return Err(Error::already_exists(&cluster));
    }

    let phase = transition(&id, ClusterPhase::Absent, ClusterPhase::Creating)?;

    let payload = expand_cluster(desired);
    let config = reconciler.config();
    let handle = call(
        "create cluster",
        config.read_timeout(),
        cancel,
        reconciler.clusters().create_or_update(&id, &payload),
    )
    .await
    .map_err(|e| e.in_section(&cluster, "create"))?;

    let outcome = reconciler
        .waiter(config.create_timeout())
        .wait(handle, cancel)
        .await
        .map_err(|e| e.in_section(&cluster, "create"))?;
    if outcome == OperationOutcome::NotFound {
        return Err(Error::operation_failed(
            "create cluster",
            "cluster disappeared while it was being created",
        )
        .in_section(&cluster, "create"));
    }
    secrets.record_all(desired);
    info!("cluster created");

    let created = reconciler
        .fetch(&id, cancel)
        .await
        .and_then(|found| found.ok_or_else(|| Error::not_found(&cluster)))
        .map_err(|e| e.in_section(&cluster, "read"))?;

    let phase = transition(&id, phase, ClusterPhase::Ready)?;
    reconciler
        .collect_output(
            &id,
            &created,
            Some(&desired.default_node_pool.name),
            secrets,
            phase,
            cancel,
        )
        .await
        .map_err(|e| e.in_section(&cluster, "credentials"))
}
