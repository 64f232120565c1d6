//! Default node pool sub-resource
//!
//! The pool is created as part of the cluster payload but every later change
//! goes through the separate agent pool API with its own operation.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use convoy_common::types::{AgentPoolProfile, ClusterId, NodePoolSpec, PoolWriteMode};
use convoy_common::Error;

use crate::client::{NodePoolApi, OperationHandle};
use crate::operation::{call, OperationWaiter};

/// Wire payload for `spec`
///
/// With autoscaling on an existing pool the count is omitted so the
/// remote autoscaler is not overridden by a stale desired count.
pub(crate) fn agent_pool_profile(spec: &NodePoolSpec, mode: PoolWriteMode) -> AgentPoolProfile {
    merge_agent_pool(AgentPoolProfile::default(), spec, mode)
}

/// Overlay `spec` on an agent pool read from the remote, keeping unmodelled fields
pub(crate) fn merge_agent_pool(
    base: AgentPoolProfile,
    spec: &NodePoolSpec,
    mode: PoolWriteMode,
) -> AgentPoolProfile {
    let count = match (mode, spec.enable_auto_scaling) {
        (PoolWriteMode::Update, true) => None,
        _ => spec.effective_node_count(),
    };
    let (min_count, max_count) = if spec.enable_auto_scaling {
        (spec.min_count, spec.max_count)
    } else {
        (None, None)
    };

    AgentPoolProfile {
        name: spec.name.clone(),
        count,
        vm_size: Some(spec.vm_size.clone()),
        enable_auto_scaling: Some(spec.enable_auto_scaling),
        min_count,
        max_count,
        availability_zones: spec.availability_zones.iter().cloned().collect(),
        enable_node_public_ip: Some(spec.enable_node_public_ip),
        max_pods: spec.max_pods.or(base.max_pods),
        os_disk_size_gb: spec.os_disk_size_gb.or(base.os_disk_size_gb),
        vnet_subnet_id: spec.vnet_subnet_id.clone().or(base.vnet_subnet_id),
        node_labels: spec.node_labels.clone(),
        node_taints: spec.node_taints.clone(),
        orchestrator_version: spec.orchestrator_version.clone().or(base.orchestrator_version),
        provisioning_state: None,
        ..base
    }
}

/// Owns writes to the cluster's default node pool
#[derive(Clone)]
pub struct NodePoolManager {
    api: Arc<dyn NodePoolApi>,
    call_timeout: Duration,
}

impl NodePoolManager {
    /// Create a manager over the agent pool API
    pub fn new(api: Arc<dyn NodePoolApi>, call_timeout: Duration) -> Self {
        Self { api, call_timeout }
    }

    /// Fail unless the remote supports `version` for an existing pool
    async fn ensure_version_supported(
        &self,
        cluster: &ClusterId,
        pool: &str,
        version: &str,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let available = call(
            "list node pool versions",
            self.call_timeout,
            cancel,
            self.api.available_versions(cluster),
        )
        .await?;
        if available.iter().any(|v| v == version) {
            return Ok(());
        }
        Err(Error::validation_for_field(
            cluster.to_string(),
            "default_node_pool.orchestrator_version",
            format!(
                "version {version} is not supported for node pool {pool}, supported versions: {}",
                available.join(", ")
            ),
        ))
    }

    /// Validate `spec` and submit it, returning the accepted operation
    ///
    /// `base` is the pool as currently read from the remote, if any. On
    /// update a pinned orchestrator version is checked against the versions
    /// the remote offers before anything is written.
    pub async fn create_or_update(
        &self,
        cluster: &ClusterId,
        spec: &NodePoolSpec,
        mode: PoolWriteMode,
        base: Option<&AgentPoolProfile>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn OperationHandle>, Error> {
        spec.validate(mode)?;
        if let (PoolWriteMode::Update, Some(version)) = (mode, spec.orchestrator_version.as_deref()) {
            self.ensure_version_supported(cluster, &spec.name, version, cancel)
                .await?;
        }

        let payload = match base {
            Some(base) => merge_agent_pool(base.clone(), spec, mode),
            None => agent_pool_profile(spec, mode),
        };
        debug!(
            cluster = %cluster,
            pool = %spec.name,
            count = ?payload.count,
            autoscaling = spec.enable_auto_scaling,
            "submitting node pool"
        );

        let operation = format!("write node pool {}", spec.name);
        call(
            &operation,
            self.call_timeout,
            cancel,
            self.api.create_or_update(cluster, &spec.name, &payload),
        )
        .await
    }

    /// Submit `spec` and wait for the pool operation to finish
    pub async fn apply(
        &self,
        cluster: &ClusterId,
        spec: &NodePoolSpec,
        mode: PoolWriteMode,
        base: Option<&AgentPoolProfile>,
        waiter: &OperationWaiter,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let handle = self
            .create_or_update(cluster, spec, mode, base, cancel)
            .await?;
        waiter.wait(handle, cancel).await?;
        info!(cluster = %cluster, pool = %spec.name, "node pool converged");
        Ok(())
    }
}
