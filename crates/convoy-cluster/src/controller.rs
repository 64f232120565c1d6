//! Managed cluster reconciler
//!
//! Entry point for converging one managed cluster. Each public operation
//! runs to completion on the calling task; the caller must not run two
//! operations for the same cluster at once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use convoy_common::types::{
    ClusterId, ClusterPhase, CredentialBundle, CredentialKind, DesiredSpec, ManagedCluster,
    ObservedState,
};
use convoy_common::{Error, ReconcilerConfig};

use crate::client::{ManagedClusterApi, NodePoolApi};
use crate::credentials;
use crate::node_pool::NodePoolManager;
use crate::operation::{call, OperationWaiter};
use crate::payload::flatten;
use crate::phases::{handle_creating, handle_deleting, handle_updating};
use crate::plan::{plan, Plan};
use crate::secrets::SecretStore;

/// Result of a successful create, read, import or update
#[derive(Clone, PartialEq, Eq)]
pub struct ReconcileOutput {
    /// Converged state with write-only secrets backfilled
    pub observed: ObservedState,
    /// Lifecycle phase after the operation
    pub phase: ClusterPhase,
    /// Credentials from the default listing
    pub default_credentials: CredentialBundle,
    /// Credentials from the privileged listing, only with identity-provider RBAC
    pub privileged_credentials: Option<CredentialBundle>,
    /// Raw kubeconfig from the default listing
    pub raw_default_credentials: String,
    /// Raw kubeconfig from the privileged listing
    pub raw_privileged_credentials: Option<String>,
}

impl fmt::Debug for ReconcileOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconcileOutput")
            .field("cluster", &self.observed.id().to_string())
            .field("phase", &self.phase)
            .field("fqdn", &self.observed.fqdn)
            .field("default_credentials", &self.default_credentials)
            .field("privileged_credentials", &self.privileged_credentials)
            .finish_non_exhaustive()
    }
}

/// Reconciles managed clusters against the remote service
///
/// Use [`ClusterReconcilerBuilder`] to construct instances:
///
/// ```text
/// let reconciler = ClusterReconciler::builder(cluster_api, node_pool_api)
///     .config(ReconcilerConfig::from_env()?)
///     .build();
/// ```
pub struct ClusterReconciler {
    clusters: Arc<dyn ManagedClusterApi>,
    node_pools: NodePoolManager,
    config: ReconcilerConfig,
}

impl ClusterReconciler {
    /// Create a builder over the two remote APIs
    pub fn builder(
        clusters: Arc<dyn ManagedClusterApi>,
        node_pools: Arc<dyn NodePoolApi>,
    ) -> ClusterReconcilerBuilder {
        ClusterReconcilerBuilder::new(clusters, node_pools)
    }

    /// Create a reconciler with default configuration
    pub fn new(clusters: Arc<dyn ManagedClusterApi>, node_pools: Arc<dyn NodePoolApi>) -> Self {
        Self::builder(clusters, node_pools).build()
    }

    /// Active configuration
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub(crate) fn clusters(&self) -> &dyn ManagedClusterApi {
        self.clusters.as_ref()
    }

    pub(crate) fn node_pools(&self) -> &NodePoolManager {
        &self.node_pools
    }

    pub(crate) fn waiter(&self, timeout: Duration) -> OperationWaiter {
        OperationWaiter::new(self.config.poll_interval(), timeout)
    }

    /// Read the remote object, `None` when it does not exist
    pub(crate) async fn fetch(
        &self,
        id: &ClusterId,
        cancel: &CancellationToken,
    ) -> Result<Option<ManagedCluster>, Error> {
        match call(
            "get cluster",
            self.config.read_timeout(),
            cancel,
            self.clusters.get(id),
        )
        .await
        {
            Err(e) if e.is_not_found() => Ok(None),
            other => other,
        }
    }

    async fn fetch_credentials(
        &self,
        id: &ClusterId,
        kind: CredentialKind,
        cancel: &CancellationToken,
    ) -> Result<(CredentialBundle, String), Error> {
        let operation = format!("list {kind} credentials");
        let raw = call(
            &operation,
            self.config.read_timeout(),
            cancel,
            self.clusters.list_credentials(id, kind),
        )
        .await?;
        let raw = String::from_utf8(raw).map_err(|e| {
            Error::malformed_credentials(format!("{kind} credentials are not UTF-8: {e}"))
        })?;
        let bundle = credentials::parse(raw.as_bytes())?;
        Ok((bundle, raw))
    }

    /// Flatten `cluster` and regenerate its credentials
    ///
    /// The privileged listing is only requested when identity-provider RBAC
    /// is configured.
    pub(crate) async fn collect_output(
        &self,
        id: &ClusterId,
        cluster: &ManagedCluster,
        pool_name: Option<&str>,
        secrets: &SecretStore,
        phase: ClusterPhase,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutput, Error> {
        let observed = flatten(id, cluster, pool_name, secrets)?;
        let (default_credentials, raw_default_credentials) =
            self.fetch_credentials(id, CredentialKind::User, cancel).await?;

        let (privileged_credentials, raw_privileged_credentials) = if observed
            .spec
            .role_based_access_control
            .identity_provider
            .is_some()
        {
            let (bundle, raw) = self
                .fetch_credentials(id, CredentialKind::Admin, cancel)
                .await?;
            (Some(bundle), Some(raw))
        } else {
            (None, None)
        };

        Ok(ReconcileOutput {
            observed,
            phase,
            default_credentials,
            privileged_credentials,
            raw_default_credentials,
            raw_privileged_credentials,
        })
    }

    /// Create the cluster described by `desired`
    ///
    /// Fails with `AlreadyExists` if a cluster with the same identity exists.
    pub async fn create(
        &self,
        desired: &DesiredSpec,
        secrets: &mut SecretStore,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutput, Error> {
        handle_creating(self, desired, secrets, cancel).await
    }

    /// Read the cluster, `None` when the remote reports it gone
    ///
    /// `pool_name` is the name of the default node pool as last known; without
    /// it the first system pool is reported.
    #[instrument(skip_all, fields(cluster = %id))]
    pub async fn read(
        &self,
        id: &ClusterId,
        pool_name: Option<&str>,
        secrets: &SecretStore,
        cancel: &CancellationToken,
    ) -> Result<Option<ReconcileOutput>, Error> {
        let cluster = id.to_string();
        let Some(remote) = self
            .fetch(id, cancel)
            .await
            .map_err(|e| e.in_section(&cluster, "read"))?
        else {
            info!("cluster is gone");
            return Ok(None);
        };
        self.collect_output(id, &remote, pool_name, secrets, ClusterPhase::Ready, cancel)
            .await
            .map(Some)
            .map_err(|e| e.in_section(&cluster, "read"))
    }

    /// Adopt an existing cluster
    ///
    /// Write-only secrets are unknown at this point and stay empty.
    pub async fn import(
        &self,
        id: &ClusterId,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutput, Error> {
        self.read(id, None, &SecretStore::empty(), cancel)
            .await?
            .ok_or_else(|| Error::not_found(id.to_string()).in_section(id.to_string(), "import"))
    }

    /// Converge an existing cluster in place
    ///
    /// `secrets` is updated as each secret-bearing write commits and must be
    /// persisted by the caller even when this returns an error.
    pub async fn update(
        &self,
        desired: &DesiredSpec,
        secrets: &mut SecretStore,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutput, Error> {
        handle_updating(self, desired, secrets, cancel).await
    }

    /// Delete the cluster; a cluster that is already gone counts as deleted
    pub async fn delete(&self, id: &ClusterId, cancel: &CancellationToken) -> Result<(), Error> {
        handle_deleting(self, id, cancel).await
    }

    /// Create, replace or update as needed to move `prior` to `desired`
    ///
    /// A replace deletes the cluster `prior` describes, which is a different
    /// remote object from the one created when the name or resource group
    /// changed.
    #[instrument(skip_all, fields(cluster = %desired.id()))]
    pub async fn reconcile(
        &self,
        desired: &DesiredSpec,
        prior: Option<&ObservedState>,
        secrets: &mut SecretStore,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutput, Error> {
        let Some(prior) = prior else {
            return self.create(desired, secrets, cancel).await;
        };
        match plan(desired, Some(prior)) {
            Plan::Create => self.create(desired, secrets, cancel).await,
            Plan::Replace { fields } => {
                let stale = prior.id();
                info!(?fields, replaced = %stale, "replace-only fields changed, recreating cluster");
                self.delete(&stale, cancel).await?;
                *secrets = SecretStore::empty();
                self.create(desired, secrets, cancel).await
            }
            Plan::Update | Plan::NoOp => self.update(desired, secrets, cancel).await,
        }
    }
}

/// Builder for constructing [`ClusterReconciler`] instances
pub struct ClusterReconcilerBuilder {
    clusters: Arc<dyn ManagedClusterApi>,
    node_pools: Arc<dyn NodePoolApi>,
    config: Option<ReconcilerConfig>,
}

impl ClusterReconcilerBuilder {
    fn new(clusters: Arc<dyn ManagedClusterApi>, node_pools: Arc<dyn NodePoolApi>) -> Self {
        Self {
            clusters,
            node_pools,
            config: None,
        }
    }

    /// Override the timing configuration
    pub fn config(mut self, config: ReconcilerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the reconciler
    pub fn build(self) -> ClusterReconciler {
        let config = self.config.unwrap_or_default();
        ClusterReconciler {
            node_pools: NodePoolManager::new(self.node_pools, config.read_timeout()),
            clusters: self.clusters,
            config,
        }
    }
}
