//! Collaborator interfaces for the remote managed-cluster service
//!
//! The reconciler never talks to the network directly. Authentication,
//! transport retries and rate limiting live behind these traits; a call that
//! returns `Err` was rejected outright, a call that returns an
//! [`OperationHandle`] was accepted and must be polled.

use async_trait::async_trait;
use convoy_common::types::{
    AgentPoolProfile, ClusterId, CredentialKind, ManagedCluster, ServicePrincipalProfile,
};
use convoy_common::Error;

#[cfg(test)]
use mockall::automock;

/// Status of an in-flight remote mutation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationStatus {
    /// Still running
    InProgress,
    /// Completed successfully
    Succeeded,
    /// Reached a terminal failure
    Failed {
        /// Message reported by the remote service
        message: String,
    },
    /// The target object no longer exists
    NotFound,
}

impl OperationStatus {
    /// Whether polling can stop
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::InProgress)
    }
}

/// Opaque reference to an accepted long-running operation
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OperationHandle: Send + Sync {
    /// Human-readable description used in logs and errors (e.g. "update node pool default")
    fn description(&self) -> String;

    /// Fetch the current status
    ///
    /// Errors are transient read failures; the waiter keeps polling.
    async fn poll(&self) -> Result<OperationStatus, Error>;
}

/// Remote control-plane API for the managed cluster object
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManagedClusterApi: Send + Sync {
    /// Read the cluster, `None` when it does not exist
    async fn get(&self, id: &ClusterId) -> Result<Option<ManagedCluster>, Error>;

    /// Create or fully replace the cluster object
    async fn create_or_update(
        &self,
        id: &ClusterId,
        payload: &ManagedCluster,
    ) -> Result<Box<dyn OperationHandle>, Error>;

    /// Rotate the service principal credential
    async fn reset_service_principal(
        &self,
        id: &ClusterId,
        profile: &ServicePrincipalProfile,
    ) -> Result<Box<dyn OperationHandle>, Error>;

    /// Delete the cluster object
    async fn delete(&self, id: &ClusterId) -> Result<Box<dyn OperationHandle>, Error>;

    /// Fetch a raw kubeconfig blob from the given credential listing
    async fn list_credentials(&self, id: &ClusterId, kind: CredentialKind)
        -> Result<Vec<u8>, Error>;
}

/// Remote API for agent pools, a separate endpoint family from the cluster object
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodePoolApi: Send + Sync {
    /// Create or update a single agent pool of a cluster
    async fn create_or_update(
        &self,
        cluster: &ClusterId,
        pool_name: &str,
        payload: &AgentPoolProfile,
    ) -> Result<Box<dyn OperationHandle>, Error>;

    /// Kubernetes versions an existing agent pool of `cluster` can run
    async fn available_versions(&self, cluster: &ClusterId) -> Result<Vec<String>, Error>;
}
