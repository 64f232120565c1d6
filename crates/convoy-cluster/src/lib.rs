//! Reconciliation core for a managed Kubernetes cluster
//!
//! [`ClusterReconciler`] converges one remote managed cluster, including its
//! default node pool, to a declared [`DesiredSpec`](convoy_common::types::DesiredSpec):
//!
//! - create, guarded against adopting an existing cluster
//! - in-place update through an ordered saga of independently committed steps
//! - idempotent delete
//! - read and import, including kubeconfig credential extraction
//!
//! The remote service is reached through the [`ManagedClusterApi`] and
//! [`NodePoolApi`] traits. Write-only secrets the remote never echoes back are
//! carried between invocations in a caller-persisted [`SecretStore`].

pub mod client;
pub mod controller;
pub mod credentials;
pub mod node_pool;
pub mod operation;
pub mod payload;
mod phases;
pub mod plan;
pub mod saga;
pub mod secrets;
pub mod sections;

#[cfg(test)]
mod testing;

pub use client::{ManagedClusterApi, NodePoolApi, OperationHandle, OperationStatus};
pub use controller::{ClusterReconciler, ClusterReconcilerBuilder, ReconcileOutput};
pub use operation::{OperationOutcome, OperationWaiter};
pub use plan::{plan, Plan};
pub use secrets::{reconcile_secret, SecretField, SecretStore};

pub use convoy_common::{Error, ReconcilerConfig, Result};
