//! The ordered update saga
//!
//! An update is a fixed sequence of independently committing remote steps.
//! Each step carries a pure precondition evaluated against the saga context
//! at the moment it runs, so ordering and skip logic can be tested without
//! any remote calls. The runner lives in `phases::updating`.

use std::fmt;

use convoy_common::types::{ClusterId, DesiredSpec, ManagedCluster, ObservedState};

use crate::sections::{changed_sections, ClusterSection};

/// One step of an update
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateStep {
    /// Rotate the service principal through its dedicated call
    ResetServicePrincipal,
    /// Re-read the cluster as the base for the section write
    RefreshBase,
    /// Coalesce changed sections into one whole-object write
    ApplyClusterSections,
    /// Update the default node pool through the agent pool API
    ApplyNodePool,
    /// Re-read and write only the Kubernetes version
    UpgradeVersion,
    /// Read the converged state and regenerate credentials
    FinalRead,
}

/// Every update runs these steps in this order
pub const UPDATE_SAGA: [UpdateStep; 6] = [
    UpdateStep::ResetServicePrincipal,
    UpdateStep::RefreshBase,
    UpdateStep::ApplyClusterSections,
    UpdateStep::ApplyNodePool,
    UpdateStep::UpgradeVersion,
    UpdateStep::FinalRead,
];

impl UpdateStep {
    /// Logical section named in errors
    pub fn section(self) -> &'static str {
        match self {
            UpdateStep::ResetServicePrincipal => "service principal",
            UpdateStep::RefreshBase => "refresh",
            UpdateStep::ApplyClusterSections => "cluster sections",
            UpdateStep::ApplyNodePool => "node pool",
            UpdateStep::UpgradeVersion => "version",
            UpdateStep::FinalRead => "final read",
        }
    }

    /// Whether the step issues a remote mutation when it runs
    pub fn mutates(self) -> bool {
        matches!(
            self,
            UpdateStep::ResetServicePrincipal
                | UpdateStep::ApplyClusterSections
                | UpdateStep::ApplyNodePool
                | UpdateStep::UpgradeVersion
        )
    }

    /// Whether the step has work to do given the current context
    pub fn precondition(self, ctx: &SagaContext<'_>) -> bool {
        let desired = ctx.desired;
        let observed = &ctx.observed.spec;
        match self {
            UpdateStep::ResetServicePrincipal => service_principal_changed(desired, observed),
            UpdateStep::RefreshBase | UpdateStep::FinalRead => true,
            UpdateStep::ApplyClusterSections => !changed_sections(desired, observed).is_empty(),
            UpdateStep::ApplyNodePool => desired
                .default_node_pool
                .differs_from(&observed.default_node_pool),
            UpdateStep::UpgradeVersion => desired.kubernetes_version != observed.kubernetes_version,
        }
    }
}

impl fmt::Display for UpdateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

/// A service principal needs a reset when its id or secret moved
///
/// Clearing the principal is not a reset; managed identity is chosen at
/// create time.
fn service_principal_changed(desired: &DesiredSpec, observed: &DesiredSpec) -> bool {
    match (&desired.service_principal, &observed.service_principal) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(wanted), Some(current)) => {
            wanted.client_id != current.client_id || wanted.client_secret != current.client_secret
        }
    }
}

/// State threaded through one run of the saga
#[derive(Debug)]
pub struct SagaContext<'a> {
    /// Identity of the cluster being updated
    pub id: ClusterId,
    /// Target configuration
    pub desired: &'a DesiredSpec,
    /// Latest known state, secrets backfilled
    pub observed: ObservedState,
    /// Latest remote object, the base for whole-object writes
    pub base: ManagedCluster,
    /// Mutating steps that committed, in order
    pub committed: Vec<UpdateStep>,
}

impl<'a> SagaContext<'a> {
    /// Start a saga from a fresh read
    pub fn new(desired: &'a DesiredSpec, observed: ObservedState, base: ManagedCluster) -> Self {
        Self {
            id: desired.id(),
            desired,
            observed,
            base,
            committed: Vec::new(),
        }
    }

    /// Sections the next cluster write would carry
    pub fn changed_sections(&self) -> Vec<ClusterSection> {
        changed_sections(self.desired, &self.observed.spec)
    }
}

/// Mutating steps that would run if the saga started from `observed`
///
/// Empty means the cluster has converged.
pub fn pending_mutations(desired: &DesiredSpec, observed: &ObservedState) -> Vec<UpdateStep> {
    let ctx = SagaContext::new(desired, observed.clone(), ManagedCluster::default());
    UPDATE_SAGA
        .into_iter()
        .filter(|step| step.mutates() && step.precondition(&ctx))
        .collect()
}
