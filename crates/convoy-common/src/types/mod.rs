//! Data model for managed clusters
//!
//! `cluster` and `node_pool` hold the caller-facing desired/observed model,
//! `remote` the wire shape exchanged with the managed-cluster service.

mod cluster;
mod credentials;
mod node_pool;
mod remote;

pub use cluster::{
    AddonProfile, AutoScalerProfile, ClusterId, ClusterPhase, DesiredSpec, IdentityProviderSpec,
    LinuxProfile, LoadBalancerProfile, NetworkProfile, ObservedState, RbacSpec,
    ServicePrincipalSpec, SkuTier, WindowsProfile, AUTO_SCALER_EXPANDERS,
};
pub use credentials::{CredentialBundle, CredentialKind};
pub use node_pool::{NodePoolSpec, PoolWriteMode};
pub use remote::{
    AgentPoolProfile, ApiServerAccessProfile, AutoScalerProfileProperties, IdentityProviderProfile,
    ManagedCluster, ManagedClusterProperties, ManagedClusterSku, ServicePrincipalProfile,
    WindowsProfileProperties, MANAGED_IDENTITY_CLIENT_ID, SYSTEM_POOL_MODE,
};
