//! Wire model of the remote managed-cluster resource
//!
//! Every object keeps unknown properties in a flattened `additional` map so
//! a read-modify-write cycle never drops fields this crate does not model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::cluster::{AddonProfile, LinuxProfile, NetworkProfile};

/// Client id reported when the cluster runs with a managed identity
pub const MANAGED_IDENTITY_CLIENT_ID: &str = "msi";

/// Agent pool mode of the default (system) pool
pub const SYSTEM_POOL_MODE: &str = "System";

/// A managed cluster as exchanged with the remote service
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedCluster {
    /// Full resource id, assigned by the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Cluster name
    #[serde(default)]
    pub name: String,
    /// Region
    #[serde(default)]
    pub location: String,
    /// Resource tags
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Service SKU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<ManagedClusterSku>,
    /// Cluster properties
    #[serde(default)]
    pub properties: ManagedClusterProperties,
    /// Properties not modelled here
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

/// Properties block of [`ManagedCluster`]
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterProperties {
    /// Provisioning status reported by the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    /// Control plane version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
    /// DNS prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_prefix: Option<String>,
    /// API server FQDN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    /// Resource group holding node infrastructure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_resource_group: Option<String>,
    /// Kubernetes RBAC
    #[serde(default, rename = "enableRBAC", skip_serializing_if = "Option::is_none")]
    pub enable_rbac: Option<bool>,
    /// Pod security policy admission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_pod_security_policy: Option<bool>,
    /// Identity-provider integration
    #[serde(default, rename = "aadProfile", skip_serializing_if = "Option::is_none")]
    pub identity_provider_profile: Option<IdentityProviderProfile>,
    /// Add-ons keyed by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub addon_profiles: BTreeMap<String, AddonProfile>,
    /// Agent pools embedded in the cluster object
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_pool_profiles: Vec<AgentPoolProfile>,
    /// API server access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_server_access_profile: Option<ApiServerAccessProfile>,
    /// Linux node access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux_profile: Option<LinuxProfile>,
    /// Windows node access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows_profile: Option<WindowsProfileProperties>,
    /// Networking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_profile: Option<NetworkProfile>,
    /// Service principal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_principal_profile: Option<ServicePrincipalProfile>,
    /// Cluster autoscaler tuning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scaler_profile: Option<AutoScalerProfileProperties>,
    /// Properties not modelled here
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

/// SKU of the cluster object
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSku {
    /// SKU name, "Basic" for every current cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// "Free" or "Paid"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    /// Properties not modelled here
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

/// Cluster autoscaler tuning as exchanged with the remote service
///
/// The service keys every setting in kebab-case and carries every value,
/// numbers and flags included, as a string.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AutoScalerProfileProperties {
    /// Balance similar node groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_similar_node_groups: Option<String>,
    /// Expander strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expander: Option<String>,
    /// Empty nodes deleted at once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_empty_bulk_delete: Option<String>,
    /// Graceful termination wait in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_graceful_termination_sec: Option<String>,
    /// Node provisioning wait
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_node_provision_time: Option<String>,
    /// Unready percentage tolerated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total_unready_percentage: Option<String>,
    /// Pod age ignored on scale up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_pod_scale_up_delay: Option<String>,
    /// Unready nodes tolerated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok_total_unready_count: Option<String>,
    /// Evaluation interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_interval: Option<String>,
    /// Cool-off after scale up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_delay_after_add: Option<String>,
    /// Cool-off after deletion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_delay_after_delete: Option<String>,
    /// Cool-off after failed scale down
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_delay_after_failure: Option<String>,
    /// Unneeded time before removal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_unneeded_time: Option<String>,
    /// Unready time before removal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_unready_time: Option<String>,
    /// Utilisation threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_utilization_threshold: Option<String>,
    /// Keep nodes with local storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_nodes_with_local_storage: Option<String>,
    /// Keep nodes with kube-system pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_nodes_with_system_pods: Option<String>,
    /// Settings not modelled here
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

/// Service principal as exchanged with the remote service
///
/// The secret is write-only and comes back empty on reads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipalProfile {
    /// Application (client) id
    pub client_id: String,
    /// Client secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl ServicePrincipalProfile {
    /// Whether this profile stands for a managed identity rather than a real principal
    pub fn is_managed_identity(&self) -> bool {
        self.client_id == MANAGED_IDENTITY_CLIENT_ID
    }
}

/// Windows profile as exchanged with the remote service
///
/// The password is write-only and comes back empty on reads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowsProfileProperties {
    /// Admin user
    pub admin_username: String,
    /// Admin password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<String>,
}

/// Identity-provider integration as exchanged with the remote service
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProviderProfile {
    /// Managed integration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed: Option<bool>,
    /// Tenant
    #[serde(default, rename = "tenantID", skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Client application id
    #[serde(default, rename = "clientAppID", skip_serializing_if = "Option::is_none")]
    pub client_app_id: Option<String>,
    /// Server application id
    #[serde(default, rename = "serverAppID", skip_serializing_if = "Option::is_none")]
    pub server_app_id: Option<String>,
    /// Server application secret; write-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_app_secret: Option<String>,
    /// Groups granted cluster admin
    #[serde(default, rename = "adminGroupObjectIDs", skip_serializing_if = "Vec::is_empty")]
    pub admin_group_object_ids: Vec<String>,
    /// Provider RBAC authorisation
    #[serde(default, rename = "enableAzureRBAC", skip_serializing_if = "Option::is_none")]
    pub enable_provider_rbac: Option<bool>,
}

/// API server access as exchanged with the remote service
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiServerAccessProfile {
    /// CIDRs allowed to reach the API server
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorized_ip_ranges: Vec<String>,
    /// Properties not modelled here (e.g. private cluster settings)
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

/// An agent pool, both embedded in the cluster and on the node pool API
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolProfile {
    /// Pool name
    #[serde(default)]
    pub name: String,
    /// Current or requested node count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// VM size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_size: Option<String>,
    /// Autoscaling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_auto_scaling: Option<bool>,
    /// Lower scaling bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_count: Option<u32>,
    /// Upper scaling bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u32>,
    /// Availability zones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub availability_zones: Vec<String>,
    /// Public IP per node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_node_public_ip: Option<bool>,
    /// Maximum pods per node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pods: Option<u32>,
    /// OS disk size
    #[serde(default, rename = "osDiskSizeGB", skip_serializing_if = "Option::is_none")]
    pub os_disk_size_gb: Option<u32>,
    /// Node subnet
    #[serde(default, rename = "vnetSubnetID", skip_serializing_if = "Option::is_none")]
    pub vnet_subnet_id: Option<String>,
    /// Node labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_labels: BTreeMap<String, String>,
    /// Node taints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_taints: Vec<String>,
    /// Pool Kubernetes version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_version: Option<String>,
    /// Pool mode ("System" for the default pool)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Node OS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
    /// Provisioning status reported by the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    /// Properties not modelled here
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}
