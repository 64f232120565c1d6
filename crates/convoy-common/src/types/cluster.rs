//! Desired and observed cluster configuration

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::node_pool::{NodePoolSpec, PoolWriteMode};
use crate::Error;

/// Identity of a managed cluster within the remote service
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterId {
    /// Resource group (container) the cluster lives in
    pub resource_group: String,
    /// Cluster name
    pub name: String,
}

impl ClusterId {
    /// Create a new cluster identity
    pub fn new(resource_group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resourceGroups/{}/managedClusters/{}",
            self.resource_group, self.name
        )
    }
}

/// Lifecycle phase of a managed cluster
///
/// `Absent -> Creating -> Ready`, `Ready -> Updating -> Ready` and
/// `Ready -> Deleting -> Absent`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ClusterPhase {
    /// No remote object exists
    #[default]
    Absent,
    /// The create operation is in flight
    Creating,
    /// The remote object has converged
    Ready,
    /// An update sequence is in flight
    Updating,
    /// The delete operation is in flight
    Deleting,
}

impl ClusterPhase {
    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(self, next: ClusterPhase) -> bool {
        use ClusterPhase::*;
        matches!(
            (self, next),
            (Absent, Creating)
                | (Creating, Ready)
                | (Ready, Updating)
                | (Updating, Ready)
                | (Ready, Deleting)
                | (Deleting, Absent)
        )
    }
}

impl fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Service principal used by the cluster to manage cloud resources
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipalSpec {
    /// Application (client) id
    pub client_id: String,
    /// Client secret; write-only on the remote side
    #[serde(default)]
    pub client_secret: String,
}

/// Add-on configuration keyed by add-on name
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddonProfile {
    /// Whether the add-on is enabled
    pub enabled: bool,
    /// Add-on specific settings
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

/// SSH access for Linux nodes
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinuxProfile {
    /// Admin user created on every Linux node
    pub admin_username: String,
    /// Public SSH keys authorised for the admin user
    #[serde(default)]
    pub ssh_keys: Vec<String>,
}

/// Admin credentials for Windows nodes
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WindowsProfile {
    /// Admin user created on every Windows node
    pub admin_username: String,
    /// Admin password; write-only on the remote side
    #[serde(default)]
    pub admin_password: String,
}

/// Outbound load balancer settings
///
/// At most one of `managed_outbound_ip_count`, `outbound_ip_address_ids`
/// and `outbound_ip_prefix_ids` may be set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerProfile {
    /// Number of IPs the service manages for egress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_outbound_ip_count: Option<u32>,
    /// Caller-owned public IP ids used for egress
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outbound_ip_address_ids: Vec<String>,
    /// Caller-owned public IP prefix ids used for egress
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outbound_ip_prefix_ids: Vec<String>,
    /// Idle timeout for outbound flows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_in_minutes: Option<u32>,
    /// SNAT ports allocated per node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound_ports_allocated: Option<u32>,
}

impl LoadBalancerProfile {
    fn outbound_settings(&self) -> usize {
        usize::from(self.managed_outbound_ip_count.is_some())
            + usize::from(!self.outbound_ip_address_ids.is_empty())
            + usize::from(!self.outbound_ip_prefix_ids.is_empty())
    }
}

/// Cluster networking
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    /// CNI plugin (e.g. "kubenet")
    pub network_plugin: String,
    /// Network policy engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_policy: Option<String>,
    /// Cluster DNS service IP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_service_ip: Option<String>,
    /// Docker bridge CIDR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_bridge_cidr: Option<String>,
    /// Pod CIDR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_cidr: Option<String>,
    /// Service CIDR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_cidr: Option<String>,
    /// Load balancer SKU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_sku: Option<String>,
    /// Egress routing type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound_type: Option<String>,
    /// Outbound load balancer settings; the only in-place updatable part
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_profile: Option<LoadBalancerProfile>,
}

impl NetworkProfile {
    /// Everything except the load balancer profile, which changes in place
    pub(crate) fn replace_only_view(&self) -> NetworkProfile {
        NetworkProfile {
            load_balancer_profile: None,
            ..self.clone()
        }
    }
}

/// Service tier of the control plane
///
/// Upgrading to `Paid` happens in place; going back to `Free` replaces the
/// cluster.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize, JsonSchema,
)]
pub enum SkuTier {
    /// No uptime SLA
    #[default]
    Free,
    /// Uptime SLA
    Paid,
}

impl SkuTier {
    /// Wire value of the tier
    pub fn as_str(self) -> &'static str {
        match self {
            SkuTier::Free => "Free",
            SkuTier::Paid => "Paid",
        }
    }

    /// Tier reported by the remote; anything but `Paid` reads as `Free`
    pub fn from_wire(tier: Option<&str>) -> Self {
        match tier {
            Some(t) if t.eq_ignore_ascii_case("paid") => SkuTier::Paid,
            _ => SkuTier::Free,
        }
    }
}

impl fmt::Display for SkuTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster autoscaler tuning
///
/// Unset fields keep whatever the remote currently uses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoScalerProfile {
    /// Balance node counts across similar node groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_similar_node_groups: Option<bool>,
    /// Expander strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expander: Option<String>,
    /// Seconds to wait for graceful pod termination on scale down
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_graceful_termination_sec: Option<String>,
    /// Time to wait for a node to provision (e.g. "15m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_node_provisioning_time: Option<String>,
    /// Unready nodes tolerated before scaling stops
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unready_nodes: Option<u32>,
    /// Percentage of unready nodes tolerated before scaling stops (0 to 100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unready_percentage: Option<String>,
    /// Ignore pods younger than this when scaling up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_pod_scale_up_delay: Option<String>,
    /// How often the cluster is evaluated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_interval: Option<String>,
    /// Scale down cool-off after a scale up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_delay_after_add: Option<String>,
    /// Scale down cool-off after a node deletion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_delay_after_delete: Option<String>,
    /// Scale down cool-off after a failed scale down
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_delay_after_failure: Option<String>,
    /// How long a node is unneeded before it is removed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_unneeded: Option<String>,
    /// How long an unready node is unneeded before it is removed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_unready: Option<String>,
    /// Utilisation below which a node counts as unneeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_utilization_threshold: Option<String>,
    /// Empty nodes deleted at once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_bulk_delete_max: Option<u32>,
    /// Never remove nodes running pods with local storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_nodes_with_local_storage: Option<bool>,
    /// Never remove nodes running kube-system pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_nodes_with_system_pods: Option<bool>,
}

/// Expander strategies the remote accepts
pub const AUTO_SCALER_EXPANDERS: [&str; 4] = ["least-waste", "most-pods", "priority", "random"];

impl AutoScalerProfile {
    /// `self` with every field set in `wanted` overwritten
    pub fn overlay(&self, wanted: &AutoScalerProfile) -> AutoScalerProfile {
        fn pick<T: Clone>(wanted: &Option<T>, current: &Option<T>) -> Option<T> {
            wanted.clone().or_else(|| current.clone())
        }

        AutoScalerProfile {
            balance_similar_node_groups: pick(
                &wanted.balance_similar_node_groups,
                &self.balance_similar_node_groups,
            ),
            expander: pick(&wanted.expander, &self.expander),
            max_graceful_termination_sec: pick(
                &wanted.max_graceful_termination_sec,
                &self.max_graceful_termination_sec,
            ),
            max_node_provisioning_time: pick(
                &wanted.max_node_provisioning_time,
                &self.max_node_provisioning_time,
            ),
            max_unready_nodes: pick(&wanted.max_unready_nodes, &self.max_unready_nodes),
            max_unready_percentage: pick(&wanted.max_unready_percentage, &self.max_unready_percentage),
            new_pod_scale_up_delay: pick(&wanted.new_pod_scale_up_delay, &self.new_pod_scale_up_delay),
            scan_interval: pick(&wanted.scan_interval, &self.scan_interval),
            scale_down_delay_after_add: pick(
                &wanted.scale_down_delay_after_add,
                &self.scale_down_delay_after_add,
            ),
            scale_down_delay_after_delete: pick(
                &wanted.scale_down_delay_after_delete,
                &self.scale_down_delay_after_delete,
            ),
            scale_down_delay_after_failure: pick(
                &wanted.scale_down_delay_after_failure,
                &self.scale_down_delay_after_failure,
            ),
            scale_down_unneeded: pick(&wanted.scale_down_unneeded, &self.scale_down_unneeded),
            scale_down_unready: pick(&wanted.scale_down_unready, &self.scale_down_unready),
            scale_down_utilization_threshold: pick(
                &wanted.scale_down_utilization_threshold,
                &self.scale_down_utilization_threshold,
            ),
            empty_bulk_delete_max: pick(&wanted.empty_bulk_delete_max, &self.empty_bulk_delete_max),
            skip_nodes_with_local_storage: pick(
                &wanted.skip_nodes_with_local_storage,
                &self.skip_nodes_with_local_storage,
            ),
            skip_nodes_with_system_pods: pick(
                &wanted.skip_nodes_with_system_pods,
                &self.skip_nodes_with_system_pods,
            ),
        }
    }

    fn validate(&self, cluster: &str) -> Result<(), Error> {
        if let Some(expander) = &self.expander {
            if !AUTO_SCALER_EXPANDERS.contains(&expander.as_str()) {
                return Err(Error::validation_for_field(
                    cluster,
                    "auto_scaler_profile.expander",
                    format!(
                        "unknown expander `{expander}`, expected one of {}",
                        AUTO_SCALER_EXPANDERS.join(", ")
                    ),
                ));
            }
        }
        if let Some(pct) = &self.max_unready_percentage {
            match pct.trim().parse::<f64>() {
                Ok(v) if (0.0..=100.0).contains(&v) => {}
                _ => {
                    return Err(Error::validation_for_field(
                        cluster,
                        "auto_scaler_profile.max_unready_percentage",
                        format!("`{pct}` is not a percentage between 0 and 100"),
                    ))
                }
            }
        }
        if let Some(threshold) = &self.scale_down_utilization_threshold {
            if threshold.trim().parse::<f64>().is_err() {
                return Err(Error::validation_for_field(
                    cluster,
                    "auto_scaler_profile.scale_down_utilization_threshold",
                    format!("scale down utilization threshold `{threshold}` is not a number"),
                ));
            }
        }
        Ok(())
    }
}

/// Identity-provider integration for Kubernetes RBAC
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProviderSpec {
    /// Whether the integration is managed by the service
    #[serde(default)]
    pub managed: bool,
    /// Tenant of the identity provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Client application id (unmanaged only)
    #[serde(default)]
    pub client_app_id: String,
    /// Server application id (unmanaged only)
    #[serde(default)]
    pub server_app_id: String,
    /// Server application secret (unmanaged only); write-only on the remote side
    #[serde(default)]
    pub server_app_secret: String,
    /// Groups granted cluster admin (managed only)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub admin_group_object_ids: BTreeSet<String>,
    /// Authorise Kubernetes requests against the provider's RBAC (managed only)
    #[serde(default)]
    pub provider_rbac_enabled: bool,
}

/// Role-based access control
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RbacSpec {
    /// Whether Kubernetes RBAC is enabled; changing it replaces the cluster
    pub enabled: bool,
    /// At most one identity-provider integration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_provider: Option<IdentityProviderSpec>,
}

/// The user-declared target configuration for one cluster
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DesiredSpec {
    /// Cluster name
    pub name: String,
    /// Resource group (container) the cluster lives in
    pub resource_group: String,
    /// Region
    pub location: String,
    /// DNS prefix for the API server FQDN
    pub dns_prefix: String,
    /// Kubernetes version of the control plane
    pub kubernetes_version: String,
    /// Resource group for node infrastructure; computed when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_resource_group: Option<String>,
    /// Service principal; absent when the cluster uses a managed identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_principal: Option<ServicePrincipalSpec>,
    /// Networking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_profile: Option<NetworkProfile>,
    /// Linux node access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux_profile: Option<LinuxProfile>,
    /// Windows node access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows_profile: Option<WindowsProfile>,
    /// Add-ons keyed by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub addon_profiles: BTreeMap<String, AddonProfile>,
    /// CIDRs allowed to reach the API server
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub api_server_authorized_ip_ranges: BTreeSet<String>,
    /// Pod security policy admission
    #[serde(default)]
    pub enable_pod_security_policy: bool,
    /// Role-based access control
    #[serde(default)]
    pub role_based_access_control: RbacSpec,
    /// Tags applied to the cluster object
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Control plane service tier
    #[serde(default)]
    pub sku_tier: SkuTier,
    /// Cluster autoscaler tuning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scaler_profile: Option<AutoScalerProfile>,
    /// The default node pool
    pub default_node_pool: NodePoolSpec,
}

impl DesiredSpec {
    /// Identity of the remote object this spec describes
    pub fn id(&self) -> ClusterId {
        ClusterId::new(&self.resource_group, &self.name)
    }

    /// Validate the desired state before any remote call
    ///
    /// `mode` selects the node pool rules that depend on whether the pool is
    /// being created or updated.
    pub fn validate(&self, mode: PoolWriteMode) -> Result<(), Error> {
        let cluster = self.id().to_string();

        for (field, value) in [
            ("name", &self.name),
            ("resource_group", &self.resource_group),
            ("location", &self.location),
            ("dns_prefix", &self.dns_prefix),
        ] {
            if value.trim().is_empty() {
                return Err(Error::validation_for_field(
                    &cluster,
                    field,
                    format!("`{field}` must not be empty"),
                ));
            }
        }

        if let Some(sp) = &self.service_principal {
            if sp.client_id.is_empty() {
                return Err(Error::validation_for_field(
                    &cluster,
                    "service_principal.client_id",
                    "a service principal requires a client id",
                ));
            }
        }

        if let Some(lb) = self
            .network_profile
            .as_ref()
            .and_then(|n| n.load_balancer_profile.as_ref())
        {
            if lb.outbound_settings() > 1 {
                return Err(Error::validation_for_field(
                    &cluster,
                    "network_profile.load_balancer_profile",
                    "only one of managed outbound IP count, outbound IP ids or outbound IP prefix ids may be set",
                ));
            }
        }

        if let Some(idp) = &self.role_based_access_control.identity_provider {
            validate_identity_provider(&cluster, idp)?;
        }

        if let Some(profile) = &self.auto_scaler_profile {
            profile.validate(&cluster)?;
        }

        self.default_node_pool.validate(mode)
    }
}

fn validate_identity_provider(cluster: &str, idp: &IdentityProviderSpec) -> Result<(), Error> {
    const FIELD: &str = "role_based_access_control.identity_provider";

    if idp.managed {
        if !idp.client_app_id.is_empty()
            || !idp.server_app_id.is_empty()
            || !idp.server_app_secret.is_empty()
        {
            return Err(Error::validation_for_field(
                cluster,
                FIELD,
                "client app id, server app id and server app secret cannot be set for a managed integration",
            ));
        }
        return Ok(());
    }

    if !idp.admin_group_object_ids.is_empty() {
        return Err(Error::validation_for_field(
            cluster,
            FIELD,
            "admin group object ids require a managed integration",
        ));
    }
    if idp.client_app_id.is_empty() || idp.server_app_id.is_empty() || idp.server_app_secret.is_empty() {
        return Err(Error::validation_for_field(
            cluster,
            FIELD,
            "an unmanaged integration requires client app id, server app id and server app secret",
        ));
    }
    if idp.provider_rbac_enabled {
        return Err(Error::validation_for_field(
            cluster,
            FIELD,
            "provider RBAC requires a managed integration",
        ));
    }
    Ok(())
}

/// The last state read back from the remote control plane
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedState {
    /// Configuration as read, with write-only secrets backfilled
    pub spec: DesiredSpec,
    /// Fully-qualified domain name of the API server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    /// Resource group holding node infrastructure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_resource_group: Option<String>,
    /// Remote provisioning status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

impl ObservedState {
    /// Identity of the observed remote object
    pub fn id(&self) -> ClusterId {
        self.spec.id()
    }

    /// Replace-only fields that differ between `desired` and this state
    ///
    /// A non-empty result means the remote object cannot converge in place
    /// and must be deleted and recreated.
    pub fn replacement_fields(&self, desired: &DesiredSpec) -> Vec<&'static str> {
        let observed = &self.spec;
        let mut fields = Vec::new();

        if desired.name != observed.name {
            fields.push("name");
        }
        if desired.resource_group != observed.resource_group {
            fields.push("resource_group");
        }
        if !desired.location.eq_ignore_ascii_case(&observed.location) {
            fields.push("location");
        }
        if desired.dns_prefix != observed.dns_prefix {
            fields.push("dns_prefix");
        }
        if let Some(wanted) = &desired.node_resource_group {
            if self.node_resource_group.as_ref() != Some(wanted) {
                fields.push("node_resource_group");
            }
        }
        let desired_network = desired.network_profile.as_ref().map(NetworkProfile::replace_only_view);
        let observed_network = observed.network_profile.as_ref().map(NetworkProfile::replace_only_view);
        if desired_network.is_some() && desired_network != observed_network {
            fields.push("network_profile");
        }
        if desired.role_based_access_control.enabled != observed.role_based_access_control.enabled {
            fields.push("role_based_access_control.enabled");
        }
        if desired.sku_tier < observed.sku_tier {
            fields.push("sku_tier");
        }
        fields.extend(
            desired
                .default_node_pool
                .replacement_fields(&observed.default_node_pool),
        );
        fields
    }
}
