//! Conversion between the caller's model and the remote wire model
//!
//! `expand_*` builds wire objects from a [`DesiredSpec`], `flatten` reads a
//! [`ManagedCluster`] back into an [`ObservedState`] with redacted secrets
//! backfilled from the [`SecretStore`].

use std::str::FromStr;

use convoy_common::types::{
    AgentPoolProfile, ApiServerAccessProfile, AutoScalerProfile, AutoScalerProfileProperties,
    ClusterId, DesiredSpec, IdentityProviderProfile, IdentityProviderSpec, ManagedCluster,
    ManagedClusterProperties, ManagedClusterSku, NodePoolSpec, ObservedState, PoolWriteMode,
    RbacSpec, ServicePrincipalProfile, ServicePrincipalSpec, SkuTier, WindowsProfile,
    WindowsProfileProperties, SYSTEM_POOL_MODE,
};
use convoy_common::Error;

use crate::node_pool::agent_pool_profile;
use crate::secrets::SecretStore;

/// SKU name every managed cluster is created with
const SKU_NAME: &str = "Basic";

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Full create payload for `desired`
pub fn expand_cluster(desired: &DesiredSpec) -> ManagedCluster {
    let mut pool = agent_pool_profile(&desired.default_node_pool, PoolWriteMode::Create);
    pool.mode = Some(SYSTEM_POOL_MODE.to_string());

    ManagedCluster {
        name: desired.name.clone(),
        location: desired.location.clone(),
        tags: desired.tags.clone(),
        sku: Some(expand_sku(None, desired.sku_tier)),
        properties: ManagedClusterProperties {
            kubernetes_version: non_empty(&desired.kubernetes_version),
            dns_prefix: non_empty(&desired.dns_prefix),
            node_resource_group: desired.node_resource_group.clone(),
            enable_rbac: Some(desired.role_based_access_control.enabled),
            enable_pod_security_policy: Some(desired.enable_pod_security_policy),
            identity_provider_profile: expand_identity_provider(&desired.role_based_access_control),
            addon_profiles: desired.addon_profiles.clone(),
            agent_pool_profiles: vec![pool],
            api_server_access_profile: expand_api_server_access(None, desired),
            linux_profile: desired.linux_profile.clone(),
            windows_profile: desired.windows_profile.as_ref().map(expand_windows_profile),
            network_profile: desired.network_profile.clone(),
            service_principal_profile: desired
                .service_principal
                .as_ref()
                .map(expand_service_principal),
            auto_scaler_profile: desired
                .auto_scaler_profile
                .as_ref()
                .map(|wanted| expand_auto_scaler_profile(None, wanted)),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Service principal block, secret included
pub fn expand_service_principal(sp: &ServicePrincipalSpec) -> ServicePrincipalProfile {
    ServicePrincipalProfile {
        client_id: sp.client_id.clone(),
        secret: non_empty(&sp.client_secret),
    }
}

pub(crate) fn expand_windows_profile(windows: &WindowsProfile) -> WindowsProfileProperties {
    WindowsProfileProperties {
        admin_username: windows.admin_username.clone(),
        admin_password: non_empty(&windows.admin_password),
    }
}

pub(crate) fn expand_identity_provider(rbac: &RbacSpec) -> Option<IdentityProviderProfile> {
    let idp = rbac.identity_provider.as_ref()?;
    let profile = if idp.managed {
        IdentityProviderProfile {
            managed: Some(true),
            tenant_id: idp.tenant_id.clone(),
            admin_group_object_ids: idp.admin_group_object_ids.iter().cloned().collect(),
            enable_provider_rbac: Some(idp.provider_rbac_enabled),
            ..Default::default()
        }
    } else {
        IdentityProviderProfile {
            managed: None,
            tenant_id: idp.tenant_id.clone(),
            client_app_id: non_empty(&idp.client_app_id),
            server_app_id: non_empty(&idp.server_app_id),
            server_app_secret: non_empty(&idp.server_app_secret),
            ..Default::default()
        }
    };
    Some(profile)
}

/// API server access block built on top of whatever the remote already has
pub(crate) fn expand_api_server_access(
    existing: Option<ApiServerAccessProfile>,
    desired: &DesiredSpec,
) -> Option<ApiServerAccessProfile> {
    let ranges: Vec<String> = desired.api_server_authorized_ip_ranges.iter().cloned().collect();
    match existing {
        Some(mut profile) => {
            profile.authorized_ip_ranges = ranges;
            Some(profile)
        }
        None if ranges.is_empty() => None,
        None => Some(ApiServerAccessProfile {
            authorized_ip_ranges: ranges,
            ..Default::default()
        }),
    }
}

/// SKU with `tier` set, keeping the name and anything else already there
pub(crate) fn expand_sku(existing: Option<ManagedClusterSku>, tier: SkuTier) -> ManagedClusterSku {
    let mut sku = existing.unwrap_or_default();
    sku.name.get_or_insert_with(|| SKU_NAME.to_string());
    sku.tier = Some(tier.as_str().to_string());
    sku
}

/// Autoscaler settings with the set fields of `wanted` written over `existing`
pub(crate) fn expand_auto_scaler_profile(
    existing: Option<AutoScalerProfileProperties>,
    wanted: &AutoScalerProfile,
) -> AutoScalerProfileProperties {
    fn set<T: ToString>(slot: &mut Option<String>, value: &Option<T>) {
        if let Some(value) = value {
            *slot = Some(value.to_string());
        }
    }

    let mut wire = existing.unwrap_or_default();
    set(&mut wire.balance_similar_node_groups, &wanted.balance_similar_node_groups);
    set(&mut wire.expander, &wanted.expander);
    set(&mut wire.max_empty_bulk_delete, &wanted.empty_bulk_delete_max);
    set(&mut wire.max_graceful_termination_sec, &wanted.max_graceful_termination_sec);
    set(&mut wire.max_node_provision_time, &wanted.max_node_provisioning_time);
    set(&mut wire.max_total_unready_percentage, &wanted.max_unready_percentage);
    set(&mut wire.new_pod_scale_up_delay, &wanted.new_pod_scale_up_delay);
    set(&mut wire.ok_total_unready_count, &wanted.max_unready_nodes);
    set(&mut wire.scan_interval, &wanted.scan_interval);
    set(&mut wire.scale_down_delay_after_add, &wanted.scale_down_delay_after_add);
    set(&mut wire.scale_down_delay_after_delete, &wanted.scale_down_delay_after_delete);
    set(&mut wire.scale_down_delay_after_failure, &wanted.scale_down_delay_after_failure);
    set(&mut wire.scale_down_unneeded_time, &wanted.scale_down_unneeded);
    set(&mut wire.scale_down_unready_time, &wanted.scale_down_unready);
    set(
        &mut wire.scale_down_utilization_threshold,
        &wanted.scale_down_utilization_threshold,
    );
    set(&mut wire.skip_nodes_with_local_storage, &wanted.skip_nodes_with_local_storage);
    set(&mut wire.skip_nodes_with_system_pods, &wanted.skip_nodes_with_system_pods);
    wire
}

fn flatten_auto_scaler_profile(wire: &AutoScalerProfileProperties) -> AutoScalerProfile {
    fn parse<T: FromStr>(value: &Option<String>) -> Option<T> {
        value.as_deref().and_then(|v| v.trim().parse().ok())
    }

    AutoScalerProfile {
        balance_similar_node_groups: parse(&wire.balance_similar_node_groups),
        expander: wire.expander.clone(),
        max_graceful_termination_sec: wire.max_graceful_termination_sec.clone(),
        max_node_provisioning_time: wire.max_node_provision_time.clone(),
        max_unready_nodes: parse(&wire.ok_total_unready_count),
        max_unready_percentage: wire.max_total_unready_percentage.clone(),
        new_pod_scale_up_delay: wire.new_pod_scale_up_delay.clone(),
        scan_interval: wire.scan_interval.clone(),
        scale_down_delay_after_add: wire.scale_down_delay_after_add.clone(),
        scale_down_delay_after_delete: wire.scale_down_delay_after_delete.clone(),
        scale_down_delay_after_failure: wire.scale_down_delay_after_failure.clone(),
        scale_down_unneeded: wire.scale_down_unneeded_time.clone(),
        scale_down_unready: wire.scale_down_unready_time.clone(),
        scale_down_utilization_threshold: wire.scale_down_utilization_threshold.clone(),
        empty_bulk_delete_max: parse(&wire.max_empty_bulk_delete),
        skip_nodes_with_local_storage: parse(&wire.skip_nodes_with_local_storage),
        skip_nodes_with_system_pods: parse(&wire.skip_nodes_with_system_pods),
    }
}

/// The default pool of a cluster
///
/// The pool named `name` when there is one, otherwise the first named pool
/// in System mode. A cluster carries user pools and extra system pools
/// alongside its default pool, so `name` should be given whenever it is
/// known.
pub fn default_pool<'a>(
    cluster: &'a ManagedCluster,
    name: Option<&str>,
) -> Option<&'a AgentPoolProfile> {
    let pools = &cluster.properties.agent_pool_profiles;
    name.and_then(|name| pools.iter().find(|p| p.name == name))
        .or_else(|| {
            pools
                .iter()
                .find(|p| p.mode.as_deref() == Some(SYSTEM_POOL_MODE) && !p.name.is_empty())
        })
}

/// Read an agent pool back into a node pool spec
pub fn flatten_node_pool(pool: &AgentPoolProfile) -> NodePoolSpec {
    NodePoolSpec {
        name: pool.name.clone(),
        vm_size: pool.vm_size.clone().unwrap_or_default(),
        node_count: pool.count,
        enable_auto_scaling: pool.enable_auto_scaling.unwrap_or(false),
        min_count: pool.min_count,
        max_count: pool.max_count,
        availability_zones: pool.availability_zones.iter().cloned().collect(),
        enable_node_public_ip: pool.enable_node_public_ip.unwrap_or(false),
        max_pods: pool.max_pods,
        os_disk_size_gb: pool.os_disk_size_gb,
        vnet_subnet_id: pool.vnet_subnet_id.clone(),
        node_labels: pool.node_labels.clone(),
        node_taints: pool.node_taints.clone(),
        orchestrator_version: pool.orchestrator_version.clone(),
    }
}

fn flatten_identity_provider(profile: &IdentityProviderProfile) -> IdentityProviderSpec {
    IdentityProviderSpec {
        managed: profile.managed.unwrap_or(false),
        tenant_id: profile.tenant_id.clone(),
        client_app_id: profile.client_app_id.clone().unwrap_or_default(),
        server_app_id: profile.server_app_id.clone().unwrap_or_default(),
        server_app_secret: profile.server_app_secret.clone().unwrap_or_default(),
        admin_group_object_ids: profile.admin_group_object_ids.iter().cloned().collect(),
        provider_rbac_enabled: profile.enable_provider_rbac.unwrap_or(false),
    }
}

/// Read the remote object back into the caller's model
///
/// `pool_name` picks the default pool (see [`default_pool`]). Write-only
/// secrets the remote redacted are backfilled from `secrets`.
pub fn flatten(
    id: &ClusterId,
    cluster: &ManagedCluster,
    pool_name: Option<&str>,
    secrets: &SecretStore,
) -> Result<ObservedState, Error> {
    let props = &cluster.properties;
    let pool = default_pool(cluster, pool_name).ok_or_else(|| {
        Error::remote_permanent(
            id.to_string(),
            match pool_name {
                Some(name) => format!(
                    "unable to determine the default agent pool: no pool named `{name}` and no system pool"
                ),
                None => "unable to determine the default agent pool: no system pool".to_string(),
            },
        )
    })?;

    let mut spec = DesiredSpec {
        name: if cluster.name.is_empty() {
            id.name.clone()
        } else {
            cluster.name.clone()
        },
        resource_group: id.resource_group.clone(),
        location: cluster.location.clone(),
        dns_prefix: props.dns_prefix.clone().unwrap_or_default(),
        kubernetes_version: props.kubernetes_version.clone().unwrap_or_default(),
        node_resource_group: props.node_resource_group.clone(),
        service_principal: props
            .service_principal_profile
            .as_ref()
            .filter(|sp| !sp.is_managed_identity())
            .map(|sp| ServicePrincipalSpec {
                client_id: sp.client_id.clone(),
                client_secret: sp.secret.clone().unwrap_or_default(),
            }),
        network_profile: props.network_profile.clone(),
        linux_profile: props.linux_profile.clone(),
        windows_profile: props.windows_profile.as_ref().map(|w| WindowsProfile {
            admin_username: w.admin_username.clone(),
            admin_password: w.admin_password.clone().unwrap_or_default(),
        }),
        addon_profiles: props.addon_profiles.clone(),
        api_server_authorized_ip_ranges: props
            .api_server_access_profile
            .as_ref()
            .map(|a| a.authorized_ip_ranges.iter().cloned().collect())
            .unwrap_or_default(),
        enable_pod_security_policy: props.enable_pod_security_policy.unwrap_or(false),
        role_based_access_control: RbacSpec {
            enabled: props.enable_rbac.unwrap_or(false),
            identity_provider: props
                .identity_provider_profile
                .as_ref()
                .map(flatten_identity_provider),
        },
        tags: cluster.tags.clone(),
        sku_tier: SkuTier::from_wire(cluster.sku.as_ref().and_then(|sku| sku.tier.as_deref())),
        auto_scaler_profile: props
            .auto_scaler_profile
            .as_ref()
            .map(flatten_auto_scaler_profile),
        default_node_pool: flatten_node_pool(pool),
    };
    secrets.backfill(&mut spec);

    Ok(ObservedState {
        spec,
        fqdn: props.fqdn.clone(),
        node_resource_group: props.node_resource_group.clone(),
        provisioning_state: props.provisioning_state.clone(),
    })
}
