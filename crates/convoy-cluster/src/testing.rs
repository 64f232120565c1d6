//! Shared fixtures for unit tests

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use convoy_common::types::{
    AddonProfile, AutoScalerProfile, DesiredSpec, IdentityProviderSpec, LinuxProfile,
    LoadBalancerProfile, NetworkProfile, NodePoolSpec, RbacSpec, ServicePrincipalSpec, SkuTier,
    WindowsProfile,
};
use convoy_common::Error;

use crate::client::{OperationHandle, OperationStatus};

/// An operation that is already terminal
pub(crate) struct FinishedOperation {
    description: String,
    status: OperationStatus,
}

#[async_trait]
impl OperationHandle for FinishedOperation {
    fn description(&self) -> String {
        self.description.clone()
    }

    async fn poll(&self) -> Result<OperationStatus, Error> {
        Ok(self.status.clone())
    }
}

pub(crate) fn completed(description: &str) -> Box<dyn OperationHandle> {
    finished(description, OperationStatus::Succeeded)
}

pub(crate) fn finished(description: &str, status: OperationStatus) -> Box<dyn OperationHandle> {
    Box::new(FinishedOperation {
        description: description.to_string(),
        status,
    })
}

/// A fully populated spec with every secret-bearing block present
pub(crate) fn sample_desired() -> DesiredSpec {
    DesiredSpec {
        name: "prod".to_string(),
        resource_group: "rg".to_string(),
        location: "westeurope".to_string(),
        dns_prefix: "prod".to_string(),
        kubernetes_version: "1.29.2".to_string(),
        node_resource_group: None,
        service_principal: Some(ServicePrincipalSpec {
            client_id: "app-id".to_string(),
            client_secret: "sp-secret".to_string(),
        }),
        network_profile: Some(NetworkProfile {
            network_plugin: "kubenet".to_string(),
            load_balancer_sku: Some("standard".to_string()),
            load_balancer_profile: Some(LoadBalancerProfile {
                managed_outbound_ip_count: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        }),
        linux_profile: Some(LinuxProfile {
            admin_username: "ops".to_string(),
            ssh_keys: vec!["ssh-ed25519 AAAA ops".to_string()],
        }),
        windows_profile: Some(WindowsProfile {
            admin_username: "winadmin".to_string(),
            admin_password: "win-password".to_string(),
        }),
        addon_profiles: BTreeMap::from([(
            "omsagent".to_string(),
            AddonProfile {
                enabled: true,
                config: BTreeMap::from([("logAnalyticsWorkspaceResourceID".to_string(), "ws".to_string())]),
            },
        )]),
        api_server_authorized_ip_ranges: BTreeSet::from(["10.0.0.0/8".to_string()]),
        enable_pod_security_policy: false,
        role_based_access_control: RbacSpec {
            enabled: true,
            identity_provider: Some(IdentityProviderSpec {
                client_app_id: "client-app".to_string(),
                server_app_id: "server-app".to_string(),
                server_app_secret: "idp-secret".to_string(),
                ..Default::default()
            }),
        },
        tags: BTreeMap::from([("env".to_string(), "prod".to_string())]),
        sku_tier: SkuTier::Free,
        auto_scaler_profile: Some(AutoScalerProfile {
            scan_interval: Some("10s".to_string()),
            max_unready_nodes: Some(3),
            ..Default::default()
        }),
        default_node_pool: NodePoolSpec {
            name: "default".to_string(),
            vm_size: "Standard_D2s_v3".to_string(),
            node_count: Some(3),
            ..Default::default()
        },
    }
}
