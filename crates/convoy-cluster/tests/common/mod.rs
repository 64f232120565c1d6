//! In-memory remote service for lifecycle tests
//!
//! Behaves like the managed cluster service as far as the reconciler can
//! observe: clusters are stored per identity, writes land when the operation
//! is accepted, reads redact write-only secrets, and credential listings
//! switch shape when an identity provider is configured.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use convoy_cluster::{
    ClusterReconciler, ManagedClusterApi, NodePoolApi, OperationHandle, OperationStatus,
    ReconcilerConfig,
};
use convoy_common::types::{
    AddonProfile, AgentPoolProfile, AutoScalerProfile, ClusterId, CredentialKind, DesiredSpec,
    IdentityProviderSpec, LinuxProfile, LoadBalancerProfile, ManagedCluster, NetworkProfile,
    NodePoolSpec, RbacSpec, ServicePrincipalProfile, ServicePrincipalSpec, SkuTier,
    WindowsProfile,
};
use convoy_common::Error;

// =============================================================================
// Fixtures
// =============================================================================

/// A spec with a service principal, windows profile and unmanaged identity provider
pub fn desired_spec() -> DesiredSpec {
    DesiredSpec {
        name: "payments".to_string(),
        resource_group: "team-rg".to_string(),
        location: "eastus".to_string(),
        dns_prefix: "payments".to_string(),
        kubernetes_version: "1.29.2".to_string(),
        node_resource_group: None,
        service_principal: Some(ServicePrincipalSpec {
            client_id: "sp-client".to_string(),
            client_secret: "sp-secret-1".to_string(),
        }),
        network_profile: Some(NetworkProfile {
            network_plugin: "azure".to_string(),
            load_balancer_sku: Some("standard".to_string()),
            load_balancer_profile: Some(LoadBalancerProfile {
                managed_outbound_ip_count: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        }),
        linux_profile: Some(LinuxProfile {
            admin_username: "azureuser".to_string(),
            ssh_keys: vec!["ssh-rsa AAAA payments".to_string()],
        }),
        windows_profile: Some(WindowsProfile {
            admin_username: "winadmin".to_string(),
            admin_password: "win-pass-1".to_string(),
        }),
        addon_profiles: BTreeMap::from([(
            "omsagent".to_string(),
            AddonProfile {
                enabled: true,
                config: BTreeMap::new(),
            },
        )]),
        api_server_authorized_ip_ranges: BTreeSet::new(),
        enable_pod_security_policy: false,
        role_based_access_control: RbacSpec {
            enabled: true,
            identity_provider: Some(IdentityProviderSpec {
                managed: false,
                tenant_id: Some("tenant".to_string()),
                client_app_id: "client-app".to_string(),
                server_app_id: "server-app".to_string(),
                server_app_secret: "idp-secret-1".to_string(),
                admin_group_object_ids: BTreeSet::new(),
                provider_rbac_enabled: false,
            }),
        },
        tags: BTreeMap::from([("owner".to_string(), "payments".to_string())]),
        sku_tier: SkuTier::Free,
        auto_scaler_profile: Some(AutoScalerProfile {
            max_node_provisioning_time: Some("15m".to_string()),
            max_unready_nodes: Some(3),
            ..Default::default()
        }),
        default_node_pool: NodePoolSpec {
            name: "system".to_string(),
            vm_size: "Standard_D4s_v3".to_string(),
            node_count: Some(3),
            ..Default::default()
        },
    }
}

/// Same spec without identity-provider integration
pub fn plain_spec() -> DesiredSpec {
    let mut spec = desired_spec();
    spec.role_based_access_control.identity_provider = None;
    spec
}

pub fn test_config() -> ReconcilerConfig {
    ReconcilerConfig {
        poll_interval_secs: 5,
        create_timeout_secs: 600,
        update_timeout_secs: 600,
        delete_timeout_secs: 600,
        read_timeout_secs: 60,
    }
}

pub fn reconciler(remote: &Arc<FakeRemote>) -> ClusterReconciler {
    ClusterReconciler::builder(remote.clone(), remote.clone())
        .config(test_config())
        .build()
}

// =============================================================================
// Fake remote
// =============================================================================

/// Remote calls that can be made to fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Call {
    WriteCluster,
    ResetServicePrincipal,
    Delete,
    WriteNodePool,
}

impl Call {
    fn name(self) -> &'static str {
        match self {
            Call::WriteCluster => "write cluster",
            Call::ResetServicePrincipal => "reset service principal",
            Call::Delete => "delete",
            Call::WriteNodePool => "write node pool",
        }
    }
}

/// Versions every agent pool may be moved to
pub const AVAILABLE_VERSIONS: [&str; 3] = ["1.28.5", "1.29.2", "1.30.0"];

#[derive(Default)]
struct State {
    clusters: BTreeMap<ClusterId, ManagedCluster>,
    log: Vec<String>,
    failures: HashMap<Call, String>,
}

/// Stateful in-memory managed cluster service
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<State>,
    polls_until_done: u32,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A remote whose operations report in progress `polls` times first
    pub fn slow(polls: u32) -> Arc<Self> {
        Arc::new(Self {
            polls_until_done: polls,
            ..Default::default()
        })
    }

    /// Make every `call` operation end in failure with `message`
    pub fn fail(&self, call: Call, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(call, message.to_string());
    }

    pub fn heal(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Unredacted remote object stored under `id`
    pub fn stored(&self, id: &ClusterId) -> Option<ManagedCluster> {
        self.state.lock().unwrap().clusters.get(id).cloned()
    }

    /// Identities of every stored cluster
    pub fn cluster_ids(&self) -> Vec<ClusterId> {
        self.state.lock().unwrap().clusters.keys().cloned().collect()
    }

    /// Change the remote behind the reconciler's back
    pub fn edit(&self, id: &ClusterId, f: impl FnOnce(&mut ManagedCluster)) {
        if let Some(cluster) = self.state.lock().unwrap().clusters.get_mut(id) {
            f(cluster);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Calls that change the remote
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("get") && !c.starts_with("list"))
            .collect()
    }

    pub fn clear_log(&self) {
        self.state.lock().unwrap().log.clear();
    }

    /// Log `call` and return the failure message if one is injected
    fn record(&self, call: Call, detail: String) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        state.log.push(detail);
        state.failures.get(&call).cloned()
    }

    fn handle(&self, call: Call, failure: Option<String>) -> Box<dyn OperationHandle> {
        let status = match failure {
            Some(message) => OperationStatus::Failed { message },
            None => OperationStatus::Succeeded,
        };
        Box::new(FakeOperation {
            description: call.name().to_string(),
            remaining: Mutex::new(self.polls_until_done),
            status,
        })
    }
}

struct FakeOperation {
    description: String,
    remaining: Mutex<u32>,
    status: OperationStatus,
}

#[async_trait]
impl OperationHandle for FakeOperation {
    fn description(&self) -> String {
        self.description.clone()
    }

    async fn poll(&self) -> Result<OperationStatus, Error> {
        let mut remaining = self.remaining.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Ok(OperationStatus::InProgress);
        }
        Ok(self.status.clone())
    }
}

fn redacted(mut cluster: ManagedCluster) -> ManagedCluster {
    let props = &mut cluster.properties;
    if let Some(sp) = props.service_principal_profile.as_mut() {
        sp.secret = None;
    }
    if let Some(w) = props.windows_profile.as_mut() {
        w.admin_password = None;
    }
    if let Some(idp) = props.identity_provider_profile.as_mut() {
        idp.server_app_secret = None;
    }
    cluster
}

/// Secrets omitted from a write keep their stored value
fn keep_unsent_secrets(current: &ManagedCluster, next: &mut ManagedCluster) {
    let (cur, props) = (&current.properties, &mut next.properties);
    if let (Some(old), Some(new)) = (
        cur.service_principal_profile.as_ref(),
        props.service_principal_profile.as_mut(),
    ) {
        if new.secret.is_none() {
            new.secret = old.secret.clone();
        }
    }
    if let (Some(old), Some(new)) = (cur.windows_profile.as_ref(), props.windows_profile.as_mut()) {
        if new.admin_password.is_none() {
            new.admin_password = old.admin_password.clone();
        }
    }
    if let (Some(old), Some(new)) = (
        cur.identity_provider_profile.as_ref(),
        props.identity_provider_profile.as_mut(),
    ) {
        if new.server_app_secret.is_none() {
            new.server_app_secret = old.server_app_secret.clone();
        }
    }
}

fn kubeconfig(cluster: &ManagedCluster, kind: CredentialKind) -> String {
    let server = format!(
        "https://{}:443",
        cluster.properties.fqdn.clone().unwrap_or_default()
    );
    let identity_integrated = cluster.properties.identity_provider_profile.is_some();
    let user = match (kind, identity_integrated) {
        (CredentialKind::User, true) => "    auth-provider:\n      name: azure\n      config:\n        apiserver-id: server-app\n        client-id: client-app\n        tenant-id: tenant\n".to_string(),
        _ => "    client-certificate-data: Y2VydA==\n    client-key-data: a2V5\n    token: t0ken\n".to_string(),
    };
    format!(
        "apiVersion: v1\nkind: Config\nclusters:\n- name: {name}\n  cluster:\n    server: {server}\n    certificate-authority-data: Y2E=\nusers:\n- name: {kind}_{name}\n  user:\n{user}",
        name = cluster.name,
    )
}

#[async_trait]
impl ManagedClusterApi for FakeRemote {
    async fn get(&self, id: &ClusterId) -> Result<Option<ManagedCluster>, Error> {
        let mut state = self.state.lock().unwrap();
        state.log.push("get".to_string());
        Ok(state.clusters.get(id).cloned().map(redacted))
    }

    async fn create_or_update(
        &self,
        id: &ClusterId,
        cluster: &ManagedCluster,
    ) -> Result<Box<dyn OperationHandle>, Error> {
        let version = cluster
            .properties
            .kubernetes_version
            .clone()
            .unwrap_or_default();
        let failure = self.record(Call::WriteCluster, format!("write cluster {version}"));
        if failure.is_none() {
            let mut state = self.state.lock().unwrap();
            let mut next = cluster.clone();
            next.name = id.name.clone();
            match state.clusters.get(id) {
                Some(current) => {
                    keep_unsent_secrets(current, &mut next);
                    next.properties.fqdn = current.properties.fqdn.clone();
                    next.properties.node_resource_group =
                        current.properties.node_resource_group.clone();
                }
                None => {
                    next.properties.fqdn = Some(format!("{}.hcp.{}.example", id.name, next.location));
                    next.properties.node_resource_group.get_or_insert_with(|| {
                        format!("MC_{}_{}_{}", id.resource_group, id.name, next.location)
                    });
                }
            }
            next.properties.provisioning_state = Some("Succeeded".to_string());
            state.clusters.insert(id.clone(), next);
        }
        Ok(self.handle(Call::WriteCluster, failure))
    }

    async fn reset_service_principal(
        &self,
        id: &ClusterId,
        profile: &ServicePrincipalProfile,
    ) -> Result<Box<dyn OperationHandle>, Error> {
        let failure = self.record(
            Call::ResetServicePrincipal,
            "reset service principal".to_string(),
        );
        if failure.is_none() {
            let mut state = self.state.lock().unwrap();
            if let Some(cluster) = state.clusters.get_mut(id) {
                cluster.properties.service_principal_profile = Some(profile.clone());
            }
        }
        Ok(self.handle(Call::ResetServicePrincipal, failure))
    }

    async fn delete(&self, id: &ClusterId) -> Result<Box<dyn OperationHandle>, Error> {
        let failure = self.record(Call::Delete, "delete".to_string());
        let mut state = self.state.lock().unwrap();
        if !state.clusters.contains_key(id) {
            return Err(Error::not_found(id.to_string()));
        }
        if failure.is_none() {
            state.clusters.remove(id);
        }
        drop(state);
        Ok(self.handle(Call::Delete, failure))
    }

    async fn list_credentials(
        &self,
        id: &ClusterId,
        kind: CredentialKind,
    ) -> Result<Vec<u8>, Error> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("list {kind}"));
        let cluster = state
            .clusters
            .get(id)
            .ok_or_else(|| Error::not_found(id.to_string()))?;
        Ok(kubeconfig(cluster, kind).into_bytes())
    }
}

#[async_trait]
impl NodePoolApi for FakeRemote {
    async fn create_or_update(
        &self,
        id: &ClusterId,
        pool_name: &str,
        pool: &AgentPoolProfile,
    ) -> Result<Box<dyn OperationHandle>, Error> {
        let failure = self.record(
            Call::WriteNodePool,
            format!("write node pool {pool_name} count={:?}", pool.count),
        );
        if failure.is_none() {
            let mut state = self.state.lock().unwrap();
            let cluster = state
                .clusters
                .get_mut(id)
                .ok_or_else(|| Error::not_found(id.to_string()))?;
            let pools = &mut cluster.properties.agent_pool_profiles;
            let mut next = pool.clone();
            next.name = pool_name.to_string();
            match pools.iter_mut().find(|p| p.name == pool_name) {
                Some(existing) => {
                    if next.count.is_none() {
                        next.count = existing.count;
                    }
                    *existing = next;
                }
                None => pools.push(next),
            }
        }
        Ok(self.handle(Call::WriteNodePool, failure))
    }

    async fn available_versions(&self, id: &ClusterId) -> Result<Vec<String>, Error> {
        let mut state = self.state.lock().unwrap();
        state.log.push("list node pool versions".to_string());
        if !state.clusters.contains_key(id) {
            return Err(Error::not_found(id.to_string()));
        }
        Ok(AVAILABLE_VERSIONS.iter().map(|v| v.to_string()).collect())
    }
}
