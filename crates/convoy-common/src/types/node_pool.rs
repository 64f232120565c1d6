//! Default node pool settings and scaling rules

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Whether a node pool write creates the pool or changes an existing one
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolWriteMode {
    /// The pool does not exist yet
    Create,
    /// The pool exists and is being changed in place
    Update,
}

/// Desired configuration of the cluster's default node pool
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolSpec {
    /// Pool name
    pub name: String,
    /// VM size of every node
    pub vm_size: String,
    /// Fixed node count, or the initial count when autoscaling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,
    /// Let the service scale the pool between `min_count` and `max_count`
    #[serde(default)]
    pub enable_auto_scaling: bool,
    /// Lower scaling bound (autoscaling only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_count: Option<u32>,
    /// Upper scaling bound (autoscaling only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u32>,
    /// Availability zones
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub availability_zones: BTreeSet<String>,
    /// Assign a public IP to every node
    #[serde(default)]
    pub enable_node_public_ip: bool,
    /// Maximum pods per node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pods: Option<u32>,
    /// OS disk size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_disk_size_gb: Option<u32>,
    /// Subnet the nodes join
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnet_subnet_id: Option<String>,
    /// Kubernetes labels applied to every node
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_labels: BTreeMap<String, String>,
    /// Kubernetes taints applied to every node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_taints: Vec<String>,
    /// Kubernetes version of the pool; follows the control plane when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_version: Option<String>,
}

impl NodePoolSpec {
    /// Node count to send to the remote service
    ///
    /// With autoscaling on and no explicit count, the pool starts at
    /// `min_count`.
    pub fn effective_node_count(&self) -> Option<u32> {
        match (self.enable_auto_scaling, self.node_count) {
            (true, None) => self.min_count,
            (_, count) => count,
        }
    }

    /// Validate scaling bounds for the given write mode
    pub fn validate(&self, mode: PoolWriteMode) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::validation_for_field(
                crate::error::UNKNOWN_CONTEXT,
                "default_node_pool.name",
                "node pool name must not be empty",
            ));
        }
        if self.vm_size.trim().is_empty() {
            return Err(Error::validation_for_field(
                crate::error::UNKNOWN_CONTEXT,
                "default_node_pool.vm_size",
                "node pool vm size must not be empty",
            ));
        }

        let bounds = |msg: String| Error::invalid_scaling_bounds(&self.name, msg);

        if !self.enable_auto_scaling {
            if self.min_count.is_some() || self.max_count.is_some() {
                return Err(bounds(
                    "min_count and max_count must be unset when autoscaling is disabled".to_string(),
                ));
            }
            return match self.node_count {
                Some(_) => Ok(()),
                None => Err(bounds(
                    "node_count is required when autoscaling is disabled".to_string(),
                )),
            };
        }

        let (Some(min), Some(max)) = (self.min_count, self.max_count) else {
            return Err(bounds(
                "min_count and max_count are required when autoscaling is enabled".to_string(),
            ));
        };
        if min > max {
            return Err(bounds(format!(
                "min_count ({min}) must be less than or equal to max_count ({max})"
            )));
        }

        if let Some(count) = self.effective_node_count() {
            if count > max {
                return Err(bounds(format!(
                    "node_count ({count}) must be less than or equal to max_count ({max})"
                )));
            }
            if mode == PoolWriteMode::Create && count < min {
                return Err(bounds(format!(
                    "node_count ({count}) must be greater than or equal to min_count ({min})"
                )));
            }
        }
        Ok(())
    }

    /// Whether an in-place write is needed to move `observed` to this spec
    ///
    /// The node count is ignored while autoscaling, since the service owns it.
    pub fn differs_from(&self, observed: &NodePoolSpec) -> bool {
        let mut desired = self.normalized();
        let mut current = observed.normalized();
        if desired.enable_auto_scaling && current.enable_auto_scaling {
            desired.node_count = None;
            current.node_count = None;
        }
        if desired.orchestrator_version.is_none() {
            current.orchestrator_version = None;
        }
        desired != current
    }

    /// Replace-only fields that differ from `observed`
    pub fn replacement_fields(&self, observed: &NodePoolSpec) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name != observed.name {
            fields.push("default_node_pool.name");
        }
        if !self.vm_size.eq_ignore_ascii_case(&observed.vm_size) {
            fields.push("default_node_pool.vm_size");
        }
        if self.availability_zones != observed.availability_zones {
            fields.push("default_node_pool.availability_zones");
        }
        if self.enable_node_public_ip != observed.enable_node_public_ip {
            fields.push("default_node_pool.enable_node_public_ip");
        }
        if self.max_pods.is_some() && self.max_pods != observed.max_pods {
            fields.push("default_node_pool.max_pods");
        }
        if self.os_disk_size_gb.is_some() && self.os_disk_size_gb != observed.os_disk_size_gb {
            fields.push("default_node_pool.os_disk_size_gb");
        }
        if self.vnet_subnet_id.is_some() && self.vnet_subnet_id != observed.vnet_subnet_id {
            fields.push("default_node_pool.vnet_subnet_id");
        }
        fields
    }

    fn normalized(&self) -> NodePoolSpec {
        NodePoolSpec {
            node_count: self.effective_node_count(),
            vm_size: self.vm_size.to_ascii_lowercase(),
            ..self.clone()
        }
    }
}
