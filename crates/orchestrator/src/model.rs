//! Tenant-facing cluster model.
//!
//! These are the shapes persisted in the state store and returned to callers.
//! They are provider independent: every provider-native identifier has already
//! been reduced to its system id by the translator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Literal used for "let the provider choose" on disk type, disk size and image.
pub const DEFAULT_LITERAL: &str = "default";

/// Lifecycle status reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterStatus {
    /// Provisioning is in progress.
    #[default]
    Creating,
    /// Running and reachable.
    Active,
    /// Exists but not serving.
    Inactive,
    /// A mutation is being applied.
    Updating,
    /// Tear-down is in progress.
    Deleting,
}

/// Node groups report the same lifecycle states as clusters.
pub type NodeGroupStatus = ClusterStatus;

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "Creating"),
            Self::Active => write!(f, "Active"),
            Self::Inactive => write!(f, "Inactive"),
            Self::Updating => write!(f, "Updating"),
            Self::Deleting => write!(f, "Deleting"),
        }
    }
}

/// Free-form annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Network placement of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterNetwork {
    #[serde(rename = "vNetId")]
    pub vnet_id: String,
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub key_value_list: Vec<KeyValue>,
}

/// Control-plane access details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessInfo {
    pub endpoint: String,
    pub kubeconfig: String,
}

/// Installed addons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Addons {
    pub key_value_list: Vec<KeyValue>,
}

/// A node group embedded in a [`ClusterRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeGroupRecord {
    /// Provider system id.
    pub id: String,
    /// Provider-side name; the tenant addresses node groups by it.
    pub name: String,
    pub image_id: String,
    pub spec_id: String,
    pub root_disk_type: String,
    pub root_disk_size: String,
    pub ssh_key_id: String,
    pub on_auto_scaling: bool,
    pub desired_node_size: u32,
    pub min_node_size: u32,
    pub max_node_size: u32,
    pub status: NodeGroupStatus,
    pub nodes: Vec<String>,
    pub key_value_list: Vec<KeyValue>,
}

impl NodeGroupRecord {
    /// Whether the tenant-facing `name` refers to this node group. Records
    /// written without a name are matched on their id.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        if self.name.is_empty() {
            self.id == name
        } else {
            self.name == name
        }
    }

    /// Whether `min <= desired <= max` holds. Always true without autoscaling.
    #[must_use]
    pub fn has_consistent_sizing(&self) -> bool {
        !self.on_auto_scaling
            || (self.min_node_size <= self.desired_node_size
                && self.desired_node_size <= self.max_node_size)
    }
}

/// Persisted, provider-independent view of a managed Kubernetes cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterRecord {
    pub id: String,
    pub name: String,
    pub connection_name: String,
    pub version: String,
    pub network: ClusterNetwork,
    pub node_group_list: Vec<NodeGroupRecord>,
    pub access_info: AccessInfo,
    pub addons: Addons,
    pub status: ClusterStatus,
    pub created_time: Option<DateTime<Utc>>,
    pub key_value_list: Vec<KeyValue>,
    pub description: String,
    pub csp_cluster_id: String,
    pub csp_cluster_name: String,
    pub system_message: String,
    pub system_label: String,
}

impl ClusterRecord {
    /// Find a node group by name.
    #[must_use]
    pub fn node_group(&self, name: &str) -> Option<&NodeGroupRecord> {
        self.node_group_list.iter().find(|ng| ng.is_named(name))
    }

    /// Find a node group by name for update.
    pub fn node_group_mut(&mut self, name: &str) -> Option<&mut NodeGroupRecord> {
        self.node_group_list.iter_mut().find(|ng| ng.is_named(name))
    }

    /// Replace the node group with the same id, or append it.
    pub fn upsert_node_group(&mut self, node_group: NodeGroupRecord) {
        match self
            .node_group_list
            .iter_mut()
            .find(|ng| ng.id == node_group.id)
        {
            Some(existing) => *existing = node_group,
            None => self.node_group_list.push(node_group),
        }
    }

    /// Drop the node group with the given name. Returns whether one was removed.
    pub fn remove_node_group(&mut self, name: &str) -> bool {
        let before = self.node_group_list.len();
        self.node_group_list.retain(|ng| !ng.is_named(name));
        self.node_group_list.len() != before
    }
}

fn default_literal() -> String {
    DEFAULT_LITERAL.to_string()
}

/// Node group as requested by a tenant, on create or add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupAddRequest {
    pub name: String,
    #[serde(default = "default_literal")]
    pub image_id: String,
    pub spec_id: String,
    #[serde(default = "default_literal")]
    pub root_disk_type: String,
    #[serde(default = "default_literal")]
    pub root_disk_size: String,
    pub ssh_key_id: String,
    #[serde(default)]
    pub on_auto_scaling: bool,
    #[serde(default)]
    pub desired_node_size: u32,
    #[serde(default)]
    pub min_node_size: u32,
    #[serde(default)]
    pub max_node_size: u32,
}

/// Cluster as requested by a tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCreateRequest {
    pub name: String,
    pub connection_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "vNetId")]
    pub vnet_id: String,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default)]
    pub node_group_list: Vec<NodeGroupAddRequest>,
    /// Provider-native cluster id, only used with [`CreateOption::Register`].
    #[serde(default)]
    pub csp_resource_id: String,
}

/// New sizing for an autoscaling node group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscaleSizeRequest {
    pub desired_node_size: u32,
    pub min_node_size: u32,
    pub max_node_size: u32,
}

/// Target Kubernetes version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeRequest {
    pub version: String,
}

/// How a cluster comes under management.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CreateOption {
    /// Provision a new cluster at the provider.
    #[default]
    Create,
    /// Adopt a cluster that already exists at the provider.
    Register,
}
