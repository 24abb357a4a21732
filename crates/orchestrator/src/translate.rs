//! Translation between the tenant model and the driver model.
//!
//! Driver → tenant is lossy: each provider identifier `(NameId, SystemId)` is
//! reduced to its `SystemId`. Only the cluster's own identifier keeps both
//! halves, as `csp_cluster_name` and `csp_cluster_id`.
//!
//! Tenant → driver resolves tenant ids to provider-native names through a
//! [`ResourceResolver`] before building the request.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::capability::CapabilitySettings;
use crate::driver::models::{
    flag, AddonsInfo, AutoscaleSizeReqInfo, ClusterInfo, ClusterRegisterReqInfo, ClusterReqInfo,
    DriverAccessInfo, DriverKeyValue, Iid, NetworkInfo, NodeGroupInfo, NodeGroupReqInfo,
};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::model::{
    AccessInfo, Addons, AutoscaleSizeRequest, ClusterCreateRequest, ClusterNetwork, ClusterRecord,
    ClusterStatus, KeyValue, NodeGroupAddRequest, NodeGroupRecord, DEFAULT_LITERAL,
};
use crate::resolver::{ResourceKind, ResourceResolver, SubnetRef};

// ============================================================================
// Driver → tenant
// ============================================================================

/// Map a driver status string. Unrecognized values are treated as inactive.
#[must_use]
pub fn parse_status(status: &str) -> ClusterStatus {
    match status.to_ascii_lowercase().as_str() {
        "creating" => ClusterStatus::Creating,
        "active" => ClusterStatus::Active,
        "inactive" => ClusterStatus::Inactive,
        "updating" => ClusterStatus::Updating,
        "deleting" => ClusterStatus::Deleting,
        other => {
            debug!(status = %other, "Unrecognized driver status, treating as Inactive");
            ClusterStatus::Inactive
        }
    }
}

/// Parse the driver's creation timestamp. Empty or malformed values yield `None`.
#[must_use]
pub fn parse_created_time(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn key_values_to_tenant(list: &[DriverKeyValue]) -> Vec<KeyValue> {
    list.iter()
        .map(|kv| KeyValue::new(&kv.key, &kv.value))
        .collect()
}

fn key_values_to_driver(list: &[KeyValue]) -> Vec<DriverKeyValue> {
    list.iter()
        .map(|kv| DriverKeyValue {
            key: kv.key.clone(),
            value: kv.value.clone(),
        })
        .collect()
}

fn system_ids(iids: &[Iid]) -> Vec<String> {
    iids.iter().map(|iid| iid.system_id.clone()).collect()
}

/// Network info → tenant network.
#[must_use]
pub fn network_to_tenant(network: &NetworkInfo) -> ClusterNetwork {
    ClusterNetwork {
        vnet_id: network.vpc_iid.system_id.clone(),
        subnet_ids: system_ids(&network.subnet_iids),
        security_group_ids: system_ids(&network.security_group_iids),
        key_value_list: key_values_to_tenant(&network.key_value_list),
    }
}

/// Driver node group → tenant node group.
#[must_use]
pub fn node_group_to_tenant(node_group: &NodeGroupInfo) -> NodeGroupRecord {
    NodeGroupRecord {
        id: node_group.iid.system_id.clone(),
        name: node_group.iid.name_id.clone(),
        image_id: node_group.image_iid.system_id.clone(),
        spec_id: node_group.vm_spec_name.clone(),
        root_disk_type: node_group.root_disk_type.clone(),
        root_disk_size: node_group.root_disk_size.clone(),
        ssh_key_id: node_group.key_pair_iid.system_id.clone(),
        on_auto_scaling: node_group.on_auto_scaling,
        desired_node_size: node_group.desired_node_size,
        min_node_size: node_group.min_node_size,
        max_node_size: node_group.max_node_size,
        status: parse_status(&node_group.status),
        nodes: system_ids(&node_group.nodes),
        key_value_list: key_values_to_tenant(&node_group.key_value_list),
    }
}

/// Tenant node group → driver node group.
///
/// Identifiers come back with an empty `NameId`. Only the node group's own
/// name is kept on the tenant side, and it is not sent back.
#[must_use]
pub fn node_group_to_driver(node_group: &NodeGroupRecord) -> NodeGroupInfo {
    NodeGroupInfo {
        iid: Iid::system(&node_group.id),
        image_iid: Iid::system(&node_group.image_id),
        vm_spec_name: node_group.spec_id.clone(),
        root_disk_type: node_group.root_disk_type.clone(),
        root_disk_size: node_group.root_disk_size.clone(),
        key_pair_iid: Iid::system(&node_group.ssh_key_id),
        on_auto_scaling: node_group.on_auto_scaling,
        desired_node_size: node_group.desired_node_size,
        min_node_size: node_group.min_node_size,
        max_node_size: node_group.max_node_size,
        status: node_group.status.to_string(),
        nodes: node_group.nodes.iter().map(Iid::system).collect(),
        key_value_list: key_values_to_driver(&node_group.key_value_list),
    }
}

fn access_to_tenant(access: &DriverAccessInfo) -> AccessInfo {
    AccessInfo {
        endpoint: access.endpoint.clone(),
        kubeconfig: access.kubeconfig.clone(),
    }
}

fn addons_to_tenant(addons: &AddonsInfo) -> Addons {
    Addons {
        key_value_list: key_values_to_tenant(&addons.key_value_list),
    }
}

/// Fields the driver does not know about, carried over from the request or
/// the persisted record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordContext {
    pub name: String,
    pub connection_name: String,
    pub description: String,
    pub system_message: String,
    pub system_label: String,
}

impl RecordContext {
    /// Context taken from an existing record.
    #[must_use]
    pub fn from_record(record: &ClusterRecord) -> Self {
        Self {
            name: record.name.clone(),
            connection_name: record.connection_name.clone(),
            description: record.description.clone(),
            system_message: record.system_message.clone(),
            system_label: record.system_label.clone(),
        }
    }
}

/// Driver cluster → tenant record.
///
/// `id` and `csp_cluster_name` come from the driver's `NameId`,
/// `csp_cluster_id` from its `SystemId`.
#[must_use]
pub fn cluster_to_tenant(info: &ClusterInfo, ctx: &RecordContext) -> ClusterRecord {
    ClusterRecord {
        id: info.iid.name_id.clone(),
        name: ctx.name.clone(),
        connection_name: ctx.connection_name.clone(),
        version: info.version.clone(),
        network: network_to_tenant(&info.network),
        node_group_list: info.node_group_list.iter().map(node_group_to_tenant).collect(),
        access_info: access_to_tenant(&info.access_info),
        addons: addons_to_tenant(&info.addons),
        status: parse_status(&info.status),
        created_time: parse_created_time(&info.created_time),
        key_value_list: key_values_to_tenant(&info.key_value_list),
        description: ctx.description.clone(),
        csp_cluster_id: info.iid.system_id.clone(),
        csp_cluster_name: info.iid.name_id.clone(),
        system_message: ctx.system_message.clone(),
        system_label: ctx.system_label.clone(),
    }
}

// ============================================================================
// Tenant → driver
// ============================================================================

/// Outcome of matching requested subnets against a VNet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetSelection {
    /// Provider-native names of the matched subnets, in request order.
    pub names: Vec<String>,
    /// Requested ids with no match in the VNet.
    pub dropped: Vec<String>,
}

/// Match requested subnet ids against a VNet's subnets.
///
/// Unmatched ids are dropped, not rejected. Only when nothing matches does the
/// selection fail.
///
/// # Errors
/// Returns [`OrchestratorError::NoValidSubnets`] when no requested id matches.
pub fn select_subnets(
    vnet_id: &str,
    available: &[SubnetRef],
    requested: &[String],
) -> OrchestratorResult<SubnetSelection> {
    let mut names = Vec::new();
    let mut dropped = Vec::new();

    for id in requested {
        match available.iter().find(|s| &s.id == id) {
            Some(subnet) => names.push(subnet.csp_name.clone()),
            None => dropped.push(id.clone()),
        }
    }

    if names.is_empty() {
        return Err(OrchestratorError::NoValidSubnets {
            vnet: vnet_id.to_string(),
            requested: requested.to_vec(),
        });
    }

    Ok(SubnetSelection { names, dropped })
}

async fn resolve_required(
    resolver: &dyn ResourceResolver,
    namespace: &str,
    kind: ResourceKind,
    id: &str,
) -> OrchestratorResult<String> {
    let name = resolver.resolve(namespace, kind, id).await?;
    if name.is_empty() {
        return Err(OrchestratorError::Resolution {
            namespace: namespace.to_string(),
            kind,
            id: id.to_string(),
        });
    }
    Ok(name)
}

/// Image name sent to the driver. Empty when the provider picks the image.
async fn resolve_image(
    resolver: &dyn ResourceResolver,
    namespace: &str,
    image_id: &str,
    settings: &CapabilitySettings,
) -> OrchestratorResult<String> {
    if image_id.is_empty() || image_id == DEFAULT_LITERAL {
        return Ok(String::new());
    }
    if !settings.node_image_designation {
        debug!(image_id = %image_id, "Provider does not accept node images, sending empty image");
        return Ok(String::new());
    }
    resolve_required(resolver, namespace, ResourceKind::Image, image_id).await
}

/// Resolve a node-group request into driver form.
///
/// # Errors
/// Returns [`OrchestratorError::Resolution`] when the VM spec, SSH key, or an
/// explicitly designated image cannot be resolved.
pub async fn build_node_group_request(
    resolver: &dyn ResourceResolver,
    namespace: &str,
    req: &NodeGroupAddRequest,
    settings: &CapabilitySettings,
) -> OrchestratorResult<NodeGroupReqInfo> {
    let image_name = resolve_image(resolver, namespace, &req.image_id, settings).await?;
    let vm_spec_name = resolve_required(resolver, namespace, ResourceKind::Spec, &req.spec_id).await?;
    let key_pair_name =
        resolve_required(resolver, namespace, ResourceKind::SshKey, &req.ssh_key_id).await?;

    Ok(NodeGroupReqInfo {
        name: req.name.clone(),
        image_name,
        vm_spec_name,
        root_disk_type: req.root_disk_type.clone(),
        root_disk_size: req.root_disk_size.clone(),
        key_pair_name,
        on_auto_scaling: flag(req.on_auto_scaling),
        desired_node_size: req.desired_node_size.to_string(),
        min_node_size: req.min_node_size.to_string(),
        max_node_size: req.max_node_size.to_string(),
    })
}

/// Resolve a cluster create request into driver form.
///
/// # Errors
/// Fails with [`OrchestratorError::Resolution`] for unresolvable references,
/// [`OrchestratorError::NoValidSubnets`] when no subnet belongs to the VNet,
/// and [`OrchestratorError::Validation`] when the provider's settings reject
/// the request (version, subnet count, node groups on creation).
pub async fn build_cluster_request(
    resolver: &dyn ResourceResolver,
    namespace: &str,
    req: &ClusterCreateRequest,
    settings: &CapabilitySettings,
) -> OrchestratorResult<ClusterReqInfo> {
    const OPERATION: &str = "CreateCluster";

    if !req.version.is_empty() && !settings.supports_version(&req.version) {
        return Err(OrchestratorError::invalid(
            OPERATION,
            "version",
            format!("{} is not supported (supported: {:?})", req.version, settings.version),
        ));
    }
    if !settings.node_groups_on_creation && !req.node_group_list.is_empty() {
        return Err(OrchestratorError::invalid(
            OPERATION,
            "nodeGroupList",
            "provider does not accept node groups on creation; add them after the cluster is active",
        ));
    }

    let vpc_name = resolve_required(resolver, namespace, ResourceKind::VNet, &req.vnet_id).await?;

    let available = resolver.vnet_subnets(namespace, &req.vnet_id).await?;
    let selection = select_subnets(&req.vnet_id, &available, &req.subnet_ids)?;
    if !selection.dropped.is_empty() {
        warn!(
            vnet = %req.vnet_id,
            dropped = ?selection.dropped,
            "Requested subnets not in VNet were dropped"
        );
    }
    if selection.names.len() < settings.required_subnet_count {
        return Err(OrchestratorError::invalid(
            OPERATION,
            "subnetIds",
            format!(
                "provider requires at least {} subnets, {} resolved",
                settings.required_subnet_count,
                selection.names.len()
            ),
        ));
    }

    let mut security_group_names = Vec::with_capacity(req.security_group_ids.len());
    for id in &req.security_group_ids {
        security_group_names
            .push(resolve_required(resolver, namespace, ResourceKind::SecurityGroup, id).await?);
    }

    let mut node_group_list = Vec::with_capacity(req.node_group_list.len());
    for ng in &req.node_group_list {
        node_group_list.push(build_node_group_request(resolver, namespace, ng, settings).await?);
    }

    Ok(ClusterReqInfo {
        name: req.name.clone(),
        version: req.version.clone(),
        vpc_name,
        subnet_names: selection.names,
        security_group_names,
        node_group_list,
    })
}

/// Resolve a register request into driver form.
///
/// # Errors
/// Returns [`OrchestratorError::Resolution`] when the VNet cannot be resolved.
pub async fn build_register_request(
    resolver: &dyn ResourceResolver,
    namespace: &str,
    req: &ClusterCreateRequest,
) -> OrchestratorResult<ClusterRegisterReqInfo> {
    let vpc_name = resolve_required(resolver, namespace, ResourceKind::VNet, &req.vnet_id).await?;
    Ok(ClusterRegisterReqInfo {
        vpc_name,
        name: req.name.clone(),
        csp_id: req.csp_resource_id.clone(),
    })
}

/// Autoscale sizing in driver form.
#[must_use]
pub fn autoscale_size_request(req: &AutoscaleSizeRequest) -> AutoscaleSizeReqInfo {
    AutoscaleSizeReqInfo {
        desired_node_size: req.desired_node_size.to_string(),
        min_node_size: req.min_node_size.to_string(),
        max_node_size: req.max_node_size.to_string(),
    }
}
