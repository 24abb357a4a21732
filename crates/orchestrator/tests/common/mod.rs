//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Barrier;

use cluster_orchestrator::driver::models::{
    AutoscaleSizeReqInfo, ClusterRegisterReqInfo, ClusterReqInfo, NetworkInfo, NodeGroupReqInfo,
    UpgradeReqInfo,
};
use cluster_orchestrator::driver::{BoolResult, ClusterInfo, Iid, NodeGroupInfo};
use cluster_orchestrator::{
    CapabilitySettings, CapabilityTable, ClusterCreateRequest, ClusterManager, ConnectionConfig,
    DriverError, DriverGateway, KeyValueStore, MemoryStore, NodeGroupAddRequest, ResourceKind,
    StaticConnections, StaticResolver, SubnetRef,
};

pub const NS: &str = "ns01";
pub const CREATED_TIME: &str = "2024-05-01T10:00:00Z";

pub fn connection(name: &str, provider: &str) -> ConnectionConfig {
    ConnectionConfig {
        config_name: name.to_string(),
        provider_name: provider.to_string(),
        region_name: "region-1".to_string(),
        credential_name: String::new(),
    }
}

pub fn connections() -> StaticConnections {
    StaticConnections::new(vec![
        connection("aws-conn", "AWS"),
        connection("gcp-conn", "GCP"),
        connection("tencent-conn", "TENCENT"),
    ])
}

pub fn enabled() -> CapabilitySettings {
    CapabilitySettings {
        enabled: true,
        ..CapabilitySettings::default()
    }
}

/// `Common` enabled, AWS pinned to 1.29/1.30, GCP disabled.
pub fn capabilities() -> CapabilityTable {
    CapabilityTable::new(enabled())
        .with_provider(
            "aws",
            CapabilitySettings {
                version: vec!["1.29".to_string(), "1.30".to_string()],
                ..enabled()
            },
        )
        .with_provider("gcp", CapabilitySettings::default())
}

pub fn resolver() -> StaticResolver {
    StaticResolver::new()
        .with_vnet(
            NS,
            "vnet-01",
            "vpc-0abc",
            vec![
                SubnetRef::new("subnet-a", "subnet-0a"),
                SubnetRef::new("subnet-b", "subnet-0b"),
                SubnetRef::new("subnet-c", "subnet-0c"),
            ],
        )
        .with_resource(NS, ResourceKind::SecurityGroup, "sg-01", "sg-0f00")
        .with_resource(NS, ResourceKind::Spec, "spec-small", "t3.medium")
        .with_resource(NS, ResourceKind::SshKey, "key-01", "kp-key01")
}

pub fn node_group_request(name: &str) -> NodeGroupAddRequest {
    NodeGroupAddRequest {
        name: name.to_string(),
        image_id: "default".to_string(),
        spec_id: "spec-small".to_string(),
        root_disk_type: "default".to_string(),
        root_disk_size: "default".to_string(),
        ssh_key_id: "key-01".to_string(),
        on_auto_scaling: true,
        desired_node_size: 2,
        min_node_size: 1,
        max_node_size: 3,
    }
}

pub fn cluster_request(name: &str, connection: &str) -> ClusterCreateRequest {
    ClusterCreateRequest {
        name: name.to_string(),
        connection_name: connection.to_string(),
        version: "1.30".to_string(),
        description: "test cluster".to_string(),
        vnet_id: "vnet-01".to_string(),
        subnet_ids: vec!["subnet-a".to_string(), "subnet-b".to_string()],
        security_group_ids: vec!["sg-01".to_string()],
        node_group_list: vec![node_group_request("ng-base")],
        csp_resource_id: String::new(),
    }
}

/// Manager over the given driver and store, with the default fixtures.
pub fn manager(driver: Arc<dyn DriverGateway>, store: Arc<dyn KeyValueStore>) -> ClusterManager {
    ClusterManager::new(
        driver,
        store,
        Arc::new(resolver()),
        Arc::new(connections()),
        capabilities(),
    )
}

pub fn memory_manager(driver: Arc<FakeDriver>) -> (ClusterManager, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (manager(driver, store.clone()), store)
}

fn node_group_info(req: &NodeGroupReqInfo, arn_ids: bool) -> NodeGroupInfo {
    let size = |s: &str| -> u32 { s.parse().unwrap_or(0) };
    let system_id = if arn_ids {
        format!("arn:aws:eks:nodegroup/{}", req.name)
    } else {
        req.name.clone()
    };
    NodeGroupInfo {
        iid: Iid::new(&req.name, system_id),
        image_iid: Iid::new("", &req.image_name),
        vm_spec_name: req.vm_spec_name.clone(),
        root_disk_type: req.root_disk_type.clone(),
        root_disk_size: req.root_disk_size.clone(),
        key_pair_iid: Iid::new(&req.key_pair_name, &req.key_pair_name),
        on_auto_scaling: req.on_auto_scaling == "true",
        desired_node_size: size(&req.desired_node_size),
        min_node_size: size(&req.min_node_size),
        max_node_size: size(&req.max_node_size),
        status: "Creating".to_string(),
        ..NodeGroupInfo::default()
    }
}

/// In-process driver that keeps provider-side clusters in memory and records
/// every call it receives.
#[derive(Default)]
pub struct FakeDriver {
    clusters: Mutex<HashMap<String, ClusterInfo>>,
    calls: Mutex<Vec<String>>,
    last_create: Mutex<Option<ClusterReqInfo>>,
    failing_deletes: Mutex<HashSet<String>>,
    refused_deletes: Mutex<HashSet<String>>,
    add_barrier: Option<Arc<Barrier>>,
    arn_node_group_ids: bool,
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Driver whose `add_node_group` holds every caller until `parties` calls
    /// are in flight.
    pub fn with_add_barrier(parties: usize) -> Arc<Self> {
        Arc::new(Self {
            add_barrier: Some(Arc::new(Barrier::new(parties))),
            ..Self::default()
        })
    }

    /// Driver that reports node groups with ARN-style system ids, so the
    /// system id never equals the node group name.
    pub fn with_arn_node_group_ids() -> Arc<Self> {
        Arc::new(Self {
            arn_node_group_ids: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| *c == operation).count()
    }

    pub fn last_create(&self) -> Option<ClusterReqInfo> {
        self.last_create.lock().unwrap().clone()
    }

    pub fn remote(&self, cluster: &str) -> Option<ClusterInfo> {
        self.clusters.lock().unwrap().get(cluster).cloned()
    }

    /// Change the provider-side name of a cluster behind the orchestrator's back.
    pub fn rename_remote(&self, cluster: &str, new_name: &str) {
        if let Some(info) = self.clusters.lock().unwrap().get_mut(cluster) {
            info.iid.name_id = new_name.to_string();
        }
    }

    pub fn set_remote_status(&self, cluster: &str, status: &str) {
        if let Some(info) = self.clusters.lock().unwrap().get_mut(cluster) {
            info.status = status.to_string();
        }
    }

    pub fn fail_delete(&self, cluster: &str) {
        self.failing_deletes.lock().unwrap().insert(cluster.to_string());
    }

    pub fn refuse_delete(&self, cluster: &str) {
        self.refused_deletes.lock().unwrap().insert(cluster.to_string());
    }

    fn record(&self, operation: &str) {
        self.calls.lock().unwrap().push(operation.to_string());
    }

    fn with_cluster<T>(
        &self,
        cluster: &str,
        f: impl FnOnce(&mut ClusterInfo) -> Result<T, DriverError>,
    ) -> Result<T, DriverError> {
        let mut clusters = self.clusters.lock().unwrap();
        let info = clusters
            .get_mut(cluster)
            .ok_or_else(|| DriverError::NotFound(cluster.to_string()))?;
        f(info)
    }
}

#[async_trait]
impl DriverGateway for FakeDriver {
    async fn create_cluster(
        &self,
        _connection: &str,
        req: ClusterReqInfo,
    ) -> Result<ClusterInfo, DriverError> {
        self.record("create");
        let info = ClusterInfo {
            iid: Iid::new(&req.name, format!("csp-{}", req.name)),
            version: req.version.clone(),
            network: NetworkInfo {
                vpc_iid: Iid::new(&req.vpc_name, &req.vpc_name),
                subnet_iids: req.subnet_names.iter().map(|s| Iid::new(s, s)).collect(),
                security_group_iids: req
                    .security_group_names
                    .iter()
                    .map(|s| Iid::new(s, s))
                    .collect(),
                key_value_list: vec![],
            },
            node_group_list: req
                .node_group_list
                .iter()
                .map(|ng| node_group_info(ng, self.arn_node_group_ids))
                .collect(),
            status: "Creating".to_string(),
            created_time: CREATED_TIME.to_string(),
            ..ClusterInfo::default()
        };
        self.clusters
            .lock()
            .unwrap()
            .insert(req.name.clone(), info.clone());
        *self.last_create.lock().unwrap() = Some(req);
        Ok(info)
    }

    async fn register_cluster(
        &self,
        _connection: &str,
        req: ClusterRegisterReqInfo,
    ) -> Result<ClusterInfo, DriverError> {
        self.record("register");
        let info = ClusterInfo {
            iid: Iid::new(&req.name, &req.csp_id),
            version: "1.30".to_string(),
            network: NetworkInfo {
                vpc_iid: Iid::new(&req.vpc_name, &req.vpc_name),
                ..NetworkInfo::default()
            },
            status: "Active".to_string(),
            created_time: CREATED_TIME.to_string(),
            ..ClusterInfo::default()
        };
        self.clusters
            .lock()
            .unwrap()
            .insert(req.name.clone(), info.clone());
        Ok(info)
    }

    async fn get_cluster(&self, _connection: &str, cluster: &str) -> Result<ClusterInfo, DriverError> {
        self.record("get");
        self.with_cluster(cluster, |info| Ok(info.clone()))
    }

    async fn add_node_group(
        &self,
        _connection: &str,
        cluster: &str,
        req: NodeGroupReqInfo,
    ) -> Result<ClusterInfo, DriverError> {
        self.record("add_node_group");
        if let Some(barrier) = &self.add_barrier {
            barrier.wait().await;
        }
        self.with_cluster(cluster, |info| {
            info.node_group_list
                .push(node_group_info(&req, self.arn_node_group_ids));
            info.status = "Active".to_string();
            Ok(info.clone())
        })
    }

    async fn remove_node_group(
        &self,
        _connection: &str,
        cluster: &str,
        node_group: &str,
        _force: bool,
    ) -> Result<BoolResult, DriverError> {
        self.record("remove_node_group");
        self.with_cluster(cluster, |info| {
            let before = info.node_group_list.len();
            info.node_group_list.retain(|ng| ng.iid.name_id != node_group);
            Ok(BoolResult {
                success: info.node_group_list.len() != before,
            })
        })
    }

    async fn set_node_group_autoscaling(
        &self,
        _connection: &str,
        cluster: &str,
        node_group: &str,
        on: bool,
    ) -> Result<BoolResult, DriverError> {
        self.record("set_autoscaling");
        self.with_cluster(cluster, |info| {
            for ng in &mut info.node_group_list {
                if ng.iid.name_id == node_group {
                    ng.on_auto_scaling = on;
                }
            }
            // Some drivers answer "false" even after applying the change.
            Ok(BoolResult { success: false })
        })
    }

    async fn change_node_group_autoscale_size(
        &self,
        _connection: &str,
        cluster: &str,
        node_group: &str,
        req: AutoscaleSizeReqInfo,
    ) -> Result<NodeGroupInfo, DriverError> {
        self.record("change_autoscale_size");
        self.with_cluster(cluster, |info| {
            let ng = info
                .node_group_list
                .iter_mut()
                .find(|ng| ng.iid.name_id == node_group)
                .ok_or_else(|| DriverError::NotFound(node_group.to_string()))?;
            ng.desired_node_size = req.desired_node_size.parse().unwrap_or(0);
            ng.min_node_size = req.min_node_size.parse().unwrap_or(0);
            ng.max_node_size = req.max_node_size.parse().unwrap_or(0);
            Ok(ng.clone())
        })
    }

    async fn upgrade_cluster(
        &self,
        _connection: &str,
        cluster: &str,
        req: UpgradeReqInfo,
    ) -> Result<ClusterInfo, DriverError> {
        self.record("upgrade");
        self.with_cluster(cluster, |info| {
            info.version = req.version;
            info.status = "Updating".to_string();
            Ok(info.clone())
        })
    }

    async fn delete_cluster(
        &self,
        _connection: &str,
        cluster: &str,
        _force: bool,
    ) -> Result<BoolResult, DriverError> {
        self.record("delete");
        if self.failing_deletes.lock().unwrap().contains(cluster) {
            return Err(DriverError::Api {
                status: 500,
                message: "provider unavailable".to_string(),
            });
        }
        if self.refused_deletes.lock().unwrap().contains(cluster) {
            return Ok(BoolResult { success: false });
        }
        self.clusters.lock().unwrap().remove(cluster);
        Ok(BoolResult { success: true })
    }
}
