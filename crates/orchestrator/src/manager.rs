//! Cluster lifecycle manager.
//!
//! Every operation is one sequential flow: validate, load, resolve, call the
//! driver, translate, persist. Records live at `/ns/{namespace}/cluster/{id}`
//! and are written back with compare-and-swap against the version they were
//! loaded at.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::capability::{CapabilitySource, CapabilityTable, ResolvedCapability};
use crate::driver::models::UpgradeReqInfo;
use crate::driver::{ClusterInfo, DriverError, DriverGateway};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::model::{
    AutoscaleSizeRequest, ClusterCreateRequest, ClusterRecord, ClusterStatus, CreateOption,
    NodeGroupAddRequest, NodeGroupRecord, UpgradeRequest,
};
use crate::reconcile::{ensure_no_drift, verify_write};
use crate::resolver::{ConnectionCatalog, ResourceResolver};
use crate::store::{KeyValueStore, StoreEntry, StoreError};
use crate::translate::{
    autoscale_size_request, build_cluster_request, build_node_group_request,
    build_register_request, cluster_to_tenant, node_group_to_tenant, RecordContext,
};
use crate::validation::{
    check_identifier, ensure_valid, validate_autoscale_size, validate_cluster_request,
    validate_node_group_request, validate_register_request, validate_upgrade,
};

/// System label of clusters adopted through [`CreateOption::Register`].
pub const REGISTERED_LABEL: &str = "Registered from CSP resource";

/// Store key of a cluster record.
#[must_use]
pub fn cluster_key(namespace: &str, cluster: &str) -> String {
    format!("{}/{cluster}", cluster_prefix(namespace))
}

/// Store prefix holding all clusters of a namespace.
#[must_use]
pub fn cluster_prefix(namespace: &str) -> String {
    format!("/ns/{namespace}/cluster")
}

/// Case-insensitive substring filter on one top-level record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    /// camelCase field name, e.g. `connectionName`.
    pub key: String,
    /// Substring to look for, compared case-insensitively.
    pub value: String,
}

impl ListFilter {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    fn matches(&self, record: &Value) -> bool {
        let Some(field) = record.get(&self.key) else {
            return false;
        };
        let text = match field {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        text.to_lowercase().contains(&self.value.to_lowercase())
    }
}

/// Record loaded together with the store version it was read at.
struct Loaded {
    key: String,
    record: ClusterRecord,
    version: u64,
}

/// Orchestrates cluster lifecycle operations.
#[derive(Clone)]
pub struct ClusterManager {
    driver: Arc<dyn DriverGateway>,
    store: Arc<dyn KeyValueStore>,
    resolver: Arc<dyn ResourceResolver>,
    connections: Arc<dyn ConnectionCatalog>,
    capabilities: CapabilityTable,
}

impl ClusterManager {
    pub fn new(
        driver: Arc<dyn DriverGateway>,
        store: Arc<dyn KeyValueStore>,
        resolver: Arc<dyn ResourceResolver>,
        connections: Arc<dyn ConnectionCatalog>,
        capabilities: CapabilityTable,
    ) -> Self {
        Self {
            driver,
            store,
            resolver,
            connections,
            capabilities,
        }
    }

    // ------------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------------

    /// Create or register a cluster.
    ///
    /// # Errors
    /// Fails without calling the driver on invalid input, an existing id,
    /// an unknown connection, a disabled provider, or an unresolvable
    /// reference. Driver and store failures are wrapped with context.
    #[instrument(skip(self, req), fields(cluster = %req.name, connection = %req.connection_name))]
    pub async fn create_cluster(
        &self,
        namespace: &str,
        req: &ClusterCreateRequest,
        option: CreateOption,
    ) -> OrchestratorResult<ClusterRecord> {
        const OPERATION: &str = "CreateCluster";

        check_identifier("namespace", namespace)?;
        check_identifier("clusterId", &req.name)?;
        let violations = match option {
            CreateOption::Create => validate_cluster_request(req),
            CreateOption::Register => validate_register_request(req),
        };
        ensure_valid(OPERATION, violations)?;

        let key = cluster_key(namespace, &req.name);
        if self.store_get(&key).await?.is_some() {
            return Err(OrchestratorError::AlreadyExists {
                namespace: namespace.to_string(),
                cluster: req.name.clone(),
            });
        }

        let capability = self.gate(&req.connection_name).await?;

        let (info, ctx) = match option {
            CreateOption::Create => {
                let req_info =
                    build_cluster_request(self.resolver.as_ref(), namespace, req, &capability.settings)
                        .await?;
                info!(
                    namespace = %namespace,
                    cluster = %req.name,
                    provider = %capability.provider,
                    subnets = req_info.subnet_names.len(),
                    node_groups = req_info.node_group_list.len(),
                    "Creating cluster"
                );
                let info = self
                    .driver
                    .create_cluster(&req.connection_name, req_info)
                    .await
                    .map_err(driver_error(OPERATION, &req.name))?;
                (info, RecordContext {
                    name: req.name.clone(),
                    connection_name: req.connection_name.clone(),
                    description: req.description.clone(),
                    ..RecordContext::default()
                })
            }
            CreateOption::Register => {
                let req_info = build_register_request(self.resolver.as_ref(), namespace, req).await?;
                info!(
                    namespace = %namespace,
                    cluster = %req.name,
                    csp_id = %req.csp_resource_id,
                    "Registering existing cluster"
                );
                let info = self
                    .driver
                    .register_cluster(&req.connection_name, req_info)
                    .await
                    .map_err(driver_error(OPERATION, &req.name))?;
                (info, RecordContext {
                    name: req.name.clone(),
                    connection_name: req.connection_name.clone(),
                    description: req.description.clone(),
                    system_message: format!("Registered from CSP cluster {}", req.csp_resource_id),
                    system_label: REGISTERED_LABEL.to_string(),
                })
            }
        };

        let mut record = cluster_to_tenant(&info, &ctx);
        if record.id != req.name {
            warn!(
                requested = %req.name,
                reported = %record.id,
                "Driver reported a different cluster name"
            );
            record.id.clone_from(&req.name);
        }

        self.persist(namespace, &key, &record, None).await?;
        info!(namespace = %namespace, cluster = %record.id, status = %record.status, "Cluster persisted");
        Ok(record)
    }

    // ------------------------------------------------------------------------
    // Node groups
    // ------------------------------------------------------------------------

    /// Add a node group and persist the refreshed cluster.
    ///
    /// # Errors
    /// See [`ClusterManager::create_cluster`]; a concurrent update of the same
    /// record fails with [`OrchestratorError::ConcurrentModification`].
    #[instrument(skip(self, req), fields(node_group = %req.name))]
    pub async fn add_node_group(
        &self,
        namespace: &str,
        cluster: &str,
        req: &NodeGroupAddRequest,
    ) -> OrchestratorResult<ClusterRecord> {
        const OPERATION: &str = "AddNodeGroup";

        check_identifier("namespace", namespace)?;
        check_identifier("clusterId", cluster)?;
        ensure_valid(OPERATION, validate_node_group_request(req))?;

        let loaded = self.load(namespace, cluster).await?;
        warn_if_deleting(OPERATION, namespace, &loaded.record);

        let capability = self.gate(&loaded.record.connection_name).await?;
        let req_info =
            build_node_group_request(self.resolver.as_ref(), namespace, req, &capability.settings)
                .await?;

        let info = self
            .driver
            .add_node_group(
                &loaded.record.connection_name,
                &loaded.record.csp_cluster_name,
                req_info,
            )
            .await
            .map_err(driver_error(OPERATION, cluster))?;

        let record = refresh(&loaded.record, &info);
        self.persist(namespace, &loaded.key, &record, Some(loaded.version))
            .await?;
        info!(namespace = %namespace, cluster = %cluster, node_group = %req.name, "Node group added");
        Ok(record)
    }

    /// Remove a node group. Returns the provider's verdict.
    ///
    /// # Errors
    /// Fails on invalid ids, a missing cluster, or a driver error.
    #[instrument(skip(self))]
    pub async fn remove_node_group(
        &self,
        namespace: &str,
        cluster: &str,
        node_group: &str,
        force: bool,
    ) -> OrchestratorResult<bool> {
        const OPERATION: &str = "RemoveNodeGroup";

        check_identifier("namespace", namespace)?;
        check_identifier("clusterId", cluster)?;
        check_identifier("nodeGroupName", node_group)?;

        let mut loaded = self.load(namespace, cluster).await?;
        warn_if_deleting(OPERATION, namespace, &loaded.record);

        let result = self
            .driver
            .remove_node_group(
                &loaded.record.connection_name,
                &loaded.record.csp_cluster_name,
                node_group,
                force,
            )
            .await
            .map_err(driver_error(OPERATION, cluster))?;

        if !result.success {
            warn!(namespace = %namespace, cluster = %cluster, node_group = %node_group, "Provider refused node group removal");
            return Ok(false);
        }

        if loaded.record.remove_node_group(node_group) {
            self.persist(namespace, &loaded.key, &loaded.record, Some(loaded.version))
                .await?;
        } else {
            debug!(node_group = %node_group, "Removed node group was not in the persisted record");
        }
        info!(namespace = %namespace, cluster = %cluster, node_group = %node_group, "Node group removed");
        Ok(true)
    }

    /// Turn autoscaling on or off.
    ///
    /// Returns `true` whenever the driver call succeeds. The provider's own
    /// acknowledgment is logged but not inspected.
    ///
    /// # Errors
    /// Fails on invalid ids, a missing cluster, or a driver error.
    #[instrument(skip(self))]
    pub async fn set_autoscaling(
        &self,
        namespace: &str,
        cluster: &str,
        node_group: &str,
        on: bool,
    ) -> OrchestratorResult<bool> {
        const OPERATION: &str = "SetAutoscaling";

        check_identifier("namespace", namespace)?;
        check_identifier("clusterId", cluster)?;
        check_identifier("nodeGroupName", node_group)?;

        let mut loaded = self.load(namespace, cluster).await?;
        warn_if_deleting(OPERATION, namespace, &loaded.record);

        let result = self
            .driver
            .set_node_group_autoscaling(
                &loaded.record.connection_name,
                &loaded.record.csp_cluster_name,
                node_group,
                on,
            )
            .await
            .map_err(driver_error(OPERATION, cluster))?;
        debug!(acknowledged = result.success, "Autoscaling acknowledgment ignored");

        if let Some(ng) = loaded.record.node_group_mut(node_group) {
            ng.on_auto_scaling = on;
            self.persist(namespace, &loaded.key, &loaded.record, Some(loaded.version))
                .await?;
        } else {
            debug!(node_group = %node_group, "Node group not in the persisted record");
        }
        Ok(true)
    }

    /// Change autoscale bounds and return the updated node group.
    ///
    /// # Errors
    /// Fails on invalid input, a missing cluster, a driver error, or a
    /// concurrent update.
    #[instrument(skip(self, req))]
    pub async fn change_autoscale_size(
        &self,
        namespace: &str,
        cluster: &str,
        node_group: &str,
        req: &AutoscaleSizeRequest,
    ) -> OrchestratorResult<NodeGroupRecord> {
        const OPERATION: &str = "ChangeAutoscaleSize";

        check_identifier("namespace", namespace)?;
        check_identifier("clusterId", cluster)?;
        check_identifier("nodeGroupName", node_group)?;
        ensure_valid(OPERATION, validate_autoscale_size(req))?;

        let mut loaded = self.load(namespace, cluster).await?;
        warn_if_deleting(OPERATION, namespace, &loaded.record);

        let info = self
            .driver
            .change_node_group_autoscale_size(
                &loaded.record.connection_name,
                &loaded.record.csp_cluster_name,
                node_group,
                autoscale_size_request(req),
            )
            .await
            .map_err(driver_error(OPERATION, cluster))?;

        let updated = node_group_to_tenant(&info);
        loaded.record.upsert_node_group(updated.clone());
        self.persist(namespace, &loaded.key, &loaded.record, Some(loaded.version))
            .await?;
        info!(
            namespace = %namespace,
            cluster = %cluster,
            node_group = %updated.id,
            desired = updated.desired_node_size,
            min = updated.min_node_size,
            max = updated.max_node_size,
            "Autoscale size changed"
        );
        Ok(updated)
    }

    // ------------------------------------------------------------------------
    // Upgrade
    // ------------------------------------------------------------------------

    /// Upgrade the control-plane version.
    ///
    /// # Errors
    /// Fails on invalid input, a disabled provider, an unsupported version, a
    /// driver error, or a concurrent update.
    #[instrument(skip(self, req), fields(version = %req.version))]
    pub async fn upgrade_cluster(
        &self,
        namespace: &str,
        cluster: &str,
        req: &UpgradeRequest,
    ) -> OrchestratorResult<ClusterRecord> {
        const OPERATION: &str = "UpgradeCluster";

        check_identifier("namespace", namespace)?;
        check_identifier("clusterId", cluster)?;
        ensure_valid(OPERATION, validate_upgrade(req))?;

        let loaded = self.load(namespace, cluster).await?;
        warn_if_deleting(OPERATION, namespace, &loaded.record);

        let capability = self.gate(&loaded.record.connection_name).await?;
        if !capability.settings.supports_version(&req.version) {
            return Err(OrchestratorError::invalid(
                OPERATION,
                "version",
                format!(
                    "{} is not supported by {} (supported: {:?})",
                    req.version, capability.provider, capability.settings.version
                ),
            ));
        }

        let info = self
            .driver
            .upgrade_cluster(
                &loaded.record.connection_name,
                &loaded.record.csp_cluster_name,
                UpgradeReqInfo {
                    version: req.version.clone(),
                },
            )
            .await
            .map_err(driver_error(OPERATION, cluster))?;

        let record = refresh(&loaded.record, &info);
        self.persist(namespace, &loaded.key, &record, Some(loaded.version))
            .await?;
        info!(namespace = %namespace, cluster = %cluster, version = %record.version, "Cluster upgraded");
        Ok(record)
    }

    // ------------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------------

    /// Fetch the live cluster and check it against the persisted record.
    ///
    /// The persisted record is never rewritten here.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::DriftDetected`] when identity fields differ.
    #[instrument(skip(self))]
    pub async fn get_cluster(&self, namespace: &str, cluster: &str) -> OrchestratorResult<ClusterRecord> {
        check_identifier("namespace", namespace)?;
        check_identifier("clusterId", cluster)?;

        let loaded = self.load(namespace, cluster).await?;
        let info = self
            .driver
            .get_cluster(&loaded.record.connection_name, &loaded.record.csp_cluster_name)
            .await
            .map_err(driver_error("GetCluster", cluster))?;

        let live = cluster_to_tenant(&info, &RecordContext::from_record(&loaded.record));
        ensure_no_drift(namespace, &loaded.record, &live)?;
        Ok(live)
    }

    /// Persisted records of a namespace, optionally filtered.
    ///
    /// # Errors
    /// Fails on an invalid namespace, a store error, or an unreadable record.
    #[instrument(skip(self))]
    pub async fn list_cluster(
        &self,
        namespace: &str,
        filter: Option<&ListFilter>,
    ) -> OrchestratorResult<Vec<ClusterRecord>> {
        check_identifier("namespace", namespace)?;
        let prefix = cluster_prefix(namespace);
        let entries = self
            .store
            .get_list(&prefix, false)
            .await
            .map_err(store_error("list", &prefix))?;

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let value: Value = serde_json::from_str(&entry.value)
                .map_err(serialization_error(&entry.key))?;
            if filter.is_some_and(|f| !f.matches(&value)) {
                continue;
            }
            records.push(serde_json::from_value(value).map_err(serialization_error(&entry.key))?);
        }
        Ok(records)
    }

    /// Ids of the clusters in a namespace, in key order.
    ///
    /// # Errors
    /// Same as [`ClusterManager::list_cluster`].
    #[instrument(skip(self))]
    pub async fn list_cluster_id(
        &self,
        namespace: &str,
        filter: Option<&ListFilter>,
    ) -> OrchestratorResult<Vec<String>> {
        check_identifier("namespace", namespace)?;

        if filter.is_some() {
            return Ok(self
                .list_cluster(namespace, filter)
                .await?
                .into_iter()
                .map(|r| r.id)
                .collect());
        }

        let prefix = cluster_prefix(namespace);
        let entries = self
            .store
            .get_list(&prefix, false)
            .await
            .map_err(store_error("list", &prefix))?;
        Ok(entries
            .into_iter()
            .filter_map(|e| e.key.rsplit('/').next().map(str::to_string))
            .collect())
    }

    // ------------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------------

    /// Delete a cluster at the provider and drop its record.
    ///
    /// Without `force` the record is kept unless the provider confirms. With
    /// `force` the record is dropped even when the driver call fails.
    ///
    /// # Errors
    /// Fails on invalid ids, a missing cluster, a store error, or a driver
    /// error when `force` is off.
    #[instrument(skip(self))]
    pub async fn delete_cluster(
        &self,
        namespace: &str,
        cluster: &str,
        force: bool,
    ) -> OrchestratorResult<bool> {
        const OPERATION: &str = "DeleteCluster";

        check_identifier("namespace", namespace)?;
        check_identifier("clusterId", cluster)?;

        let loaded = self.load(namespace, cluster).await?;
        let outcome = self
            .driver
            .delete_cluster(
                &loaded.record.connection_name,
                &loaded.record.csp_cluster_name,
                force,
            )
            .await;

        match outcome {
            Ok(result) if result.success => {}
            Ok(_) if force => {
                warn!(namespace = %namespace, cluster = %cluster, "Provider did not confirm deletion, forcing record removal");
            }
            Ok(_) => {
                warn!(namespace = %namespace, cluster = %cluster, "Provider did not confirm deletion, record kept");
                return Ok(false);
            }
            Err(e) if force => {
                warn!(namespace = %namespace, cluster = %cluster, error = %e, "Driver delete failed, forcing record removal");
            }
            Err(e) => return Err(driver_error(OPERATION, cluster)(e)),
        }

        self.store
            .delete(&loaded.key)
            .await
            .map_err(store_error("delete", &loaded.key))?;
        info!(namespace = %namespace, cluster = %cluster, force, "Cluster deleted");
        Ok(true)
    }

    /// Delete every cluster whose id contains `substring` (case-insensitive).
    ///
    /// Never stops at the first failure; returns one `"{id}: {status}"` line
    /// per attempted id.
    ///
    /// # Errors
    /// Fails only when the namespace is invalid or the ids cannot be listed.
    #[instrument(skip(self))]
    pub async fn delete_all_cluster(
        &self,
        namespace: &str,
        substring: &str,
        force: bool,
    ) -> OrchestratorResult<Vec<String>> {
        let needle = substring.to_lowercase();
        let ids: Vec<String> = self
            .list_cluster_id(namespace, None)
            .await?
            .into_iter()
            .filter(|id| id.to_lowercase().contains(&needle))
            .collect();

        let mut report = Vec::with_capacity(ids.len());
        for id in ids {
            let status = match self.delete_cluster(namespace, &id, force).await {
                Ok(true) => "deleted".to_string(),
                Ok(false) => "not deleted (provider did not confirm)".to_string(),
                Err(e) => {
                    warn!(namespace = %namespace, cluster = %id, error = %e, "Delete failed");
                    format!("failed ({e})")
                }
            };
            report.push(format!("{id}: {status}"));
        }
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Resolve the connection's provider and check it is enabled.
    async fn gate(&self, connection_name: &str) -> OrchestratorResult<ResolvedCapability> {
        let connection = self.connections.lookup(connection_name).await?;
        let capability = self.capabilities.require_enabled(&connection.provider_name)?;
        if capability.source == CapabilitySource::CommonFallback {
            info!(
                connection = %connection_name,
                provider = %capability.provider,
                "Using Common capability settings"
            );
        }
        Ok(capability)
    }

    async fn store_get(&self, key: &str) -> OrchestratorResult<Option<StoreEntry>> {
        self.store.get(key).await.map_err(store_error("get", key))
    }

    async fn load(&self, namespace: &str, cluster: &str) -> OrchestratorResult<Loaded> {
        let key = cluster_key(namespace, cluster);
        let entry = self
            .store_get(&key)
            .await?
            .ok_or_else(|| OrchestratorError::cluster_not_found(namespace, cluster))?;
        let record = serde_json::from_str(&entry.value).map_err(serialization_error(&key))?;
        Ok(Loaded {
            key,
            record,
            version: entry.version,
        })
    }

    /// Write `record` if the stored version still equals `expected`, then
    /// re-read it. The re-read outcome is only logged.
    async fn persist(
        &self,
        namespace: &str,
        key: &str,
        record: &ClusterRecord,
        expected: Option<u64>,
    ) -> OrchestratorResult<()> {
        let value = serde_json::to_string(record).map_err(serialization_error(key))?;

        match self.store.put_if_version(key, &value, expected).await {
            Ok(version) => debug!(key = %key, version, "Record written"),
            Err(StoreError::Conflict { found, .. }) => {
                warn!(key = %key, expected = ?expected, found = ?found, "Record changed since it was loaded");
                return Err(match (expected, found) {
                    (None, Some(_)) => OrchestratorError::AlreadyExists {
                        namespace: namespace.to_string(),
                        cluster: record.id.clone(),
                    },
                    _ => OrchestratorError::ConcurrentModification {
                        namespace: namespace.to_string(),
                        cluster: record.id.clone(),
                    },
                });
            }
            Err(source) => return Err(store_error("put", key)(source)),
        }

        verify_write(self.store.as_ref(), key, record).await;
        Ok(())
    }
}

/// Re-translate a driver response for an existing record. Identity assigned
/// at creation is kept.
fn refresh(persisted: &ClusterRecord, info: &ClusterInfo) -> ClusterRecord {
    let mut record = cluster_to_tenant(info, &RecordContext::from_record(persisted));
    record.id.clone_from(&persisted.id);
    record.csp_cluster_id.clone_from(&persisted.csp_cluster_id);
    record.csp_cluster_name.clone_from(&persisted.csp_cluster_name);
    if record.created_time.is_none() {
        record.created_time = persisted.created_time;
    }
    record
}

fn warn_if_deleting(operation: &str, namespace: &str, record: &ClusterRecord) {
    if record.status == ClusterStatus::Deleting {
        warn!(
            operation = %operation,
            namespace = %namespace,
            cluster = %record.id,
            "Cluster is being deleted; proceeding anyway"
        );
    }
}

fn driver_error<'a>(
    operation: &'static str,
    cluster: &'a str,
) -> impl FnOnce(DriverError) -> OrchestratorError + 'a {
    move |source| OrchestratorError::DriverCall {
        operation,
        cluster: cluster.to_string(),
        source,
    }
}

fn store_error<'a>(
    operation: &'static str,
    key: &'a str,
) -> impl FnOnce(StoreError) -> OrchestratorError + 'a {
    move |source| OrchestratorError::Store {
        operation,
        key: key.to_string(),
        source,
    }
}

fn serialization_error(context: &str) -> impl FnOnce(serde_json::Error) -> OrchestratorError + '_ {
    move |source| OrchestratorError::Serialization {
        context: context.to_string(),
        source,
    }
}
