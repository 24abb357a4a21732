#![warn(clippy::pedantic)]
// Allow common pedantic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::too_many_lines)]

//! # Cluster Orchestrator
//!
//! Multi-cloud Kubernetes cluster lifecycle orchestration.
//!
//! Tenants describe clusters and node groups in a cloud-agnostic model. The
//! orchestrator resolves their references to provider-native names, calls a
//! unified cloud-driver service, and keeps a normalized record per cluster in
//! a versioned key-value store.
//!
//! - **Model translation** between the tenant model and the driver model
//! - **Capability gate** per provider, with a `Common` fallback
//! - **Drift detection** between persisted and live state
//! - **Optimistic concurrency** on every record update
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cluster_orchestrator::{ClusterManager, ConfigFile, HttpDriverGateway, MemoryStore};
//!
//! let file = ConfigFile::load("orchestrator.yaml")?;
//! let manager = ClusterManager::new(
//!     Arc::new(HttpDriverGateway::new("http://localhost:1024/spider", Default::default())?),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(file.resolver()),
//!     Arc::new(file.connection_catalog()),
//!     file.capability_table(),
//! );
//!
//! let clusters = manager.list_cluster("default", None).await?;
//! ```

// Errors
pub mod error;

// Tenant-facing model and validation
pub mod model;
pub mod validation;

// Driver-facing model and gateway
pub mod driver;

// Collaborators
pub mod resolver;
pub mod store;

// Core
pub mod capability;
pub mod manager;
pub mod reconcile;
pub mod translate;

// Configuration
pub mod config;

pub use capability::{CapabilitySettings, CapabilitySource, CapabilityTable, ProviderKey};
pub use config::{ConfigFile, OrchestratorConfig};
pub use driver::{DriverError, DriverGateway, DriverTimeouts, HttpDriverGateway, TimeoutClass};
pub use error::{OrchestratorError, OrchestratorResult};
pub use manager::{ClusterManager, ListFilter};
pub use model::{
    AutoscaleSizeRequest, ClusterCreateRequest, ClusterRecord, ClusterStatus, CreateOption,
    NodeGroupAddRequest, NodeGroupRecord, UpgradeRequest,
};
pub use resolver::{
    ConnectionCatalog, ConnectionConfig, ResourceKind, ResourceResolver, StaticConnections,
    StaticResolver, SubnetRef,
};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreEntry, StoreError};
