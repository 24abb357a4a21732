//! Error types for cluster lifecycle orchestration.

use thiserror::Error;

use crate::driver::DriverError;
use crate::resolver::ResourceKind;
use crate::store::StoreError;
use crate::validation::FieldViolation;

/// Result alias used throughout the crate.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors returned by the cluster lifecycle operations.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// A namespace, cluster, or node-group identifier failed the syntax check.
    #[error("Invalid identifier for {field}: {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },

    /// The request shape was rejected.
    #[error("Invalid request for {operation}: {}", FieldViolation::summarize(.violations))]
    Validation {
        operation: &'static str,
        violations: Vec<FieldViolation>,
    },

    /// A referenced cluster, connection, or node group does not exist.
    #[error("{kind} not found: {id} (namespace: {namespace})")]
    NotFound {
        kind: &'static str,
        namespace: String,
        id: String,
    },

    /// The cluster id is already taken in the namespace.
    #[error("Cluster already exists: {namespace}/{cluster}")]
    AlreadyExists { namespace: String, cluster: String },

    /// A referenced resource resolved to nothing.
    #[error("Failed to resolve {kind} {id:?} in namespace {namespace}")]
    Resolution {
        namespace: String,
        kind: ResourceKind,
        id: String,
    },

    /// None of the requested subnets belong to the VNet.
    #[error("No valid subnets in VNet {vnet}: requested {requested:?}")]
    NoValidSubnets { vnet: String, requested: Vec<String> },

    /// Cluster management is turned off for the provider.
    #[error("Cluster management is disabled for provider {provider}")]
    CapabilityDisabled { provider: String },

    /// The cloud-driver gateway call failed.
    #[error("Driver call {operation} failed for cluster {cluster}: {source}")]
    DriverCall {
        operation: &'static str,
        cluster: String,
        #[source]
        source: DriverError,
    },

    /// Reading or writing the state store failed.
    #[error("Store {operation} failed for key {key}: {source}")]
    Store {
        operation: &'static str,
        key: String,
        #[source]
        source: StoreError,
    },

    /// The live cluster no longer matches the persisted record.
    #[error("Cluster {namespace}/{cluster} drifted on: {}", .fields.join(", "))]
    DriftDetected {
        namespace: String,
        cluster: String,
        fields: Vec<&'static str>,
    },

    /// A record could not be encoded or decoded.
    #[error("Serialization error for {context}: {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Another writer updated the record between load and persist.
    #[error("Cluster {namespace}/{cluster} was modified concurrently")]
    ConcurrentModification { namespace: String, cluster: String },
}

impl OrchestratorError {
    /// Shorthand for a missing cluster record.
    pub(crate) fn cluster_not_found(namespace: &str, cluster: &str) -> Self {
        Self::NotFound {
            kind: "Cluster",
            namespace: namespace.to_string(),
            id: cluster.to_string(),
        }
    }

    /// Single-field validation failure.
    pub(crate) fn invalid(
        operation: &'static str,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            operation,
            violations: vec![FieldViolation::new(field, message)],
        }
    }
}
