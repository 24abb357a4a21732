//! Request validation.
//!
//! Validation is a plain function of the request: it returns every field-level
//! violation it finds instead of stopping at the first one.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::model::{AutoscaleSizeRequest, ClusterCreateRequest, NodeGroupAddRequest, UpgradeRequest};

/// Alphanumeric start, then alphanumerics and `-`, `_`, `.`. No path separators.
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").expect("identifier pattern is valid")
});

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Join violations into one line for error display.
    #[must_use]
    pub fn summarize(violations: &[FieldViolation]) -> String {
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Whether `value` is a syntactically valid identifier.
#[must_use]
pub fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER.is_match(value)
}

/// Check a namespace, cluster, or node-group identifier.
///
/// # Errors
/// Returns [`OrchestratorError::InvalidIdentifier`] when `value` is empty or
/// does not match the identifier syntax.
pub fn check_identifier(field: &'static str, value: &str) -> OrchestratorResult<()> {
    if is_valid_identifier(value) {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidIdentifier {
            field,
            value: value.to_string(),
        })
    }
}

/// Turn collected violations into a result.
///
/// # Errors
/// Returns [`OrchestratorError::Validation`] when `violations` is not empty.
pub fn ensure_valid(
    operation: &'static str,
    violations: Vec<FieldViolation>,
) -> OrchestratorResult<()> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(OrchestratorError::Validation {
            operation,
            violations,
        })
    }
}

fn require(violations: &mut Vec<FieldViolation>, field: &str, value: &str) {
    if value.trim().is_empty() {
        violations.push(FieldViolation::new(field, "is required"));
    }
}

fn require_identifier(violations: &mut Vec<FieldViolation>, field: &str, value: &str) {
    if !is_valid_identifier(value) {
        violations.push(FieldViolation::new(
            field,
            format!("{value:?} is not a valid identifier"),
        ));
    }
}

fn check_sizes(
    violations: &mut Vec<FieldViolation>,
    prefix: &str,
    min: u32,
    desired: u32,
    max: u32,
) {
    if min > desired || desired > max {
        violations.push(FieldViolation::new(
            format!("{prefix}desiredNodeSize"),
            format!("sizes must satisfy min <= desired <= max (got {min} <= {desired} <= {max})"),
        ));
    }
}

fn collect_node_group(violations: &mut Vec<FieldViolation>, prefix: &str, req: &NodeGroupAddRequest) {
    require_identifier(violations, &format!("{prefix}name"), &req.name);
    require(violations, &format!("{prefix}specId"), &req.spec_id);
    require(violations, &format!("{prefix}sshKeyId"), &req.ssh_key_id);
    require(violations, &format!("{prefix}rootDiskType"), &req.root_disk_type);
    require(violations, &format!("{prefix}rootDiskSize"), &req.root_disk_size);
    if req.on_auto_scaling {
        check_sizes(
            violations,
            prefix,
            req.min_node_size,
            req.desired_node_size,
            req.max_node_size,
        );
    }
}

/// Validate a node-group request.
#[must_use]
pub fn validate_node_group_request(req: &NodeGroupAddRequest) -> Vec<FieldViolation> {
    let mut violations = Vec::new();
    collect_node_group(&mut violations, "", req);
    violations
}

/// Validate a cluster create or register request.
#[must_use]
pub fn validate_cluster_request(req: &ClusterCreateRequest) -> Vec<FieldViolation> {
    let mut violations = Vec::new();

    require_identifier(&mut violations, "name", &req.name);
    require(&mut violations, "connectionName", &req.connection_name);
    require(&mut violations, "vNetId", &req.vnet_id);
    if req.subnet_ids.is_empty() {
        violations.push(FieldViolation::new("subnetIds", "at least one subnet is required"));
    }

    for (i, ng) in req.node_group_list.iter().enumerate() {
        collect_node_group(&mut violations, &format!("nodeGroupList[{i}]."), ng);
    }

    violations
}

/// Validate a register request. Subnets and node groups come from the
/// provider, so only addressing fields are checked.
#[must_use]
pub fn validate_register_request(req: &ClusterCreateRequest) -> Vec<FieldViolation> {
    let mut violations = Vec::new();
    require_identifier(&mut violations, "name", &req.name);
    require(&mut violations, "connectionName", &req.connection_name);
    require(&mut violations, "vNetId", &req.vnet_id);
    require(&mut violations, "cspResourceId", &req.csp_resource_id);
    violations
}

/// Validate an autoscale sizing change.
#[must_use]
pub fn validate_autoscale_size(req: &AutoscaleSizeRequest) -> Vec<FieldViolation> {
    let mut violations = Vec::new();
    check_sizes(
        &mut violations,
        "",
        req.min_node_size,
        req.desired_node_size,
        req.max_node_size,
    );
    violations
}

/// Validate a version upgrade.
#[must_use]
pub fn validate_upgrade(req: &UpgradeRequest) -> Vec<FieldViolation> {
    let mut violations = Vec::new();
    require(&mut violations, "version", &req.version);
    violations
}
