//! Tenant resource and connection lookup.
//!
//! The orchestrator never talks to the resource registry directly. It asks a
//! [`ResourceResolver`] for provider-native names and a [`ConnectionCatalog`]
//! for connection configs. Static implementations back the CLI and tests.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};

/// Kind of tenant resource a cluster can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    VNet,
    Subnet,
    SecurityGroup,
    Image,
    Spec,
    SshKey,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::VNet => "vNet",
            Self::Subnet => "subnet",
            Self::SecurityGroup => "securityGroup",
            Self::Image => "image",
            Self::Spec => "spec",
            Self::SshKey => "sshKey",
        };
        f.write_str(name)
    }
}

/// Subnet of a VNet: tenant id and provider-native name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetRef {
    pub id: String,
    pub csp_name: String,
}

impl SubnetRef {
    #[must_use]
    pub fn new(id: impl Into<String>, csp_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            csp_name: csp_name.into(),
        }
    }
}

/// Maps tenant resource ids to provider-native names.
#[async_trait]
pub trait ResourceResolver: Send + Sync {
    /// Provider-native name of a resource. Empty when the id does not exist in
    /// the namespace.
    async fn resolve(
        &self,
        namespace: &str,
        kind: ResourceKind,
        id: &str,
    ) -> OrchestratorResult<String>;

    /// Subnets registered under a VNet. Empty when the VNet is unknown.
    async fn vnet_subnets(&self, namespace: &str, vnet_id: &str)
        -> OrchestratorResult<Vec<SubnetRef>>;
}

/// Connection configuration: which provider and credentials a name refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub config_name: String,
    pub provider_name: String,
    #[serde(default)]
    pub region_name: String,
    #[serde(default)]
    pub credential_name: String,
}

/// Looks up connection configs by name.
#[async_trait]
pub trait ConnectionCatalog: Send + Sync {
    /// # Errors
    /// Returns [`OrchestratorError::NotFound`] for an unknown connection.
    async fn lookup(&self, connection_name: &str) -> OrchestratorResult<ConnectionConfig>;
}

/// One resource entry as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBinding {
    pub namespace: String,
    pub kind: ResourceKind,
    pub id: String,
    pub csp_name: String,
    /// Only meaningful for [`ResourceKind::VNet`].
    #[serde(default)]
    pub subnets: Vec<SubnetRef>,
}

/// In-memory [`ResourceResolver`].
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    names: HashMap<(String, ResourceKind, String), String>,
    subnets: HashMap<(String, String), Vec<SubnetRef>>,
}

impl StaticResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource.
    #[must_use]
    pub fn with_resource(
        mut self,
        namespace: &str,
        kind: ResourceKind,
        id: &str,
        csp_name: &str,
    ) -> Self {
        self.names.insert(
            (namespace.to_string(), kind, id.to_string()),
            csp_name.to_string(),
        );
        self
    }

    /// Register a VNet together with its subnets.
    #[must_use]
    pub fn with_vnet(
        mut self,
        namespace: &str,
        vnet_id: &str,
        csp_name: &str,
        subnets: Vec<SubnetRef>,
    ) -> Self {
        for subnet in &subnets {
            self.names.insert(
                (namespace.to_string(), ResourceKind::Subnet, subnet.id.clone()),
                subnet.csp_name.clone(),
            );
        }
        self.subnets
            .insert((namespace.to_string(), vnet_id.to_string()), subnets);
        self.with_resource(namespace, ResourceKind::VNet, vnet_id, csp_name)
    }

    /// Build from config-file bindings.
    #[must_use]
    pub fn from_bindings(bindings: Vec<ResourceBinding>) -> Self {
        bindings
            .into_iter()
            .fold(Self::new(), |resolver, binding| match binding.kind {
                ResourceKind::VNet => resolver.with_vnet(
                    &binding.namespace,
                    &binding.id,
                    &binding.csp_name,
                    binding.subnets,
                ),
                kind => resolver.with_resource(&binding.namespace, kind, &binding.id, &binding.csp_name),
            })
    }
}

#[async_trait]
impl ResourceResolver for StaticResolver {
    async fn resolve(
        &self,
        namespace: &str,
        kind: ResourceKind,
        id: &str,
    ) -> OrchestratorResult<String> {
        Ok(self
            .names
            .get(&(namespace.to_string(), kind, id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn vnet_subnets(
        &self,
        namespace: &str,
        vnet_id: &str,
    ) -> OrchestratorResult<Vec<SubnetRef>> {
        Ok(self
            .subnets
            .get(&(namespace.to_string(), vnet_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory [`ConnectionCatalog`].
#[derive(Debug, Clone, Default)]
pub struct StaticConnections {
    by_name: HashMap<String, ConnectionConfig>,
}

impl StaticConnections {
    #[must_use]
    pub fn new(connections: impl IntoIterator<Item = ConnectionConfig>) -> Self {
        Self {
            by_name: connections
                .into_iter()
                .map(|c| (c.config_name.clone(), c))
                .collect(),
        }
    }
}

#[async_trait]
impl ConnectionCatalog for StaticConnections {
    async fn lookup(&self, connection_name: &str) -> OrchestratorResult<ConnectionConfig> {
        self.by_name
            .get(connection_name)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound {
                kind: "Connection",
                namespace: String::new(),
                id: connection_name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver_scopes_by_namespace() {
        let resolver = StaticResolver::new()
            .with_resource("ns1", ResourceKind::Spec, "spec-small", "t3.medium")
            .with_vnet(
                "ns1",
                "vnet-01",
                "vpc-abc",
                vec![SubnetRef::new("subnet-a", "subnet-0a")],
            );

        assert_eq!(
            resolver.resolve("ns1", ResourceKind::Spec, "spec-small").await.unwrap(),
            "t3.medium"
        );
        assert_eq!(
            resolver.resolve("ns2", ResourceKind::Spec, "spec-small").await.unwrap(),
            ""
        );
        assert_eq!(
            resolver.resolve("ns1", ResourceKind::Subnet, "subnet-a").await.unwrap(),
            "subnet-0a"
        );
        assert_eq!(resolver.vnet_subnets("ns1", "vnet-01").await.unwrap().len(), 1);
        assert!(resolver.vnet_subnets("ns1", "vnet-02").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_connection_is_not_found() {
        let catalog = StaticConnections::new(vec![ConnectionConfig {
            config_name: "aws-ap-northeast-2".to_string(),
            provider_name: "AWS".to_string(),
            region_name: "ap-northeast-2".to_string(),
            credential_name: String::new(),
        }]);

        assert_eq!(
            catalog.lookup("aws-ap-northeast-2").await.unwrap().provider_name,
            "AWS"
        );
        assert!(matches!(
            catalog.lookup("gcp-x").await.unwrap_err(),
            OrchestratorError::NotFound { kind: "Connection", .. }
        ));
    }

    #[test]
    fn test_resource_kind_wire_names() {
        assert_eq!(serde_json::to_value(ResourceKind::VNet).unwrap(), "vNet");
        assert_eq!(serde_json::to_value(ResourceKind::SshKey).unwrap(), "sshKey");
        assert_eq!(ResourceKind::SecurityGroup.to_string(), "securityGroup");
    }
}
