//! Cloud-driver gateway client.
//!
//! Every call is one HTTP request against `{base}/cluster[...]` with a JSON
//! envelope body and a timeout picked from the call's [`TimeoutClass`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::models::{
    flag, AutoScalingReqInfo, AutoscaleSizeReqInfo, BoolResult, ClusterInfo,
    ClusterRegisterReqInfo, ClusterReqInfo, DriverRequest, NodeGroupInfo, NodeGroupReqInfo,
    UpgradeReqInfo,
};

/// Errors returned by the driver gateway.
#[derive(Error, Debug)]
pub enum DriverError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Driver returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Driver reported the resource as missing.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Call exceeded its time budget.
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Response body did not match the expected shape.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Base URL cannot address driver resources.
    #[error("Invalid driver URL: {0}")]
    InvalidUrl(String),
}

/// Time budget class of a driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    /// Fast mutating calls.
    VeryShort,
    /// Reads and ordinary mutations.
    Medium,
    /// Provisioning a control plane.
    Long,
}

/// Duration per [`TimeoutClass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverTimeouts {
    pub very_short: Duration,
    pub medium: Duration,
    pub long: Duration,
}

impl Default for DriverTimeouts {
    fn default() -> Self {
        Self {
            very_short: Duration::from_secs(30),
            medium: Duration::from_secs(300),
            long: Duration::from_secs(1200),
        }
    }
}

impl DriverTimeouts {
    #[must_use]
    pub fn for_class(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::VeryShort => self.very_short,
            TimeoutClass::Medium => self.medium,
            TimeoutClass::Long => self.long,
        }
    }
}

/// Operations the orchestrator needs from the cloud-driver service.
///
/// `connection` is the connection config name; `cluster` is always the
/// provider-native cluster name.
#[async_trait]
pub trait DriverGateway: Send + Sync {
    /// Provision a new cluster.
    async fn create_cluster(
        &self,
        connection: &str,
        req: ClusterReqInfo,
    ) -> Result<ClusterInfo, DriverError>;

    /// Adopt an existing provider cluster.
    async fn register_cluster(
        &self,
        connection: &str,
        req: ClusterRegisterReqInfo,
    ) -> Result<ClusterInfo, DriverError>;

    /// Fetch live cluster state.
    async fn get_cluster(&self, connection: &str, cluster: &str)
        -> Result<ClusterInfo, DriverError>;

    /// Add a node group and return the whole cluster.
    async fn add_node_group(
        &self,
        connection: &str,
        cluster: &str,
        req: NodeGroupReqInfo,
    ) -> Result<ClusterInfo, DriverError>;

    /// Remove a node group.
    async fn remove_node_group(
        &self,
        connection: &str,
        cluster: &str,
        node_group: &str,
        force: bool,
    ) -> Result<BoolResult, DriverError>;

    /// Turn autoscaling on or off for a node group.
    async fn set_node_group_autoscaling(
        &self,
        connection: &str,
        cluster: &str,
        node_group: &str,
        on: bool,
    ) -> Result<BoolResult, DriverError>;

    /// Change autoscale bounds of a node group.
    async fn change_node_group_autoscale_size(
        &self,
        connection: &str,
        cluster: &str,
        node_group: &str,
        req: AutoscaleSizeReqInfo,
    ) -> Result<NodeGroupInfo, DriverError>;

    /// Upgrade the control-plane version.
    async fn upgrade_cluster(
        &self,
        connection: &str,
        cluster: &str,
        req: UpgradeReqInfo,
    ) -> Result<ClusterInfo, DriverError>;

    /// Delete the cluster at the provider.
    async fn delete_cluster(
        &self,
        connection: &str,
        cluster: &str,
        force: bool,
    ) -> Result<BoolResult, DriverError>;
}

/// HTTP implementation of [`DriverGateway`].
#[derive(Debug, Clone)]
pub struct HttpDriverGateway {
    /// HTTP client.
    client: Client,
    /// Driver service root, e.g. `http://localhost:1024/spider`.
    base_url: Url,
    /// Per-class time budgets.
    timeouts: DriverTimeouts,
}

impl HttpDriverGateway {
    /// Create a gateway rooted at `base_url`.
    ///
    /// # Errors
    /// Returns error if the URL is malformed or the HTTP client cannot be created.
    pub fn new(base_url: &str, timeouts: DriverTimeouts) -> Result<Self, DriverError> {
        let base_url =
            Url::parse(base_url).map_err(|e| DriverError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(DriverError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder().build().map_err(DriverError::Http)?;

        Ok(Self {
            client,
            base_url,
            timeouts,
        })
    }

    /// Driver service root.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `{base}/{segments...}`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, DriverError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| DriverError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Execute a driver request.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: &impl Serialize,
        class: TimeoutClass,
    ) -> Result<T, DriverError> {
        let timeout = self.timeouts.for_class(class);
        debug!(url = %url, method = %method, timeout_secs = timeout.as_secs(), "Driver request");

        let response = self
            .client
            .request(method, url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DriverError::Timeout(timeout.as_secs())
                } else {
                    DriverError::Http(e)
                }
            })?;

        Self::handle_response(response).await
    }

    /// Handle API response.
    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriverError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse driver response");
                DriverError::Serialization(e)
            })
        } else if status == StatusCode::NOT_FOUND {
            Err(DriverError::NotFound(text))
        } else {
            Err(DriverError::Api {
                status: status.as_u16(),
                message: text,
            })
        }
    }
}

#[async_trait]
impl DriverGateway for HttpDriverGateway {
    async fn create_cluster(
        &self,
        connection: &str,
        req: ClusterReqInfo,
    ) -> Result<ClusterInfo, DriverError> {
        let url = self.endpoint(&["cluster"])?;
        let body = DriverRequest::new(connection, req);
        self.call(Method::POST, url, &body, TimeoutClass::Long).await
    }

    async fn register_cluster(
        &self,
        connection: &str,
        req: ClusterRegisterReqInfo,
    ) -> Result<ClusterInfo, DriverError> {
        let url = self.endpoint(&["regcluster"])?;
        let body = DriverRequest::new(connection, req);
        self.call(Method::POST, url, &body, TimeoutClass::Medium).await
    }

    async fn get_cluster(
        &self,
        connection: &str,
        cluster: &str,
    ) -> Result<ClusterInfo, DriverError> {
        let url = self.endpoint(&["cluster", cluster])?;
        let body = DriverRequest::connection_only(connection);
        self.call(Method::GET, url, &body, TimeoutClass::Medium).await
    }

    async fn add_node_group(
        &self,
        connection: &str,
        cluster: &str,
        req: NodeGroupReqInfo,
    ) -> Result<ClusterInfo, DriverError> {
        let url = self.endpoint(&["cluster", cluster, "nodegroup"])?;
        let body = DriverRequest::new(connection, req);
        self.call(Method::POST, url, &body, TimeoutClass::Medium).await
    }

    async fn remove_node_group(
        &self,
        connection: &str,
        cluster: &str,
        node_group: &str,
        force: bool,
    ) -> Result<BoolResult, DriverError> {
        let mut url = self.endpoint(&["cluster", cluster, "nodegroup", node_group])?;
        if force {
            url.query_pairs_mut().append_pair("force", "true");
        }
        let body = DriverRequest::connection_only(connection);
        self.call(Method::DELETE, url, &body, TimeoutClass::Medium).await
    }

    async fn set_node_group_autoscaling(
        &self,
        connection: &str,
        cluster: &str,
        node_group: &str,
        on: bool,
    ) -> Result<BoolResult, DriverError> {
        let url = self.endpoint(&["cluster", cluster, "nodegroup", node_group, "onautoscaling"])?;
        let body = DriverRequest::new(
            connection,
            AutoScalingReqInfo {
                on_auto_scaling: flag(on),
            },
        );
        self.call(Method::PUT, url, &body, TimeoutClass::VeryShort)
            .await
    }

    async fn change_node_group_autoscale_size(
        &self,
        connection: &str,
        cluster: &str,
        node_group: &str,
        req: AutoscaleSizeReqInfo,
    ) -> Result<NodeGroupInfo, DriverError> {
        let url = self.endpoint(&["cluster", cluster, "nodegroup", node_group, "autoscalesize"])?;
        let body = DriverRequest::new(connection, req);
        self.call(Method::PUT, url, &body, TimeoutClass::VeryShort)
            .await
    }

    async fn upgrade_cluster(
        &self,
        connection: &str,
        cluster: &str,
        req: UpgradeReqInfo,
    ) -> Result<ClusterInfo, DriverError> {
        let url = self.endpoint(&["cluster", cluster, "upgrade"])?;
        let body = DriverRequest::new(connection, req);
        self.call(Method::PUT, url, &body, TimeoutClass::Medium).await
    }

    async fn delete_cluster(
        &self,
        connection: &str,
        cluster: &str,
        force: bool,
    ) -> Result<BoolResult, DriverError> {
        let mut url = self.endpoint(&["cluster", cluster])?;
        if force {
            url.query_pairs_mut().append_pair("force", "true");
        }
        let body = DriverRequest::connection_only(connection);
        self.call(Method::DELETE, url, &body, TimeoutClass::Medium).await
    }
}
