//! Unified cloud-driver gateway.
//!
//! The driver service fronts every cloud provider with one REST API. This
//! module holds its wire models and the [`DriverGateway`] seam the lifecycle
//! manager calls through.

mod client;
pub mod models;

pub use client::{DriverError, DriverGateway, DriverTimeouts, HttpDriverGateway, TimeoutClass};
pub use models::{BoolResult, ClusterInfo, Iid, NodeGroupInfo};
