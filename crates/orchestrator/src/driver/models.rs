//! Cloud-driver request and response models.
//!
//! The driver speaks PascalCase JSON, encodes booleans and sizes in requests as
//! strings, and sends `null` for empty lists.

use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize `null` as the type's default.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept `"true"`/`"false"` strings as well as JSON booleans.
fn bool_from_string_or_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(s) => Ok(s.trim().eq_ignore_ascii_case("true")),
    }
}

/// Encode a boolean the way the driver expects it in requests.
#[must_use]
pub fn flag(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

// ============================================================================
// Response types
// ============================================================================

/// Provider-native identifier: a human-readable name plus the system id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iid {
    #[serde(rename = "NameId", default, deserialize_with = "nullable")]
    pub name_id: String,
    #[serde(rename = "SystemId", default, deserialize_with = "nullable")]
    pub system_id: String,
}

impl Iid {
    #[must_use]
    pub fn new(name_id: impl Into<String>, system_id: impl Into<String>) -> Self {
        Self {
            name_id: name_id.into(),
            system_id: system_id.into(),
        }
    }

    /// Identifier that only carries a system id.
    #[must_use]
    pub fn system(system_id: impl Into<String>) -> Self {
        Self::new(String::new(), system_id)
    }
}

/// Driver key/value pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DriverKeyValue {
    #[serde(default, deserialize_with = "nullable")]
    pub key: String,
    #[serde(default, deserialize_with = "nullable")]
    pub value: String,
}

/// Cluster network as reported by the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(rename = "VpcIID", default, deserialize_with = "nullable")]
    pub vpc_iid: Iid,
    #[serde(rename = "SubnetIIDs", default, deserialize_with = "nullable")]
    pub subnet_iids: Vec<Iid>,
    #[serde(rename = "SecurityGroupIIDs", default, deserialize_with = "nullable")]
    pub security_group_iids: Vec<Iid>,
    #[serde(rename = "KeyValueList", default, deserialize_with = "nullable")]
    pub key_value_list: Vec<DriverKeyValue>,
}

/// Node group as reported by the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroupInfo {
    #[serde(rename = "IId", default, deserialize_with = "nullable")]
    pub iid: Iid,
    #[serde(rename = "ImageIID", default, deserialize_with = "nullable")]
    pub image_iid: Iid,
    #[serde(rename = "VMSpecName", default, deserialize_with = "nullable")]
    pub vm_spec_name: String,
    #[serde(rename = "RootDiskType", default, deserialize_with = "nullable")]
    pub root_disk_type: String,
    #[serde(rename = "RootDiskSize", default, deserialize_with = "nullable")]
    pub root_disk_size: String,
    #[serde(rename = "KeyPairIID", default, deserialize_with = "nullable")]
    pub key_pair_iid: Iid,
    #[serde(rename = "OnAutoScaling", default, deserialize_with = "bool_from_string_or_bool")]
    pub on_auto_scaling: bool,
    #[serde(rename = "DesiredNodeSize", default, deserialize_with = "nullable")]
    pub desired_node_size: u32,
    #[serde(rename = "MinNodeSize", default, deserialize_with = "nullable")]
    pub min_node_size: u32,
    #[serde(rename = "MaxNodeSize", default, deserialize_with = "nullable")]
    pub max_node_size: u32,
    #[serde(rename = "Status", default, deserialize_with = "nullable")]
    pub status: String,
    #[serde(rename = "Nodes", default, deserialize_with = "nullable")]
    pub nodes: Vec<Iid>,
    #[serde(rename = "KeyValueList", default, deserialize_with = "nullable")]
    pub key_value_list: Vec<DriverKeyValue>,
}

/// Control-plane access as reported by the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DriverAccessInfo {
    #[serde(default, deserialize_with = "nullable")]
    pub endpoint: String,
    #[serde(default, deserialize_with = "nullable")]
    pub kubeconfig: String,
}

/// Addons as reported by the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonsInfo {
    #[serde(rename = "KeyValueList", default, deserialize_with = "nullable")]
    pub key_value_list: Vec<DriverKeyValue>,
}

/// Cluster as reported by the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    #[serde(rename = "IId", default, deserialize_with = "nullable")]
    pub iid: Iid,
    #[serde(rename = "Version", default, deserialize_with = "nullable")]
    pub version: String,
    #[serde(rename = "Network", default, deserialize_with = "nullable")]
    pub network: NetworkInfo,
    #[serde(rename = "NodeGroupList", default, deserialize_with = "nullable")]
    pub node_group_list: Vec<NodeGroupInfo>,
    #[serde(rename = "AccessInfo", default, deserialize_with = "nullable")]
    pub access_info: DriverAccessInfo,
    #[serde(rename = "Addons", default, deserialize_with = "nullable")]
    pub addons: AddonsInfo,
    #[serde(rename = "Status", default, deserialize_with = "nullable")]
    pub status: String,
    #[serde(rename = "CreatedTime", default, deserialize_with = "nullable")]
    pub created_time: String,
    #[serde(rename = "KeyValueList", default, deserialize_with = "nullable")]
    pub key_value_list: Vec<DriverKeyValue>,
}

/// Outcome of boolean-style operations (`{"Result": "true"}`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct BoolResult {
    #[serde(rename = "Result", deserialize_with = "bool_from_string_or_bool")]
    pub success: bool,
}

// ============================================================================
// Request types
// ============================================================================

/// Envelope shared by every driver request.
#[derive(Debug, Clone, Serialize)]
pub struct DriverRequest<T: Serialize> {
    /// Always empty from this layer.
    #[serde(rename = "NameSpace")]
    pub namespace: String,
    #[serde(rename = "ConnectionName")]
    pub connection_name: String,
    #[serde(rename = "ReqInfo", skip_serializing_if = "Option::is_none")]
    pub req_info: Option<T>,
}

impl<T: Serialize> DriverRequest<T> {
    /// Request carrying operation-specific info.
    pub fn new(connection_name: impl Into<String>, req_info: T) -> Self {
        Self {
            namespace: String::new(),
            connection_name: connection_name.into(),
            req_info: Some(req_info),
        }
    }
}

impl DriverRequest<()> {
    /// Request that only addresses a connection.
    pub fn connection_only(connection_name: impl Into<String>) -> Self {
        Self {
            namespace: String::new(),
            connection_name: connection_name.into(),
            req_info: None,
        }
    }
}

/// Node group to create, with provider-native names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeGroupReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ImageName")]
    pub image_name: String,
    #[serde(rename = "VMSpecName")]
    pub vm_spec_name: String,
    #[serde(rename = "RootDiskType")]
    pub root_disk_type: String,
    #[serde(rename = "RootDiskSize")]
    pub root_disk_size: String,
    #[serde(rename = "KeyPairName")]
    pub key_pair_name: String,
    #[serde(rename = "OnAutoScaling")]
    pub on_auto_scaling: String,
    #[serde(rename = "DesiredNodeSize")]
    pub desired_node_size: String,
    #[serde(rename = "MinNodeSize")]
    pub min_node_size: String,
    #[serde(rename = "MaxNodeSize")]
    pub max_node_size: String,
}

/// Cluster to create, with provider-native names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "VPCName")]
    pub vpc_name: String,
    #[serde(rename = "SubnetNames")]
    pub subnet_names: Vec<String>,
    #[serde(rename = "SecurityGroupNames")]
    pub security_group_names: Vec<String>,
    #[serde(rename = "NodeGroupList")]
    pub node_group_list: Vec<NodeGroupReqInfo>,
}

/// Existing provider cluster to adopt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterRegisterReqInfo {
    #[serde(rename = "VPCName")]
    pub vpc_name: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "CSPId")]
    pub csp_id: String,
}

/// Autoscaling toggle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutoScalingReqInfo {
    #[serde(rename = "OnAutoScaling")]
    pub on_auto_scaling: String,
}

/// Autoscale bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutoscaleSizeReqInfo {
    #[serde(rename = "DesiredNodeSize")]
    pub desired_node_size: String,
    #[serde(rename = "MinNodeSize")]
    pub min_node_size: String,
    #[serde(rename = "MaxNodeSize")]
    pub max_node_size: String,
}

/// Version upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpgradeReqInfo {
    #[serde(rename = "Version")]
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cluster_info_tolerates_nulls() {
        let info: ClusterInfo = serde_json::from_value(json!({
            "IId": {"NameId": "c1", "SystemId": "csp-c1"},
            "Version": "1.30",
            "Network": {
                "VpcIID": {"NameId": "vpc", "SystemId": "vpc-123"},
                "SubnetIIDs": null,
                "SecurityGroupIIDs": null,
                "KeyValueList": null
            },
            "NodeGroupList": null,
            "AccessInfo": {"Endpoint": "https://k8s", "Kubeconfig": null},
            "Addons": {"KeyValueList": null},
            "Status": "Active",
            "CreatedTime": "2024-05-01T10:00:00Z",
            "KeyValueList": null
        }))
        .unwrap();

        assert_eq!(info.iid.system_id, "csp-c1");
        assert!(info.network.subnet_iids.is_empty());
        assert!(info.node_group_list.is_empty());
        assert_eq!(info.access_info.kubeconfig, "");
    }

    #[test]
    fn test_bool_result_accepts_string_and_bool() {
        let from_text: BoolResult = serde_json::from_value(json!({"Result": "true"})).unwrap();
        let from_false: BoolResult = serde_json::from_value(json!({"Result": "False"})).unwrap();
        let from_bool: BoolResult = serde_json::from_value(json!({"Result": true})).unwrap();

        assert!(from_text.success);
        assert!(!from_false.success);
        assert!(from_bool.success);
    }

    #[test]
    fn test_request_envelope_shape() {
        let req = DriverRequest::new(
            "aws-conn",
            UpgradeReqInfo {
                version: "1.31".to_string(),
            },
        );
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"NameSpace": "", "ConnectionName": "aws-conn", "ReqInfo": {"Version": "1.31"}})
        );

        let bare = DriverRequest::connection_only("aws-conn");
        assert_eq!(
            serde_json::to_value(&bare).unwrap(),
            json!({"NameSpace": "", "ConnectionName": "aws-conn"})
        );
    }
}
