use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "operator.ibm.com",
    version = "v1",
    kind = "NamespaceScope",
    plural = "namespacescopes",
    derive = "Default",
    shortname = "nss",
    namespaced
)]
pub struct NamespaceScopeSpec {
    #[serde(default)]
    pub namespace_members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configmap_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restart_labels: Vec<String>,
}
