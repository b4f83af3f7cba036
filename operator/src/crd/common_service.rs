use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "operator.ibm.com",
    version = "v3",
    kind = "CommonService",
    plural = "commonservices",
    derive = "Default",
    derive = "PartialEq",
    status = "CommonServiceStatus",
    shortname = "cs",
    namespaced
)]
pub struct CommonServiceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Labels propagated onto the objects bootstrapped for this instance.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services_namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_plan_approval: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_host: Option<String>,

    #[serde(default)]
    pub manual_management: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<LicenseSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LicenseSpec {
    #[serde(default)]
    pub accept: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommonServiceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bedrock_operators: Vec<BedrockOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_status: Option<ConfigStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BedrockOperator {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_plan_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_status: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigStatus {
    pub operator_namespace: String,
    pub services_namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_namespace: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
}

pub const PHASE_PENDING: &str = "Pending";
pub const PHASE_RUNNING: &str = "Running";
pub const PHASE_TERMINATING: &str = "Terminating";

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn crd_is_namespaced_v3() {
        let crd = CommonService::crd();
        assert_eq!(crd.spec.group, "operator.ibm.com");
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.versions[0].name, "v3");
        assert_eq!(crd.spec.names.short_names, Some(vec!["cs".to_string()]));
    }

    #[test]
    fn spec_round_trips_camel_case_fields() {
        let cs: CommonService = serde_json::from_value(serde_json::json!({
            "apiVersion": "operator.ibm.com/v3",
            "kind": "CommonService",
            "metadata": {"name": "common-service", "namespace": "cs-op"},
            "spec": {
                "size": "small",
                "operatorNamespace": "cs-op",
                "servicesNamespace": "ibm-common-services",
                "labels": {"team": "platform"},
                "license": {"accept": true}
            }
        }))
        .unwrap();

        assert_eq!(cs.spec.operator_namespace.as_deref(), Some("cs-op"));
        assert_eq!(cs.spec.labels.get("team").map(String::as_str), Some("platform"));
        assert!(cs.spec.license.as_ref().is_some_and(|l| l.accept));
        assert!(!cs.spec.manual_management);
    }
}
