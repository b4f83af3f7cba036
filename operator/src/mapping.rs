use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    cluster::{self, ClusterClient},
    config::{CS_MAPS_CONFIGMAP, CS_MAPS_KEY, KUBE_PUBLIC},
    error::{Error, Result},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsMaps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_cs_ns: Option<String>,
    #[serde(default)]
    pub namespace_mapping: Vec<NamespaceMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceMapping {
    #[serde(rename = "requested-from-namespace", default)]
    pub requested_from_namespace: Vec<String>,
    #[serde(rename = "map-to-common-service-namespace")]
    pub map_to_common_service_namespace: String,
}

impl CsMaps {
    pub fn parse(text: &str) -> Result<Self> {
        let maps: CsMaps = serde_yaml::from_str(text)?;
        maps.validate()?;
        Ok(maps)
    }

    /// Rejects overlapping mappings.
    pub fn validate(&self) -> Result<()> {
        // A common-service namespace always serves itself.
        let mut owner: BTreeMap<&str, &str> = BTreeMap::new();
        for mapping in &self.namespace_mapping {
            let cs_ns = mapping.map_to_common_service_namespace.as_str();
            if cs_ns.is_empty() {
                return Err(Error::InvalidMapping(
                    "map-to-common-service-namespace is empty".into(),
                ));
            }
            if self.control_namespace.as_deref() == Some(cs_ns) {
                return Err(Error::InvalidMapping(format!(
                    "control namespace {cs_ns} is used as a common-service namespace"
                )));
            }
            owner.insert(cs_ns, cs_ns);
        }

        for mapping in &self.namespace_mapping {
            let cs_ns = mapping.map_to_common_service_namespace.as_str();
            for requested in &mapping.requested_from_namespace {
                if self.control_namespace.as_deref() == Some(requested.as_str()) {
                    return Err(Error::InvalidMapping(format!(
                        "control namespace {requested} is listed as a requested-from namespace"
                    )));
                }
                match owner.insert(requested, cs_ns) {
                    Some(previous) if previous != cs_ns => {
                        return Err(Error::InvalidMapping(format!(
                            "namespace {requested} is mapped to both {previous} and {cs_ns}"
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Common-services namespace serving `namespace`, if the table says.
    pub fn services_namespace_for(&self, namespace: &str) -> Option<&str> {
        self.namespace_mapping
            .iter()
            .find(|m| {
                m.map_to_common_service_namespace == namespace
                    || m.requested_from_namespace.iter().any(|r| r == namespace)
            })
            .map(|m| m.map_to_common_service_namespace.as_str())
            .or(self.default_cs_ns.as_deref())
    }

    /// Every namespace served by `cs_namespace`, itself included.
    pub fn members_of(&self, cs_namespace: &str) -> Vec<String> {
        let mut members = vec![cs_namespace.to_string()];
        for mapping in &self.namespace_mapping {
            if mapping.map_to_common_service_namespace == cs_namespace {
                for ns in &mapping.requested_from_namespace {
                    if !members.contains(ns) {
                        members.push(ns.clone());
                    }
                }
            }
        }
        members
    }
}

/// Reads and validates `kube-public/common-service-maps`. `None` when the
/// ConfigMap or its key is absent.
pub async fn load(client: &dyn ClusterClient) -> Result<Option<CsMaps>> {
    let Some(cm) = cluster::get::<ConfigMap>(client, Some(KUBE_PUBLIC), CS_MAPS_CONFIGMAP).await?
    else {
        debug!("no common-service-maps ConfigMap");
        return Ok(None);
    };
    match cm.data.as_ref().and_then(|d| d.get(CS_MAPS_KEY)) {
        Some(text) => CsMaps::parse(text).map(Some),
        None => Ok(None),
    }
}
