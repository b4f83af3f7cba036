use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::Task;
use crate::{
    cluster::{self, ClusterClient, api_resource_for},
    config::{CPP_CONFIGMAP, OperatorConfig},
    error::Result,
};

const OPENSHIFT_CONFIG_API: &str = "config.openshift.io/v1";
const CLUSTER_TYPE_OCP: &str = "ocp";
const CLUSTER_TYPE_CNCF: &str = "cncf";

pub struct CppConfigTask {
    client: Arc<dyn ClusterClient>,
    cfg: Arc<OperatorConfig>,
}

impl CppConfigTask {
    pub fn new(client: Arc<dyn ClusterClient>, cfg: Arc<OperatorConfig>) -> Self {
        CppConfigTask { client, cfg }
    }
}

#[async_trait]
impl Task for CppConfigTask {
    fn name(&self) -> &'static str {
        "cpp-config"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn tick(&self) -> Result<()> {
        let domain = openshift_ingress_domain(self.client.as_ref()).await?;
        let defaults = computed_defaults(&self.cfg.services_namespace, domain.as_deref());
        fill_missing(self.client.as_ref(), &self.cfg.services_namespace, &defaults).await
    }
}

/// `spec.domain` of the cluster-wide OpenShift ingress config, when this is
/// an OpenShift cluster.
async fn openshift_ingress_domain(client: &dyn ClusterClient) -> Result<Option<String>> {
    if !client.has_kind(OPENSHIFT_CONFIG_API, "Ingress").await? {
        return Ok(None);
    }
    let ar = api_resource_for(OPENSHIFT_CONFIG_API, "Ingress")?;
    Ok(client
        .get(&ar, None, "cluster")
        .await?
        .and_then(|obj| obj.data.pointer("/spec/domain").and_then(Value::as_str).map(String::from)))
}

pub fn computed_defaults(services_namespace: &str, domain: Option<&str>) -> BTreeMap<String, String> {
    let (cluster_type, domain) = match domain {
        Some(domain) => (CLUSTER_TYPE_OCP, domain.to_string()),
        None => (CLUSTER_TYPE_CNCF, "cluster.local".to_string()),
    };
    let address = format!("cp-console-{services_namespace}.{domain}");

    [
        ("kubernetes_cluster_type", cluster_type.to_string()),
        ("cluster_name", "mycluster".to_string()),
        ("domain_name", domain),
        ("cluster_address", address.clone()),
        ("cluster_endpoint", format!("https://{address}")),
        ("cluster_router_http_port", "80".to_string()),
        ("cluster_router_https_port", "443".to_string()),
        ("proxy_address", address),
        ("cluster_kube_apiserver_host", "kubernetes.default".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Adds the keys of `defaults` that the ConfigMap lacks. Present keys are
/// left alone even when they differ.
pub async fn fill_missing(
    client: &dyn ClusterClient,
    namespace: &str,
    defaults: &BTreeMap<String, String>,
) -> Result<()> {
    let Some(cm) = cluster::get::<ConfigMap>(client, Some(namespace), CPP_CONFIGMAP).await? else {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(CPP_CONFIGMAP.into()),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            data: Some(defaults.clone()),
            ..Default::default()
        };
        cluster::create(client, &cm).await?;
        info!(namespace, "created {CPP_CONFIGMAP}");
        return Ok(());
    };

    let existing = cm.data.unwrap_or_default();
    let missing: BTreeMap<&String, &String> = defaults
        .iter()
        .filter(|(k, _)| !existing.contains_key(*k))
        .collect();
    if missing.is_empty() {
        debug!(namespace, "{CPP_CONFIGMAP} complete");
        return Ok(());
    }

    let keys: Vec<&str> = missing.keys().map(|k| k.as_str()).collect();
    let patch = json!({ "data": missing });
    cluster::merge_patch::<ConfigMap>(client, Some(namespace), CPP_CONFIGMAP, &patch).await?;
    info!(namespace, keys = ?keys, "filled missing {CPP_CONFIGMAP} keys");
    Ok(())
}
