use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use k8s_openapi::api::{apps::v1::Deployment, core::v1::ConfigMap};
use kube::api::ObjectMeta;
use serde_json::json;
use tracing::{debug, info};

use super::Task;
use crate::{
    cluster::{self, ClusterClient},
    config::{KUBE_PUBLIC, OperatorConfig, STATUS_CONFIGMAP},
    error::Result,
    status::{IAM_STATUS_KEY, WorkloadReadiness, check_overall_status, fold, iam_status_key},
};

pub const IAM_DEPLOYMENTS: &[&str] = &[
    "auth-idp",
    "auth-pap",
    "auth-pdp",
    "oidcclient-watcher",
    "secret-watcher",
];

pub struct IamStatusTask {
    client: Arc<dyn ClusterClient>,
    cfg: Arc<OperatorConfig>,
}

impl IamStatusTask {
    pub fn new(client: Arc<dyn ClusterClient>, cfg: Arc<OperatorConfig>) -> Self {
        IamStatusTask { client, cfg }
    }

    async fn iam_status(&self) -> Result<&'static str> {
        let ns = self.cfg.services_namespace.as_str();
        let mut ready = Vec::with_capacity(IAM_DEPLOYMENTS.len());
        for name in IAM_DEPLOYMENTS {
            let deploy = cluster::get::<Deployment>(self.client.as_ref(), Some(ns), name).await?;
            let this = deploy.as_ref().is_some_and(WorkloadReadiness::is_ready);
            if !this {
                debug!(namespace = ns, deployment = name, "IAM deployment not ready");
            }
            ready.push(this);
        }
        Ok(fold(ready))
    }
}

#[async_trait]
impl Task for IamStatusTask {
    fn name(&self) -> &'static str {
        "iam-status"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn tick(&self) -> Result<()> {
        let status = self.iam_status().await?;
        let key = iam_status_key(&self.cfg.services_namespace);
        write_status(self.client.as_ref(), &key, status).await
    }
}

/// Sets `key` and refolds the overall `iamstatus`, writing only on change.
pub async fn write_status(client: &dyn ClusterClient, key: &str, value: &str) -> Result<()> {
    let existing = cluster::get::<ConfigMap>(client, Some(KUBE_PUBLIC), STATUS_CONFIGMAP).await?;

    let mut data: BTreeMap<String, String> = existing
        .as_ref()
        .and_then(|cm| cm.data.clone())
        .unwrap_or_default();
    let before = data.clone();
    data.insert(key.to_string(), value.to_string());
    let overall = check_overall_status(&data);
    data.insert(IAM_STATUS_KEY.to_string(), overall.clone());

    match existing {
        None => {
            let cm = ConfigMap {
                metadata: ObjectMeta {
                    name: Some(STATUS_CONFIGMAP.into()),
                    namespace: Some(KUBE_PUBLIC.into()),
                    ..Default::default()
                },
                data: Some(data),
                ..Default::default()
            };
            cluster::create(client, &cm).await?;
            info!(key, value, overall = %overall, "created status ConfigMap");
        }
        Some(_) if before == data => debug!(key, value, "status unchanged"),
        Some(_) => {
            let patch = json!({ "data": { key: value, IAM_STATUS_KEY: overall } });
            cluster::merge_patch::<ConfigMap>(client, Some(KUBE_PUBLIC), STATUS_CONFIGMAP, &patch)
                .await?;
            info!(key, value, overall = %overall, "updated status ConfigMap");
        }
    }
    Ok(())
}

/// Drops `key` and refolds. Used when a CommonService goes away.
pub async fn remove_status(client: &dyn ClusterClient, key: &str) -> Result<()> {
    let Some(cm) = cluster::get::<ConfigMap>(client, Some(KUBE_PUBLIC), STATUS_CONFIGMAP).await?
    else {
        return Ok(());
    };
    let mut data = cm.data.unwrap_or_default();
    if data.remove(key).is_none() {
        return Ok(());
    }
    let overall = check_overall_status(&data);
    let patch = json!({ "data": { key: null, IAM_STATUS_KEY: overall } });
    cluster::merge_patch::<ConfigMap>(client, Some(KUBE_PUBLIC), STATUS_CONFIGMAP, &patch).await?;
    info!(key, "removed status key");
    Ok(())
}
