use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{info, warn};

use super::Task;
use crate::{
    cluster::{self, ClusterClient},
    config::OperatorConfig,
    crd::{ClusterServiceVersion, Subscription},
    error::Result,
};

pub const DEPRECATED_OPERATORS: &[&str] = &[
    "ibm-metering-operator",
    "ibm-monitoring-exporters-operator",
    "ibm-monitoring-prometheusext-operator",
    "ibm-monitoring-grafana-operator",
    "ibm-elastic-stack-operator",
];

pub struct CleanupTask {
    client: Arc<dyn ClusterClient>,
    cfg: Arc<OperatorConfig>,
}

impl CleanupTask {
    pub fn new(client: Arc<dyn ClusterClient>, cfg: Arc<OperatorConfig>) -> Self {
        CleanupTask { client, cfg }
    }
}

#[async_trait]
impl Task for CleanupTask {
    fn name(&self) -> &'static str {
        "deprecated-cleanup"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(600)
    }

    async fn tick(&self) -> Result<()> {
        let ns = self.cfg.services_namespace.as_str();
        let mut last_err = None;
        for name in DEPRECATED_OPERATORS {
            if let Err(e) = remove_operator(self.client.as_ref(), ns, name).await {
                warn!(namespace = ns, operator = name, error = %e, "cleanup failed");
                last_err = Some(e);
            }
        }
        last_err.map_or(Ok(()), Err)
    }
}

/// OLM's component label on the objects it installs for an operator.
fn component_label(name: &str, namespace: &str) -> String {
    format!("operators.coreos.com/{name}.{namespace}")
}

/// Deletes the Subscription `name` and the CSV it installed. `false` when
/// there was no such Subscription.
pub async fn remove_operator(client: &dyn ClusterClient, namespace: &str, name: &str) -> Result<bool> {
    let Some(sub) = cluster::get::<Subscription>(client, Some(namespace), name).await? else {
        return Ok(false);
    };
    let csvs: Vec<String> = match sub.installed_csv() {
        Some(csv) => vec![csv.to_string()],
        // Status not written yet: fall back to what OLM labelled.
        None => cluster::list::<ClusterServiceVersion>(
            client,
            Some(namespace),
            Some(&component_label(name, namespace)),
        )
        .await?
        .into_iter()
        .filter_map(|csv| csv.metadata.name)
        .collect(),
    };
    for csv in &csvs {
        cluster::delete::<ClusterServiceVersion>(client, Some(namespace), csv).await?;
    }
    cluster::delete::<Subscription>(client, Some(namespace), name).await?;
    info!(namespace, operator = name, "removed deprecated operator");
    Ok(true)
}
