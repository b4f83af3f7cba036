use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use super::Task;
use crate::{
    cluster::{self, ClusterClient},
    config::{COMMON_SERVICE_NAME, OperatorConfig},
    crd::{BedrockOperator, ClusterServiceVersion, CommonService, Subscription},
    error::Result,
    status::{NOT_READY, READY, fold, ready_str},
    version::parse_csv_version,
};

/// Subscriptions in the services namespace whose health is reported.
pub const BEDROCK_OPERATORS: &[&str] = &[
    "ibm-namespace-scope-operator",
    "operand-deployment-lifecycle-manager-app",
    "ibm-iam-operator",
    "ibm-cert-manager-operator",
    "ibm-management-ingress-operator",
    "ibm-licensing-operator",
];

pub struct OperatorStatusTask {
    client: Arc<dyn ClusterClient>,
    cfg: Arc<OperatorConfig>,
}

impl OperatorStatusTask {
    pub fn new(client: Arc<dyn ClusterClient>, cfg: Arc<OperatorConfig>) -> Self {
        OperatorStatusTask { client, cfg }
    }
}

#[async_trait]
impl Task for OperatorStatusTask {
    fn name(&self) -> &'static str {
        "operator-status"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(20)
    }

    async fn tick(&self) -> Result<()> {
        let client = self.client.as_ref();
        let op_ns = self.cfg.operator_namespace.as_str();
        let Some(cs) = cluster::get::<CommonService>(client, Some(op_ns), COMMON_SERVICE_NAME).await?
        else {
            debug!(namespace = op_ns, "no CommonService to report on");
            return Ok(());
        };

        let mut operators = Vec::new();
        for name in BEDROCK_OPERATORS {
            if let Some(op) = bedrock_status(client, &self.cfg.services_namespace, name).await? {
                operators.push(op);
            }
        }
        let overall = if operators.is_empty() {
            NOT_READY
        } else {
            fold(operators.iter().map(|op| op.status == READY))
        };

        let current = cs.status.unwrap_or_default();
        if current.bedrock_operators == operators && current.overall_status.as_deref() == Some(overall) {
            debug!("operator status unchanged");
            return Ok(());
        }

        let patch = json!({ "status": { "bedrockOperators": operators, "overallStatus": overall } });
        cluster::merge_patch_status::<CommonService>(client, Some(op_ns), COMMON_SERVICE_NAME, &patch)
            .await?;
        info!(overall, operators = operators.len(), "updated bedrock operator status");
        Ok(())
    }
}

/// Status of one operator, `None` when it has no Subscription.
pub async fn bedrock_status(
    client: &dyn ClusterClient,
    namespace: &str,
    name: &str,
) -> Result<Option<BedrockOperator>> {
    let Some(sub) = cluster::get::<Subscription>(client, Some(namespace), name).await? else {
        return Ok(None);
    };

    let csv = match sub.installed_csv() {
        Some(csv) => cluster::get::<ClusterServiceVersion>(client, Some(namespace), csv).await?,
        None => None,
    };
    let ready = csv.as_ref().is_some_and(ClusterServiceVersion::succeeded);

    Ok(Some(BedrockOperator {
        name: name.to_string(),
        version: sub
            .installed_csv()
            .and_then(parse_csv_version)
            .map(|v| v.to_string()),
        status: ready_str(ready).to_string(),
        install_plan_name: sub
            .status
            .as_ref()
            .and_then(|s| s.installplan.as_ref())
            .map(|ip| ip.name.clone()),
        subscription_status: sub.state().map(String::from),
        operator_status: csv
            .as_ref()
            .and_then(|c| c.status.as_ref())
            .and_then(|s| s.phase.clone()),
    }))
}
