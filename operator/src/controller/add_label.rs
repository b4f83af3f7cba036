use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::{
    bootstrap::{NAMESPACE_SCOPE_API, ODLM_API},
    cluster::{ClusterClient, api_resource_for},
    config::{COMMON_SERVICE_NAME, OperatorConfig},
    error::Result,
    event::Outcome,
};

/// `(apiVersion, kind)` of every object that carries the propagated labels.
/// All of them are named `common-service` in the services namespace.
const LABELLED: &[(&str, &str)] = &[
    (ODLM_API, "OperandRegistry"),
    (ODLM_API, "OperandConfig"),
    (NAMESPACE_SCOPE_API, "NamespaceScope"),
];

/// Labels from `wanted` that are absent or different in `current`.
pub fn missing_labels(
    current: &BTreeMap<String, String>,
    wanted: &BTreeMap<String, String>,
) -> Map<String, Value> {
    wanted
        .iter()
        .filter(|(k, v)| current.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

pub async fn propagate_labels(
    client: &dyn ClusterClient,
    cfg: &OperatorConfig,
    labels: &BTreeMap<String, String>,
) -> Result<Outcome> {
    if labels.is_empty() {
        return Ok(Outcome::NoOp);
    }

    let ns = cfg.services_namespace.as_str();
    let mut outcome = Outcome::NoOp;
    for (api_version, kind) in LABELLED {
        let ar = api_resource_for(api_version, kind)?;
        let Some(obj) = client.get(&ar, Some(ns), COMMON_SERVICE_NAME).await? else {
            debug!(kind, namespace = ns, "not present, skipping labels");
            continue;
        };

        let patch = missing_labels(&obj.metadata.labels.unwrap_or_default(), labels);
        if patch.is_empty() {
            continue;
        }
        client
            .merge_patch(
                &ar,
                Some(ns),
                COMMON_SERVICE_NAME,
                &json!({ "metadata": { "labels": patch } }),
            )
            .await?;
        info!(kind, namespace = ns, count = patch.len(), "labels propagated");
        outcome = Outcome::Updated;
    }
    Ok(outcome)
}
