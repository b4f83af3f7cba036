//! Validating webhook for CommonService.
//!
//! The namespaces a CommonService names must be reachable by the operator,
//! i.e. listed in the OperatorGroup of the operator namespace.

use std::sync::Arc;

use axum::{Json, extract::State};
use kube::{
    api::DynamicObject,
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
};
use tracing::{debug, error, info};

use super::WebhookState;
use crate::{
    cluster::{self, ClusterClient, from_dynamic},
    config::OperatorConfig,
    crd::{CommonService, OperatorGroup},
    error::Result,
};

pub async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = AdmissionResponse::from(&req);
    let Some(obj) = req.object.clone() else {
        debug!(uid = %req.uid, "no object in request, allowing");
        return Json(response.into_review());
    };

    let response = match denial(state.cluster.as_ref(), &state.config, obj).await {
        Ok(None) => response,
        Ok(Some(reason)) => {
            info!(uid = %req.uid, name = %req.name, reason, "denied CommonService");
            response.deny(reason)
        }
        Err(e) => {
            error!(uid = %req.uid, error = %e, "CommonService validation failed");
            response.deny(e.to_string())
        }
    };
    Json(response.into_review())
}

/// The reason to reject `obj`, if any.
pub async fn denial(
    client: &dyn ClusterClient,
    cfg: &OperatorConfig,
    obj: DynamicObject,
) -> Result<Option<String>> {
    let cs: CommonService = from_dynamic(obj)?;
    let requested: Vec<(&str, &str)> = [
        ("operatorNamespace", cs.spec.operator_namespace.as_deref()),
        ("servicesNamespace", cs.spec.services_namespace.as_deref()),
    ]
    .into_iter()
    .filter_map(|(field, ns)| ns.map(|ns| (field, ns)))
    .collect();
    if requested.is_empty() {
        return Ok(None);
    }

    let og_ns = cfg.operator_namespace.as_str();
    let Some(og) = cluster::list::<OperatorGroup>(client, Some(og_ns), None)
        .await?
        .into_iter()
        .next()
    else {
        return Ok(None);
    };
    let targets = og.target_namespaces();
    if targets.is_empty() {
        return Ok(None);
    }

    Ok(requested
        .into_iter()
        .find(|(_, ns)| !targets.iter().any(|t| t == *ns))
        .map(|(field, ns)| {
            format!(
                "{field} {ns} is not a target namespace of OperatorGroup {} in {og_ns}; allowed: {}",
                og.metadata.name.as_deref().unwrap_or_default(),
                targets.join(",")
            )
        }))
}
