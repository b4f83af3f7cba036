use std::sync::Arc;

use axum::{Json, extract::State};
use kube::{
    api::DynamicObject,
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
};
use serde_json::Value;
use tracing::{debug, error, info};

use super::WebhookState;
use crate::{
    cluster::from_dynamic,
    config::OperatorConfig,
    crd::OperandRequest,
    error::Result,
};

pub async fn mutate_handler(
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
    let Some(obj) = req.object.as_ref() else {
        debug!(uid = %req.uid, "no object in request, allowing unchanged");
        return Json(response.into_review());
    };

    let patch = match registry_namespace_patch(&state.config, obj) {
        Ok(patch) => patch,
        Err(e) => {
            error!(uid = %req.uid, error = %e, "failed to decode OperandRequest");
            return Json(response.deny(e.to_string()).into_review());
        }
    };
    if patch.0.is_empty() {
        return Json(response.into_review());
    }

    info!(uid = %req.uid, name = %req.name, namespace = ?req.namespace, ops = patch.0.len(), "defaulting registry namespaces");
    let response = match AdmissionResponse::from(&req).with_patch(patch) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %req.uid, error = %e, "failed to serialize patch");
            AdmissionResponse::from(&req).deny(format!("patch serialization error: {e}"))
        }
    };
    Json(response.into_review())
}

/// JSON patch that sets `registryNamespace` on every request whose registry
/// is missing, empty, or outside the watched namespaces.
pub fn registry_namespace_patch(cfg: &OperatorConfig, obj: &DynamicObject) -> Result<json_patch::Patch> {
    let request: OperandRequest = from_dynamic(obj.clone())?;
    let before = serde_json::to_value(obj)?;
    let mut after = before.clone();

    let stale: Vec<usize> = request
        .spec
        .requests
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            r.registry_namespace
                .as_deref()
                .is_none_or(|ns| ns.is_empty() || !cfg.watches(ns))
        })
        .map(|(i, _)| i)
        .collect();

    if let Some(requests) = after.pointer_mut("/spec/requests").and_then(Value::as_array_mut) {
        for i in stale {
            if let Some(entry) = requests.get_mut(i).and_then(Value::as_object_mut) {
                entry.insert(
                    "registryNamespace".into(),
                    Value::String(cfg.services_namespace.clone()),
                );
            }
        }
    }

    Ok(json_patch::diff(&before, &after))
}
