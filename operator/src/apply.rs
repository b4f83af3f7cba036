//! Apply-by-version.
//!
//! An embedded manifest is created when absent and replaced wholesale only
//! when its `version` annotation is strictly greater than the live object's.
//! Batches are best effort: every object is attempted, and the last failure
//! is reported once the batch is done.

use kube::api::DynamicObject;
use tracing::{debug, info, warn};

use crate::{
    cluster::{ClusterClient, api_resource_for},
    config::OperatorConfig,
    error::{Error, Result},
    event::Outcome,
    manifest::{self, object_version},
};

/// Creates `desired` or, when the manifest version wins, replaces the live object.
pub async fn apply_object(client: &dyn ClusterClient, desired: &DynamicObject) -> Result<Outcome> {
    let types = desired
        .types
        .as_ref()
        .ok_or_else(|| Error::InvalidManifest("object without apiVersion/kind".into()))?;
    let ar = api_resource_for(&types.api_version, &types.kind)?;
    let name = desired.metadata.name.as_deref().unwrap_or_default();
    let namespace = desired.metadata.namespace.as_deref();

    let Some(live) = client.get(&ar, namespace, name).await? else {
        client.create(&ar, desired).await?;
        info!(kind = %ar.kind, name, namespace = namespace.unwrap_or(""), "created");
        return Ok(Outcome::Created);
    };

    let (want, have) = (object_version(desired), object_version(&live));
    if want <= have {
        debug!(kind = %ar.kind, name, want, have, "live object is current");
        return Ok(Outcome::NoOp);
    }

    let mut replacement = desired.clone();
    replacement.metadata.resource_version = live.metadata.resource_version.clone();
    client.replace(&ar, &replacement).await?;
    info!(kind = %ar.kind, name, from = have, to = want, "upgraded to newer manifest version");
    Ok(Outcome::Updated)
}

/// Applies every object in `objects`, continuing past failures.
pub async fn apply_objects(
    client: &dyn ClusterClient,
    objects: &[DynamicObject],
) -> Result<Vec<Outcome>> {
    let mut outcomes = Vec::with_capacity(objects.len());
    let mut last_err = None;

    for obj in objects {
        match apply_object(client, obj).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                warn!(
                    name = obj.metadata.name.as_deref().unwrap_or(""),
                    error = %e,
                    "failed to apply object, continuing with the rest"
                );
                last_err = Some(e);
            }
        }
    }

    match last_err {
        Some(e) => Err(e),
        None => Ok(outcomes),
    }
}

/// Renders an embedded manifest against `cfg`, decodes it and applies it.
pub async fn apply_manifest(
    client: &dyn ClusterClient,
    cfg: &OperatorConfig,
    template: &str,
) -> Result<Vec<Outcome>> {
    let objects = manifest::decode(&manifest::render(template, cfg))?;
    apply_objects(client, &objects).await
}
