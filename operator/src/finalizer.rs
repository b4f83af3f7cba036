use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::{
    cluster::{self, ClusterClient},
    error::Error,
    event::Outcome,
};

pub const FINALIZER: &str = "operator.ibm.com/common-service-finalizer";

pub fn is_deleting<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .map(|fs| fs.iter().any(|x| x == finalizer))
        .unwrap_or(false)
}

pub async fn ensure_finalizer_present<K>(
    client: &dyn ClusterClient,
    obj: &K,
    finalizer: &str,
) -> Result<Outcome, Error>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    if has_finalizer(obj, finalizer) {
        return Ok(Outcome::NoOp);
    }

    let mut finalizers = obj.meta().finalizers.clone().unwrap_or_default();
    finalizers.push(finalizer.into());

    let patch = json!({
        "metadata": {"finalizers": finalizers}
    });

    cluster::merge_patch::<K>(client, obj.namespace().as_deref(), &obj.name_any(), &patch).await?;
    Ok(Outcome::Created)
}

pub async fn remove_finalizer<K>(
    client: &dyn ClusterClient,
    obj: &K,
    finalizer: &str,
) -> Result<Outcome, Error>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    if !has_finalizer(obj, finalizer) {
        return Ok(Outcome::NoOp);
    }

    let mut finalizers = obj.meta().finalizers.clone().unwrap_or_default();
    finalizers.retain(|x| x != finalizer);

    let patch = json!({
        "metadata": {"finalizers": finalizers}
    });

    cluster::merge_patch::<K>(client, obj.namespace().as_deref(), &obj.name_any(), &patch).await?;
    Ok(Outcome::Updated)
}
