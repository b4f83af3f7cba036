//! Cluster access behind a small trait.
//!
//! Everything that reads or writes the cluster goes through [`ClusterClient`],
//! which speaks [`DynamicObject`] so manifests, foreign CRs and built-in kinds
//! share one code path. The typed helpers below convert at the edge.

mod live;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use kube::{
    Resource,
    api::{ApiResource, DynamicObject},
    core::GroupVersion,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{Error, Result};

pub use live::KubeCluster;

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// `None` when the object does not exist.
    async fn get(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>>;

    async fn list(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>>;

    /// Namespace is taken from the object's metadata.
    async fn create(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Whole-object replace. Carries the object's resourceVersion, so a stale
    /// read surfaces as a conflict.
    async fn replace(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject>;

    /// `false` when there was nothing to delete.
    async fn delete(&self, ar: &ApiResource, namespace: Option<&str>, name: &str)
    -> Result<bool>;

    async fn merge_patch(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject>;

    async fn merge_patch_status(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject>;

    /// Whether `kind` is served under `api_version` right now.
    async fn has_kind(&self, api_version: &str, kind: &str) -> Result<bool>;
}

pub fn api_resource<K>() -> ApiResource
where
    K: Resource<DynamicType = ()>,
{
    ApiResource::erase::<K>(&())
}

pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

pub fn from_dynamic<K: DeserializeOwned>(obj: DynamicObject) -> Result<K> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

pub async fn get<K>(
    client: &dyn ClusterClient,
    namespace: Option<&str>,
    name: &str,
) -> Result<Option<K>>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    client
        .get(&api_resource::<K>(), namespace, name)
        .await?
        .map(from_dynamic)
        .transpose()
}

pub async fn list<K>(
    client: &dyn ClusterClient,
    namespace: Option<&str>,
    label_selector: Option<&str>,
) -> Result<Vec<K>>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    client
        .list(&api_resource::<K>(), namespace, label_selector)
        .await?
        .into_iter()
        .map(from_dynamic)
        .collect()
}

pub async fn create<K>(client: &dyn ClusterClient, obj: &K) -> Result<K>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Sync,
{
    let created = client
        .create(&api_resource::<K>(), &to_dynamic(obj)?)
        .await?;
    from_dynamic(created)
}

pub async fn replace<K>(client: &dyn ClusterClient, obj: &K) -> Result<K>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Sync,
{
    let replaced = client
        .replace(&api_resource::<K>(), &to_dynamic(obj)?)
        .await?;
    from_dynamic(replaced)
}

pub async fn delete<K>(client: &dyn ClusterClient, namespace: Option<&str>, name: &str) -> Result<bool>
where
    K: Resource<DynamicType = ()>,
{
    client.delete(&api_resource::<K>(), namespace, name).await
}

pub async fn merge_patch<K>(
    client: &dyn ClusterClient,
    namespace: Option<&str>,
    name: &str,
    patch: &Value,
) -> Result<K>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let patched = client
        .merge_patch(&api_resource::<K>(), namespace, name, patch)
        .await?;
    from_dynamic(patched)
}

pub async fn merge_patch_status<K>(
    client: &dyn ClusterClient,
    namespace: Option<&str>,
    name: &str,
    patch: &Value,
) -> Result<K>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let patched = client
        .merge_patch_status(&api_resource::<K>(), namespace, name, patch)
        .await?;
    from_dynamic(patched)
}

/// Resource for a manifest's `apiVersion` and `kind`, plural included.
pub fn api_resource_for(api_version: &str, kind: &str) -> Result<ApiResource> {
    let gv = api_version
        .parse::<GroupVersion>()
        .map_err(|e| Error::InvalidManifest(format!("apiVersion {api_version}: {e}")))?;
    Ok(ApiResource::from_gvk(&gv.with_kind(kind)))
}
