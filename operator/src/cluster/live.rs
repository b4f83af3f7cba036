use async_trait::async_trait;
use kube::{
    Api, Client,
    api::{ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams},
    core::GroupVersion,
};
use serde_json::Value;
use tracing::debug;

use super::ClusterClient;
use crate::error::{Error, Result};

/// [`ClusterClient`] backed by the API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        KubeCluster { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api(&self, ar: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, ar),
            None => Api::all_with(self.client.clone(), ar),
        }
    }
}

fn object_name<'a>(ar: &ApiResource, obj: &'a DynamicObject) -> Result<&'a str> {
    obj.metadata
        .name
        .as_deref()
        .ok_or_else(|| Error::InvalidManifest(format!("{} without metadata.name", ar.kind)))
}

/// 404 and 409 on a write become [`Error::NotFound`] and [`Error::Conflict`].
fn api_error(err: kube::Error, ar: &ApiResource, namespace: Option<&str>, name: &str) -> Error {
    match err {
        kube::Error::Api(e) if e.code == 404 => Error::not_found(&ar.kind, namespace, name),
        kube::Error::Api(e) if e.code == 409 => Error::Conflict {
            kind: ar.kind.clone(),
            name: name.into(),
            message: e.message.clone(),
        },
        other => Error::Kube(other),
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn get(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        Ok(self.api(ar, namespace).get_opt(name).await?)
    }

    async fn list(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let mut lp = ListParams::default();
        if let Some(selector) = label_selector {
            lp = lp.labels(selector);
        }
        Ok(self.api(ar, namespace).list(&lp).await?.items)
    }

    async fn create(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = object_name(ar, obj)?;
        let api = self.api(ar, obj.metadata.namespace.as_deref());
        debug!(kind = %ar.kind, name, "creating object");
        api.create(&PostParams::default(), obj)
            .await
            .map_err(|e| api_error(e, ar, obj.metadata.namespace.as_deref(), name))
    }

    async fn replace(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = object_name(ar, obj)?;
        let api = self.api(ar, obj.metadata.namespace.as_deref());
        debug!(kind = %ar.kind, name, "replacing object");
        api.replace(name, &PostParams::default(), obj)
            .await
            .map_err(|e| api_error(e, ar, obj.metadata.namespace.as_deref(), name))
    }

    async fn delete(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool> {
        match self
            .api(ar, namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn merge_patch(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject> {
        self.api(ar, namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| api_error(e, ar, namespace, name))
    }

    async fn merge_patch_status(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject> {
        self.api(ar, namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| api_error(e, ar, namespace, name))
    }

    async fn has_kind(&self, api_version: &str, kind: &str) -> Result<bool> {
        let gv = api_version
            .parse::<GroupVersion>()
            .map_err(|e| Error::InvalidManifest(format!("apiVersion {api_version}: {e}")))?;
        let listed = if gv.group.is_empty() {
            self.client.list_core_api_resources(&gv.version).await
        } else {
            self.client.list_api_group_resources(api_version).await
        };

        match listed {
            Ok(list) => Ok(list.resources.iter().any(|r| r.kind == kind)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
