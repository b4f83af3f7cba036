use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Mutex,
};

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject, TypeMeta};
use serde::Serialize;
use serde_json::Value;

use super::{ClusterClient, to_dynamic};
use crate::error::{Error, Result};

type Key = (String, String, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, DynamicObject>,
    kinds: BTreeSet<(String, String)>,
    failing: BTreeSet<String>,
    flaky: BTreeMap<String, usize>,
    resource_version: u64,
    writes: usize,
    deleted: Vec<String>,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

fn key(ar: &ApiResource, namespace: Option<&str>, name: &str) -> Key {
    (
        ar.api_version.clone(),
        ar.kind.clone(),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

fn matches_selector(obj: &DynamicObject, selector: &str) -> bool {
    let labels = obj.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k.trim()).map(String::as_str) == Some(v.trim()),
            None => labels.contains_key(term),
        })
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a kind for discovery. Core kinds are always served.
    pub fn register_kind(&self, api_version: &str, kind: &str) {
        let mut state = self.state.lock().unwrap();
        state.kinds.insert((api_version.into(), kind.into()));
    }

    /// Makes every create/replace/patch/delete of `name` fail.
    pub fn fail_writes_for(&self, name: &str) {
        self.state.lock().unwrap().failing.insert(name.into());
    }

    /// Makes the next `times` writes of `name` time out.
    pub fn fail_transiently(&self, name: &str, times: usize) {
        self.state.lock().unwrap().flaky.insert(name.into(), times);
    }

    pub fn insert<K: Serialize>(&self, obj: &K) {
        let dynamic = to_dynamic(obj).unwrap();
        self.insert_dynamic(dynamic);
    }

    pub fn insert_dynamic(&self, mut obj: DynamicObject) {
        let types = obj.types.clone().expect("test objects carry apiVersion/kind");
        let mut state = self.state.lock().unwrap();
        state.resource_version += 1;
        obj.metadata.resource_version = Some(state.resource_version.to_string());
        let k = (
            types.api_version,
            types.kind,
            obj.metadata.namespace.clone().unwrap_or_default(),
            obj.metadata.name.clone().unwrap_or_default(),
        );
        state.objects.insert(k, obj);
    }

    pub fn object(&self, ar: &ApiResource, namespace: Option<&str>, name: &str) -> Option<DynamicObject> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&key(ar, namespace, name))
            .cloned()
    }

    pub fn typed<K>(&self, namespace: Option<&str>, name: &str) -> Option<K>
    where
        K: kube::Resource<DynamicType = ()> + serde::de::DeserializeOwned,
    {
        self.object(&super::api_resource::<K>(), namespace, name)
            .map(|o| super::from_dynamic(o).unwrap())
    }

    /// Number of successful mutating calls so far.
    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    /// Names of deleted objects, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    fn check_failing(state: &mut State, ar: &ApiResource, name: &str) -> Result<()> {
        if let Some(left) = state.flaky.get_mut(name).filter(|left| **left > 0) {
            *left -= 1;
            return Err(Error::Timeout(format!("injected timeout writing {} {name}", ar.kind)));
        }
        if state.failing.contains(name) {
            return Err(Error::Conflict {
                kind: ar.kind.clone(),
                name: name.into(),
                message: "injected failure".into(),
            });
        }
        Ok(())
    }

    fn patch_with(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject> {
        let mut state = self.state.lock().unwrap();
        Self::check_failing(&mut state, ar, name)?;
        let k = key(ar, namespace, name);
        let current = state
            .objects
            .get(&k)
            .cloned()
            .ok_or_else(|| Error::not_found(&ar.kind, namespace, name))?;

        let mut doc = serde_json::to_value(&current)?;
        json_patch::merge(&mut doc, patch);
        let mut patched: DynamicObject = serde_json::from_value(doc)?;
        state.resource_version += 1;
        patched.metadata.resource_version = Some(state.resource_version.to_string());
        state.objects.insert(k, patched.clone());
        state.writes += 1;
        Ok(patched)
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        Ok(self.object(ar, namespace, name))
    }

    async fn list(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .iter()
            .filter(|((av, kind, ns, _), _)| {
                av == &ar.api_version
                    && kind == &ar.kind
                    && namespace.is_none_or(|want| want == ns)
            })
            .map(|(_, obj)| obj)
            .filter(|obj| label_selector.is_none_or(|sel| matches_selector(obj, sel)))
            .cloned()
            .collect())
    }

    async fn create(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let namespace = obj.metadata.namespace.clone();
        let mut state = self.state.lock().unwrap();
        Self::check_failing(&mut state, ar, &name)?;
        let k = key(ar, namespace.as_deref(), &name);
        if state.objects.contains_key(&k) {
            return Err(Error::Conflict {
                kind: ar.kind.clone(),
                name,
                message: "already exists".into(),
            });
        }

        let mut created = obj.clone();
        created.types = Some(TypeMeta {
            api_version: ar.api_version.clone(),
            kind: ar.kind.clone(),
        });
        state.resource_version += 1;
        created.metadata.resource_version = Some(state.resource_version.to_string());
        state.objects.insert(k, created.clone());
        state.writes += 1;
        Ok(created)
    }

    async fn replace(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let namespace = obj.metadata.namespace.clone();
        let mut state = self.state.lock().unwrap();
        Self::check_failing(&mut state, ar, &name)?;
        let k = key(ar, namespace.as_deref(), &name);
        let current = state
            .objects
            .get(&k)
            .ok_or_else(|| Error::not_found(&ar.kind, namespace.as_deref(), &name))?;

        if let Some(rv) = obj.metadata.resource_version.as_deref() {
            if current.metadata.resource_version.as_deref() != Some(rv) {
                return Err(Error::Conflict {
                    kind: ar.kind.clone(),
                    name,
                    message: "resourceVersion mismatch".into(),
                });
            }
        }

        let mut replaced = obj.clone();
        replaced.types = Some(TypeMeta {
            api_version: ar.api_version.clone(),
            kind: ar.kind.clone(),
        });
        state.resource_version += 1;
        replaced.metadata.resource_version = Some(state.resource_version.to_string());
        state.objects.insert(k, replaced.clone());
        state.writes += 1;
        Ok(replaced)
    }

    async fn delete(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        Self::check_failing(&mut state, ar, name)?;
        let removed = state.objects.remove(&key(ar, namespace, name)).is_some();
        if removed {
            state.writes += 1;
            state.deleted.push(name.to_string());
        }
        Ok(removed)
    }

    async fn merge_patch(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject> {
        self.patch_with(ar, namespace, name, patch)
    }

    async fn merge_patch_status(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject> {
        self.patch_with(ar, namespace, name, patch)
    }

    async fn has_kind(&self, api_version: &str, kind: &str) -> Result<bool> {
        if !api_version.contains('/') {
            return Ok(true);
        }
        let state = self.state.lock().unwrap();
        Ok(state.kinds.contains(&(api_version.to_string(), kind.to_string())))
    }
}
