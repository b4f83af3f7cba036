//! Keeps the OperatorGroup targets, the `namespace-scope` ConfigMap and the
//! `common-service` NamespaceScope CR naming the same namespaces.
//!
//! A ConfigMap still marked `cp2` is authoritative exactly once: its
//! namespaces are merged with the OperatorGroup's and the result is written
//! everywhere before the marker flips to `cp3`. From then on the
//! OperatorGroup leads.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use serde_json::json;
use tracing::{debug, info};

use super::Task;
use crate::{
    cluster::{self, ClusterClient},
    config::{COMMON_SERVICE_NAME, NAMESPACE_SCOPE_CONFIGMAP, OperatorConfig, split_namespaces},
    crd::{NamespaceScope, OperatorGroup},
    error::Result,
};

pub const SCHEMA_VERSION_ANNOTATION: &str = "operator.ibm.com/cs-schema-version";
pub const SCHEMA_CP2: &str = "cp2";
pub const SCHEMA_CP3: &str = "cp3";
const NAMESPACES_KEY: &str = "namespaces";

pub struct NamespaceScopeTask {
    client: Arc<dyn ClusterClient>,
    cfg: Arc<OperatorConfig>,
}

impl NamespaceScopeTask {
    pub fn new(client: Arc<dyn ClusterClient>, cfg: Arc<OperatorConfig>) -> Self {
        NamespaceScopeTask { client, cfg }
    }
}

#[async_trait]
impl Task for NamespaceScopeTask {
    fn name(&self) -> &'static str {
        "namespace-scope"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn tick(&self) -> Result<()> {
        sync_namespace_scope(self.client.as_ref(), &self.cfg).await.map(|_| ())
    }
}

fn configmap_namespaces(cm: &ConfigMap) -> BTreeSet<String> {
    cm.data
        .as_ref()
        .and_then(|d| d.get(NAMESPACES_KEY))
        .map(|v| split_namespaces(v))
        .unwrap_or_default()
}

/// A ConfigMap without the marker predates it, so it counts as `cp2`.
fn is_cp2(cm: &ConfigMap) -> bool {
    cm.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(SCHEMA_VERSION_ANNOTATION))
        .is_none_or(|v| v == SCHEMA_CP2)
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(",")
}

/// One sync pass. Returns whether anything was written.
pub async fn sync_namespace_scope(client: &dyn ClusterClient, cfg: &OperatorConfig) -> Result<bool> {
    let og_ns = cfg.operator_namespace.as_str();
    let Some(og) = cluster::list::<OperatorGroup>(client, Some(og_ns), None)
        .await?
        .into_iter()
        .next()
    else {
        debug!(namespace = og_ns, "no operator group yet");
        return Ok(false);
    };
    let og_name = og.metadata.name.clone().unwrap_or_default();
    let og_targets: BTreeSet<String> = og.target_namespaces().iter().cloned().collect();
    if og_targets.is_empty() {
        debug!(operator_group = %og_name, "operator group watches all namespaces, nothing to sync");
        return Ok(false);
    }

    let ns = cfg.services_namespace.as_str();
    let cm = cluster::get::<ConfigMap>(client, Some(ns), NAMESPACE_SCOPE_CONFIGMAP).await?;
    let migrating = cm.as_ref().is_some_and(is_cp2);

    let desired = match &cm {
        Some(cm) if migrating => og_targets.union(&configmap_namespaces(cm)).cloned().collect(),
        _ => og_targets.clone(),
    };

    let mut wrote = false;

    if og_targets != desired {
        let patch = json!({ "spec": { "targetNamespaces": desired } });
        cluster::merge_patch::<OperatorGroup>(client, Some(og_ns), &og_name, &patch).await?;
        info!(operator_group = %og_name, namespaces = %join(&desired), "updated operator group targets");
        wrote = true;
    }

    if let Some(cm) = &cm {
        let joined = join(&desired);
        if migrating || configmap_namespaces(cm) != desired {
            let patch = json!({
                "metadata": { "annotations": { SCHEMA_VERSION_ANNOTATION: SCHEMA_CP3 } },
                "data": { NAMESPACES_KEY: joined },
            });
            cluster::merge_patch::<ConfigMap>(client, Some(ns), NAMESPACE_SCOPE_CONFIGMAP, &patch)
                .await?;
            info!(configmap = NAMESPACE_SCOPE_CONFIGMAP, namespaces = %joined, migrating, "updated namespace list");
            wrote = true;
        }
    }

    if let Some(nss) = cluster::get::<NamespaceScope>(client, Some(ns), COMMON_SERVICE_NAME).await? {
        let members: BTreeSet<String> = nss.spec.namespace_members.iter().cloned().collect();
        if members != desired {
            let patch = json!({ "spec": { "namespaceMembers": desired } });
            cluster::merge_patch::<NamespaceScope>(client, Some(ns), COMMON_SERVICE_NAME, &patch)
                .await?;
            info!(namespacescope = COMMON_SERVICE_NAME, namespaces = %join(&desired), "updated namespace members");
            wrote = true;
        }
    }

    Ok(wrote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cluster::fake::FakeCluster,
        crd::{NamespaceScopeSpec, OperatorGroupSpec},
    };

    const SERVICES: &str = "ibm-common-services";

    fn cfg() -> OperatorConfig {
        OperatorConfig::new("cs-op")
    }

    fn seed(fake: &FakeCluster, og: &[&str], cm: &[&str], schema: Option<&str>, nss: &[&str]) {
        let mut group = OperatorGroup::new(
            "common-service",
            OperatorGroupSpec {
                target_namespaces: og.iter().map(|s| s.to_string()).collect(),
            },
        );
        group.metadata.namespace = Some("cs-op".into());
        fake.insert(&group);

        let mut configmap = ConfigMap::default();
        configmap.metadata.name = Some(NAMESPACE_SCOPE_CONFIGMAP.into());
        configmap.metadata.namespace = Some(SERVICES.into());
        if let Some(schema) = schema {
            configmap.metadata.annotations =
                Some([(SCHEMA_VERSION_ANNOTATION.to_string(), schema.to_string())].into());
        }
        configmap.data = Some([(NAMESPACES_KEY.to_string(), cm.join(","))].into());
        fake.insert(&configmap);

        let mut scope = NamespaceScope::new(
            COMMON_SERVICE_NAME,
            NamespaceScopeSpec {
                namespace_members: nss.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
        );
        scope.metadata.namespace = Some(SERVICES.into());
        fake.insert(&scope);
    }

    fn state(fake: &FakeCluster) -> (Vec<String>, String, Option<String>, Vec<String>) {
        let og: OperatorGroup = fake.typed(Some("cs-op"), "common-service").unwrap();
        let cm: ConfigMap = fake.typed(Some(SERVICES), NAMESPACE_SCOPE_CONFIGMAP).unwrap();
        let nss: NamespaceScope = fake.typed(Some(SERVICES), COMMON_SERVICE_NAME).unwrap();
        (
            og.spec.target_namespaces,
            cm.data.unwrap()[NAMESPACES_KEY].clone(),
            cm.metadata
                .annotations
                .and_then(|a| a.get(SCHEMA_VERSION_ANNOTATION).cloned()),
            nss.spec.namespace_members,
        )
    }

    #[tokio::test]
    async fn operator_group_leads_after_migration() {
        let fake = FakeCluster::new();
        seed(&fake, &["cs-op", "tenant-a"], &["cs-op"], Some(SCHEMA_CP3), &["cs-op"]);

        assert!(sync_namespace_scope(&fake, &cfg()).await.unwrap());
        let (og, cm, schema, nss) = state(&fake);
        assert_eq!(og, ["cs-op", "tenant-a"]);
        assert_eq!(cm, "cs-op,tenant-a");
        assert_eq!(schema.as_deref(), Some(SCHEMA_CP3));
        assert_eq!(nss, ["cs-op", "tenant-a"]);
    }

    #[tokio::test]
    async fn cp2_configmap_is_merged_once() {
        let fake = FakeCluster::new();
        seed(&fake, &["cs-op", "tenant-a"], &["cs-op", "legacy-b"], Some(SCHEMA_CP2), &[]);

        assert!(sync_namespace_scope(&fake, &cfg()).await.unwrap());
        let (og, cm, schema, nss) = state(&fake);
        assert_eq!(og, ["cs-op", "legacy-b", "tenant-a"]);
        assert_eq!(cm, "cs-op,legacy-b,tenant-a");
        assert_eq!(schema.as_deref(), Some(SCHEMA_CP3));
        assert_eq!(nss, ["cs-op", "legacy-b", "tenant-a"]);
    }

    #[tokio::test]
    async fn unmarked_configmap_counts_as_cp2() {
        let fake = FakeCluster::new();
        seed(&fake, &["cs-op"], &["legacy-b"], None, &[]);

        sync_namespace_scope(&fake, &cfg()).await.unwrap();
        let (og, _, schema, _) = state(&fake);
        assert_eq!(og, ["cs-op", "legacy-b"]);
        assert_eq!(schema.as_deref(), Some(SCHEMA_CP3));
    }

    #[tokio::test]
    async fn second_pass_is_a_no_op() {
        let fake = FakeCluster::new();
        seed(&fake, &["tenant-a", "cs-op"], &["x"], Some(SCHEMA_CP2), &["y"]);

        assert!(sync_namespace_scope(&fake, &cfg()).await.unwrap());
        let writes = fake.writes();
        assert!(!sync_namespace_scope(&fake, &cfg()).await.unwrap());
        assert_eq!(fake.writes(), writes);
    }

    #[tokio::test]
    async fn union_does_not_depend_on_order() {
        let a = FakeCluster::new();
        seed(&a, &["n1", "n2"], &["n3", "n1"], Some(SCHEMA_CP2), &[]);
        let b = FakeCluster::new();
        seed(&b, &["n3", "n1"], &["n2", "n1"], Some(SCHEMA_CP2), &[]);

        sync_namespace_scope(&a, &cfg()).await.unwrap();
        sync_namespace_scope(&b, &cfg()).await.unwrap();
        assert_eq!(state(&a).1, state(&b).1);
    }

    #[tokio::test]
    async fn all_namespaces_mode_is_left_alone() {
        let fake = FakeCluster::new();
        seed(&fake, &[], &["cs-op"], Some(SCHEMA_CP2), &["cs-op"]);

        assert!(!sync_namespace_scope(&fake, &cfg()).await.unwrap());
        assert_eq!(fake.writes(), 0);
    }
}
