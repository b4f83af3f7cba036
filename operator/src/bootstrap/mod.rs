//! One-time install sequence.
//!
//! Every step is idempotent: objects go through apply-by-version and the
//! sequence can be rerun after a restart without touching converged state.
//! Order matters. Operators are subscribed before the CRs that need their
//! kinds, and each kind wait is bounded by the configured timeout.

pub mod odlm;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use tracing::{debug, info};

use crate::{
    apply::apply_manifest,
    cluster::{self, ClusterClient},
    config::OperatorConfig,
    crd::OperatorGroup,
    error::Result,
    event::Outcome,
    manifest::assets,
    mapping,
    poll::{KIND_POLL_INTERVAL, wait_for_kind},
};

pub const NAMESPACE_SCOPE_API: &str = "operator.ibm.com/v1";
pub const ODLM_API: &str = "operator.ibm.com/v1alpha1";

/// Settles which namespace the common services live in. The
/// `common-service-maps` table wins over the configured default.
pub async fn resolve_config(
    client: &dyn ClusterClient,
    cfg: &OperatorConfig,
) -> Result<OperatorConfig> {
    let mut resolved = cfg.clone();
    if let Some(maps) = mapping::load(client).await? {
        if let Some(ns) = maps.services_namespace_for(&cfg.operator_namespace) {
            resolved.services_namespace = ns.to_string();
        }
    }
    info!(
        operator_namespace = %resolved.operator_namespace,
        services_namespace = %resolved.services_namespace,
        "resolved namespaces"
    );
    Ok(resolved)
}

/// Runs the full install sequence against `client`.
pub async fn run(client: &dyn ClusterClient, cfg: &OperatorConfig) -> Result<()> {
    info!(services_namespace = %cfg.services_namespace, "bootstrap starting");
    let deadline = Some(cfg.bootstrap_timeout);

    ensure_namespace(client, &cfg.services_namespace).await?;
    apply_manifest(client, cfg, assets::RBAC).await?;
    ensure_operator_group(client, cfg).await?;

    apply_manifest(client, cfg, assets::NAMESPACE_SCOPE_SUBSCRIPTION).await?;
    wait_for_kind(client, NAMESPACE_SCOPE_API, "NamespaceScope", KIND_POLL_INTERVAL, deadline)
        .await?;
    apply_manifest(client, cfg, assets::NAMESPACE_SCOPE_CR).await?;
    apply_manifest(client, cfg, assets::NAMESPACE_SCOPE_CONFIGMAP).await?;

    odlm::remove_outdated_odlm(client).await?;
    apply_manifest(client, cfg, assets::ODLM_SUBSCRIPTION).await?;

    if cfg.features.webhooks {
        apply_manifest(client, cfg, assets::WEBHOOK_DEPLOYMENT).await?;
    }
    apply_manifest(client, cfg, assets::SECRETSHARE_DEPLOYMENT).await?;

    for kind in ["OperandRegistry", "OperandConfig"] {
        wait_for_kind(client, ODLM_API, kind, KIND_POLL_INTERVAL, deadline).await?;
    }
    apply_manifest(client, cfg, assets::OPERAND_REGISTRY).await?;
    apply_manifest(client, cfg, assets::OPERAND_CONFIG).await?;

    apply_manifest(client, cfg, assets::COMMON_SERVICE_CR).await?;

    info!("bootstrap finished");
    Ok(())
}

async fn ensure_namespace(client: &dyn ClusterClient, name: &str) -> Result<Outcome> {
    if cluster::get::<Namespace>(client, None, name).await?.is_some() {
        debug!(namespace = name, "namespace exists");
        return Ok(Outcome::NoOp);
    }
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.into()),
            ..Default::default()
        },
        ..Default::default()
    };
    cluster::create(client, &ns).await?;
    info!(namespace = name, "created namespace");
    Ok(Outcome::Created)
}

/// OLM tolerates exactly one OperatorGroup per namespace, so an existing one
/// is left alone whatever its name.
async fn ensure_operator_group(client: &dyn ClusterClient, cfg: &OperatorConfig) -> Result<Outcome> {
    let existing =
        cluster::list::<OperatorGroup>(client, Some(&cfg.services_namespace), None).await?;
    if !existing.is_empty() {
        debug!(namespace = %cfg.services_namespace, "operator group already present");
        return Ok(Outcome::NoOp);
    }
    let outcomes = apply_manifest(client, cfg, assets::OPERATOR_GROUP).await?;
    Ok(outcomes.into_iter().next().unwrap_or(Outcome::NoOp))
}
