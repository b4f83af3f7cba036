use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use kube::{
    Api, ResourceExt,
    runtime::{Controller, controller::Action, watcher::Config as WatcherConfig},
};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{ControllerFuture, Ctx, WATCH_TIMEOUT_SECS, add_label, log_reconcile_result};
use crate::{
    cluster::{self, ClusterClient},
    config::OperatorConfig,
    crd::{
        CommonService, ConfigStatus,
        common_service::{PHASE_PENDING, PHASE_RUNNING},
    },
    error::{Error, Result},
    event::{Outcome, with_event},
    finalizer::{FINALIZER, ensure_finalizer_present, is_deleting, remove_finalizer},
    status::{READY, iam_status_key},
    tasks::iam_status::remove_status,
};

pub const CONTROLLER: &str = "commonservice";

pub fn run(ctx: Arc<Ctx>) -> ControllerFuture {
    let api: Api<CommonService> =
        Api::namespaced(ctx.client.clone(), &ctx.config.operator_namespace);
    Box::pin(
        Controller::new(api, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("CommonService")),
    )
}

pub async fn reconcile(cs: Arc<CommonService>, ctx: Arc<Ctx>) -> Result<Action, Error> {
    ctx.metrics.reconciled(CONTROLLER);
    let client = ctx.cluster.as_ref();
    let cfg = ctx.config.as_ref();
    info!(
        namespace = cs.namespace().unwrap_or_default(),
        name = cs.name_any(),
        "reconciling CommonService"
    );

    if is_deleting(&*cs) {
        with_event(
            &ctx.recorder,
            &*cs,
            "Removed common services status",
            "Finalized",
            "FinalizeFailed",
            finalize(client, cfg, &cs),
        )
        .await?;
        return Ok(Action::await_change());
    }

    with_event(
        &ctx.recorder,
        &*cs,
        "Added finalizer",
        "FinalizerAdded",
        "FinalizerFailed",
        ensure_finalizer_present(client, &*cs, FINALIZER),
    )
    .await?;

    with_event(
        &ctx.recorder,
        &*cs,
        "Propagated labels to managed resources",
        "LabelsPropagated",
        "LabelPropagationFailed",
        add_label::propagate_labels(client, cfg, &cs.spec.labels),
    )
    .await?;

    with_event(
        &ctx.recorder,
        &*cs,
        "Updated status",
        "StatusUpdated",
        "StatusUpdateFailed",
        sync_status(client, cfg, &cs),
    )
    .await?;

    Ok(Action::requeue(Duration::from_secs(300)))
}

pub fn error_policy(cs: Arc<CommonService>, error: &Error, ctx: Arc<Ctx>) -> Action {
    ctx.metrics.reconcile_failed(CONTROLLER);
    warn!(name = cs.name_any(), error = %error, "CommonService reconcile failed");
    if error.is_transient() {
        Action::requeue(Duration::from_secs(10))
    } else {
        Action::requeue(Duration::from_secs(60))
    }
}

/// Namespaces and catalog this CommonService resolves to; the CR wins over
/// the operator defaults.
pub fn desired_config_status(cfg: &OperatorConfig, cs: &CommonService) -> ConfigStatus {
    let spec = &cs.spec;
    ConfigStatus {
        operator_namespace: spec
            .operator_namespace
            .clone()
            .unwrap_or_else(|| cfg.operator_namespace.clone()),
        services_namespace: spec
            .services_namespace
            .clone()
            .unwrap_or_else(|| cfg.services_namespace.clone()),
        catalog_name: Some(
            spec.catalog_name
                .clone()
                .unwrap_or_else(|| cfg.catalog_name.clone()),
        ),
        catalog_namespace: Some(
            spec.catalog_namespace
                .clone()
                .unwrap_or_else(|| cfg.catalog_namespace.clone()),
        ),
    }
}

/// Writes `phase` and `configStatus` when they differ from the live status.
pub async fn sync_status(
    client: &dyn ClusterClient,
    cfg: &OperatorConfig,
    cs: &CommonService,
) -> Result<Outcome> {
    let current = cs.status.clone().unwrap_or_default();
    let config_status = desired_config_status(cfg, cs);
    let phase = if current.overall_status.as_deref() == Some(READY) {
        PHASE_RUNNING
    } else {
        PHASE_PENDING
    };

    if current.phase.as_deref() == Some(phase) && current.config_status.as_ref() == Some(&config_status)
    {
        debug!(name = cs.name_any(), "status is current");
        return Ok(Outcome::NoOp);
    }

    let patch = json!({ "status": { "phase": phase, "configStatus": config_status } });
    cluster::merge_patch_status::<CommonService>(
        client,
        cs.namespace().as_deref(),
        &cs.name_any(),
        &patch,
    )
    .await?;
    info!(name = cs.name_any(), phase, services_namespace = %config_status.services_namespace, "status updated");
    Ok(Outcome::Updated)
}

/// Drops this instance's entry from the shared status ConfigMap, then
/// releases the finalizer.
pub async fn finalize(
    client: &dyn ClusterClient,
    cfg: &OperatorConfig,
    cs: &CommonService,
) -> Result<Outcome> {
    let services_namespace = cs
        .status
        .as_ref()
        .and_then(|s| s.config_status.as_ref())
        .map(|c| c.services_namespace.clone())
        .unwrap_or_else(|| desired_config_status(cfg, cs).services_namespace);

    remove_status(client, &iam_status_key(&services_namespace)).await?;
    remove_finalizer(client, cs, FINALIZER).await?;
    info!(name = cs.name_any(), services_namespace, "CommonService finalized");
    Ok(Outcome::Deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cluster::fake::FakeCluster,
        config::{KUBE_PUBLIC, STATUS_CONFIGMAP},
        crd::{CommonServiceSpec, CommonServiceStatus},
        finalizer::has_finalizer,
        tasks::iam_status::write_status,
    };
    use k8s_openapi::api::core::v1::ConfigMap;

    fn cfg() -> OperatorConfig {
        OperatorConfig::new("cs-op")
    }

    fn common_service(spec: CommonServiceSpec) -> CommonService {
        let mut cs = CommonService::new("common-service", spec);
        cs.metadata.namespace = Some("cs-op".into());
        cs
    }

    #[test]
    fn spec_overrides_defaults() {
        let cs = common_service(CommonServiceSpec {
            services_namespace: Some("cs-tenant".into()),
            catalog_name: Some("my-catalog".into()),
            ..Default::default()
        });
        let status = desired_config_status(&cfg(), &cs);
        assert_eq!(status.operator_namespace, "cs-op");
        assert_eq!(status.services_namespace, "cs-tenant");
        assert_eq!(status.catalog_name.as_deref(), Some("my-catalog"));
        assert_eq!(
            status.catalog_namespace.as_deref(),
            Some(crate::config::DEFAULT_CATALOG_NAMESPACE)
        );
    }

    #[tokio::test]
    async fn status_is_written_once() {
        let fake = FakeCluster::new();
        let cs = common_service(Default::default());
        fake.insert(&cs);

        assert_eq!(sync_status(&fake, &cfg(), &cs).await.unwrap(), Outcome::Updated);
        let cs: CommonService = fake.typed(Some("cs-op"), "common-service").unwrap();
        let status = cs.status.clone().unwrap();
        assert_eq!(status.phase.as_deref(), Some(PHASE_PENDING));
        assert_eq!(
            status.config_status.unwrap().services_namespace,
            "ibm-common-services"
        );

        assert_eq!(sync_status(&fake, &cfg(), &cs).await.unwrap(), Outcome::NoOp);
    }

    #[tokio::test]
    async fn ready_operators_mean_running() {
        let fake = FakeCluster::new();
        let mut cs = common_service(Default::default());
        cs.status = Some(CommonServiceStatus {
            overall_status: Some(READY.into()),
            ..Default::default()
        });
        fake.insert(&cs);

        sync_status(&fake, &cfg(), &cs).await.unwrap();
        let cs: CommonService = fake.typed(Some("cs-op"), "common-service").unwrap();
        assert_eq!(cs.status.unwrap().phase.as_deref(), Some(PHASE_RUNNING));
    }

    #[tokio::test]
    async fn finalize_removes_status_key_and_finalizer() {
        let fake = FakeCluster::new();
        let mut cs = common_service(Default::default());
        cs.metadata.finalizers = Some(vec![FINALIZER.into()]);
        cs.metadata.deletion_timestamp =
            Some(serde_json::from_value(serde_json::json!("2026-10-17T12:00:00Z")).unwrap());
        fake.insert(&cs);
        write_status(&fake, "ibm-common-services-iamstatus", "Ready").await.unwrap();
        write_status(&fake, "cs-b-iamstatus", "NotReady").await.unwrap();

        assert_eq!(finalize(&fake, &cfg(), &cs).await.unwrap(), Outcome::Deleted);

        let cm: ConfigMap = fake.typed(Some(KUBE_PUBLIC), STATUS_CONFIGMAP).unwrap();
        let data = cm.data.unwrap();
        assert!(!data.contains_key("ibm-common-services-iamstatus"));
        assert_eq!(data["iamstatus"], "NotReady");

        let cs: CommonService = fake.typed(Some("cs-op"), "common-service").unwrap();
        assert!(!has_finalizer(&cs, FINALIZER));
    }
}
