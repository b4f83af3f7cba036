//! Restarts workloads that mount a certificate secret after cert-manager
//! reissues it.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, NaiveDateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment, StatefulSet},
    core::v1::{Container, PodSpec, PodTemplateSpec},
};
use kube::{
    Api, Resource, ResourceExt,
    runtime::{Controller, controller::Action, watcher::Config as WatcherConfig},
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{ControllerFuture, Ctx, WATCH_TIMEOUT_SECS, log_reconcile_result};
use crate::{
    cluster::{self, ClusterClient},
    crd::Certificate,
    error::{Error, Result},
    event::{Outcome, with_event},
};

pub const CONTROLLER: &str = "pod-refresh";
pub const DISABLE_RESTART_ANNOTATION: &str = "certmanager.k8s.io/disable-auto-restart";
pub const RESTARTED_LABEL: &str = "certmanager.k8s.io/time-restarted";
pub const RESTARTED_FORMAT: &str = "%Y-%m-%d.%H%M%S";

/// Workload kinds whose pods can be rolled by touching the template.
pub trait HasPodTemplate: Resource<DynamicType = ()> + DeserializeOwned {
    fn pod_template(&self) -> Option<&PodTemplateSpec>;
}

impl HasPodTemplate for Deployment {
    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|s| &s.template)
    }
}

impl HasPodTemplate for StatefulSet {
    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|s| &s.template)
    }
}

impl HasPodTemplate for DaemonSet {
    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|s| &s.template)
    }
}

pub fn run(ctx: Arc<Ctx>) -> ControllerFuture {
    let api: Api<Certificate> = Api::all(ctx.client.clone());
    Box::pin(
        Controller::new(api, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("PodRefresh")),
    )
}

pub async fn reconcile(cert: Arc<Certificate>, ctx: Arc<Ctx>) -> Result<Action, Error> {
    ctx.metrics.reconciled(CONTROLLER);
    with_event(
        &ctx.recorder,
        &*cert,
        "Restarted workloads using the renewed certificate",
        "WorkloadsRestarted",
        "WorkloadRestartFailed",
        refresh_pods(ctx.cluster.as_ref(), &cert, Utc::now()),
    )
    .await?;
    Ok(Action::await_change())
}

pub fn error_policy(cert: Arc<Certificate>, error: &Error, ctx: Arc<Ctx>) -> Action {
    ctx.metrics.reconcile_failed(CONTROLLER);
    warn!(certificate = cert.name_any(), error = %error, "pod refresh failed");
    Action::requeue(Duration::from_secs(30))
}

fn container_uses_secret(container: &Container, secret: &str) -> bool {
    let env = container.env.iter().flatten().any(|var| {
        var.value_from
            .as_ref()
            .and_then(|from| from.secret_key_ref.as_ref())
            .is_some_and(|sel| sel.name == secret)
    });
    let env_from = container.env_from.iter().flatten().any(|source| {
        source
            .secret_ref
            .as_ref()
            .is_some_and(|sel| sel.name == secret)
    });
    env || env_from
}

pub fn pod_uses_secret(spec: &PodSpec, secret: &str) -> bool {
    let containers = spec
        .containers
        .iter()
        .chain(spec.init_containers.iter().flatten())
        .any(|c| container_uses_secret(c, secret));

    let volumes = spec.volumes.iter().flatten().any(|vol| {
        let mounted = vol
            .secret
            .as_ref()
            .is_some_and(|s| s.secret_name.as_deref() == Some(secret));
        let projected = vol
            .projected
            .as_ref()
            .and_then(|p| p.sources.as_ref())
            .into_iter()
            .flatten()
            .any(|src| src.secret.as_ref().is_some_and(|s| s.name == secret));
        mounted || projected
    });

    containers || volumes
}

/// A workload restarted after `not_before` already runs the new certificate.
pub fn restarted_since(template: &PodTemplateSpec, not_before: DateTime<Utc>) -> bool {
    template
        .metadata
        .as_ref()
        .and_then(|m| m.labels.as_ref())
        .and_then(|labels| labels.get(RESTARTED_LABEL))
        .and_then(|raw| NaiveDateTime::parse_from_str(raw, RESTARTED_FORMAT).ok())
        .is_some_and(|restarted| restarted.and_utc() > not_before)
}

async fn restart_kind<K: HasPodTemplate>(
    client: &dyn ClusterClient,
    namespace: &str,
    secret: &str,
    not_before: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let mut restarted = Vec::new();
    for workload in cluster::list::<K>(client, Some(namespace), None).await? {
        let Some(template) = workload.pod_template() else {
            continue;
        };
        let uses = template
            .spec
            .as_ref()
            .is_some_and(|spec| pod_uses_secret(spec, secret));
        if !uses || restarted_since(template, not_before) {
            continue;
        }

        let name = workload.name_any();
        let patch = json!({
            "spec": { "template": { "metadata": { "labels": {
                RESTARTED_LABEL: now.format(RESTARTED_FORMAT).to_string()
            }}}}
        });
        cluster::merge_patch::<K>(client, Some(namespace), &name, &patch).await?;
        info!(kind = %K::kind(&()), name, namespace, secret, "restarted for renewed certificate");
        restarted.push(name);
    }
    Ok(restarted)
}

pub async fn refresh_pods(
    client: &dyn ClusterClient,
    cert: &Certificate,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    let name = cert.name_any();
    let Some(status) = cert.status.as_ref() else {
        return Ok(Outcome::NoOp);
    };
    let (Some(not_before), Some(_)) = (status.not_before.as_deref(), status.not_after.as_deref())
    else {
        debug!(certificate = name, "certificate not issued yet");
        return Ok(Outcome::NoOp);
    };
    if cert
        .annotations()
        .get(DISABLE_RESTART_ANNOTATION)
        .is_some_and(|v| v == "true")
    {
        debug!(certificate = name, "auto restart disabled");
        return Ok(Outcome::NoOp);
    }
    let not_before = match DateTime::parse_from_rfc3339(not_before) {
        Ok(t) => t.with_timezone(&Utc),
        Err(e) => {
            warn!(certificate = name, not_before, error = %e, "unparseable notBefore");
            return Ok(Outcome::NoOp);
        }
    };

    let ns = cert.namespace().unwrap_or_default();
    let secret = cert.spec.secret_name.as_str();
    let mut restarted = restart_kind::<Deployment>(client, &ns, secret, not_before, now).await?;
    restarted.extend(restart_kind::<StatefulSet>(client, &ns, secret, not_before, now).await?);
    restarted.extend(restart_kind::<DaemonSet>(client, &ns, secret, not_before, now).await?);

    Ok(if restarted.is_empty() {
        Outcome::NoOp
    } else {
        Outcome::Updated
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cluster::fake::FakeCluster,
        crd::{CertificateSpec, CertificateStatus},
    };
    use chrono::TimeZone;
    use k8s_openapi::api::{
        apps::v1::{DeploymentSpec, StatefulSetSpec},
        core::v1::{
            EnvFromSource, SecretEnvSource, SecretVolumeSource, Volume,
        },
    };
    use kube::api::ObjectMeta;

    const NS: &str = "ibm-common-services";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    fn template(pod: PodSpec, restarted: Option<&str>) -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: restarted
                    .map(|r| [(RESTARTED_LABEL.to_string(), r.to_string())].into()),
                ..Default::default()
            }),
            spec: Some(pod),
        }
    }

    fn volume_pod(secret: &str) -> PodSpec {
        PodSpec {
            containers: vec![Container { name: "app".into(), ..Default::default() }],
            volumes: Some(vec![Volume {
                name: "certs".into(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secret.into()),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    fn env_from_pod(secret: &str) -> PodSpec {
        PodSpec {
            containers: vec![Container {
                name: "app".into(),
                env_from: Some(vec![EnvFromSource {
                    secret_ref: Some(SecretEnvSource {
                        name: secret.into(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn deployment(fake: &FakeCluster, name: &str, tpl: PodTemplateSpec) {
        let dep = Deployment {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(NS.into()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec { template: tpl, ..Default::default() }),
            status: None,
        };
        fake.insert(&dep);
    }

    fn certificate(annotations: &[(&str, &str)], issued: bool) -> Certificate {
        let mut cert = Certificate::new(
            "auth-tls",
            CertificateSpec { secret_name: "auth-tls-secret".into(), ..Default::default() },
        );
        cert.metadata.namespace = Some(NS.into());
        cert.metadata.annotations = Some(
            annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        if issued {
            cert.status = Some(CertificateStatus {
                not_before: Some("2026-10-17T11:00:00Z".into()),
                not_after: Some("2027-01-15T11:00:00Z".into()),
            });
        }
        cert
    }

    fn restarted_label(fake: &FakeCluster, name: &str) -> Option<String> {
        let dep: Deployment = fake.typed(Some(NS), name).unwrap();
        dep.spec?.template.metadata?.labels?.get(RESTARTED_LABEL).cloned()
    }

    #[test]
    fn projected_and_env_references_count() {
        assert!(pod_uses_secret(&env_from_pod("s"), "s"));
        assert!(pod_uses_secret(&volume_pod("s"), "s"));
        assert!(!pod_uses_secret(&volume_pod("s"), "t"));
    }

    #[tokio::test]
    async fn consumers_are_restarted() {
        let fake = FakeCluster::new();
        deployment(&fake, "auth-idp", template(volume_pod("auth-tls-secret"), None));
        deployment(&fake, "unrelated", template(volume_pod("other"), None));
        let sts = StatefulSet {
            metadata: ObjectMeta {
                name: Some("auth-db".into()),
                namespace: Some(NS.into()),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                template: template(env_from_pod("auth-tls-secret"), None),
                ..Default::default()
            }),
            status: None,
        };
        fake.insert(&sts);

        let outcome = refresh_pods(&fake, &certificate(&[], true), now()).await.unwrap();
        assert_eq!(outcome, Outcome::Updated);
        assert_eq!(restarted_label(&fake, "auth-idp").as_deref(), Some("2026-10-17.120000"));
        assert_eq!(restarted_label(&fake, "unrelated"), None);
        assert_eq!(fake.writes(), 2);
    }

    #[tokio::test]
    async fn recent_restart_is_not_repeated() {
        let fake = FakeCluster::new();
        deployment(
            &fake,
            "auth-idp",
            template(volume_pod("auth-tls-secret"), Some("2026-10-17.113000")),
        );

        let outcome = refresh_pods(&fake, &certificate(&[], true), now()).await.unwrap();
        assert_eq!(outcome, Outcome::NoOp);
        assert_eq!(fake.writes(), 0);
    }

    #[tokio::test]
    async fn older_restart_is_refreshed() {
        let fake = FakeCluster::new();
        deployment(
            &fake,
            "auth-idp",
            template(volume_pod("auth-tls-secret"), Some("2026-10-01.080000")),
        );

        refresh_pods(&fake, &certificate(&[], true), now()).await.unwrap();
        assert_eq!(restarted_label(&fake, "auth-idp").as_deref(), Some("2026-10-17.120000"));
    }

    #[tokio::test]
    async fn disabled_or_unissued_certificates_are_skipped() {
        let fake = FakeCluster::new();
        deployment(&fake, "auth-idp", template(volume_pod("auth-tls-secret"), None));

        let disabled = certificate(&[(DISABLE_RESTART_ANNOTATION, "true")], true);
        assert_eq!(refresh_pods(&fake, &disabled, now()).await.unwrap(), Outcome::NoOp);
        assert_eq!(refresh_pods(&fake, &certificate(&[], false), now()).await.unwrap(), Outcome::NoOp);
        assert_eq!(fake.writes(), 0);
    }
}
