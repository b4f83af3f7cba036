//! Rotates leaf certificate secrets when their CA secret changes.
//!
//! A CA secret opts in with the refresh label. Every Certificate issued by an
//! Issuer backed by that secret gets its secret deleted once the `ca.crt` it
//! carries no longer matches the CA's `tls.crt`, and cert-manager reissues it.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    Api, ResourceExt,
    runtime::{Controller, controller::Action, watcher::Config as WatcherConfig},
};
use tracing::{debug, info, warn};

use super::{ControllerFuture, Ctx, WATCH_TIMEOUT_SECS, log_reconcile_result};
use crate::{
    cluster::{self, ClusterClient},
    crd::{Certificate, Issuer},
    error::{Error, Result},
    event::{Outcome, with_event},
};

pub const CONTROLLER: &str = "cert-refresh";
pub const REFRESH_LABEL: &str = "ibm-cert-manager-operator/refresh-ca-chain";
const CA_KEY: &str = "ca.crt";
const TLS_KEY: &str = "tls.crt";

pub fn run(ctx: Arc<Ctx>) -> ControllerFuture {
    let api: Api<Secret> = Api::all(ctx.client.clone());
    let watcher = WatcherConfig::default()
        .labels(&format!("{REFRESH_LABEL}=true"))
        .timeout(WATCH_TIMEOUT_SECS);
    Box::pin(
        Controller::new(api, watcher)
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("CertRefresh")),
    )
}

pub async fn reconcile(secret: Arc<Secret>, ctx: Arc<Ctx>) -> Result<Action, Error> {
    ctx.metrics.reconciled(CONTROLLER);
    with_event(
        &ctx.recorder,
        &*secret,
        "Deleted leaf secrets signed by a previous CA",
        "LeafSecretsRefreshed",
        "LeafSecretRefreshFailed",
        refresh_leaf_secrets(ctx.cluster.as_ref(), &secret),
    )
    .await?;
    Ok(Action::await_change())
}

pub fn error_policy(secret: Arc<Secret>, error: &Error, ctx: Arc<Ctx>) -> Action {
    ctx.metrics.reconcile_failed(CONTROLLER);
    warn!(secret = secret.name_any(), error = %error, "CA refresh failed");
    Action::requeue(Duration::from_secs(30))
}

pub async fn refresh_leaf_secrets(client: &dyn ClusterClient, ca: &Secret) -> Result<Outcome> {
    let ca_name = ca.name_any();
    let ns = ca.namespace().unwrap_or_default();
    let Some(ca_cert) = ca.data.as_ref().and_then(|d| d.get(TLS_KEY)) else {
        debug!(secret = ca_name, namespace = ns, "CA secret has no tls.crt yet");
        return Ok(Outcome::NoOp);
    };

    let issuers: BTreeSet<String> = cluster::list::<Issuer>(client, Some(&ns), None)
        .await?
        .into_iter()
        .filter(|issuer| issuer.ca_secret_name() == Some(ca_name.as_str()))
        .map(|issuer| issuer.name_any())
        .collect();
    if issuers.is_empty() {
        return Ok(Outcome::NoOp);
    }

    let mut outcome = Outcome::NoOp;
    for cert in cluster::list::<Certificate>(client, Some(&ns), None).await? {
        if !issuers.contains(&cert.spec.issuer_ref.name) || cert.spec.secret_name == ca_name {
            continue;
        }
        let leaf_name = cert.spec.secret_name.as_str();
        let Some(leaf) = cluster::get::<Secret>(client, Some(&ns), leaf_name).await? else {
            continue;
        };
        if leaf.data.as_ref().and_then(|d| d.get(CA_KEY)) == Some(ca_cert) {
            continue;
        }
        if cluster::delete::<Secret>(client, Some(&ns), leaf_name).await? {
            info!(secret = leaf_name, namespace = ns, ca = ca_name, "deleted stale leaf secret");
            outcome = Outcome::Deleted;
        }
    }
    Ok(outcome)
}
