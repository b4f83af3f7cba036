//! Lease-based leader election.
//!
//! Compare-and-swap on the Lease resourceVersion: a write that loses the race
//! comes back as [`Error::Conflict`] and counts as "not leader".

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::{
    api::coordination::v1::{Lease, LeaseSpec},
    apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta},
};
use serde_json::json;
use tokio::{sync::oneshot, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    cluster::{self, ClusterClient},
    error::{Error, Result},
};

pub const LEASE_NAME: &str = "ibm-common-service-operator-lock";

const LEASE_DURATION: Duration = Duration::from_secs(30);
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

pub struct LeaderElector {
    client: Arc<dyn ClusterClient>,
    lease_name: String,
    namespace: String,
    identity: String,
    is_leader: Arc<AtomicBool>,
}

impl LeaderElector {
    pub fn new(client: Arc<dyn ClusterClient>, namespace: &str, identity: &str) -> Self {
        LeaderElector {
            client,
            lease_name: LEASE_NAME.to_string(),
            namespace: namespace.to_string(),
            identity: identity.to_string(),
            is_leader: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// Blocks until the lease is ours, then keeps renewing it in the
    /// background for as long as the guard lives.
    pub async fn acquire(self: Arc<Self>) -> LeaderGuard {
        info!(identity = %self.identity, lease = %self.lease_name, "waiting for leadership");
        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    info!(identity = %self.identity, "leadership acquired");
                    self.is_leader.store(true, Ordering::SeqCst);
                    return self.create_guard();
                }
                Ok(false) => {
                    debug!(identity = %self.identity, "lease held by another, waiting");
                }
                Err(e) => {
                    warn!(identity = %self.identity, error = %e, "failed to acquire lease, retrying");
                }
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    fn create_guard(self: &Arc<Self>) -> LeaderGuard {
        let (lost_tx, lost_rx) = oneshot::channel();
        let elector = Arc::clone(self);
        let renewal_task = tokio::spawn(async move {
            elector.renewal_loop(lost_tx).await;
        });
        LeaderGuard {
            elector: Arc::clone(self),
            renewal_task,
            lost_rx: Some(lost_rx),
        }
    }

    /// One election round. `Ok(true)` when we hold the lease afterwards.
    pub async fn try_acquire_or_renew(&self) -> Result<bool> {
        let now = Utc::now();
        let client = self.client.as_ref();
        let Some(lease) = cluster::get::<Lease>(client, Some(&self.namespace), &self.lease_name).await?
        else {
            return self.write(cluster::create(client, &self.fresh_lease(now, None, 0)?).await);
        };

        let spec = lease.spec.clone().unwrap_or_default();
        if spec.holder_identity.as_deref() == Some(self.identity.as_str()) {
            let mut renewed = lease;
            if let Some(spec) = renewed.spec.as_mut() {
                spec.renew_time = Some(micro_time(now)?);
            }
            return self.write(cluster::replace(client, &renewed).await);
        }

        if !expired(&spec, now) {
            return Ok(false);
        }
        let transitions = spec.lease_transitions.unwrap_or(0) + 1;
        let taken = self.fresh_lease(now, lease.metadata.resource_version.clone(), transitions)?;
        let won = self.write(cluster::replace(client, &taken).await)?;
        if won {
            info!(identity = %self.identity, transitions, "took over expired lease");
        }
        Ok(won)
    }

    fn write(&self, result: Result<Lease>) -> Result<bool> {
        match result {
            Ok(_) => Ok(true),
            Err(Error::Conflict { .. }) => {
                debug!(identity = %self.identity, "lease write lost the race");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn fresh_lease(
        &self,
        now: DateTime<Utc>,
        resource_version: Option<String>,
        transitions: i32,
    ) -> Result<Lease> {
        Ok(Lease {
            metadata: ObjectMeta {
                name: Some(self.lease_name.clone()),
                namespace: Some(self.namespace.clone()),
                resource_version,
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.identity.clone()),
                lease_duration_seconds: Some(LEASE_DURATION.as_secs() as i32),
                acquire_time: Some(micro_time(now)?),
                renew_time: Some(micro_time(now)?),
                lease_transitions: Some(transitions),
                ..Default::default()
            }),
        })
    }

    /// Renews every [`RENEW_INTERVAL`]. A failed call is retried until the
    /// lease we last wrote has run out; losing the lease to another holder
    /// ends leadership at once.
    async fn renewal_loop(&self, lost_tx: oneshot::Sender<()>) {
        let mut renewed_at = Instant::now();
        let mut wait = RENEW_INTERVAL;
        loop {
            tokio::time::sleep(wait).await;
            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    renewed_at = Instant::now();
                    wait = RENEW_INTERVAL;
                }
                Ok(false) => {
                    warn!(identity = %self.identity, "lease taken by another holder");
                    break;
                }
                Err(e) if renewed_at.elapsed() < LEASE_DURATION => {
                    warn!(identity = %self.identity, error = %e, "lease renewal failed, retrying");
                    wait = RETRY_INTERVAL;
                }
                Err(e) => {
                    warn!(identity = %self.identity, error = %e, "lease expired before it could be renewed");
                    break;
                }
            }
        }
        self.is_leader.store(false, Ordering::SeqCst);
        let _ = lost_tx.send(());
    }

    /// Clears the holder so a standby can take over without waiting for
    /// expiry. No-op when someone else holds the lease.
    pub async fn release(&self) -> Result<()> {
        let client = self.client.as_ref();
        let Some(lease) = cluster::get::<Lease>(client, Some(&self.namespace), &self.lease_name).await?
        else {
            return Ok(());
        };
        let holder = lease.spec.as_ref().and_then(|s| s.holder_identity.as_deref());
        if holder != Some(self.identity.as_str()) {
            return Ok(());
        }

        let past = Utc::now() - chrono::Duration::seconds(60);
        let patch = json!({ "spec": { "holderIdentity": null, "renewTime": rfc3339(past) } });
        cluster::merge_patch::<Lease>(client, Some(&self.namespace), &self.lease_name, &patch).await?;
        self.is_leader.store(false, Ordering::SeqCst);
        info!(identity = %self.identity, "lease released");
        Ok(())
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Lease timestamps are handled in their RFC 3339 wire form.
fn micro_time(t: DateTime<Utc>) -> Result<MicroTime> {
    Ok(serde_json::from_value(json!(rfc3339(t)))?)
}

fn parse_micro_time(t: &MicroTime) -> Option<DateTime<Utc>> {
    let raw = serde_json::to_value(t).ok()?;
    DateTime::parse_from_rfc3339(raw.as_str()?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn expired(spec: &LeaseSpec, now: DateTime<Utc>) -> bool {
    let renewed = spec.renew_time.as_ref().and_then(parse_micro_time);
    match (renewed, spec.lease_duration_seconds) {
        (Some(renewed), Some(secs)) => now > renewed + chrono::Duration::seconds(secs as i64),
        _ => true,
    }
}

/// Held while this replica leads. Dropping it stops renewal.
pub struct LeaderGuard {
    elector: Arc<LeaderElector>,
    renewal_task: JoinHandle<()>,
    lost_rx: Option<oneshot::Receiver<()>>,
}

impl LeaderGuard {
    /// Resolves once a renewal fails.
    pub async fn lost(&mut self) {
        if let Some(rx) = self.lost_rx.take() {
            let _ = rx.await;
        }
    }

    pub async fn release(&self) -> Result<()> {
        self.elector.release().await
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        self.elector.is_leader.store(false, Ordering::SeqCst);
        self.renewal_task.abort();
    }
}
