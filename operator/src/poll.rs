use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    cluster::ClusterClient,
    error::{Error, Result},
};

/// How often kind discovery is retried while waiting on a CRD.
pub const KIND_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Runs `check` immediately and then every `interval` until it returns
/// `Ok(true)`. `Ok(false)` means "not yet"; an error ends the poll. With
/// `deadline = None` this never gives up.
pub async fn poll_until<F, Fut>(
    interval: Duration,
    deadline: Option<Duration>,
    what: &str,
    mut check: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let started = Instant::now();
    loop {
        if check().await? {
            return Ok(());
        }
        if let Some(limit) = deadline {
            if started.elapsed() + interval > limit {
                return Err(Error::Timeout(format!("{what} after {}s", limit.as_secs())));
            }
        }
        debug!(what, "condition not met yet");
        tokio::time::sleep(interval).await;
    }
}

/// Waits until `kind` is served under `api_version`.
pub async fn wait_for_kind(
    client: &dyn ClusterClient,
    api_version: &str,
    kind: &str,
    interval: Duration,
    deadline: Option<Duration>,
) -> Result<()> {
    let what = format!("waiting for {api_version}/{kind}");
    poll_until(interval, deadline, &what, || client.has_kind(api_version, kind)).await?;
    info!(api_version, kind, "kind is available");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeCluster;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn stops_when_condition_holds() {
        let calls = AtomicUsize::new(0);
        poll_until(Duration::from_secs(5), None, "third time", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(n >= 2) }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_poll_times_out() {
        let err = poll_until(
            Duration::from_secs(5),
            Some(Duration::from_secs(20)),
            "never",
            || async { Ok(false) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn check_errors_propagate() {
        let err = poll_until(Duration::from_secs(1), None, "boom", || async {
            Err(Error::Webhook("discovery failed".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Webhook(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_registered_kind() {
        let fake = FakeCluster::new();
        fake.register_kind("operator.ibm.com/v1alpha1", "OperandRegistry");

        wait_for_kind(
            &fake,
            "operator.ibm.com/v1alpha1",
            "OperandRegistry",
            KIND_POLL_INTERVAL,
            Some(Duration::from_secs(30)),
        )
        .await
        .unwrap();

        let err = wait_for_kind(
            &fake,
            "operator.ibm.com/v1alpha1",
            "OperandConfig",
            KIND_POLL_INTERVAL,
            Some(Duration::from_secs(30)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
