//! Background loops.
//!
//! A [`Task`] ticks once immediately and then every [`Task::interval`]. A
//! failed tick is logged and retried on the next interval; the loop only
//! ends when its cancellation token fires.

pub mod cert_manager_cr;
pub mod cleanup;
pub mod cpp_config;
pub mod iam_status;
pub mod namespace_scope;
pub mod operator_status;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{cluster::ClusterClient, config::OperatorConfig, error::Result, metrics::Metrics};

#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    async fn tick(&self) -> Result<()>;
}

pub async fn run_task(task: Arc<dyn Task>, metrics: Arc<Metrics>, cancel: CancellationToken) {
    let name = task.name();
    let interval = task.interval();
    info!(task = name, interval_secs = interval.as_secs(), "task started");

    loop {
        metrics.task_ticks.with_label_values(&[name]).inc();
        match task.tick().await {
            Ok(()) => debug!(task = name, "tick done"),
            Err(e) => {
                metrics.task_failures.with_label_values(&[name]).inc();
                warn!(task = name, error = %e, "tick failed, retrying next interval");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    info!(task = name, "task stopped");
}

/// The tasks this configuration asks for.
pub fn default_tasks(client: Arc<dyn ClusterClient>, cfg: Arc<OperatorConfig>) -> Vec<Arc<dyn Task>> {
    let mut tasks: Vec<Arc<dyn Task>> = vec![
        Arc::new(iam_status::IamStatusTask::new(client.clone(), cfg.clone())),
        Arc::new(operator_status::OperatorStatusTask::new(client.clone(), cfg.clone())),
        Arc::new(namespace_scope::NamespaceScopeTask::new(client.clone(), cfg.clone())),
        Arc::new(cpp_config::CppConfigTask::new(client.clone(), cfg.clone())),
    ];
    if cfg.features.deprecated_cleanup {
        tasks.push(Arc::new(cleanup::CleanupTask::new(client.clone(), cfg.clone())));
    }
    if cfg.features.cert_manager_cr {
        tasks.push(Arc::new(cert_manager_cr::CertManagerCrTask::new(client, cfg)));
    }
    tasks
}

pub fn spawn_all(
    tasks: Vec<Arc<dyn Task>>,
    metrics: Arc<Metrics>,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    tasks
        .into_iter()
        .map(|task| tokio::spawn(run_task(task, metrics.clone(), cancel.child_token())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cluster::fake::FakeCluster, error::Error};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        ticks: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Task for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn interval(&self) -> Duration {
            Duration::from_secs(5)
        }

        async fn tick(&self) -> Result<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Timeout("always".into()));
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_immediately_then_on_interval_until_cancelled() {
        let task = Arc::new(Counting {
            ticks: AtomicUsize::new(0),
            fail: false,
        });
        let metrics = Arc::new(Metrics::new().unwrap());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_task(task.clone(), metrics.clone(), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(task.ticks.load(Ordering::SeqCst), 3);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(metrics.task_ticks.with_label_values(&["counting"]).get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_ticks_keep_the_loop_alive() {
        let task = Arc::new(Counting {
            ticks: AtomicUsize::new(0),
            fail: true,
        });
        let metrics = Arc::new(Metrics::new().unwrap());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_task(task.clone(), metrics.clone(), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(11)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(task.ticks.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.task_failures.with_label_values(&["counting"]).get(), 3);
    }

    #[test]
    fn feature_flags_select_tasks() {
        let client: Arc<dyn ClusterClient> = Arc::new(FakeCluster::new());
        let mut cfg = OperatorConfig::new("cs-op");
        assert_eq!(default_tasks(client.clone(), Arc::new(cfg.clone())).len(), 6);

        cfg.features.deprecated_cleanup = false;
        cfg.features.cert_manager_cr = false;
        let names: Vec<_> = default_tasks(client, Arc::new(cfg))
            .iter()
            .map(|t| t.name())
            .collect();
        assert_eq!(names, ["iam-status", "operator-status", "namespace-scope", "cpp-config"]);
    }
}
