//! Watch-driven reconcilers.
//!
//! Reconcile logic lives in plain async functions over [`ClusterClient`];
//! each submodule's `run` wires them to `kube::runtime::Controller`.

pub mod add_label;
pub mod cert_refresh;
pub mod common_service;
pub mod pod_refresh;

use std::{fmt::Debug, future::Future, pin::Pin, sync::Arc};

use kube::{Client, runtime::events::Recorder};

use crate::{cluster::ClusterClient, config::OperatorConfig, metrics::Metrics};

/// Watch timeout, kept below the client read timeout.
const WATCH_TIMEOUT_SECS: u32 = 25;

pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

pub struct Ctx {
    pub client: Client,
    pub cluster: Arc<dyn ClusterClient>,
    pub recorder: Recorder,
    pub config: Arc<OperatorConfig>,
    pub metrics: Arc<Metrics>,
}

/// Every controller this operator runs.
pub fn build_controllers(ctx: Arc<Ctx>) -> Vec<ControllerFuture> {
    vec![
        common_service::run(ctx.clone()),
        cert_refresh::run(ctx.clone()),
        pod_refresh::run(ctx),
    ]
}

fn log_reconcile_result<T: Debug, E: Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::warn!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
