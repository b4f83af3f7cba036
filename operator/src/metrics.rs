use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::{error, info};

use crate::error::{Error, Result};

const NAMESPACE: &str = "common_service_operator";

pub struct Metrics {
    registry: Registry,
    pub reconciliations: IntCounterVec,
    pub reconcile_errors: IntCounterVec,
    pub task_ticks: IntCounterVec,
    pub task_failures: IntCounterVec,
}

fn counter(registry: &Registry, name: &str, help: &str, label: &str) -> prometheus::Result<IntCounterVec> {
    let c = IntCounterVec::new(Opts::new(name, help).namespace(NAMESPACE), &[label])?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        Ok(Metrics {
            reconciliations: counter(
                &registry,
                "reconciliations_total",
                "Reconcile calls per controller",
                "controller",
            )?,
            reconcile_errors: counter(
                &registry,
                "reconcile_errors_total",
                "Failed reconcile calls per controller",
                "controller",
            )?,
            task_ticks: counter(&registry, "task_ticks_total", "Background task ticks", "task")?,
            task_failures: counter(
                &registry,
                "task_failures_total",
                "Background task ticks that returned an error",
                "task",
            )?,
            registry,
        })
    }

    pub fn reconciled(&self, controller: &str) {
        self.reconciliations.with_label_values(&[controller]).inc();
    }

    pub fn reconcile_failed(&self, controller: &str) {
        self.reconcile_errors.with_label_values(&[controller]).inc();
    }

    /// Text exposition of every registered metric.
    pub fn encode(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            error!(error = %e, "failed to encode metrics");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

/// Readiness flag flipped once bootstrap has finished.
#[derive(Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn set_ready(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn metrics_router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

pub fn probe_router(readiness: Readiness) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz_handler))
        .with_state(readiness)
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        metrics.encode(),
    )
}

async fn readyz_handler(State(readiness): State<Readiness>) -> StatusCode {
    if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Accepts `host:port` or the bare `:port` form, which binds every interface.
pub fn parse_bind_addr(raw: &str) -> Result<SocketAddr> {
    let full = if raw.starts_with(':') {
        format!("0.0.0.0{raw}")
    } else {
        raw.to_string()
    };
    full.parse()
        .map_err(|_| Error::Config(format!("invalid bind address {raw}")))
}

/// Serves `router` on `addr` until the listener fails.
pub async fn serve(addr: SocketAddr, router: Router, what: &'static str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, what, "listening");
    axum::serve(listener, router).await
}
