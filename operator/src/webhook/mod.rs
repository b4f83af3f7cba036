pub mod common_service;
pub mod operand_request;

use std::{net::SocketAddr, path::Path, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use axum_server::tls_rustls::RustlsConfig;
use tracing::info;

use crate::{
    cluster::ClusterClient,
    config::OperatorConfig,
    error::{Error, Result},
};

pub const VALIDATE_COMMON_SERVICE_PATH: &str = "/validate-operator-ibm-com-v3-commonservice";
pub const MUTATE_OPERAND_REQUEST_PATH: &str = "/mutate-operator-ibm-com-v1alpha1-operandrequest";

pub struct WebhookState {
    pub cluster: Arc<dyn ClusterClient>,
    pub config: Arc<OperatorConfig>,
}

pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(VALIDATE_COMMON_SERVICE_PATH, post(common_service::validate_handler))
        .route(MUTATE_OPERAND_REQUEST_PATH, post(operand_request::mutate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Serves the webhooks over TLS with `tls.crt`/`tls.key` from `cert_dir`.
pub async fn serve(addr: SocketAddr, cert_dir: &Path, state: Arc<WebhookState>) -> Result<()> {
    let tls_config =
        RustlsConfig::from_pem_file(cert_dir.join("tls.crt"), cert_dir.join("tls.key"))
            .await
            .map_err(|e| Error::Webhook(format!("TLS config error: {e}")))?;

    info!(addr = %addr, cert_dir = %cert_dir.display(), "starting webhook server");

    axum_server::bind_rustls(addr, tls_config)
        .serve(webhook_router(state).into_make_service())
        .await
        .map_err(|e| Error::Webhook(format!("server error: {e}")))
}
