use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::debug;

use super::Task;
use crate::{
    apply::apply_manifest,
    cluster::ClusterClient,
    config::OperatorConfig,
    error::Result,
    manifest::assets,
};

const CERT_MANAGER_API: &str = "cert-manager.io/v1";

pub struct CertManagerCrTask {
    client: Arc<dyn ClusterClient>,
    cfg: Arc<OperatorConfig>,
}

impl CertManagerCrTask {
    pub fn new(client: Arc<dyn ClusterClient>, cfg: Arc<OperatorConfig>) -> Self {
        CertManagerCrTask { client, cfg }
    }
}

#[async_trait]
impl Task for CertManagerCrTask {
    fn name(&self) -> &'static str {
        "cert-manager-cr"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn tick(&self) -> Result<()> {
        let client = self.client.as_ref();
        for kind in ["Issuer", "Certificate"] {
            if !client.has_kind(CERT_MANAGER_API, kind).await? {
                debug!(kind, "cert-manager kind not served yet");
                return Ok(());
            }
        }
        apply_manifest(client, &self.cfg, assets::CERT_MANAGER_CRS).await?;
        Ok(())
    }
}
