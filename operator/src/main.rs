use std::{future, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use kube::{Client, CustomResourceExt, runtime::events::Recorder};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use common_service_operator::{
    bootstrap,
    cluster::{ClusterClient, KubeCluster},
    config::OperatorConfig,
    controller::{self, Ctx},
    crd::CommonService,
    event::make_reporter,
    leader::LeaderElector,
    metrics::{self, Metrics, Readiness},
    tasks,
    webhook::{self, WebhookState},
};

/// Installs and supervises the IBM common services on a cluster.
#[derive(Parser, Debug)]
#[command(name = "common-service-operator", version, about, long_about = None)]
struct Args {
    /// Address the Prometheus endpoint binds to
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = ":8080")]
    metrics_addr: String,

    /// Address the liveness and readiness probes bind to
    #[arg(long, env = "HEALTH_PROBE_BIND_ADDRESS", default_value = ":8081")]
    health_probe_bind_address: String,

    /// Only run while holding the operator Lease
    #[arg(long, env = "ENABLE_LEADER_ELECTION")]
    enable_leader_election: bool,

    #[arg(long, env = "WEBHOOK_ADDR", default_value = ":9443")]
    webhook_addr: String,

    /// Directory holding tls.crt and tls.key for the webhook server
    #[arg(
        long,
        env = "WEBHOOK_CERT_DIR",
        default_value = "/tmp/k8s-webhook-server/serving-certs"
    )]
    webhook_cert_dir: PathBuf,

    /// Print the CommonService CRD and exit
    #[arg(long)]
    print_crd: bool,

    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_crd {
        let crd = serde_yaml::to_string(&CommonService::crd())
            .context("failed to serialize CommonService CRD")?;
        println!("{crd}");
        return Ok(());
    }

    init_tracing(args.log_json);
    // Fails only when a provider is already installed.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cfg = OperatorConfig::from_env()?;
    let client = Client::try_default()
        .await
        .context("failed to build Kubernetes client")?;
    let cluster: Arc<dyn ClusterClient> = Arc::new(KubeCluster::new(client.clone()));
    let metrics = Arc::new(Metrics::new()?);
    let readiness = Readiness::default();
    let pod_name = std::env::var("POD_NAME").ok();

    let metrics_addr = metrics::parse_bind_addr(&args.metrics_addr)?;
    let probe_addr = metrics::parse_bind_addr(&args.health_probe_bind_address)?;
    let metrics_app = metrics::metrics_router(metrics.clone());
    tokio::spawn(async move {
        if let Err(e) = metrics::serve(metrics_addr, metrics_app, "metrics").await {
            error!(error = %e, "metrics server exited");
        }
    });
    let probe_app = metrics::probe_router(readiness.clone());
    tokio::spawn(async move {
        if let Err(e) = metrics::serve(probe_addr, probe_app, "probes").await {
            error!(error = %e, "probe server exited");
        }
    });

    let mut leader = None;
    if args.enable_leader_election {
        let identity = pod_name
            .clone()
            .unwrap_or_else(|| format!("common-service-operator-{}", std::process::id()));
        let elector = Arc::new(LeaderElector::new(
            cluster.clone(),
            &cfg.operator_namespace,
            &identity,
        ));
        leader = Some(elector.acquire().await);
    }

    let cfg = Arc::new(bootstrap::resolve_config(cluster.as_ref(), &cfg).await?);
    bootstrap::run(cluster.as_ref(), &cfg)
        .await
        .context("bootstrap failed")?;
    readiness.set_ready();
    info!(services_namespace = %cfg.services_namespace, "bootstrap complete");

    let cancel = CancellationToken::new();
    let task_handles = tasks::spawn_all(
        tasks::default_tasks(cluster.clone(), cfg.clone()),
        metrics.clone(),
        &cancel,
    );

    if cfg.features.webhooks {
        let addr = metrics::parse_bind_addr(&args.webhook_addr)?;
        let state = Arc::new(WebhookState {
            cluster: cluster.clone(),
            config: cfg.clone(),
        });
        let cert_dir = args.webhook_cert_dir.clone();
        tokio::spawn(async move {
            if let Err(e) = webhook::serve(addr, &cert_dir, state).await {
                error!(error = %e, "webhook server exited");
            }
        });
    }

    let ctx = Arc::new(Ctx {
        recorder: Recorder::new(client.clone(), make_reporter(pod_name)),
        client,
        cluster,
        config: cfg,
        metrics,
    });
    let controllers = futures::future::join_all(controller::build_controllers(ctx));

    let lost = async {
        match leader.as_mut() {
            Some(guard) => guard.lost().await,
            None => future::pending().await,
        }
    };
    let lost_leadership = tokio::select! {
        _ = controllers => {
            info!("controllers stopped");
            false
        }
        _ = lost => true,
    };

    cancel.cancel();
    futures::future::join_all(task_handles).await;

    if lost_leadership {
        anyhow::bail!("leadership lost");
    }
    if let Some(guard) = &leader {
        if let Err(e) = guard.release().await {
            warn!(error = %e, "failed to release lease");
        }
    }
    info!("shut down");
    Ok(())
}
