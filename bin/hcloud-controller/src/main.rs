use anyhow::Result;
use hcloud_client::{KubeClusterStore, KubeSecretCredentials, RestClientFactory};
use hcloud_core::Engine;
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod hetzner_cluster_controller;
mod metrics;

use config::{ControllerConfig, LogFormat};
use hetzner_cluster_controller::HetznerClusterController;
use metrics::ControllerMetrics;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ControllerConfig::from_env()?;
    init_tracing(config.log_format);

    info!("Starting hcloud-controller...");
    info!("  - Hetzner API: {}", config.hcloud_endpoint);
    info!("  - Call timeout: {:?}", config.engine.call_timeout);
    info!("  - Reconcile deadline: {:?}", config.reconcile_deadline);

    let client = Client::try_default().await?;
    let clients = RestClientFactory::new(&config.hcloud_endpoint, config.engine.call_timeout)?;
    let engine = Engine::new(
        Arc::new(KubeClusterStore::new(client.clone())),
        Arc::new(KubeSecretCredentials::new(client.clone())),
        Arc::new(clients),
        config.engine.clone(),
    );

    let metrics = ControllerMetrics::new()?;
    let metrics_addr = config.metrics_addr;
    let server_metrics = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = metrics::serve(metrics_addr, server_metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    let controller = HetznerClusterController::new(
        client,
        config.watch_namespace.clone(),
        engine,
        metrics,
        config.reconcile_deadline,
    );
    tokio::spawn(async move {
        if let Err(e) = controller.run().await {
            error!("HetznerCluster controller error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting...");

    Ok(())
}
