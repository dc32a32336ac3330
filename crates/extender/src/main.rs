//! Affinity extender - traffic-aware placement for kube-scheduler
//!
//! Runs as a Deployment next to the scheduler, which calls it over HTTP
//! for every pod it places.

use affinity_core::{
    health::{components, HealthRegistry},
    AffinityPipeline, ClusterView, KubeCluster, MetricsQuery, PrometheusClient, StructuredLogger,
};
use affinity_extender::{api, config::ExtenderConfig};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const EXTENDER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Node name used to check that pod listing works; it need not exist
const CLUSTER_PROBE_NODE: &str = "affinity-extender-probe";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = ExtenderConfig::load()?;
    let plugin_config = config.plugin_config();
    plugin_config
        .validate()
        .context("invalid placement configuration")?;
    info!(
        prometheus_url = %config.prometheus_url,
        cpu_usage_limit = config.cpu_usage_limit,
        max_tenant_occupants = config.max_tenant_occupants,
        "Extender configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::METRICS_BACKEND).await;
    health_registry.register(components::CLUSTER).await;

    let metrics: Arc<dyn MetricsQuery> = Arc::new(PrometheusClient::new(&plugin_config.metrics)?);
    let cluster: Arc<dyn ClusterView> =
        Arc::new(KubeCluster::try_default(plugin_config.identity_label.clone()).await?);

    let logger = StructuredLogger::new(&config.instance);
    let pipeline = AffinityPipeline::new(
        plugin_config.clone(),
        Arc::clone(&metrics),
        Arc::clone(&cluster),
    )?
    .with_logger(logger.clone());

    health_registry
        .probe_cluster(cluster.as_ref(), CLUSTER_PROBE_NODE)
        .await;
    spawn_backend_probe(
        health_registry.clone(),
        metrics,
        Duration::from_secs(config.probe_interval_secs.max(1)),
    );

    logger.log_startup(EXTENDER_VERSION, &plugin_config.tenant_namespace);

    let app_state = Arc::new(api::AppState::new(
        Arc::new(pipeline),
        health_registry.clone(),
    ));
    health_registry.set_ready(true).await;

    api::serve(config.port, app_state, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    logger.log_shutdown("SIGINT received");
    Ok(())
}

fn spawn_backend_probe(registry: HealthRegistry, metrics: Arc<dyn MetricsQuery>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            registry.probe_metrics_backend(metrics.as_ref()).await;
        }
    });
}
