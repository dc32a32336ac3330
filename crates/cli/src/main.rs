//! Traffic-affinity placement CLI
//!
//! A command-line tool for inspecting affinity profiles, node utilization
//! and admission, and for dry-running full placement cycles against a live
//! cluster.

mod commands;
mod config;
mod output;

use affinity_core::{
    AffinityPipeline, ClusterView, KubeCluster, MetricsQuery, PluginConfig, PrometheusClient,
    Workload,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{admit, evaluate, profile, query};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Traffic-affinity placement CLI
#[derive(Parser)]
#[command(name = "affinityctl")]
#[command(author, version, about = "Inspect traffic-affinity placement decisions", long_about = None)]
pub struct Cli {
    /// Metrics backend URL (can also be set via AFFINITY_PROMETHEUS_URL env var)
    #[arg(long, env = "AFFINITY_PROMETHEUS_URL")]
    pub prometheus_url: Option<String>,

    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Tenant namespace whose workloads count for density and affinity
    #[arg(long, short, env = "AFFINITY_TENANT_NAMESPACE")]
    pub namespace: Option<String>,

    /// CPU utilization fraction above which nodes are rejected
    #[arg(long, env = "AFFINITY_CPU_USAGE_LIMIT")]
    pub cpu_usage_limit: Option<f64>,

    /// Tenant occupant count at which nodes are rejected
    #[arg(long, env = "AFFINITY_MAX_TENANT_OCCUPANTS")]
    pub max_tenant_occupants: Option<usize>,

    /// Metrics query timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the affinity profile of a service
    Profile {
        /// Service identity, as carried in the identity label
        service: String,

        /// Also print the correlation query
        #[arg(long)]
        show_query: bool,
    },

    /// Show the live CPU utilization of a node exporter
    Utilization {
        /// Node address, as reported in the node's status
        address: String,
    },

    /// Run the admission filter for nodes
    Admit {
        /// Node names
        #[arg(required = true)]
        nodes: Vec<String>,
    },

    /// Dry-run a full placement cycle over nodes
    Evaluate {
        /// Service identity of the workload; omit to evaluate an unlabeled workload
        #[arg(long, short)]
        service: Option<String>,

        /// Workload name shown in logs and output
        #[arg(long, default_value = "affinityctl-dry-run")]
        pod_name: String,

        /// Candidate node names, in scheduler order
        #[arg(long, value_delimiter = ',', required = true)]
        nodes: Vec<String>,
    },

    /// Run a raw query against the metrics backend
    Query {
        /// Query expression
        expr: String,
    },
}

impl Cli {
    fn overrides(&self) -> config::Overrides {
        config::Overrides {
            prometheus_url: self.prometheus_url.clone(),
            tenant_namespace: self.namespace.clone(),
            cpu_usage_limit: self.cpu_usage_limit,
            max_tenant_occupants: self.max_tenant_occupants,
            timeout_secs: self.timeout,
        }
    }
}

async fn connect_cluster(cli: &Cli, config: &PluginConfig) -> Result<Arc<dyn ClusterView>> {
    let label = config.identity_label.clone();
    let cluster = match config::kubeconfig_path(cli.kubeconfig.as_deref()) {
        Some(path) => KubeCluster::from_kubeconfig(&path, label).await?,
        None => KubeCluster::try_default(label).await?,
    };
    Ok(Arc::new(cluster))
}

async fn build_pipeline(
    cli: &Cli,
    config: &PluginConfig,
    metrics: Arc<dyn MetricsQuery>,
) -> Result<AffinityPipeline> {
    let cluster = connect_cluster(cli, config).await?;
    Ok(AffinityPipeline::new(config.clone(), metrics, cluster)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let plugin_config = config::plugin_config(&cli.overrides(), &config::Config::load()?)?;
    let metrics: Arc<dyn MetricsQuery> = Arc::new(PrometheusClient::new(&plugin_config.metrics)?);

    match &cli.command {
        Commands::Profile {
            service,
            show_query,
        } => {
            profile::show_profile(metrics, &plugin_config, service, *show_query, cli.format)
                .await?;
        }
        Commands::Utilization { address } => {
            query::show_utilization(metrics, &plugin_config, address, cli.format).await?;
        }
        Commands::Admit { nodes } => {
            let pipeline = build_pipeline(&cli, &plugin_config, metrics).await?;
            admit::admit_nodes(&pipeline, nodes, cli.format).await?;
        }
        Commands::Evaluate {
            service,
            pod_name,
            nodes,
        } => {
            let pipeline = build_pipeline(&cli, &plugin_config, metrics).await?;
            let mut workload = Workload::new(pod_name, &plugin_config.tenant_namespace);
            if let Some(service) = service {
                workload = workload.with_label(&plugin_config.identity_label, service);
            }
            evaluate::evaluate(&pipeline, &workload, nodes, cli.format).await?;
        }
        Commands::Query { expr } => {
            query::run_query(metrics.as_ref(), expr, cli.format).await?;
        }
    }

    Ok(())
}
