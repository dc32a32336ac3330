//! Affinity profile inspection

use affinity_core::{AffinityProfile, MetricsQuery, PluginConfig, ProfileBuilder, Workload};
use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;
use tabled::Tabled;

use crate::output::{print_heading, print_info, print_json, print_table, OutputFormat};

#[derive(Debug, Tabled)]
pub struct PeerRow {
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[tabled(rename = "Service")]
    pub service: String,
    #[tabled(rename = "Weight")]
    pub weight: i64,
}

pub fn peer_rows(profile: &AffinityProfile) -> Vec<PeerRow> {
    profile
        .entries()
        .iter()
        .enumerate()
        .map(|(i, e)| PeerRow {
            rank: i + 1,
            service: e.service.clone(),
            weight: e.weight,
        })
        .collect()
}

/// Build and print the affinity profile a workload of `service` would get
pub async fn show_profile(
    metrics: Arc<dyn MetricsQuery>,
    config: &PluginConfig,
    service: &str,
    show_query: bool,
    format: OutputFormat,
) -> Result<()> {
    let builder = ProfileBuilder::new(metrics, config);
    let workload = Workload::new(service, &config.tenant_namespace)
        .with_label(&config.identity_label, service);
    let profile = builder.build(&workload).await?;

    match format {
        OutputFormat::Json => print_json(&profile)?,
        OutputFormat::Table => {
            print_heading("Affinity Profile");
            println!("Service:   {}", service.cyan());
            println!("Namespace: {}", config.tenant_namespace.cyan());
            println!("Source:    {}", profile.source());
            if show_query {
                println!("Query:     {}", builder.correlation_query(service).dimmed());
            }
            println!();
            print_table(peer_rows(&profile), "No correlated peers; every node would score equally");
            if !profile.is_empty() {
                print_info(&format!("{} peers ranked", profile.len()));
            }
        }
    }
    Ok(())
}
