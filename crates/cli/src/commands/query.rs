//! Raw metrics backend queries and node utilization lookups

use affinity_core::{AdmissionFilter, CandidateHost, MetricsQuery, PluginConfig};
use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;

use crate::output::{color_utilization, print_heading, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct SampleRow {
    #[tabled(rename = "Labels")]
    labels: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Run `expr` against the metrics backend and print the samples
pub async fn run_query(metrics: &dyn MetricsQuery, expr: &str, format: OutputFormat) -> Result<()> {
    let samples = metrics.query(expr).await?;

    match format {
        OutputFormat::Json => print_json(&samples)?,
        OutputFormat::Table => {
            let rows: Vec<SampleRow> = samples
                .iter()
                .map(|s| SampleRow {
                    labels: s
                        .labels
                        .iter()
                        .map(|(k, v)| format!("{k}={v}"))
                        .collect::<Vec<_>>()
                        .join(", "),
                    value: s.value.to_string(),
                })
                .collect();
            print_table(rows, "Query returned no samples");
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct UtilizationReport<'a> {
    address: &'a str,
    query: String,
    utilization: Option<f64>,
    limit: f64,
    over_limit: bool,
}

/// Show the live CPU utilization of the node exporter at `address`
pub async fn show_utilization(
    metrics: Arc<dyn MetricsQuery>,
    config: &PluginConfig,
    address: &str,
    format: OutputFormat,
) -> Result<()> {
    let filter = AdmissionFilter::new(metrics, config);
    let host = CandidateHost::new(address, address, Vec::new());
    let utilization = filter.current_utilization(&host).await?;
    let limit = filter.thresholds().cpu_usage_limit;

    let report = UtilizationReport {
        address,
        query: filter.utilization_query(address),
        utilization,
        limit,
        over_limit: utilization.is_some_and(|u| u > limit),
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_heading("Node Utilization");
            println!("Address:     {}", report.address.cyan());
            println!("Query:       {}", report.query.dimmed());
            println!("Utilization: {}", color_utilization(report.utilization, limit));
            println!("Limit:       {:.1}%", limit * 100.0);
            if report.utilization.is_none() {
                println!();
                println!("{}", "No sample for this node; the filter would admit it".yellow());
            }
        }
    }
    Ok(())
}
