//! Admission checks against live cluster state

use affinity_core::{Admission, AffinityPipeline, CycleState, HostRef};
use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{color_status, color_utilization, print_json, print_table, OutputFormat};

#[derive(Debug, Serialize)]
pub struct AdmitReport {
    pub host: String,
    pub tenant_occupants: Option<usize>,
    pub admission: Option<Admission>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Tabled)]
struct AdmitRow {
    #[tabled(rename = "Node")]
    host: String,
    #[tabled(rename = "Tenants")]
    tenants: String,
    #[tabled(rename = "Utilization")]
    utilization: String,
    #[tabled(rename = "Verdict")]
    verdict: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Run the admission filter for each of `nodes`
pub async fn admit_nodes(
    pipeline: &AffinityPipeline,
    nodes: &[String],
    format: OutputFormat,
) -> Result<()> {
    let cycle = CycleState::new("affinityctl");
    let namespace = &pipeline.config().tenant_namespace;
    let mut reports = Vec::with_capacity(nodes.len());

    for node in nodes {
        let report = match pipeline.admit(&cycle, &HostRef::named(node)).await {
            Ok((candidate, admission)) => AdmitReport {
                host: node.clone(),
                tenant_occupants: Some(candidate.tenant_occupants(namespace).count()),
                admission: Some(admission),
                error: None,
            },
            Err(e) => AdmitReport {
                host: node.clone(),
                tenant_occupants: None,
                admission: None,
                error: Some(e.to_string()),
            },
        };
        reports.push(report);
    }

    match format {
        OutputFormat::Json => print_json(&reports)?,
        OutputFormat::Table => {
            let limit = pipeline.config().thresholds.cpu_usage_limit;
            let rows: Vec<AdmitRow> = reports
                .iter()
                .map(|r| admit_row(r, limit))
                .collect();
            print_table(rows, "No nodes given");
        }
    }
    Ok(())
}

fn admit_row(report: &AdmitReport, limit: f64) -> AdmitRow {
    let tenants = report
        .tenant_occupants
        .map_or_else(|| "-".to_string(), |n| n.to_string());

    let (utilization, verdict, detail) = match (&report.admission, &report.error) {
        (Some(Admission::Admitted { utilization }), _) => (
            color_utilization(*utilization, limit),
            "admitted",
            String::new(),
        ),
        (Some(Admission::Rejected(rejection)), _) => {
            ("-".to_string(), "rejected", rejection.to_string())
        }
        (None, error) => ("-".to_string(), "error", error.clone().unwrap_or_default()),
    };

    AdmitRow {
        host: report.host.clone(),
        tenants,
        utilization,
        verdict: color_status(verdict),
        detail,
    }
}
