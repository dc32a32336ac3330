//! Full placement cycle dry runs

use affinity_core::{AffinityPipeline, CycleOutcome, HostOutcome, HostRef, Workload};
use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::commands::profile::peer_rows;
use crate::output::{
    color_status, color_utilization, print_heading, print_json, print_success, print_table,
    print_warning, OutputFormat,
};

#[derive(Debug, Tabled)]
pub struct EvaluationRow {
    #[tabled(rename = "Node")]
    pub host: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Utilization")]
    pub utilization: String,
    #[tabled(rename = "Score")]
    pub score: String,
    #[tabled(rename = "Detail")]
    pub detail: String,
}

pub fn evaluation_rows(outcome: &CycleOutcome, limit: f64) -> Vec<EvaluationRow> {
    outcome
        .evaluations
        .iter()
        .map(|e| {
            let (status, utilization, score, detail) = match &e.outcome {
                HostOutcome::Scored { utilization, score } => (
                    "scored",
                    color_utilization(*utilization, limit),
                    score.score.to_string(),
                    score
                        .matches
                        .iter()
                        .map(|m| format!("{} ({})", m.occupant, m.weight))
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
                HostOutcome::Rejected { rejection } => (
                    "rejected",
                    "-".to_string(),
                    "-".to_string(),
                    rejection.to_string(),
                ),
                HostOutcome::Error { message } => {
                    ("error", "-".to_string(), "-".to_string(), message.clone())
                }
            };
            EvaluationRow {
                host: e.host.clone(),
                status: color_status(status),
                utilization,
                score,
                detail,
            }
        })
        .collect()
}

/// Run one placement cycle for a workload over `nodes` without binding it
pub async fn evaluate(
    pipeline: &AffinityPipeline,
    workload: &Workload,
    nodes: &[String],
    format: OutputFormat,
) -> Result<()> {
    let hosts: Vec<HostRef> = nodes.iter().map(HostRef::named).collect();
    let outcome = pipeline.run_cycle(workload, &hosts).await?;

    match format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Table => {
            print_heading("Placement Evaluation");
            println!("Workload: {}", workload.name.cyan());
            println!("Cycle:    {}", outcome.cycle);
            println!("Profile:  {}", outcome.profile.source());
            println!();
            print_table(peer_rows(&outcome.profile), "Empty profile; all admitted nodes score equally");
            println!();

            let limit = pipeline.config().thresholds.cpu_usage_limit;
            print_table(evaluation_rows(&outcome, limit), "No nodes evaluated");
            println!();
            match &outcome.selected {
                Some(host) => print_success(&format!("Selected node: {}", host.bold())),
                None => print_warning("No node admitted the workload"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use affinity_core::{
        AffinityProfile, HostEvaluation, HostScore, OccupantMatch, ProfileSource, Rejection,
    };
    use std::sync::Arc;

    #[test]
    fn test_evaluation_rows() {
        colored::control::set_override(false);
        let outcome = CycleOutcome {
            cycle: 7,
            workload: "frontend-1".to_string(),
            profile: Arc::new(AffinityProfile::empty(ProfileSource::NoTraffic)),
            evaluations: vec![
                HostEvaluation {
                    host: "node-a".to_string(),
                    outcome: HostOutcome::Scored {
                        utilization: Some(0.05),
                        score: HostScore {
                            host: "node-a".to_string(),
                            score: 50,
                            matches: vec![OccupantMatch {
                                occupant: "cart-1".to_string(),
                                service: "cartservice".to_string(),
                                weight: 50,
                            }],
                        },
                    },
                },
                HostEvaluation {
                    host: "node-b".to_string(),
                    outcome: HostOutcome::Rejected {
                        rejection: Rejection::Density {
                            occupants: 5,
                            ceiling: 5,
                        },
                    },
                },
            ],
            selected: Some("node-a".to_string()),
        };

        let rows = evaluation_rows(&outcome, 0.15);
        assert_eq!(rows[0].status, "scored");
        assert_eq!(rows[0].utilization, "5.0%");
        assert_eq!(rows[0].score, "50");
        assert_eq!(rows[0].detail, "cart-1 (50)");
        assert_eq!(rows[1].status, "rejected");
        assert!(rows[1].detail.contains("ceiling 5"));
    }
}
