//! Affinity scoring
//!
//! Ranks a candidate by how many of the workload's traffic peers already run
//! on it. All telemetry comes from the profile published in the cycle
//! state; scoring itself does no I/O.

use crate::config::PluginConfig;
use crate::cycle::CycleState;
use crate::error::ScoreError;
use crate::models::CandidateHost;
use crate::observability::PipelineMetrics;
use crate::profile::AffinityProfile;
use serde::Serialize;

/// Highest score a kube-scheduler extender may report
pub const MAX_EXTENDER_PRIORITY: i64 = 10;

/// An occupant whose service appears in the profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccupantMatch {
    pub occupant: String,
    pub service: String,
    pub weight: i64,
}

/// Score of one candidate with the contributing occupants
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostScore {
    pub host: String,
    pub score: i64,
    pub matches: Vec<OccupantMatch>,
}

pub struct AffinityScorer {
    tenant_namespace: String,
    pipeline_metrics: PipelineMetrics,
}

impl AffinityScorer {
    pub fn new(config: &PluginConfig) -> Self {
        Self {
            tenant_namespace: config.tenant_namespace.clone(),
            pipeline_metrics: PipelineMetrics::new(),
        }
    }

    /// Rank score of `host`; higher is better
    pub fn score(&self, state: &CycleState, host: &CandidateHost) -> Result<i64, ScoreError> {
        self.explain(state, host).map(|s| s.score)
    }

    /// Rank score of `host` with its breakdown
    pub fn explain(&self, state: &CycleState, host: &CandidateHost) -> Result<HostScore, ScoreError> {
        let profile = state.profile()?;
        let scored = self.score_with(&profile, host);
        self.pipeline_metrics.inc_candidates_scored();
        Ok(scored)
    }

    /// Sum the profile weights of the host's tenant occupants
    pub fn score_with(&self, profile: &AffinityProfile, host: &CandidateHost) -> HostScore {
        let matches: Vec<OccupantMatch> = host
            .tenant_occupants(&self.tenant_namespace)
            .filter_map(|occupant| {
                let service = occupant.service.as_deref()?;
                let weight = profile.weight(service)?;
                Some(OccupantMatch {
                    occupant: occupant.name.clone(),
                    service: service.to_string(),
                    weight,
                })
            })
            .collect();

        HostScore {
            host: host.name.clone(),
            score: matches.iter().map(|m| m.weight).sum(),
            matches,
        }
    }
}

/// Map raw scores onto `0..=max_priority`
///
/// The highest positive score maps to `max_priority` and the rest scale
/// proportionally. Non-positive scores map to 0, so when nothing scored
/// above zero every host is equal.
pub fn normalize_scores(scores: &[i64], max_priority: i64) -> Vec<i64> {
    let highest = scores.iter().copied().max().unwrap_or(0);
    if highest <= 0 {
        return vec![0; scores.len()];
    }
    scores
        .iter()
        .map(|&s| if s <= 0 { 0 } else { s * max_priority / highest })
        .collect()
}
