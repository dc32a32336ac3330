//! Placement cycle orchestration
//!
//! Wires the profile builder, admission filter and scorer to the metrics
//! backend and the cluster view, and drives them the way a host scheduler
//! does: the profile once per cycle, then every candidate concurrently
//! against the shared cycle state.

use crate::cluster::ClusterView;
use crate::config::PluginConfig;
use crate::cycle::CycleState;
use crate::error::{CandidateError, ConfigError, CycleError, ProfileError};
use crate::filter::{Admission, AdmissionFilter, Rejection};
use crate::metrics::MetricsQuery;
use crate::models::{CandidateHost, HostRef, Workload};
use crate::observability::StructuredLogger;
use crate::profile::{AffinityProfile, ProfileBuilder};
use crate::score::{AffinityScorer, HostScore};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

/// What happened to one candidate during a cycle
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HostOutcome {
    Scored {
        utilization: Option<f64>,
        #[serde(flatten)]
        score: HostScore,
    },
    Rejected {
        rejection: Rejection,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct HostEvaluation {
    pub host: String,
    pub outcome: HostOutcome,
}

impl HostEvaluation {
    pub fn score(&self) -> Option<i64> {
        match &self.outcome {
            HostOutcome::Scored { score, .. } => Some(score.score),
            _ => None,
        }
    }
}

/// Result of a complete placement cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub cycle: u64,
    pub workload: String,
    pub profile: Arc<AffinityProfile>,
    /// One entry per candidate, in the order the candidates were given
    pub evaluations: Vec<HostEvaluation>,
    /// Highest-scoring admitted host; ties go to the earlier candidate
    pub selected: Option<String>,
}

pub struct AffinityPipeline {
    config: PluginConfig,
    profile_builder: ProfileBuilder,
    filter: AdmissionFilter,
    scorer: AffinityScorer,
    cluster: Arc<dyn ClusterView>,
    logger: StructuredLogger,
}

impl AffinityPipeline {
    pub fn new(
        config: PluginConfig,
        metrics: Arc<dyn MetricsQuery>,
        cluster: Arc<dyn ClusterView>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            profile_builder: ProfileBuilder::new(Arc::clone(&metrics), &config),
            filter: AdmissionFilter::new(metrics, &config),
            scorer: AffinityScorer::new(&config),
            cluster,
            logger: StructuredLogger::new("affinity-pipeline"),
            config,
        })
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn profile_builder(&self) -> &ProfileBuilder {
        &self.profile_builder
    }

    pub fn filter(&self) -> &AdmissionFilter {
        &self.filter
    }

    pub fn scorer(&self) -> &AffinityScorer {
        &self.scorer
    }

    /// Resolve the host's address if needed and take its occupant snapshot
    pub async fn snapshot(&self, host: &HostRef) -> Result<CandidateHost, CandidateError> {
        let address = match &host.address {
            Some(address) => address.clone(),
            None => self.cluster.node_address(&host.name).await?,
        };
        let occupants = self.cluster.occupants(&host.name).await?;
        Ok(CandidateHost::new(host.name.clone(), address, occupants))
    }

    /// Build the workload's profile and publish it to `state`
    pub async fn build_profile(
        &self,
        state: &CycleState,
        workload: &Workload,
    ) -> Result<Arc<AffinityProfile>, ProfileError> {
        let profile = self.profile_builder.run(state, workload).await?;
        self.logger.log_profile_built(
            state.id(),
            &workload.name,
            workload.service_identity(&self.config.identity_label),
            profile.source().as_str(),
            &profile.pairs(),
        );
        Ok(profile)
    }

    /// Snapshot and filter one candidate
    pub async fn admit(
        &self,
        state: &CycleState,
        host: &HostRef,
    ) -> Result<(CandidateHost, Admission), CandidateError> {
        let result = self.admit_inner(host).await;
        match &result {
            Ok((_, Admission::Rejected(rejection))) => self.logger.log_rejection(
                state.id(),
                &host.name,
                &rejection.to_string(),
                rejection.is_resolvable(),
            ),
            Ok(_) => {}
            Err(e) => self
                .logger
                .log_candidate_error(state.id(), &host.name, &e.to_string()),
        }
        result
    }

    async fn admit_inner(&self, host: &HostRef) -> Result<(CandidateHost, Admission), CandidateError> {
        let candidate = self.snapshot(host).await?;
        let admission = self.filter.filter(&candidate).await?;
        Ok((candidate, admission))
    }

    /// Score an already snapshotted candidate against the published profile
    pub fn score(&self, state: &CycleState, candidate: &CandidateHost) -> Result<HostScore, CandidateError> {
        match self.scorer.explain(state, candidate) {
            Ok(scored) => {
                self.logger
                    .log_score(state.id(), &scored.host, scored.score, scored.matches.len());
                Ok(scored)
            }
            Err(e) => {
                self.logger
                    .log_candidate_error(state.id(), &candidate.name, &e.to_string());
                Err(e.into())
            }
        }
    }

    /// Snapshot and score one candidate
    pub async fn rank(&self, state: &CycleState, host: &HostRef) -> Result<HostScore, CandidateError> {
        let candidate = match self.snapshot(host).await {
            Ok(candidate) => candidate,
            Err(e) => {
                self.logger
                    .log_candidate_error(state.id(), &host.name, &e.to_string());
                return Err(e);
            }
        };
        self.score(state, &candidate)
    }

    /// Filter then, if admitted, score one candidate
    pub async fn evaluate(&self, state: &CycleState, host: &HostRef) -> HostEvaluation {
        let outcome = match self.admit(state, host).await {
            Ok((candidate, Admission::Admitted { utilization })) => {
                match self.score(state, &candidate) {
                    Ok(score) => HostOutcome::Scored { utilization, score },
                    Err(e) => HostOutcome::Error {
                        message: e.to_string(),
                    },
                }
            }
            Ok((_, Admission::Rejected(rejection))) => HostOutcome::Rejected { rejection },
            Err(e) => HostOutcome::Error {
                message: e.to_string(),
            },
        };

        HostEvaluation {
            host: host.name.clone(),
            outcome,
        }
    }

    /// Run one complete placement cycle for `workload` over `hosts`
    ///
    /// A profile failure aborts the cycle. Failures for individual hosts are
    /// recorded in their evaluation and do not affect the others.
    pub async fn run_cycle(
        &self,
        workload: &Workload,
        hosts: &[HostRef],
    ) -> Result<CycleOutcome, CycleError> {
        if hosts.is_empty() {
            return Err(CycleError::NoCandidates);
        }

        let state = CycleState::new(workload.name.clone());
        let profile = self.build_profile(&state, workload).await?;

        let evaluations = join_all(hosts.iter().map(|host| self.evaluate(&state, host))).await;
        let selected = select_host(&evaluations);

        Ok(CycleOutcome {
            cycle: state.id(),
            workload: workload.name.clone(),
            profile,
            evaluations,
            selected,
        })
    }
}

/// Highest score wins; on ties the earlier candidate is kept
pub fn select_host(evaluations: &[HostEvaluation]) -> Option<String> {
    let mut best: Option<(&HostEvaluation, i64)> = None;
    for evaluation in evaluations {
        if let Some(score) = evaluation.score() {
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((evaluation, score));
            }
        }
    }
    best.map(|(evaluation, _)| evaluation.host.clone())
}
