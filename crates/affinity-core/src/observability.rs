//! Observability infrastructure for the placement pipeline
//!
//! Provides:
//! - Prometheus metrics (query latency, profile builds, filter verdicts, scores)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for metrics backend round trips (in seconds)
const QUERY_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    query_latency_seconds: Histogram,
    query_errors: IntCounter,
    profiles_built: IntCounterVec,
    filter_verdicts: IntCounterVec,
    candidates_scored: IntCounter,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            query_latency_seconds: register_histogram!(
                "affinity_scheduler_query_latency_seconds",
                "Round-trip time of metrics backend queries",
                QUERY_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register query_latency_seconds"),

            query_errors: register_int_counter!(
                "affinity_scheduler_query_errors_total",
                "Metrics backend queries that failed"
            )
            .expect("Failed to register query_errors"),

            profiles_built: register_int_counter_vec!(
                "affinity_scheduler_profiles_built_total",
                "Affinity profiles built, by how the profile was derived",
                &["source"]
            )
            .expect("Failed to register profiles_built"),

            filter_verdicts: register_int_counter_vec!(
                "affinity_scheduler_filter_verdicts_total",
                "Admission filter outcomes per candidate",
                &["verdict"]
            )
            .expect("Failed to register filter_verdicts"),

            candidates_scored: register_int_counter!(
                "affinity_scheduler_candidates_scored_total",
                "Candidates ranked by the affinity scorer"
            )
            .expect("Failed to register candidates_scored"),
        }
    }
}

/// Handle to the pipeline's Prometheus metrics
///
/// Clones share the same underlying global metrics.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record one metrics backend round trip
    pub fn observe_query(&self, duration_secs: f64, ok: bool) {
        self.inner().query_latency_seconds.observe(duration_secs);
        if !ok {
            self.inner().query_errors.inc();
        }
    }

    pub fn inc_profiles_built(&self, source: &str) {
        self.inner()
            .profiles_built
            .with_label_values(&[source])
            .inc();
    }

    /// `verdict` is one of admitted, utilization, density, error
    pub fn inc_filter_verdict(&self, verdict: &str) {
        self.inner()
            .filter_verdicts
            .with_label_values(&[verdict])
            .inc();
    }

    pub fn inc_candidates_scored(&self) {
        self.inner().candidates_scored.inc();
    }
}

/// Structured logger for placement events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a published affinity profile
    pub fn log_profile_built(
        &self,
        cycle: u64,
        workload: &str,
        service: Option<&str>,
        source: &str,
        entries: &[(String, i64)],
    ) {
        info!(
            event = "profile_built",
            instance = %self.instance,
            cycle = cycle,
            workload = %workload,
            service = ?service,
            source = %source,
            peers = ?entries,
            "Affinity profile built"
        );
    }

    /// Log a candidate turned away by the admission filter
    pub fn log_rejection(&self, cycle: u64, host: &str, reason: &str, resolvable: bool) {
        info!(
            event = "candidate_rejected",
            instance = %self.instance,
            cycle = cycle,
            host = %host,
            reason = %reason,
            resolvable = resolvable,
            "Candidate rejected"
        );
    }

    /// Log a candidate that could not be evaluated
    pub fn log_candidate_error(&self, cycle: u64, host: &str, error: &str) {
        warn!(
            event = "candidate_error",
            instance = %self.instance,
            cycle = cycle,
            host = %host,
            error = %error,
            "Candidate evaluation failed"
        );
    }

    pub fn log_score(&self, cycle: u64, host: &str, score: i64, matched: usize) {
        info!(
            event = "candidate_scored",
            instance = %self.instance,
            cycle = cycle,
            host = %host,
            score = score,
            matched_occupants = matched,
            "Candidate scored"
        );
    }

    pub fn log_startup(&self, version: &str, tenant_namespace: &str) {
        info!(
            event = "extender_started",
            instance = %self.instance,
            version = %version,
            tenant_namespace = %tenant_namespace,
            "Affinity extender started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "extender_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Affinity extender shutting down"
        );
    }
}
