//! Affinity profile derivation
//!
//! Asks the metrics backend which peer services exchange the most traffic
//! with the workload's service and turns that ranking into integer weights.

use crate::config::{PluginConfig, ProfileConfig};
use crate::cycle::CycleState;
use crate::error::{MetricsError, ProfileError};
use crate::metrics::{escape_label_value, MetricsQuery, Sample};
use crate::models::Workload;
use crate::observability::PipelineMetrics;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a profile came to have the entries it has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSource {
    /// Built from traffic correlation results
    Correlated,
    /// The workload carries no service identity; no query was issued
    MissingIdentity,
    /// The query succeeded but returned no usable peers
    NoTraffic,
}

impl ProfileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileSource::Correlated => "correlated",
            ProfileSource::MissingIdentity => "missing_identity",
            ProfileSource::NoTraffic => "no_traffic",
        }
    }
}

impl std::fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked peer service and its weight
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffinityEntry {
    pub service: String,
    pub weight: i64,
}

impl AffinityEntry {
    pub fn new(service: impl Into<String>, weight: i64) -> Self {
        Self {
            service: service.into(),
            weight,
        }
    }
}

/// Ranked map of peer service to weight, in rank order
///
/// Weights are not guaranteed to be positive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffinityProfile {
    source: ProfileSource,
    entries: Vec<AffinityEntry>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl AffinityProfile {
    pub fn empty(source: ProfileSource) -> Self {
        Self {
            source,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build from ranked entries; a repeated service keeps its first rank
    pub fn from_entries(source: ProfileSource, entries: Vec<AffinityEntry>) -> Self {
        let mut kept = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());
        for entry in entries {
            if index.contains_key(&entry.service) {
                continue;
            }
            index.insert(entry.service.clone(), kept.len());
            kept.push(entry);
        }
        Self {
            source,
            entries: kept,
            index,
        }
    }

    pub fn source(&self) -> ProfileSource {
        self.source
    }

    pub fn entries(&self) -> &[AffinityEntry] {
        &self.entries
    }

    pub fn weight(&self, service: &str) -> Option<i64> {
        self.index.get(service).map(|&i| self.entries[i].weight)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(service, weight)` pairs in rank order, for logging
    pub fn pairs(&self) -> Vec<(String, i64)> {
        self.entries
            .iter()
            .map(|e| (e.service.clone(), e.weight))
            .collect()
    }
}

/// Builds a workload's affinity profile from traffic telemetry
pub struct ProfileBuilder {
    metrics: Arc<dyn MetricsQuery>,
    config: ProfileConfig,
    tenant_namespace: String,
    identity_label: String,
    pipeline_metrics: PipelineMetrics,
}

impl ProfileBuilder {
    pub fn new(metrics: Arc<dyn MetricsQuery>, config: &PluginConfig) -> Self {
        Self {
            metrics,
            config: config.profile.clone(),
            tenant_namespace: config.tenant_namespace.clone(),
            identity_label: config.identity_label.clone(),
            pipeline_metrics: PipelineMetrics::new(),
        }
    }

    /// The correlation query for `service`
    ///
    /// Combines the services `service` calls with the services calling it,
    /// each summed by the other side's label, and keeps the top K.
    pub fn correlation_query(&self, service: &str) -> String {
        let cfg = &self.config;
        let outbound = self.matchers(&cfg.peer_label, service, &cfg.fallback_label);
        let inbound = self.matchers(&cfg.fallback_label, service, &cfg.peer_label);
        format!(
            "topk({k}, sum(rate({metric}{{{outbound}}}[{window}])) by ({fallback}) \
             OR sum(rate({metric}{{{inbound}}}[{window}])) by ({peer}))",
            k = cfg.top_k,
            metric = cfg.traffic_metric,
            window = cfg.window,
            fallback = cfg.fallback_label,
            peer = cfg.peer_label,
        )
    }

    fn matchers(&self, own_label: &str, service: &str, other_label: &str) -> String {
        let mut matchers = vec![
            format!("{}=\"{}\"", own_label, escape_label_value(service)),
            format!("namespace=\"{}\"", escape_label_value(&self.tenant_namespace)),
        ];
        for excluded in &self.config.excluded_services {
            matchers.push(format!(
                "{}!=\"{}\"",
                other_label,
                escape_label_value(excluded)
            ));
        }
        matchers.push(format!("{}!=\"\"", other_label));
        matchers.join(", ")
    }

    /// Turn correlation rows into a profile
    ///
    /// Only the first `top_k` rows in backend order are considered. A row
    /// names its peer through the peer label, or the fallback label when the
    /// peer label is empty. Rows naming no peer, an excluded service or a
    /// peer already ranked are skipped without consuming a rank.
    pub fn rank(&self, samples: &[Sample]) -> AffinityProfile {
        let mut entries: Vec<AffinityEntry> = Vec::with_capacity(self.config.top_k);

        for sample in samples.iter().take(self.config.top_k) {
            let Some(peer) = sample
                .label(&self.config.peer_label)
                .or_else(|| sample.label(&self.config.fallback_label))
            else {
                debug!(labels = ?sample.labels, "Skipping correlation row without a peer service");
                continue;
            };

            if self.config.excluded_services.iter().any(|s| s == peer)
                || entries.iter().any(|e| e.service == peer)
            {
                continue;
            }

            let weight = self.config.weight_for_rank(entries.len());
            entries.push(AffinityEntry::new(peer, weight));
        }

        if entries.is_empty() {
            AffinityProfile::empty(ProfileSource::NoTraffic)
        } else {
            AffinityProfile::from_entries(ProfileSource::Correlated, entries)
        }
    }

    /// Derive the profile for `workload` without publishing it
    pub async fn build(&self, workload: &Workload) -> Result<AffinityProfile, MetricsError> {
        let Some(service) = workload.service_identity(&self.identity_label) else {
            info!(
                workload = %workload.name,
                label = %self.identity_label,
                "Workload has no service identity, using an empty affinity profile"
            );
            return Ok(AffinityProfile::empty(ProfileSource::MissingIdentity));
        };

        let query = self.correlation_query(service);
        debug!(workload = %workload.name, query = %query, "Running correlation query");

        let samples = self.metrics.query(&query).await?;
        let profile = self.rank(&samples);

        if profile.is_empty() {
            warn!(
                workload = %workload.name,
                service = %service,
                rows = samples.len(),
                "No correlated peers found, all candidates will score equally"
            );
        }
        Ok(profile)
    }

    /// Derive the profile for `workload` and publish it to `state`
    pub async fn run(
        &self,
        state: &CycleState,
        workload: &Workload,
    ) -> Result<Arc<AffinityProfile>, ProfileError> {
        let profile = self.build(workload).await?;
        self.pipeline_metrics
            .inc_profiles_built(profile.source().as_str());
        Ok(state.publish(profile)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CycleStateError;
    use crate::testing::{sample, FakeMetrics};

    fn builder(metrics: Arc<FakeMetrics>) -> ProfileBuilder {
        ProfileBuilder::new(metrics, &PluginConfig::new())
    }

    fn frontend() -> Workload {
        Workload::new("frontend-5c7d", "saiki").with_label("app", "frontend")
    }

    #[test]
    fn test_correlation_query_shape() {
        let b = builder(Arc::new(FakeMetrics::new()));
        let query = b.correlation_query("frontend");

        assert!(query.starts_with("topk(5, sum(rate(request_total{app=\"frontend\", namespace=\"saiki\""));
        assert!(query.contains("dst_service!=\"jaeger\""));
        assert!(query.contains("dst_service!=\"\"}[60m])) by (dst_service)"));
        assert!(query.contains(" OR sum(rate(request_total{dst_service=\"frontend\", namespace=\"saiki\""));
        assert!(query.contains("app!=\"otelcollector\""));
        assert!(query.ends_with("app!=\"\"}[60m])) by (app))"));
    }

    #[test]
    fn test_correlation_query_escapes_identity() {
        let b = builder(Arc::new(FakeMetrics::new()));
        let query = b.correlation_query("odd\"name");
        assert!(query.contains("app=\"odd\\\"name\""));
    }

    #[test]
    fn test_rank_fewer_than_k_rows() {
        let b = builder(Arc::new(FakeMetrics::new()));
        let rows = vec![
            sample(&[("dst_service", "cartservice")], 9.0),
            sample(&[("app", "checkoutservice")], 4.0),
            sample(&[("dst_service", "currencyservice")], 1.0),
        ];

        let profile = b.rank(&rows);
        assert_eq!(profile.source(), ProfileSource::Correlated);
        assert_eq!(
            profile.pairs(),
            vec![
                ("cartservice".to_string(), 50),
                ("checkoutservice".to_string(), 40),
                ("currencyservice".to_string(), 30),
            ]
        );
    }

    #[test]
    fn test_rank_keeps_only_first_five() {
        let b = builder(Arc::new(FakeMetrics::new()));
        let rows: Vec<Sample> = (0..8)
            .map(|i| sample(&[("app", format!("svc-{i}").as_str())], 1.0))
            .collect();

        let profile = b.rank(&rows);
        assert_eq!(profile.len(), 5);
        let weights: Vec<i64> = profile.entries().iter().map(|e| e.weight).collect();
        assert_eq!(weights, vec![50, 40, 30, 20, 10]);
        assert_eq!(profile.weight("svc-4"), Some(10));
        assert_eq!(profile.weight("svc-5"), None);
    }

    #[test]
    fn test_rank_never_reads_past_first_five_rows() {
        let b = builder(Arc::new(FakeMetrics::new()));
        let rows = vec![
            sample(&[("instance", "10.0.0.1")], 9.0),
            sample(&[("app", "a")], 8.0),
            sample(&[("app", "b")], 7.0),
            sample(&[("app", "c")], 6.0),
            sample(&[("app", "d")], 5.0),
            sample(&[("app", "sixth")], 4.0),
        ];

        let profile = b.rank(&rows);
        assert_eq!(
            profile.pairs(),
            vec![
                ("a".to_string(), 50),
                ("b".to_string(), 40),
                ("c".to_string(), 30),
                ("d".to_string(), 20),
            ]
        );
        assert_eq!(profile.weight("sixth"), None);
    }

    #[test]
    fn test_rank_keeps_backend_order_for_ties() {
        let b = builder(Arc::new(FakeMetrics::new()));
        let rows = vec![
            sample(&[("app", "zeta")], 2.0),
            sample(&[("app", "alpha")], 2.0),
        ];

        let profile = b.rank(&rows);
        assert_eq!(profile.weight("zeta"), Some(50));
        assert_eq!(profile.weight("alpha"), Some(40));
    }

    #[test]
    fn test_rank_falls_back_to_destination_label() {
        let b = builder(Arc::new(FakeMetrics::new()));
        let rows = vec![
            sample(&[("app", ""), ("dst_service", "adservice")], 3.0),
            sample(&[("app", ""), ("dst_service", "")], 2.0),
            sample(&[("instance", "10.0.0.1")], 1.0),
            sample(&[("app", "emailservice")], 0.5),
        ];

        let profile = b.rank(&rows);
        assert_eq!(
            profile.pairs(),
            vec![("adservice".to_string(), 50), ("emailservice".to_string(), 40)]
        );
    }

    #[test]
    fn test_rank_skips_duplicates_and_excluded() {
        let b = builder(Arc::new(FakeMetrics::new()));
        let rows = vec![
            sample(&[("dst_service", "cartservice")], 5.0),
            sample(&[("app", "cartservice")], 4.0),
            sample(&[("app", "jaeger")], 3.0),
            sample(&[("app", "shippingservice")], 2.0),
        ];

        let profile = b.rank(&rows);
        assert_eq!(
            profile.pairs(),
            vec![("cartservice".to_string(), 50), ("shippingservice".to_string(), 40)]
        );
    }

    #[test]
    fn test_rank_empty_result() {
        let b = builder(Arc::new(FakeMetrics::new()));
        let profile = b.rank(&[]);
        assert!(profile.is_empty());
        assert_eq!(profile.source(), ProfileSource::NoTraffic);
    }

    #[tokio::test]
    async fn test_build_queries_backend() {
        let metrics = Arc::new(FakeMetrics::new().respond(
            "topk(",
            vec![
                sample(&[("dst_service", "cartservice")], 2.0),
                sample(&[("app", "loadgenerator")], 1.0),
            ],
        ));
        let b = builder(Arc::clone(&metrics));

        let profile = b.build(&frontend()).await.unwrap();
        assert_eq!(profile.weight("cartservice"), Some(50));
        assert_eq!(profile.weight("loadgenerator"), Some(40));
        assert_eq!(metrics.calls(), 1);
    }

    #[tokio::test]
    async fn test_build_without_identity_skips_query() {
        let metrics = Arc::new(FakeMetrics::new());
        let b = builder(Arc::clone(&metrics));

        let profile = b.build(&Workload::new("batch-job", "saiki")).await.unwrap();
        assert!(profile.is_empty());
        assert_eq!(profile.source(), ProfileSource::MissingIdentity);
        assert_eq!(metrics.calls(), 0);
    }

    #[tokio::test]
    async fn test_build_propagates_metrics_failure() {
        let metrics = Arc::new(FakeMetrics::new().fail_with_status("topk(", 502));
        let b = builder(metrics);

        let err = b.build(&frontend()).await.unwrap_err();
        assert!(matches!(err, MetricsError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_run_publishes_to_cycle_state() {
        let metrics = Arc::new(
            FakeMetrics::new().respond("topk(", vec![sample(&[("app", "cartservice")], 1.0)]),
        );
        let b = builder(metrics);
        let state = CycleState::new("frontend-5c7d");

        let published = b.run(&state, &frontend()).await.unwrap();
        assert_eq!(published.weight("cartservice"), Some(50));
        assert_eq!(state.profile().unwrap(), published);

        // A cycle's profile is written once
        let err = b.run(&state, &frontend()).await.unwrap_err();
        assert!(matches!(
            err,
            ProfileError::State(CycleStateError::AlreadyPublished(_))
        ));
    }

    #[test]
    fn test_profile_from_entries_keeps_first_duplicate() {
        let profile = AffinityProfile::from_entries(
            ProfileSource::Correlated,
            vec![
                AffinityEntry::new("a", 50),
                AffinityEntry::new("b", 40),
                AffinityEntry::new("a", 30),
            ],
        );
        assert_eq!(profile.len(), 2);
        assert_eq!(profile.weight("a"), Some(50));
    }
}
