//! Admission filter
//!
//! Turns away candidates that are currently overloaded or already hold too
//! many of the tenant's workloads. Both kinds of rejection are resolvable:
//! the host is unsuitable now, not broken, and may be retried later.
//! A failed telemetry query is a hard error instead, because the filter has
//! no data to decide on.

use crate::config::{PluginConfig, Thresholds, UtilizationConfig};
use crate::error::FilterError;
use crate::metrics::{escape_label_value, MetricsQuery};
use crate::models::CandidateHost;
use crate::observability::PipelineMetrics;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a candidate was turned away
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    /// Live CPU utilization above the limit
    Utilization { observed: f64, limit: f64 },
    /// Tenant occupant count at or above the ceiling
    Density { occupants: usize, ceiling: usize },
}

impl Rejection {
    /// Rejections clear once load moves off the host
    pub fn is_resolvable(&self) -> bool {
        true
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::Utilization { .. } => "utilization",
            Rejection::Density { .. } => "density",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Utilization { observed, limit } => {
                write!(f, "CPU utilization {observed:.4} exceeds limit {limit:.4}")
            }
            Rejection::Density { occupants, ceiling } => {
                write!(f, "{occupants} tenant occupants reach ceiling {ceiling}")
            }
        }
    }
}

/// Filter verdict for one candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Admission {
    /// Both checks passed; `utilization` is absent when the backend had no sample
    Admitted { utilization: Option<f64> },
    Rejected(Rejection),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

pub struct AdmissionFilter {
    metrics: Arc<dyn MetricsQuery>,
    thresholds: Thresholds,
    tenant_namespace: String,
    utilization: UtilizationConfig,
    pipeline_metrics: PipelineMetrics,
}

impl AdmissionFilter {
    pub fn new(metrics: Arc<dyn MetricsQuery>, config: &PluginConfig) -> Self {
        Self {
            metrics,
            thresholds: config.thresholds,
            tenant_namespace: config.tenant_namespace.clone(),
            utilization: config.utilization.clone(),
            pipeline_metrics: PipelineMetrics::new(),
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Query for the CPU utilization of the node exporter at `address`
    pub fn utilization_query(&self, address: &str) -> String {
        let host = if address.contains(':') && !address.starts_with('[') {
            format!("[{address}]")
        } else {
            address.to_string()
        };
        let instance = format!("{}:{}", host, self.utilization.exporter_port);
        format!(
            "{}{{instance=\"{}\"}}",
            self.utilization.metric,
            escape_label_value(&instance)
        )
    }

    /// Occupant density check; no I/O
    pub fn check_density(&self, host: &CandidateHost) -> Option<Rejection> {
        let occupants = host.tenant_occupants(&self.tenant_namespace).count();
        let ceiling = self.thresholds.max_tenant_occupants;
        (occupants >= ceiling).then_some(Rejection::Density { occupants, ceiling })
    }

    /// Live utilization of `host`, `None` when the backend has no usable sample
    pub async fn current_utilization(&self, host: &CandidateHost) -> Result<Option<f64>, FilterError> {
        let query = self.utilization_query(&host.address);
        let samples = self
            .metrics
            .query(&query)
            .await
            .map_err(|source| FilterError::Utilization {
                host: host.name.clone(),
                source,
            })?;

        match samples.first().map(|s| s.value) {
            Some(value) if !value.is_finite() => {
                warn!(host = %host.name, value = %value, "Ignoring non-finite utilization sample");
                Ok(None)
            }
            value => Ok(value),
        }
    }

    /// Evaluate one candidate
    ///
    /// The density check runs first; when it rejects, no query is issued.
    pub async fn filter(&self, host: &CandidateHost) -> Result<Admission, FilterError> {
        let verdict = self.evaluate(host).await;
        let label = match &verdict {
            Ok(Admission::Admitted { .. }) => "admitted",
            Ok(Admission::Rejected(r)) => r.kind(),
            Err(_) => "error",
        };
        self.pipeline_metrics.inc_filter_verdict(label);
        verdict
    }

    async fn evaluate(&self, host: &CandidateHost) -> Result<Admission, FilterError> {
        if let Some(rejection) = self.check_density(host) {
            return Ok(Admission::Rejected(rejection));
        }

        let limit = self.thresholds.cpu_usage_limit;
        match self.current_utilization(host).await? {
            Some(observed) if observed > limit => {
                Ok(Admission::Rejected(Rejection::Utilization { observed, limit }))
            }
            Some(observed) => {
                debug!(host = %host.name, utilization = observed, limit = limit, "Utilization within limit");
                Ok(Admission::Admitted {
                    utilization: Some(observed),
                })
            }
            None => {
                info!(host = %host.name, address = %host.address, "No utilization sample for host");
                Ok(Admission::Admitted { utilization: None })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetricsError;
    use crate::models::Occupant;
    use crate::testing::FakeMetrics;

    const NODE_QUERY: &str = "instance:node_cpu_utilisation:rate5m{instance=\"10.0.0.1:9100\"}";

    fn host_with(occupants: Vec<Occupant>) -> CandidateHost {
        CandidateHost::new("node-a", "10.0.0.1", occupants)
    }

    fn tenants(n: usize) -> Vec<Occupant> {
        (0..n)
            .map(|i| Occupant::new(format!("pod-{i}"), "saiki", Some("frontend")))
            .collect()
    }

    fn filter_with(metrics: FakeMetrics) -> AdmissionFilter {
        AdmissionFilter::new(Arc::new(metrics), &PluginConfig::new())
    }

    #[test]
    fn test_utilization_query() {
        let f = filter_with(FakeMetrics::new());
        assert_eq!(f.utilization_query("10.0.0.1"), NODE_QUERY);
        assert_eq!(
            f.utilization_query("fd00::1"),
            "instance:node_cpu_utilisation:rate5m{instance=\"[fd00::1]:9100\"}"
        );
    }

    #[tokio::test]
    async fn test_utilization_above_limit_rejects() {
        let f = filter_with(FakeMetrics::new().respond_value(NODE_QUERY, 0.1501));
        let verdict = f.filter(&host_with(vec![])).await.unwrap();

        match verdict {
            Admission::Rejected(rejection) => {
                assert_eq!(
                    rejection,
                    Rejection::Utilization {
                        observed: 0.1501,
                        limit: 0.15
                    }
                );
                assert!(rejection.is_resolvable());
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_utilization_equal_to_limit_passes() {
        let f = filter_with(FakeMetrics::new().respond_value(NODE_QUERY, 0.15));
        let verdict = f.filter(&host_with(vec![])).await.unwrap();
        assert_eq!(verdict, Admission::Admitted { utilization: Some(0.15) });
    }

    #[tokio::test]
    async fn test_no_utilization_sample_passes() {
        let f = filter_with(FakeMetrics::new());
        let verdict = f.filter(&host_with(vec![])).await.unwrap();
        assert_eq!(verdict, Admission::Admitted { utilization: None });
    }

    #[tokio::test]
    async fn test_non_finite_utilization_counts_as_no_sample() {
        for value in [f64::NAN, f64::INFINITY] {
            let f = filter_with(FakeMetrics::new().respond_value(NODE_QUERY, value));
            let verdict = f.filter(&host_with(vec![])).await.unwrap();
            assert_eq!(verdict, Admission::Admitted { utilization: None });
        }
    }

    #[tokio::test]
    async fn test_density_at_ceiling_rejects() {
        let metrics = Arc::new(FakeMetrics::new().respond_value(NODE_QUERY, 0.01));
        let f = AdmissionFilter::new(metrics.clone(), &PluginConfig::new());

        let verdict = f.filter(&host_with(tenants(5))).await.unwrap();
        assert_eq!(
            verdict,
            Admission::Rejected(Rejection::Density {
                occupants: 5,
                ceiling: 5
            })
        );
        // Density rejection short-circuits the live query
        assert_eq!(metrics.calls(), 0);
    }

    #[tokio::test]
    async fn test_density_below_ceiling_passes() {
        let f = filter_with(FakeMetrics::new().respond_value(NODE_QUERY, 0.01));
        let verdict = f.filter(&host_with(tenants(4))).await.unwrap();
        assert!(verdict.is_admitted());
    }

    #[tokio::test]
    async fn test_density_ignores_other_namespaces() {
        let mut occupants = tenants(4);
        occupants.extend(
            (0..10).map(|i| Occupant::new(format!("sys-{i}"), "kube-system", Some("kube-proxy"))),
        );
        let f = filter_with(FakeMetrics::new().respond_value(NODE_QUERY, 0.01));

        assert!(f.filter(&host_with(occupants)).await.unwrap().is_admitted());
    }

    #[tokio::test]
    async fn test_query_failure_is_hard_error() {
        let f = filter_with(FakeMetrics::new().fail_with_status(NODE_QUERY, 500));
        let err = f.filter(&host_with(vec![])).await.unwrap_err();

        let FilterError::Utilization { host, source } = err;
        assert_eq!(host, "node-a");
        assert!(matches!(source, MetricsError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_non_numeric_sample_is_hard_error() {
        let f = filter_with(FakeMetrics::new().fail_with_invalid_sample(NODE_QUERY, "\"n/a\""));
        let err = f.filter(&host_with(vec![])).await.unwrap_err();

        let FilterError::Utilization { source, .. } = err;
        assert!(matches!(source, MetricsError::InvalidSample { .. }));
    }

    #[test]
    fn test_custom_thresholds() {
        let config = PluginConfig::with_thresholds(Thresholds {
            cpu_usage_limit: 0.8,
            max_tenant_occupants: 2,
        });
        let f = AdmissionFilter::new(Arc::new(FakeMetrics::new()), &config);

        assert!(f.check_density(&host_with(tenants(1))).is_none());
        assert!(f.check_density(&host_with(tenants(2))).is_some());
    }

    #[test]
    fn test_rejection_display() {
        let r = Rejection::Density {
            occupants: 6,
            ceiling: 5,
        };
        assert_eq!(r.to_string(), "6 tenant occupants reach ceiling 5");
        assert_eq!(r.kind(), "density");
    }
}
