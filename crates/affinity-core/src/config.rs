//! Plugin configuration
//!
//! Everything here is resolved once when the pipeline is constructed and
//! never re-read afterwards. Loading from the environment or files is the
//! job of the binaries; this module only holds and validates values.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Upper bound on the number of ranked peers in an affinity profile
pub const MAX_TOP_K: usize = 5;

/// Default CPU utilization fraction above which a node is rejected
pub const DEFAULT_CPU_USAGE_LIMIT: f64 = 0.15;

/// Default occupant count in the tenant namespace at which a node is rejected
pub const DEFAULT_MAX_TENANT_OCCUPANTS: usize = 5;

pub const DEFAULT_TENANT_NAMESPACE: &str = "saiki";
pub const DEFAULT_IDENTITY_LABEL: &str = "app";
pub const DEFAULT_PROMETHEUS_URL: &str =
    "http://prometheus-kube-prometheus-prometheus.monitoring.svc.cluster.local:9090";
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Admission thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Utilization fraction; strictly greater values are rejected
    pub cpu_usage_limit: f64,
    /// Occupant ceiling; counts at or above are rejected
    pub max_tenant_occupants: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_usage_limit: DEFAULT_CPU_USAGE_LIMIT,
            max_tenant_occupants: DEFAULT_MAX_TENANT_OCCUPANTS,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.cpu_usage_limit.is_finite() || self.cpu_usage_limit < 0.0 {
            return Err(ConfigError::CpuUsageLimit(self.cpu_usage_limit));
        }
        if self.max_tenant_occupants == 0 {
            return Err(ConfigError::MaxTenantOccupants);
        }
        Ok(())
    }
}

/// Settings for the traffic-correlation query and weight assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Request counter the correlation is computed over
    pub traffic_metric: String,
    /// Label naming the calling service on the traffic metric
    pub peer_label: String,
    /// Label naming the called service, used when the peer label is empty
    pub fallback_label: String,
    /// PromQL range for the rate window
    pub window: String,
    pub top_k: usize,
    pub base_weight: i64,
    pub weight_step: i64,
    /// Infrastructure services that never count as peers
    pub excluded_services: Vec<String>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            traffic_metric: "request_total".to_string(),
            peer_label: "app".to_string(),
            fallback_label: "dst_service".to_string(),
            window: "60m".to_string(),
            top_k: MAX_TOP_K,
            base_weight: 50,
            weight_step: 10,
            excluded_services: vec![
                "redis-cart".to_string(),
                "otel-collector-collector".to_string(),
                "otelcollector".to_string(),
                "jaeger".to_string(),
                "prometheus-kube-prometheus-prometheus".to_string(),
            ],
        }
    }
}

impl ProfileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 || self.top_k > MAX_TOP_K {
            return Err(ConfigError::TopK {
                got: self.top_k,
                max: MAX_TOP_K,
            });
        }
        for (field, value) in [
            ("traffic_metric", &self.traffic_metric),
            ("peer_label", &self.peer_label),
            ("fallback_label", &self.fallback_label),
            ("window", &self.window),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty { field });
            }
        }
        Ok(())
    }

    /// Weight assigned to the peer at `rank` (0-indexed)
    pub fn weight_for_rank(&self, rank: usize) -> i64 {
        self.base_weight - self.weight_step * rank as i64
    }
}

/// Settings for the live node utilization query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationConfig {
    /// Recording rule holding per-node CPU utilization as a fraction
    pub metric: String,
    /// Port the node exporter listens on, appended to the node address
    pub exporter_port: u16,
}

impl Default for UtilizationConfig {
    fn default() -> Self {
        Self {
            metric: "instance:node_cpu_utilisation:rate5m".to_string(),
            exporter_port: 9100,
        }
    }
}

/// Metrics backend connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_PROMETHEUS_URL.to_string(),
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

impl MetricsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::Timeout);
        }
        Url::parse(&self.endpoint).map_err(|_| ConfigError::Endpoint(self.endpoint.clone()))?;
        Ok(())
    }
}

/// Complete configuration for the placement pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// The tenant grouping density limits and scoring apply to
    pub tenant_namespace: String,
    /// Label carrying a workload's service identity
    pub identity_label: String,
    pub thresholds: Thresholds,
    pub profile: ProfileConfig,
    pub utilization: UtilizationConfig,
    pub metrics: MetricsConfig,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginConfig {
    /// Defaults with the given thresholds
    pub fn with_thresholds(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            ..Self::new()
        }
    }

    pub fn new() -> Self {
        Self {
            tenant_namespace: DEFAULT_TENANT_NAMESPACE.to_string(),
            identity_label: DEFAULT_IDENTITY_LABEL.to_string(),
            thresholds: Thresholds::default(),
            profile: ProfileConfig::default(),
            utilization: UtilizationConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tenant_namespace.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "tenant_namespace",
            });
        }
        if self.identity_label.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "identity_label",
            });
        }
        self.thresholds.validate()?;
        self.profile.validate()?;
        self.metrics.validate()
    }
}
