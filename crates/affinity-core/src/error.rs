//! Error types for the placement pipeline
//!
//! Hard errors live here. Policy rejections from the admission filter are
//! not errors; see [`crate::filter::Rejection`].

use thiserror::Error;

/// Errors raised while talking to the metrics backend
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid metrics endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("metrics query timed out after {timeout_secs}s")]
    Timeout {
        timeout_secs: u64,
        #[source]
        source: reqwest::Error,
    },

    #[error("metrics backend unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("metrics backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed metrics response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("metrics query rejected ({error_type}): {error}")]
    Query { error_type: String, error: String },

    #[error("sample value {value} is not a number")]
    InvalidSample { value: String },
}

/// Errors raised by cluster introspection
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("kubernetes client configuration error: {0}")]
    KubeConfig(String),

    #[error("node {0} not found")]
    UnknownNode(String),

    #[error("node {0} has no address")]
    NoAddress(String),
}

/// Errors raised while reading or writing per-cycle state
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CycleStateError {
    #[error("affinity profile for cycle {0} was already published")]
    AlreadyPublished(u64),

    #[error("affinity profile for cycle {0} has not been published")]
    NotPublished(u64),
}

/// Errors that abort the profile stage, and with it the whole cycle
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("correlation query failed: {0}")]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    State(#[from] CycleStateError),
}

/// Hard errors for a single candidate in the admission filter
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("utilization query for {host} failed: {source}")]
    Utilization {
        host: String,
        #[source]
        source: MetricsError,
    },
}

/// Hard errors for a single candidate in the affinity scorer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoreError {
    #[error(transparent)]
    State(#[from] CycleStateError),
}

/// Hard errors for one candidate in a cycle; other candidates are unaffected
#[derive(Debug, Error)]
pub enum CandidateError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Score(#[from] ScoreError),
}

/// Configuration validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("cpu usage limit must be a finite, non-negative fraction, got {0}")]
    CpuUsageLimit(f64),

    #[error("max tenant occupants must be at least 1")]
    MaxTenantOccupants,

    #[error("top-k must be between 1 and {max}, got {got}")]
    TopK { got: usize, max: usize },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("query timeout must be greater than zero")]
    Timeout,

    #[error("invalid metrics endpoint {0}")]
    Endpoint(String),
}

/// Errors that abort an entire placement cycle
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("affinity profile stage failed: {0}")]
    Profile(#[from] ProfileError),

    #[error("no candidate hosts supplied")]
    NoCandidates,
}
