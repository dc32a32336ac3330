//! Traffic-affinity placement for Kubernetes workloads
//!
//! This crate provides the core functionality for:
//! - Building a workload's affinity profile from service-mesh traffic
//! - Admitting candidate nodes on live CPU utilization and tenant density
//! - Scoring admitted nodes by the traffic peers they already run
//! - Per-cycle state shared by concurrent filter and score calls
//! - Health checks and observability

pub mod cluster;
pub mod config;
pub mod convert;
pub mod cycle;
pub mod error;
pub mod filter;
pub mod health;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod profile;
pub mod score;

#[cfg(test)]
mod testing;

pub use cluster::{ClusterView, KubeCluster, StaticCluster};
pub use config::{MetricsConfig, PluginConfig, ProfileConfig, Thresholds, UtilizationConfig};
pub use cycle::CycleState;
pub use error::{
    CandidateError, ClusterError, ConfigError, CycleError, CycleStateError, FilterError,
    MetricsError, ProfileError, ScoreError,
};
pub use filter::{Admission, AdmissionFilter, Rejection};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use metrics::{MetricsQuery, PrometheusClient, Sample};
pub use models::*;
pub use observability::{PipelineMetrics, StructuredLogger};
pub use pipeline::{AffinityPipeline, CycleOutcome, HostEvaluation, HostOutcome};
pub use profile::{AffinityEntry, AffinityProfile, ProfileBuilder, ProfileSource};
pub use score::{normalize_scores, AffinityScorer, HostScore, OccupantMatch, MAX_EXTENDER_PRIORITY};
