//! kube-scheduler HTTP extender for traffic-affinity placement
//!
//! Serves the `filter` and `prioritize` extender verbs on top of
//! [`affinity_core::AffinityPipeline`], alongside health and metrics routes.

pub mod api;
pub mod config;
pub mod protocol;
