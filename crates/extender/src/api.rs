//! HTTP API: extender verbs, health checks and Prometheus metrics

use crate::protocol::{ExtenderArgs, ExtenderFilterResult, HostPriority};
use affinity_core::{
    convert::workload_from_pod,
    health::{ComponentStatus, HealthRegistry},
    normalize_scores, Admission, AffinityPipeline, CycleState, MAX_EXTENDER_PRIORITY,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::future::join_all;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AffinityPipeline>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(pipeline: Arc<AffinityPipeline>, health_registry: HealthRegistry) -> Self {
        Self {
            pipeline,
            health_registry,
        }
    }
}

/// Error body returned with non-2xx extender responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

/// `POST /filter`: drop nodes the admission filter turns away
///
/// Only admission runs here; the profile is not needed to filter.
async fn filter(
    State(state): State<Arc<AppState>>,
    Json(args): Json<ExtenderArgs>,
) -> Json<ExtenderFilterResult> {
    let workload = workload_from_pod(&args.pod);
    let hosts = args.hosts();
    let cycle = CycleState::new(workload.name.clone());
    debug!(workload = %workload.name, candidates = hosts.len(), "Filter request");

    let verdicts = join_all(
        hosts
            .iter()
            .map(|host| state.pipeline.admit(&cycle, host)),
    )
    .await;

    let mut result = ExtenderFilterResult::default();
    let mut admitted = Vec::with_capacity(hosts.len());
    for (host, verdict) in hosts.iter().zip(verdicts) {
        match verdict {
            Ok((_, Admission::Admitted { .. })) => admitted.push(host.name.clone()),
            Ok((_, Admission::Rejected(rejection))) => {
                result
                    .failed_nodes
                    .insert(host.name.clone(), rejection.to_string());
            }
            Err(e) => {
                result
                    .failed_and_unresolvable_nodes
                    .insert(host.name.clone(), e.to_string());
            }
        }
    }

    Json(result.with_admitted(&args, &admitted))
}

/// `POST /prioritize`: rank nodes by co-located traffic peers
///
/// Nodes that cannot be scored get priority 0. A failed profile fails the
/// whole request.
async fn prioritize(
    State(state): State<Arc<AppState>>,
    Json(args): Json<ExtenderArgs>,
) -> Result<Json<Vec<HostPriority>>, ErrorResponse> {
    let workload = workload_from_pod(&args.pod);
    let hosts = args.hosts();
    let cycle = CycleState::new(workload.name.clone());

    state
        .pipeline
        .build_profile(&cycle, &workload)
        .await
        .map_err(|e| ErrorResponse {
            error: e.to_string(),
        })?;

    let ranked = join_all(hosts.iter().map(|host| state.pipeline.rank(&cycle, host))).await;
    let raw: Vec<i64> = ranked
        .iter()
        .map(|r| r.as_ref().map_or(0, |s| s.score))
        .collect();
    let normalized = normalize_scores(&raw, MAX_EXTENDER_PRIORITY);

    Ok(Json(
        hosts
            .into_iter()
            .zip(normalized)
            .map(|(host, score)| HostPriority {
                host: host.name,
                score,
            })
            .collect(),
    ))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return ErrorResponse {
            error: e.to_string(),
        }
        .into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/filter", post(filter))
        .route("/prioritize", post(prioritize))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server; returns when `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting extender server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
