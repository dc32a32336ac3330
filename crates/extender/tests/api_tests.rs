//! Integration tests for the extender HTTP routes

use affinity_core::{
    health::{components, HealthRegistry},
    AffinityPipeline, Occupant, PluginConfig, PrometheusClient, StaticCluster,
};
use affinity_extender::api::{create_router, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn vector_body(rows: &[(&str, &str, &str)]) -> String {
    let result: Vec<Value> = rows
        .iter()
        .map(|(label, service, value)| {
            let mut metric = serde_json::Map::new();
            metric.insert(label.to_string(), json!(service));
            json!({"metric": metric, "value": [1700000000.0, value]})
        })
        .collect();
    json!({"status": "success", "data": {"resultType": "vector", "result": result}}).to_string()
}

fn utilization_query(address: &str) -> String {
    format!("instance:node_cpu_utilisation:rate5m{{instance=\"{address}:9100\"}}")
}

async fn mock_query(server: &mut ServerGuard, query: &str, body: String) -> Mock {
    server
        .mock("GET", Matcher::Regex(r"^/api/v1/query".to_string()))
        .match_query(Matcher::UrlEncoded("query".into(), query.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

fn tenant(name: &str, service: &str) -> Occupant {
    Occupant::new(name, "saiki", Some(service))
}

fn cluster() -> StaticCluster {
    StaticCluster::new()
        .with_node("node-a", "10.0.0.1", vec![tenant("cart-1", "cartservice")])
        .with_node(
            "node-b",
            "10.0.0.2",
            vec![
                tenant("catalog-1", "productcatalog"),
                tenant("load-1", "loadgenerator"),
            ],
        )
        .with_node(
            "node-c",
            "10.0.0.3",
            (0..5).map(|i| tenant(&format!("web-{i}"), "web")).collect(),
        )
        .with_node("node-d", "10.0.0.4", vec![])
}

async fn setup_test_app(server: &ServerGuard) -> (Router, Arc<AppState>) {
    let mut config = PluginConfig::new();
    config.metrics.endpoint = server.url();

    let metrics = Arc::new(PrometheusClient::new(&config.metrics).unwrap());
    let pipeline = AffinityPipeline::new(config, metrics, Arc::new(cluster())).unwrap();

    let health_registry = HealthRegistry::new();
    health_registry.register(components::METRICS_BACKEND).await;
    health_registry.register(components::CLUSTER).await;

    let state = Arc::new(AppState::new(Arc::new(pipeline), health_registry));
    (create_router(Arc::clone(&state)), state)
}

fn extender_args(nodes: &[&str]) -> Value {
    json!({
        "pod": {
            "metadata": {
                "name": "frontend-5c7d",
                "namespace": "saiki",
                "labels": {"app": "frontend"}
            }
        },
        "nodenames": nodes
    })
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_filter_splits_admitted_rejected_and_failed() {
    let mut server = mockito::Server::new_async().await;
    let _a = mock_query(
        &mut server,
        &utilization_query("10.0.0.1"),
        vector_body(&[("instance", "10.0.0.1:9100", "0.05")]),
    )
    .await;
    let _b = mock_query(
        &mut server,
        &utilization_query("10.0.0.2"),
        vector_body(&[("instance", "10.0.0.2:9100", "0.90")]),
    )
    .await;
    let (app, _state) = setup_test_app(&server).await;

    // node-c is over the density ceiling, node-d has no mock and node-z is unknown
    let (status, body) = post(
        app,
        "/filter",
        extender_args(&["node-a", "node-b", "node-c", "node-d", "node-z"]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nodenames"], json!(["node-a"]));
    assert!(body["failedNodes"]["node-b"]
        .as_str()
        .unwrap()
        .contains("utilization"));
    assert!(body["failedNodes"]["node-c"].is_string());
    assert!(body["failedAndUnresolvableNodes"]["node-d"].is_string());
    assert!(body["failedAndUnresolvableNodes"]["node-z"].is_string());
    assert_eq!(body["error"], "");
}

#[tokio::test]
async fn test_filter_returns_node_objects_when_given_objects() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_query(&mut server, &utilization_query("10.9.0.1"), vector_body(&[])).await;
    let (app, _state) = setup_test_app(&server).await;

    // The address in the node object wins over the cluster view's
    let args = json!({
        "pod": {"metadata": {"name": "frontend-5c7d", "labels": {"app": "frontend"}}},
        "nodes": {"items": [{
            "metadata": {"name": "node-a"},
            "status": {"addresses": [{"type": "InternalIP", "address": "10.9.0.1"}]}
        }]}
    });
    let (status, body) = post(app, "/filter", args).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nodes"]["items"][0]["metadata"]["name"], "node-a");
    assert!(body.get("nodenames").is_none());
}

#[tokio::test]
async fn test_prioritize_ranks_by_colocated_peers() {
    let mut server = mockito::Server::new_async().await;
    let (app, state) = setup_test_app(&server).await;

    let correlation = state.pipeline.profile_builder().correlation_query("frontend");
    let _m = mock_query(
        &mut server,
        &correlation,
        vector_body(&[
            ("dst_service", "cartservice", "3.2"),
            ("dst_service", "productcatalog", "2.1"),
            ("app", "loadgenerator", "0.7"),
        ]),
    )
    .await;

    let (status, body) = post(app, "/prioritize", extender_args(&["node-a", "node-b", "node-d"])).await;

    assert_eq!(status, StatusCode::OK);
    // Raw scores 50, 70 and 0, normalized onto 0..=10
    assert_eq!(
        body,
        json!([
            {"host": "node-a", "score": 7},
            {"host": "node-b", "score": 10},
            {"host": "node-d", "score": 0}
        ])
    );
}

#[tokio::test]
async fn test_prioritize_without_identity_is_neutral() {
    let server = mockito::Server::new_async().await;
    let (app, _state) = setup_test_app(&server).await;

    let args = json!({
        "pod": {"metadata": {"name": "batch-1", "namespace": "saiki"}},
        "nodenames": ["node-a", "node-b"]
    });
    let (status, body) = post(app, "/prioritize", args).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{"host": "node-a", "score": 0}, {"host": "node-b", "score": 0}])
    );
}

#[tokio::test]
async fn test_prioritize_fails_when_profile_fails() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", Matcher::Regex(r"^/api/v1/query".to_string()))
        .with_status(503)
        .with_body("prometheus is restarting")
        .create_async()
        .await;
    let (app, _state) = setup_test_app(&server).await;

    let (status, body) = post(app, "/prioritize", extender_args(&["node-a"])).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("503"));
}

#[tokio::test]
async fn test_healthz_reflects_components() {
    let server = mockito::Server::new_async().await;
    let (app, state) = setup_test_app(&server).await;

    let (status, body) = get(app.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");

    state
        .health_registry
        .set_degraded(components::METRICS_BACKEND, "HTTP 503")
        .await;
    let (status, _) = get(app.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    state
        .health_registry
        .set_unhealthy(components::CLUSTER, "forbidden")
        .await;
    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_initialization() {
    let server = mockito::Server::new_async().await;
    let (app, state) = setup_test_app(&server).await;

    let (status, _) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.health_registry.set_ready(true).await;
    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    let readiness: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_pipeline_metrics() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_query(&mut server, &utilization_query("10.0.0.1"), vector_body(&[])).await;
    let (app, _state) = setup_test_app(&server).await;

    post(app.clone(), "/filter", extender_args(&["node-a"])).await;
    let (status, body) = get(app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("affinity_scheduler_filter_verdicts_total"));
    assert!(text.contains("affinity_scheduler_query_latency_seconds"));
}
