//! Metrics backend client
//!
//! Issues instant queries against a Prometheus-compatible HTTP API and
//! decodes the JSON envelope into typed samples. Every call is independent
//! and bounded by the configured timeout; nothing is retried.

use crate::config::MetricsConfig;
use crate::error::MetricsError;
use crate::observability::PipelineMetrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Path of the instant-query endpoint, relative to the backend base URL
const QUERY_PATH: &str = "api/v1/query";

/// One element of a query result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub timestamp: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(labels: BTreeMap<String, String>, value: f64) -> Self {
        Self {
            labels,
            timestamp: 0.0,
            value,
        }
    }

    /// Label value, treating empty strings as absent
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Anything that can evaluate a query expression
#[async_trait]
pub trait MetricsQuery: Send + Sync {
    /// Evaluate `expr` at the current instant; an empty result is not an error
    async fn query(&self, expr: &str) -> Result<Vec<Sample>, MetricsError>;
}

/// HTTP client for the Prometheus query API
#[derive(Clone)]
pub struct PrometheusClient {
    client: reqwest::Client,
    query_url: Url,
    timeout: Duration,
    metrics: PipelineMetrics,
}

impl PrometheusClient {
    pub fn new(config: &MetricsConfig) -> Result<Self, MetricsError> {
        let invalid = |reason: String| MetricsError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason,
        };

        let mut base = Url::parse(&config.endpoint).map_err(|e| invalid(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let query_url = base.join(QUERY_PATH).map_err(|e| invalid(e.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MetricsError::Transport)?;

        Ok(Self {
            client,
            query_url,
            timeout: config.timeout,
            metrics: PipelineMetrics::new(),
        })
    }

    pub fn query_url(&self) -> &Url {
        &self.query_url
    }

    async fn execute(&self, expr: &str) -> Result<Vec<Sample>, MetricsError> {
        debug!(query = %expr, url = %self.query_url, "Issuing metrics query");

        let response = self
            .client
            .get(self.query_url.clone())
            .query(&[("query", expr)])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            // Prometheus reports bad queries with a 4xx/5xx and an error envelope
            if let Ok(envelope) = serde_json::from_slice::<QueryEnvelope>(&body) {
                if let Some(err) = envelope.into_error() {
                    return Err(err);
                }
            }
            return Err(MetricsError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        parse_response(&body)
    }

    fn transport_error(&self, err: reqwest::Error) -> MetricsError {
        if err.is_timeout() {
            MetricsError::Timeout {
                timeout_secs: self.timeout.as_secs(),
                source: err,
            }
        } else {
            MetricsError::Transport(err)
        }
    }
}

#[async_trait]
impl MetricsQuery for PrometheusClient {
    async fn query(&self, expr: &str) -> Result<Vec<Sample>, MetricsError> {
        let started = Instant::now();
        let result = self.execute(expr).await;
        self.metrics
            .observe_query(started.elapsed().as_secs_f64(), result.is_ok());

        if let Err(e) = &result {
            warn!(query = %expr, error = %e, "Metrics query failed");
        }
        result
    }
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl QueryEnvelope {
    fn into_error(self) -> Option<MetricsError> {
        if self.status == "success" {
            return None;
        }
        Some(MetricsError::Query {
            error_type: self.error_type.unwrap_or_else(|| self.status.clone()),
            error: self.error.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawSample {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: (serde_json::Value, serde_json::Value),
}

/// Decode a query API response body into samples
///
/// `vector` and `scalar` results are supported. Sample values must be
/// strings holding a float, as the API encodes them.
pub fn parse_response(body: &[u8]) -> Result<Vec<Sample>, MetricsError> {
    let envelope: QueryEnvelope = serde_json::from_slice(body)?;
    if envelope.status != "success" {
        return Err(envelope.into_error().unwrap_or(MetricsError::Query {
            error_type: "unknown".to_string(),
            error: String::new(),
        }));
    }

    let Some(data) = envelope.data else {
        return Ok(Vec::new());
    };

    match data.result_type.as_str() {
        "vector" => {
            let raw: Vec<RawSample> = if data.result.is_null() {
                Vec::new()
            } else {
                serde_json::from_value(data.result)?
            };
            raw.into_iter()
                .map(|s| {
                    Ok(Sample {
                        timestamp: parse_timestamp(&s.value.0)?,
                        value: parse_value(&s.value.1)?,
                        labels: s.metric,
                    })
                })
                .collect()
        }
        "scalar" => {
            let (ts, value): (serde_json::Value, serde_json::Value) =
                serde_json::from_value(data.result)?;
            Ok(vec![Sample {
                labels: BTreeMap::new(),
                timestamp: parse_timestamp(&ts)?,
                value: parse_value(&value)?,
            }])
        }
        other => Err(MetricsError::Query {
            error_type: "unsupported_result".to_string(),
            error: format!("result type {other} is not an instant vector or scalar"),
        }),
    }
}

fn parse_timestamp(raw: &serde_json::Value) -> Result<f64, MetricsError> {
    raw.as_f64().ok_or_else(|| MetricsError::InvalidSample {
        value: raw.to_string(),
    })
}

fn parse_value(raw: &serde_json::Value) -> Result<f64, MetricsError> {
    raw.as_str()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .ok_or_else(|| MetricsError::InvalidSample {
            value: raw.to_string(),
        })
}

/// Escape a string for use inside a double-quoted PromQL label matcher
pub fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}
