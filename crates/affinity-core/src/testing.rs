//! Test doubles shared by the unit tests

use crate::error::MetricsError;
use crate::metrics::{MetricsQuery, Sample};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Build a sample from label pairs
pub fn sample(labels: &[(&str, &str)], value: f64) -> Sample {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Sample::new(labels, value)
}

enum Reply {
    Samples(Vec<Sample>),
    Status(u16),
    InvalidSample(String),
}

/// In-memory metrics backend answering by query substring
///
/// The first rule whose pattern occurs in the query wins; unmatched queries
/// get an empty result.
pub struct FakeMetrics {
    rules: Vec<(String, Reply)>,
    calls: AtomicUsize,
}

impl FakeMetrics {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn respond(mut self, pattern: &str, samples: Vec<Sample>) -> Self {
        self.rules.push((pattern.to_string(), Reply::Samples(samples)));
        self
    }

    /// Shorthand for a single unlabeled value
    pub fn respond_value(self, pattern: &str, value: f64) -> Self {
        self.respond(pattern, vec![sample(&[], value)])
    }

    pub fn fail_with_status(mut self, pattern: &str, status: u16) -> Self {
        self.rules.push((pattern.to_string(), Reply::Status(status)));
        self
    }

    pub fn fail_with_invalid_sample(mut self, pattern: &str, raw: &str) -> Self {
        self.rules
            .push((pattern.to_string(), Reply::InvalidSample(raw.to_string())));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsQuery for FakeMetrics {
    async fn query(&self, expr: &str) -> Result<Vec<Sample>, MetricsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .rules
            .iter()
            .find(|(pattern, _)| expr.contains(pattern.as_str()))
            .map(|(_, reply)| reply);

        match reply {
            Some(Reply::Samples(samples)) => Ok(samples.clone()),
            Some(Reply::Status(status)) => Err(MetricsError::Status {
                status: *status,
                body: "fake backend failure".to_string(),
            }),
            Some(Reply::InvalidSample(raw)) => Err(MetricsError::InvalidSample { value: raw.clone() }),
            None => Ok(Vec::new()),
        }
    }
}
