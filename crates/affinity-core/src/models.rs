//! Core data models for the placement pipeline

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A workload instance awaiting placement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
}

impl Workload {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Service identity carried under `label`; an empty value counts as absent
    pub fn service_identity(&self, label: &str) -> Option<&str> {
        self.labels
            .get(label)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// A workload already running on a candidate host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub name: String,
    pub namespace: String,
    pub service: Option<String>,
}

impl Occupant {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        service: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            service: service.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }
}

/// A host eligible to run the workload, with the occupant snapshot taken
/// for this cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateHost {
    pub name: String,
    /// Address used for live telemetry lookups
    pub address: String,
    pub occupants: Arc<[Occupant]>,
}

impl CandidateHost {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        occupants: impl Into<Arc<[Occupant]>>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            occupants: occupants.into(),
        }
    }

    /// Occupants belonging to `namespace`
    pub fn tenant_occupants<'a>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'a Occupant> {
        self.occupants
            .iter()
            .filter(move |o| o.namespace == namespace)
    }
}

/// A host as named by the scheduler, before its occupants are snapshotted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRef {
    pub name: String,
    /// Known address; resolved through the cluster view when absent
    pub address: Option<String>,
}

impl HostRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
        }
    }

    pub fn with_address(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: Some(address.into()),
        }
    }
}
