//! Cluster introspection
//!
//! The single seam through which the pipeline learns which workloads occupy
//! a host and where the host's telemetry lives. The occupant list is read
//! once per candidate per cycle and shared by the filter and the scorer.

use crate::convert::{node_address, occupant_from_pod};
use crate::error::ClusterError;
use crate::models::Occupant;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

#[async_trait]
pub trait ClusterView: Send + Sync {
    /// Workloads currently placed on `host`, across all namespaces
    async fn occupants(&self, host: &str) -> Result<Vec<Occupant>, ClusterError>;

    /// Address of `host` for telemetry lookups
    async fn node_address(&self, host: &str) -> Result<String, ClusterError>;
}

/// Cluster view backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    identity_label: String,
}

impl KubeCluster {
    pub fn new(client: Client, identity_label: impl Into<String>) -> Self {
        Self {
            client,
            identity_label: identity_label.into(),
        }
    }

    /// Connect using in-cluster credentials or the default kubeconfig
    pub async fn try_default(identity_label: impl Into<String>) -> Result<Self, ClusterError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client, identity_label))
    }

    /// Connect using an explicit kubeconfig file
    pub async fn from_kubeconfig(
        path: &Path,
        identity_label: impl Into<String>,
    ) -> Result<Self, ClusterError> {
        let kubeconfig =
            Kubeconfig::read_from(path).map_err(|e| ClusterError::KubeConfig(e.to_string()))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| ClusterError::KubeConfig(e.to_string()))?;
        let client = Client::try_from(config)?;
        Ok(Self::new(client, identity_label))
    }
}

#[async_trait]
impl ClusterView for KubeCluster {
    async fn occupants(&self, host: &str) -> Result<Vec<Occupant>, ClusterError> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("spec.nodeName={host}"));
        let list = pods.list(&params).await?;

        let occupants: Vec<Occupant> = list
            .items
            .iter()
            .filter_map(|pod| occupant_from_pod(pod, &self.identity_label))
            .collect();
        debug!(host = %host, count = occupants.len(), "Listed host occupants");
        Ok(occupants)
    }

    async fn node_address(&self, host: &str) -> Result<String, ClusterError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node = nodes
            .get_opt(host)
            .await?
            .ok_or_else(|| ClusterError::UnknownNode(host.to_string()))?;
        node_address(&node).ok_or_else(|| ClusterError::NoAddress(host.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
struct StaticNode {
    address: Option<String>,
    occupants: Vec<Occupant>,
}

/// Fixed, in-memory cluster snapshot
#[derive(Debug, Clone, Default)]
pub struct StaticCluster {
    nodes: HashMap<String, StaticNode>,
}

impl StaticCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(
        mut self,
        name: impl Into<String>,
        address: impl Into<String>,
        occupants: Vec<Occupant>,
    ) -> Self {
        self.nodes.insert(
            name.into(),
            StaticNode {
                address: Some(address.into()),
                occupants,
            },
        );
        self
    }

    /// A node that reports no address
    pub fn with_unaddressed_node(mut self, name: impl Into<String>, occupants: Vec<Occupant>) -> Self {
        self.nodes.insert(
            name.into(),
            StaticNode {
                address: None,
                occupants,
            },
        );
        self
    }

    fn node(&self, host: &str) -> Result<&StaticNode, ClusterError> {
        self.nodes
            .get(host)
            .ok_or_else(|| ClusterError::UnknownNode(host.to_string()))
    }
}

#[async_trait]
impl ClusterView for StaticCluster {
    async fn occupants(&self, host: &str) -> Result<Vec<Occupant>, ClusterError> {
        Ok(self.node(host)?.occupants.clone())
    }

    async fn node_address(&self, host: &str) -> Result<String, ClusterError> {
        self.node(host)?
            .address
            .clone()
            .ok_or_else(|| ClusterError::NoAddress(host.to_string()))
    }
}
