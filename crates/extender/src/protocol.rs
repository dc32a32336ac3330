//! Wire types of the kube-scheduler HTTP extender protocol

use affinity_core::convert::node_address;
use affinity_core::HostRef;
use k8s_openapi::api::core::v1::{Node, Pod};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Candidate nodes as full objects; only `items` is read
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeList {
    #[serde(default)]
    pub items: Vec<Node>,
}

/// Request body of `/filter` and `/prioritize`
///
/// The scheduler sends either node objects or node names, depending on
/// whether the extender is configured as node-cache capable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtenderArgs {
    pub pod: Pod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<NodeList>,
    #[serde(default, rename = "nodenames", skip_serializing_if = "Option::is_none")]
    pub node_names: Option<Vec<String>>,
}

impl ExtenderArgs {
    /// The candidates in request order; node objects take precedence over names
    pub fn hosts(&self) -> Vec<HostRef> {
        match (&self.nodes, &self.node_names) {
            (Some(list), _) => list
                .items
                .iter()
                .map(|node| {
                    let name = node.metadata.name.clone().unwrap_or_default();
                    match node_address(node) {
                        Some(address) => HostRef::with_address(name, address),
                        None => HostRef::named(name),
                    }
                })
                .collect(),
            (None, Some(names)) => names.iter().map(HostRef::named).collect(),
            (None, None) => Vec::new(),
        }
    }
}

/// Response body of `/filter`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtenderFilterResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<NodeList>,
    #[serde(rename = "nodenames", skip_serializing_if = "Option::is_none")]
    pub node_names: Option<Vec<String>>,
    /// Rejected nodes that may fit after preemption or once load drops
    #[serde(rename = "failedNodes", default)]
    pub failed_nodes: BTreeMap<String, String>,
    /// Nodes that could not be evaluated at all
    #[serde(rename = "failedAndUnresolvableNodes", default)]
    pub failed_and_unresolvable_nodes: BTreeMap<String, String>,
    #[serde(default)]
    pub error: String,
}

impl ExtenderFilterResult {
    /// Keep the admitted candidates in the shape the request used
    pub fn with_admitted(mut self, args: &ExtenderArgs, admitted: &[String]) -> Self {
        if let Some(list) = &args.nodes {
            let items = list
                .items
                .iter()
                .filter(|n| {
                    n.metadata
                        .name
                        .as_ref()
                        .is_some_and(|name| admitted.contains(name))
                })
                .cloned()
                .collect();
            self.nodes = Some(NodeList { items });
        } else {
            self.node_names = Some(admitted.to_vec());
        }
        self
    }
}

/// One entry of the `/prioritize` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPriority {
    pub host: String,
    pub score: i64,
}
