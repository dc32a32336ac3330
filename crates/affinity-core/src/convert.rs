//! Conversions from Kubernetes API objects into pipeline models

use crate::models::{Occupant, Workload};
use k8s_openapi::api::core::v1::{Node, Pod};

/// Pod phases whose pods no longer occupy a node
const TERMINAL_PHASES: &[&str] = &["Succeeded", "Failed"];

/// The workload described by a pod awaiting placement
pub fn workload_from_pod(pod: &Pod) -> Workload {
    Workload {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        labels: pod.metadata.labels.clone().unwrap_or_default(),
    }
}

/// The occupant a running pod represents, `None` for finished pods
pub fn occupant_from_pod(pod: &Pod, identity_label: &str) -> Option<Occupant> {
    let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
    if phase.is_some_and(|p| TERMINAL_PHASES.contains(&p)) {
        return None;
    }

    let service = pod
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(identity_label))
        .map(String::as_str);

    Some(Occupant::new(
        pod.metadata.name.clone().unwrap_or_default(),
        pod.metadata.namespace.clone().unwrap_or_default(),
        service,
    ))
}

/// Address used to reach the node's exporter: the internal IP when the node
/// reports one, otherwise its first address
pub fn node_address(node: &Node) -> Option<String> {
    let addresses = node.status.as_ref()?.addresses.as_ref()?;
    addresses
        .iter()
        .find(|a| a.type_ == "InternalIP" && !a.address.is_empty())
        .or_else(|| addresses.iter().find(|a| !a.address.is_empty()))
        .map(|a| a.address.clone())
}
