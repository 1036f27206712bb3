//! Node resource accounting table
//!
//! Plain synchronous state owned by the tracker task. Nothing here is
//! shared: the task applies events one at a time and hands out copies.

use crate::models::{NodeResourceRecord, ResourceKind};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Resource quantities in cores and GiB
pub type ResourceAmounts = BTreeMap<ResourceKind, f64>;

#[derive(Debug, Default)]
struct TrackedNode {
    record: NodeResourceRecord,
    /// Requests added per pod, so deletes subtract exactly what was added
    pods: HashMap<String, ResourceAmounts>,
}

/// Result of applying a pod event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodChange {
    Applied,
    /// Pod already counted on this node (duplicate add)
    Duplicate,
    /// Pod was never counted (duplicate or unmatched delete)
    Unknown,
    /// Target node is not tracked
    NodeMissing,
}

#[derive(Debug, Default)]
pub struct ResourceTable {
    nodes: HashMap<String, TrackedNode>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a node; a node that is already tracked keeps its record
    pub fn add_node(&mut self, name: &str, allocatable: ResourceAmounts) -> bool {
        if self.nodes.contains_key(name) {
            debug!(node = %name, "Node already tracked");
            return false;
        }
        self.nodes.insert(
            name.to_string(),
            TrackedNode {
                record: NodeResourceRecord::new(name, allocatable),
                pods: HashMap::new(),
            },
        );
        true
    }

    /// Stop tracking a node and drop its record
    pub fn delete_node(&mut self, name: &str) -> bool {
        let removed = self.nodes.remove(name).is_some();
        if !removed {
            debug!(node = %name, "Delete for untracked node ignored");
        }
        removed
    }

    pub fn add_pod(&mut self, node: &str, pod_key: &str, requests: &ResourceAmounts) -> PodChange {
        let Some(tracked) = self.nodes.get_mut(node) else {
            warn!(node = %node, pod = %pod_key, "Pod scheduled on untracked node");
            return PodChange::NodeMissing;
        };
        if tracked.pods.contains_key(pod_key) {
            return PodChange::Duplicate;
        }

        for (resource, amount) in requests {
            *tracked.record.requested.entry(*resource).or_insert(0.0) += amount;
        }
        tracked.pods.insert(pod_key.to_string(), requests.clone());
        PodChange::Applied
    }

    pub fn delete_pod(&mut self, node: &str, pod_key: &str) -> PodChange {
        let Some(tracked) = self.nodes.get_mut(node) else {
            return PodChange::NodeMissing;
        };
        let Some(requests) = tracked.pods.remove(pod_key) else {
            return PodChange::Unknown;
        };

        for (resource, amount) in requests {
            let entry = tracked.record.requested.entry(resource).or_insert(0.0);
            *entry = (*entry - amount).max(0.0);
        }
        PodChange::Applied
    }

    pub fn get(&self, name: &str) -> Option<NodeResourceRecord> {
        self.nodes.get(name).map(|t| t.record.clone())
    }

    /// Copies of every record, sorted by node name
    pub fn snapshot(&self) -> Vec<NodeResourceRecord> {
        let mut records: Vec<_> = self.nodes.values().map(|t| t.record.clone()).collect();
        records.sort_by(|a, b| a.node_name.cmp(&b.node_name));
        records
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
