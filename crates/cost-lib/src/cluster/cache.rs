//! Latest known cluster objects

use crate::schema::workload_types;
use dashmap::DashMap;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// A pod-owning workload reduced to what cost aggregation needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadRef {
    pub workload_type: &'static str,
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub match_labels: BTreeMap<String, String>,
}

impl WorkloadRef {
    fn from_parts(
        workload_type: &'static str,
        metadata: &ObjectMeta,
        selector: Option<&LabelSelector>,
    ) -> Self {
        Self {
            workload_type,
            namespace: metadata.namespace.clone().unwrap_or_default(),
            name: metadata.name.clone().unwrap_or_default(),
            labels: metadata.labels.clone().unwrap_or_default(),
            match_labels: selector
                .and_then(|s| s.match_labels.clone())
                .unwrap_or_default(),
        }
    }

    pub fn from_deployment(d: &Deployment) -> Self {
        Self::from_parts(
            workload_types::DEPLOYMENT,
            &d.metadata,
            d.spec.as_ref().map(|s| &s.selector),
        )
    }

    pub fn from_statefulset(s: &StatefulSet) -> Self {
        Self::from_parts(
            workload_types::STATEFULSET,
            &s.metadata,
            s.spec.as_ref().map(|s| &s.selector),
        )
    }

    pub fn from_daemonset(d: &DaemonSet) -> Self {
        Self::from_parts(
            workload_types::DAEMONSET,
            &d.metadata,
            d.spec.as_ref().map(|s| &s.selector),
        )
    }

    pub fn key(&self) -> String {
        workload_key(self.workload_type, &self.namespace, &self.name)
    }

    /// Whether the workload's `matchLabels` select this pod
    ///
    /// A workload without `matchLabels` selects nothing.
    pub fn selects(&self, pod: &Pod) -> bool {
        let same_namespace = pod.metadata.namespace.as_deref() == Some(self.namespace.as_str());
        if self.match_labels.is_empty() || !same_namespace {
            return false;
        }
        let Some(pod_labels) = pod.metadata.labels.as_ref() else {
            return false;
        };
        self.match_labels
            .iter()
            .all(|(k, v)| pod_labels.get(k) == Some(v))
    }
}

pub fn workload_key(workload_type: &str, namespace: &str, name: &str) -> String {
    format!("{workload_type}/{namespace}/{name}")
}

/// `namespace/name` key of a pod
pub fn pod_key(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or_default(),
        pod.metadata.name.as_deref().unwrap_or_default()
    )
}

/// Concurrent snapshot store of nodes, pods and workloads
pub struct ClusterCache {
    nodes: DashMap<String, Node>,
    pods: DashMap<String, Pod>,
    workloads: DashMap<String, WorkloadRef>,
    synced: AtomicBool,
}

impl Default for ClusterCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterCache {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
            pods: DashMap::new(),
            workloads: DashMap::new(),
            synced: AtomicBool::new(false),
        }
    }

    /// Insert or replace a node, returning the previous version
    pub fn upsert_node(&self, node: Node) -> Option<Node> {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.nodes.insert(name, node)
    }

    pub fn remove_node(&self, name: &str) -> Option<Node> {
        self.nodes.remove(name).map(|(_, v)| v)
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        self.nodes.get(name).map(|r| r.clone())
    }

    /// All nodes sorted by name
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.iter().map(|r| r.value().clone()).collect();
        nodes.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        nodes
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes.iter().map(|r| r.key().clone()).collect()
    }

    pub fn upsert_pod(&self, pod: Pod) -> Option<Pod> {
        self.pods.insert(pod_key(&pod), pod)
    }

    pub fn remove_pod(&self, key: &str) -> Option<Pod> {
        self.pods.remove(key).map(|(_, v)| v)
    }

    pub fn pod(&self, key: &str) -> Option<Pod> {
        self.pods.get(key).map(|r| r.clone())
    }

    /// All pods sorted by `namespace/name`
    pub fn pods(&self) -> Vec<Pod> {
        let mut pods: Vec<(String, Pod)> = self
            .pods
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        pods.sort_by(|a, b| a.0.cmp(&b.0));
        pods.into_iter().map(|(_, p)| p).collect()
    }

    pub fn pod_keys(&self) -> Vec<String> {
        self.pods.iter().map(|r| r.key().clone()).collect()
    }

    /// Pods selected by a workload
    pub fn pods_selected_by(&self, workload: &WorkloadRef) -> Vec<Pod> {
        let mut pods: Vec<Pod> = self
            .pods
            .iter()
            .filter(|r| workload.selects(r.value()))
            .map(|r| r.value().clone())
            .collect();
        pods.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        pods
    }

    pub fn upsert_workload(&self, workload: WorkloadRef) -> Option<WorkloadRef> {
        self.workloads.insert(workload.key(), workload)
    }

    pub fn remove_workload(&self, key: &str) -> Option<WorkloadRef> {
        self.workloads.remove(key).map(|(_, v)| v)
    }

    pub fn workload_keys(&self, workload_type: &str) -> Vec<String> {
        self.workloads
            .iter()
            .filter(|r| r.value().workload_type == workload_type)
            .map(|r| r.key().clone())
            .collect()
    }

    /// All workloads sorted by key
    pub fn workloads(&self) -> Vec<WorkloadRef> {
        let mut workloads: Vec<WorkloadRef> =
            self.workloads.iter().map(|r| r.value().clone()).collect();
        workloads.sort_by_key(|w| w.key());
        workloads
    }

    /// Mark the initial listing as complete
    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::SeqCst);
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(ns: &str, name: &str, labels: &[(&str, &str)]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                namespace: Some(ns.to_string()),
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn workload(match_labels: &[(&str, &str)]) -> WorkloadRef {
        WorkloadRef {
            workload_type: workload_types::DEPLOYMENT,
            namespace: "shop".to_string(),
            name: "web".to_string(),
            labels: BTreeMap::new(),
            match_labels: match_labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_selector_matches_namespace_and_labels() {
        let w = workload(&[("app", "web")]);
        assert!(w.selects(&pod("shop", "a", &[("app", "web"), ("tier", "fe")])));
        assert!(!w.selects(&pod("other", "a", &[("app", "web")])));
        assert!(!w.selects(&pod("shop", "a", &[("app", "api")])));
        assert!(!workload(&[]).selects(&pod("shop", "a", &[("app", "web")])));
    }

    #[test]
    fn test_pods_selected_by_workload() {
        let cache = ClusterCache::new();
        cache.upsert_pod(pod("shop", "web-2", &[("app", "web")]));
        cache.upsert_pod(pod("shop", "web-1", &[("app", "web")]));
        cache.upsert_pod(pod("shop", "db-0", &[("app", "db")]));

        let names: Vec<_> = cache
            .pods_selected_by(&workload(&[("app", "web")]))
            .into_iter()
            .filter_map(|p| p.metadata.name)
            .collect();
        assert_eq!(names, vec!["web-1", "web-2"]);
    }

    #[test]
    fn test_upsert_returns_previous() {
        let cache = ClusterCache::new();
        assert!(cache.upsert_pod(pod("shop", "a", &[])).is_none());
        assert!(cache.upsert_pod(pod("shop", "a", &[("v", "2")])).is_some());
        assert_eq!(cache.pods().len(), 1);
        assert!(cache.remove_pod("shop/a").is_some());
        assert!(cache.pod("shop/a").is_none());
    }

    #[test]
    fn test_workload_from_deployment() {
        use k8s_openapi::api::apps::v1::DeploymentSpec;

        let d = Deployment {
            metadata: ObjectMeta {
                namespace: Some("shop".into()),
                name: Some("web".into()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(BTreeMap::from([("app".to_string(), "web".to_string())])),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        };

        let w = WorkloadRef::from_deployment(&d);
        assert_eq!(w.key(), "deployment/shop/web");
        assert_eq!(w.match_labels.get("app").map(String::as_str), Some("web"));
    }
}
