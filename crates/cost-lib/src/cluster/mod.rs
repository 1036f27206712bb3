//! Cluster state ingestion
//!
//! Watch adapters turn API server notifications into [`ClusterEvent`]s. The
//! [`EventIngestor`] applies them to the [`ClusterCache`] read by the
//! emitter and forwards node and pod changes to the resource tracker.
//! Events are delivered at least once, so applying one twice is harmless.

mod cache;

pub use cache::{pod_key, workload_key, ClusterCache, WorkloadRef};

use crate::error::Result;
use crate::tracker::{node_allocatable, PodRequests, TrackerEvent, TrackerHandle};
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Object-level notification from a watch
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    /// Node added or updated
    NodeApplied(Node),
    NodeDeleted(Node),
    /// Full node listing after a watch restart
    NodesRestarted(Vec<Node>),
    /// Pod added or updated
    PodApplied(Pod),
    PodDeleted(Pod),
    /// Full pod listing after a watch restart
    PodsRestarted(Vec<Pod>),
    WorkloadApplied(WorkloadRef),
    WorkloadDeleted(WorkloadRef),
    /// Full listing of one workload type after a watch restart
    WorkloadsRestarted {
        workload_type: &'static str,
        workloads: Vec<WorkloadRef>,
    },
}

/// Applies cluster events to the cache and the tracker
#[derive(Clone)]
pub struct EventIngestor {
    cache: Arc<ClusterCache>,
    tracker: TrackerHandle,
}

impl EventIngestor {
    pub fn new(cache: Arc<ClusterCache>, tracker: TrackerHandle) -> Self {
        Self { cache, tracker }
    }

    pub fn cache(&self) -> &Arc<ClusterCache> {
        &self.cache
    }

    /// Apply one event
    ///
    /// Only a stopped tracker is reported as an error. Objects with
    /// unparsable resources are cached but not counted by the tracker.
    pub async fn ingest(&self, event: ClusterEvent) -> Result<()> {
        match event {
            ClusterEvent::NodeApplied(node) => self.node_applied(node).await,
            ClusterEvent::NodeDeleted(node) => {
                let name = node.metadata.name.clone().unwrap_or_default();
                self.node_deleted(&name).await
            }
            ClusterEvent::NodesRestarted(nodes) => {
                let listed: HashSet<String> = nodes
                    .iter()
                    .filter_map(|n| n.metadata.name.clone())
                    .collect();
                for name in self.cache.node_names() {
                    if !listed.contains(&name) {
                        self.node_deleted(&name).await?;
                    }
                }
                for node in nodes {
                    self.node_applied(node).await?;
                }
                Ok(())
            }
            ClusterEvent::PodApplied(pod) => self.pod_applied(pod).await,
            ClusterEvent::PodDeleted(pod) => self.pod_deleted(&pod_key(&pod)).await,
            ClusterEvent::PodsRestarted(pods) => {
                let listed: HashSet<String> = pods.iter().map(pod_key).collect();
                for key in self.cache.pod_keys() {
                    if !listed.contains(&key) {
                        self.pod_deleted(&key).await?;
                    }
                }
                for pod in pods {
                    self.pod_applied(pod).await?;
                }
                Ok(())
            }
            ClusterEvent::WorkloadApplied(workload) => {
                self.cache.upsert_workload(workload);
                Ok(())
            }
            ClusterEvent::WorkloadDeleted(workload) => {
                self.cache.remove_workload(&workload.key());
                Ok(())
            }
            ClusterEvent::WorkloadsRestarted {
                workload_type,
                workloads,
            } => {
                let listed: HashSet<String> = workloads.iter().map(WorkloadRef::key).collect();
                for key in self.cache.workload_keys(workload_type) {
                    if !listed.contains(&key) {
                        self.cache.remove_workload(&key);
                    }
                }
                for workload in workloads {
                    self.cache.upsert_workload(workload);
                }
                Ok(())
            }
        }
    }

    async fn node_applied(&self, node: Node) -> Result<()> {
        let name = node.metadata.name.clone().unwrap_or_default();
        let allocatable = node_allocatable(&node);
        let previous = self.cache.upsert_node(node);
        let was_tracked = previous.is_some_and(|p| node_allocatable(&p).is_ok());
        if was_tracked {
            return Ok(());
        }

        let allocatable = match allocatable {
            Ok(allocatable) => allocatable,
            Err(e) => {
                warn!(node = %name, error = %e, "Node allocatable unparsable, not tracked");
                return Ok(());
            }
        };
        self.tracker
            .apply(TrackerEvent::NodeAdded {
                name: name.clone(),
                allocatable,
            })
            .await?;
        self.replay_pods(&name).await
    }

    /// Count pods cached before their node was tracked
    ///
    /// Pods already counted on the node are skipped by the tracker.
    async fn replay_pods(&self, node: &str) -> Result<()> {
        let pods = self.cache.pods();
        let scheduled = pods
            .iter()
            .filter_map(|pod| PodRequests::from_pod(pod).ok())
            .filter(|requests| requests.node_name.as_deref() == Some(node));
        let mut replayed = 0usize;
        for requests in scheduled {
            self.tracker.apply(TrackerEvent::PodAdded(requests)).await?;
            replayed += 1;
        }
        if replayed > 0 {
            debug!(node = %node, pods = replayed, "Replayed pods onto newly tracked node");
        }
        Ok(())
    }

    async fn node_deleted(&self, name: &str) -> Result<()> {
        self.cache.remove_node(name);
        self.tracker
            .apply(TrackerEvent::NodeDeleted {
                name: name.to_string(),
            })
            .await
    }

    async fn pod_applied(&self, pod: Pod) -> Result<()> {
        let key = pod_key(&pod);
        let new = PodRequests::from_pod(&pod);
        let previous = self.cache.upsert_pod(pod);

        let new = match new {
            Ok(new) => new,
            Err(e) => {
                warn!(pod = %key, error = %e, "Pod requests unparsable, not counted");
                return Ok(());
            }
        };

        let event = match previous.map(|p| PodRequests::from_pod(&p)) {
            None => TrackerEvent::PodAdded(new),
            Some(Ok(old)) => TrackerEvent::PodUpdated { old, new },
            // Previous version was never counted; treat as a fresh add
            Some(Err(_)) => TrackerEvent::PodAdded(new),
        };
        self.tracker.apply(event).await
    }

    async fn pod_deleted(&self, key: &str) -> Result<()> {
        let Some(pod) = self.cache.remove_pod(key) else {
            debug!(pod = %key, "Delete for unknown pod");
            return Ok(());
        };
        match PodRequests::from_pod(&pod) {
            Ok(requests) => self.tracker.apply(TrackerEvent::PodDeleted(requests)).await,
            Err(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceKind;
    use crate::tracker::NodeResourceTracker;
    use k8s_openapi::api::core::v1::{Container, NodeStatus, PodSpec, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;
    use tokio::sync::broadcast;

    fn node(name: &str, cpu: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                allocatable: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity(cpu.to_string())),
                    ("memory".to_string(), Quantity("8Gi".to_string())),
                ])),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn pod(name: &str, node: Option<&str>, cpu: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                namespace: Some("default".into()),
                name: Some(name.into()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: node.map(str::to_string),
                containers: vec![Container {
                    name: "main".into(),
                    resources: Some(ResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "cpu".to_string(),
                            Quantity(cpu.to_string()),
                        )])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn setup() -> (EventIngestor, TrackerHandle, broadcast::Sender<()>) {
        let (shutdown, rx) = broadcast::channel(1);
        let (tracker, handle) = NodeResourceTracker::new(32);
        tracker.spawn(rx);
        let ingestor = EventIngestor::new(Arc::new(ClusterCache::new()), handle.clone());
        (ingestor, handle, shutdown)
    }

    #[tokio::test]
    async fn test_pod_lifecycle_flows_to_tracker() {
        let (ingestor, handle, _shutdown) = setup();

        ingestor.ingest(ClusterEvent::NodeApplied(node("n1", "4"))).await.unwrap();
        ingestor.ingest(ClusterEvent::PodApplied(pod("a", None, "1"))).await.unwrap();
        assert_eq!(handle.get("n1").await.unwrap().requested(ResourceKind::Cpu), 0.0);

        ingestor.ingest(ClusterEvent::PodApplied(pod("a", Some("n1"), "1"))).await.unwrap();
        assert_eq!(handle.get("n1").await.unwrap().available(ResourceKind::Cpu), 3.0);

        ingestor.ingest(ClusterEvent::PodDeleted(pod("a", Some("n1"), "1"))).await.unwrap();
        assert_eq!(handle.get("n1").await.unwrap().requested(ResourceKind::Cpu), 0.0);
        assert!(ingestor.cache().pods().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_applies_are_idempotent() {
        let (ingestor, handle, _shutdown) = setup();

        ingestor.ingest(ClusterEvent::NodeApplied(node("n1", "4"))).await.unwrap();
        ingestor.ingest(ClusterEvent::NodeApplied(node("n1", "4"))).await.unwrap();
        for _ in 0..3 {
            ingestor
                .ingest(ClusterEvent::PodApplied(pod("a", Some("n1"), "500m")))
                .await
                .unwrap();
        }

        assert_eq!(handle.get("n1").await.unwrap().requested(ResourceKind::Cpu), 0.5);
    }

    #[tokio::test]
    async fn test_pods_listed_before_their_node_are_counted() {
        let (ingestor, handle, _shutdown) = setup();

        ingestor
            .ingest(ClusterEvent::PodsRestarted(vec![
                pod("a", Some("n1"), "1"),
                pod("b", Some("n2"), "2"),
            ]))
            .await
            .unwrap();
        ingestor
            .ingest(ClusterEvent::NodesRestarted(vec![node("n1", "4")]))
            .await
            .unwrap();
        ingestor.ingest(ClusterEvent::PodApplied(pod("a", Some("n1"), "1"))).await.unwrap();

        let n1 = handle.get("n1").await.unwrap();
        assert_eq!(n1.requested(ResourceKind::Cpu), 1.0);
        assert_eq!(n1.available(ResourceKind::Cpu), 3.0);

        ingestor.ingest(ClusterEvent::PodDeleted(pod("a", Some("n1"), "1"))).await.unwrap();
        assert_eq!(handle.get("n1").await.unwrap().requested(ResourceKind::Cpu), 0.0);
    }

    #[tokio::test]
    async fn test_node_tracked_once_allocatable_becomes_parsable() {
        let (ingestor, handle, _shutdown) = setup();

        ingestor.ingest(ClusterEvent::PodApplied(pod("a", Some("n1"), "500m"))).await.unwrap();
        ingestor.ingest(ClusterEvent::NodeApplied(node("n1", "lots"))).await.unwrap();
        assert!(handle.get("n1").await.is_err());

        ingestor.ingest(ClusterEvent::NodeApplied(node("n1", "4"))).await.unwrap();
        ingestor.ingest(ClusterEvent::NodeApplied(node("n1", "4"))).await.unwrap();

        assert_eq!(handle.get("n1").await.unwrap().requested(ResourceKind::Cpu), 0.5);
    }

    #[tokio::test]
    async fn test_restart_listing_drops_missing_objects() {
        let (ingestor, handle, _shutdown) = setup();

        ingestor.ingest(ClusterEvent::NodeApplied(node("n1", "4"))).await.unwrap();
        ingestor.ingest(ClusterEvent::NodeApplied(node("n2", "4"))).await.unwrap();
        ingestor
            .ingest(ClusterEvent::NodesRestarted(vec![node("n2", "4")]))
            .await
            .unwrap();

        let names: Vec<_> = handle
            .snapshot()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.node_name)
            .collect();
        assert_eq!(names, vec!["n2"]);
        assert!(ingestor.cache().node("n1").is_none());
    }
}
