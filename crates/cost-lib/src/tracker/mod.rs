//! Node resource tracking
//!
//! A single task owns the [`ResourceTable`] and applies node and pod
//! lifecycle events in arrival order. Everyone else holds a cloneable
//! [`TrackerHandle`]: writes are sent as events, reads ask for a copy of a
//! record or of the whole table over a oneshot reply. Because events and
//! reads share one queue, a read issued after an event observes it.

mod table;

pub use table::{PodChange, ResourceAmounts, ResourceTable};

use crate::error::{CostError, Result};
use crate::models::{NodeResourceRecord, ResourceKind};
use crate::observability::AgentMetrics;
use crate::units::{quantity_to_cores, quantity_to_gib};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const TRACKER: &str = "node resource tracker";

/// Summed container requests of one pod
#[derive(Debug, Clone, PartialEq)]
pub struct PodRequests {
    pub namespace: String,
    pub name: String,
    /// Node the pod is bound to, `None` while unscheduled
    pub node_name: Option<String>,
    pub requests: ResourceAmounts,
}

impl PodRequests {
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn is_scheduled(&self) -> bool {
        self.node_name.as_deref().is_some_and(|n| !n.is_empty())
    }

    /// Sum cpu (cores) and memory (GiB) requests over the pod's containers
    pub fn from_pod(pod: &Pod) -> Result<Self> {
        let mut requests = ResourceAmounts::new();
        let containers = pod.spec.as_ref().map(|s| s.containers.as_slice()).unwrap_or_default();
        for container in containers {
            let container_requests = container
                .resources
                .as_ref()
                .and_then(|r| r.requests.as_ref());
            for (resource, amount) in resource_amounts(container_requests)? {
                *requests.entry(resource).or_insert(0.0) += amount;
            }
        }

        Ok(Self {
            namespace: pod.metadata.namespace.clone().unwrap_or_default(),
            name: pod.metadata.name.clone().unwrap_or_default(),
            node_name: pod
                .spec
                .as_ref()
                .and_then(|s| s.node_name.clone())
                .filter(|n| !n.is_empty()),
            requests,
        })
    }
}

/// Convert a Kubernetes resource list into cores and GiB
pub fn resource_amounts(list: Option<&BTreeMap<String, Quantity>>) -> Result<ResourceAmounts> {
    let mut amounts = ResourceAmounts::new();
    let Some(list) = list else {
        return Ok(amounts);
    };
    if let Some(q) = list.get(ResourceKind::Cpu.as_str()) {
        amounts.insert(ResourceKind::Cpu, quantity_to_cores(q)?);
    }
    if let Some(q) = list.get(ResourceKind::Memory.as_str()) {
        amounts.insert(ResourceKind::Memory, quantity_to_gib(q)?);
    }
    Ok(amounts)
}

/// Allocatable resources advertised by a node
pub fn node_allocatable(node: &Node) -> Result<ResourceAmounts> {
    resource_amounts(node.status.as_ref().and_then(|s| s.allocatable.as_ref()))
}

/// Lifecycle events the tracker consumes
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    NodeAdded {
        name: String,
        allocatable: ResourceAmounts,
    },
    NodeDeleted {
        name: String,
    },
    PodAdded(PodRequests),
    PodUpdated {
        old: PodRequests,
        new: PodRequests,
    },
    PodDeleted(PodRequests),
}

enum Command {
    Apply(TrackerEvent),
    Get {
        node: String,
        reply: oneshot::Sender<Option<NodeResourceRecord>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<NodeResourceRecord>>,
    },
}

/// Cloneable handle to the tracker task
#[derive(Clone)]
pub struct TrackerHandle {
    tx: mpsc::Sender<Command>,
}

impl TrackerHandle {
    /// Queue an event; returns once the tracker accepted it
    pub async fn apply(&self, event: TrackerEvent) -> Result<()> {
        self.tx
            .send(Command::Apply(event))
            .await
            .map_err(|_| CostError::Stopped(TRACKER))
    }

    /// Copy of one node's record
    pub async fn get(&self, node: &str) -> Result<NodeResourceRecord> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Get {
                node: node.to_string(),
                reply,
            })
            .await
            .map_err(|_| CostError::Stopped(TRACKER))?;

        rx.await
            .map_err(|_| CostError::Stopped(TRACKER))?
            .ok_or_else(|| CostError::per_entity("node", node, "not tracked"))
    }

    /// Copies of every record, sorted by node name
    pub async fn snapshot(&self) -> Result<Vec<NodeResourceRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| CostError::Stopped(TRACKER))?;
        rx.await.map_err(|_| CostError::Stopped(TRACKER))
    }
}

/// Single owner of the resource table
pub struct NodeResourceTracker {
    table: ResourceTable,
    rx: mpsc::Receiver<Command>,
    metrics: Option<AgentMetrics>,
}

impl NodeResourceTracker {
    /// Create the tracker and its handle; `buffer` bounds queued commands
    pub fn new(buffer: usize) -> (Self, TrackerHandle) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                table: ResourceTable::new(),
                rx,
                metrics: None,
            },
            TrackerHandle { tx },
        )
    }

    /// Report the tracked node count on the agent metrics
    pub fn with_metrics(mut self, metrics: AgentMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn the tracker on the runtime
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Process commands until shutdown or until every handle is dropped
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting node resource tracker");
        loop {
            tokio::select! {
                command = self.rx.recv() => {
                    match command {
                        Some(command) => self.handle(command),
                        None => break,
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        info!(nodes = self.table.len(), "Node resource tracker stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Apply(event) => {
                self.apply(event);
                if let Some(metrics) = &self.metrics {
                    metrics.set_tracked_nodes(self.table.len() as i64);
                }
            }
            Command::Get { node, reply } => {
                let _ = reply.send(self.table.get(&node));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.table.snapshot());
            }
        }
    }

    fn apply(&mut self, event: TrackerEvent) {
        match event {
            TrackerEvent::NodeAdded { name, allocatable } => {
                if self.table.add_node(&name, allocatable) {
                    debug!(node = %name, "Tracking node");
                }
            }
            TrackerEvent::NodeDeleted { name } => {
                if self.table.delete_node(&name) {
                    debug!(node = %name, "Stopped tracking node");
                }
            }
            TrackerEvent::PodAdded(pod) => self.add_pod(&pod),
            TrackerEvent::PodUpdated { old, new } => {
                if !old.is_scheduled() && new.is_scheduled() {
                    self.add_pod(&new);
                }
            }
            TrackerEvent::PodDeleted(pod) => {
                if let Some(node) = pod.node_name.as_deref() {
                    let change = self.table.delete_pod(node, &pod.key());
                    if change != PodChange::Applied {
                        debug!(
                            pod = %pod.key(),
                            node = %node,
                            change = ?change,
                            "Pod delete not applied"
                        );
                    }
                }
            }
        }
    }

    fn add_pod(&mut self, pod: &PodRequests) {
        let Some(node) = pod.node_name.as_deref() else {
            return;
        };
        match self.table.add_pod(node, &pod.key(), &pod.requests) {
            PodChange::Applied | PodChange::Duplicate => {}
            change => warn!(
                pod = %pod.key(),
                node = %node,
                change = ?change,
                "Pod requests not counted"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn amounts(cpu: f64, memory: f64) -> ResourceAmounts {
        let mut m = ResourceAmounts::new();
        m.insert(ResourceKind::Cpu, cpu);
        m.insert(ResourceKind::Memory, memory);
        m
    }

    fn pod(name: &str, node: Option<&str>, cpu: f64) -> PodRequests {
        PodRequests {
            namespace: "default".to_string(),
            name: name.to_string(),
            node_name: node.map(str::to_string),
            requests: amounts(cpu, 0.0),
        }
    }

    fn start() -> (TrackerHandle, broadcast::Sender<()>, JoinHandle<()>) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (tracker, handle) = NodeResourceTracker::new(64);
        let task = tracker.spawn(shutdown_rx);
        (handle, shutdown_tx, task)
    }

    #[tokio::test]
    async fn test_available_after_pod_add() {
        let (handle, _shutdown, _task) = start();
        handle
            .apply(TrackerEvent::NodeAdded {
                name: "n1".into(),
                allocatable: amounts(4.0, 16.0),
            })
            .await
            .unwrap();
        handle
            .apply(TrackerEvent::PodAdded(pod("web", Some("n1"), 1.0)))
            .await
            .unwrap();

        let record = handle.get("n1").await.unwrap();
        assert_eq!(record.available(ResourceKind::Cpu), 3.0);
    }

    #[tokio::test]
    async fn test_concurrent_pod_adds_are_all_counted() {
        let (handle, _shutdown, _task) = start();
        handle
            .apply(TrackerEvent::NodeAdded {
                name: "n1".into(),
                allocatable: amounts(64.0, 256.0),
            })
            .await
            .unwrap();

        let n = 50;
        let q = 0.25;
        let mut tasks = Vec::new();
        for i in 0..n {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .apply(TrackerEvent::PodAdded(pod(&format!("p{i}"), Some("n1"), q)))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let record = handle.get("n1").await.unwrap();
        assert!((record.requested(ResourceKind::Cpu) - n as f64 * q).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_pod_update_counts_only_on_scheduling() {
        let (handle, _shutdown, _task) = start();
        handle
            .apply(TrackerEvent::NodeAdded {
                name: "n1".into(),
                allocatable: amounts(4.0, 16.0),
            })
            .await
            .unwrap();

        let pending = pod("job", None, 2.0);
        let bound = pod("job", Some("n1"), 2.0);
        handle.apply(TrackerEvent::PodAdded(pending.clone())).await.unwrap();
        handle
            .apply(TrackerEvent::PodUpdated {
                old: pending,
                new: bound.clone(),
            })
            .await
            .unwrap();
        handle
            .apply(TrackerEvent::PodUpdated {
                old: bound.clone(),
                new: bound.clone(),
            })
            .await
            .unwrap();

        assert_eq!(handle.get("n1").await.unwrap().requested(ResourceKind::Cpu), 2.0);

        handle.apply(TrackerEvent::PodDeleted(bound)).await.unwrap();
        assert_eq!(handle.get("n1").await.unwrap().requested(ResourceKind::Cpu), 0.0);
    }

    #[tokio::test]
    async fn test_node_delete_and_not_found() {
        let (handle, _shutdown, _task) = start();
        handle
            .apply(TrackerEvent::NodeAdded {
                name: "n1".into(),
                allocatable: amounts(4.0, 16.0),
            })
            .await
            .unwrap();
        handle
            .apply(TrackerEvent::NodeDeleted { name: "n1".into() })
            .await
            .unwrap();

        let err = handle.get("n1").await.unwrap_err();
        assert!(err.is_per_entity());
        assert!(handle.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handle_fails_after_shutdown() {
        let (handle, shutdown, task) = start();
        shutdown.send(()).unwrap();
        task.await.unwrap();

        assert!(matches!(handle.snapshot().await, Err(CostError::Stopped(_))));
    }

    #[test]
    fn test_pod_requests_from_pod_sums_containers() {
        let container = |cpu: &str, mem: &str| Container {
            name: "c".to_string(),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity(cpu.to_string())),
                    ("memory".to_string(), Quantity(mem.to_string())),
                ])),
                ..Default::default()
            }),
            ..Default::default()
        };
        let p = Pod {
            metadata: ObjectMeta {
                name: Some("web".into()),
                namespace: Some("shop".into()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("n1".into()),
                containers: vec![container("250m", "512Mi"), container("750m", "512Mi")],
                ..Default::default()
            }),
            ..Default::default()
        };

        let requests = PodRequests::from_pod(&p).unwrap();
        assert_eq!(requests.key(), "shop/web");
        assert!(requests.is_scheduled());
        assert!((requests.requests[&ResourceKind::Cpu] - 1.0).abs() < 1e-9);
        assert!((requests.requests[&ResourceKind::Memory] - 1.0).abs() < 1e-9);
    }
}
