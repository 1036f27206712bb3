//! Watch adapters from the API server to the event ingestor
//!
//! One watcher per object kind. Each turns `Applied`, `Deleted` and
//! `Restarted` notifications into [`ClusterEvent`]s. Watch errors are retried
//! with backoff and reported on the watcher health component.

use cost_lib::cluster::{ClusterEvent, EventIngestor, WorkloadRef};
use cost_lib::health::{components, HealthRegistry};
use cost_lib::schema::workload_types;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

fn node_event(event: Event<Node>) -> ClusterEvent {
    match event {
        Event::Applied(node) => ClusterEvent::NodeApplied(node),
        Event::Deleted(node) => ClusterEvent::NodeDeleted(node),
        Event::Restarted(nodes) => ClusterEvent::NodesRestarted(nodes),
    }
}

fn pod_event(event: Event<Pod>) -> ClusterEvent {
    match event {
        Event::Applied(pod) => ClusterEvent::PodApplied(pod),
        Event::Deleted(pod) => ClusterEvent::PodDeleted(pod),
        Event::Restarted(pods) => ClusterEvent::PodsRestarted(pods),
    }
}

fn workload_event<K>(
    event: Event<K>,
    workload_type: &'static str,
    convert: fn(&K) -> WorkloadRef,
) -> ClusterEvent {
    match event {
        Event::Applied(obj) => ClusterEvent::WorkloadApplied(convert(&obj)),
        Event::Deleted(obj) => ClusterEvent::WorkloadDeleted(convert(&obj)),
        Event::Restarted(objs) => ClusterEvent::WorkloadsRestarted {
            workload_type,
            workloads: objs.iter().map(convert).collect(),
        },
    }
}

fn deployment_event(event: Event<Deployment>) -> ClusterEvent {
    workload_event(event, workload_types::DEPLOYMENT, WorkloadRef::from_deployment)
}

fn statefulset_event(event: Event<StatefulSet>) -> ClusterEvent {
    workload_event(event, workload_types::STATEFULSET, WorkloadRef::from_statefulset)
}

fn daemonset_event(event: Event<DaemonSet>) -> ClusterEvent {
    workload_event(event, workload_types::DAEMONSET, WorkloadRef::from_daemonset)
}

/// Receivers firing once the node and pod listings were first applied
pub struct InitialSync {
    pub nodes: oneshot::Receiver<()>,
    pub pods: oneshot::Receiver<()>,
}

struct Watch<K> {
    kind: &'static str,
    api: Api<K>,
    convert: fn(Event<K>) -> ClusterEvent,
    synced: Option<oneshot::Sender<()>>,
}

impl<K> Watch<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    async fn run(
        mut self,
        ingestor: EventIngestor,
        health: HealthRegistry,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(kind = self.kind, "Starting watcher");
        let mut stream = Box::pin(
            watcher::watcher(self.api.clone(), watcher::Config::default()).default_backoff(),
        );

        loop {
            tokio::select! {
                next = stream.next() => {
                    let event = match next {
                        Some(Ok(event)) => event,
                        Some(Err(e)) => {
                            warn!(kind = self.kind, error = %e, "Watch error, retrying");
                            let message = format!("{} watch: {e}", self.kind);
                            health.set_degraded(components::WATCHER, message).await;
                            continue;
                        }
                        None => {
                            warn!(kind = self.kind, "Watch stream ended");
                            break;
                        }
                    };

                    let restarted = matches!(event, Event::Restarted(_));
                    if let Err(e) = ingestor.ingest((self.convert)(event)).await {
                        error!(kind = self.kind, error = %e, "Tracker stopped, ending watch");
                        health.set_unhealthy(components::TRACKER, e.to_string()).await;
                        break;
                    }
                    if restarted {
                        health.set_healthy(components::WATCHER).await;
                        if let Some(tx) = self.synced.take() {
                            let _ = tx.send(());
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!(kind = self.kind, "Stopping watcher");
                    break;
                }
            }
        }
    }
}

/// Spawn the node, pod and workload watchers
pub fn spawn_watchers(
    client: Client,
    ingestor: EventIngestor,
    health: HealthRegistry,
    shutdown: &broadcast::Sender<()>,
) -> (Vec<JoinHandle<()>>, InitialSync) {
    let (nodes_tx, nodes_rx) = oneshot::channel();
    let (pods_tx, pods_rx) = oneshot::channel();

    let mut handles = Vec::with_capacity(5);
    let mut spawn = |handle| handles.push(handle);

    spawn(tokio::spawn(
        Watch {
            kind: "node",
            api: Api::<Node>::all(client.clone()),
            convert: node_event,
            synced: Some(nodes_tx),
        }
        .run(ingestor.clone(), health.clone(), shutdown.subscribe()),
    ));
    spawn(tokio::spawn(
        Watch {
            kind: "pod",
            api: Api::<Pod>::all(client.clone()),
            convert: pod_event,
            synced: Some(pods_tx),
        }
        .run(ingestor.clone(), health.clone(), shutdown.subscribe()),
    ));
    spawn(tokio::spawn(
        Watch {
            kind: workload_types::DEPLOYMENT,
            api: Api::<Deployment>::all(client.clone()),
            convert: deployment_event,
            synced: None,
        }
        .run(ingestor.clone(), health.clone(), shutdown.subscribe()),
    ));
    spawn(tokio::spawn(
        Watch {
            kind: workload_types::STATEFULSET,
            api: Api::<StatefulSet>::all(client.clone()),
            convert: statefulset_event,
            synced: None,
        }
        .run(ingestor.clone(), health.clone(), shutdown.subscribe()),
    ));
    spawn(tokio::spawn(
        Watch {
            kind: workload_types::DAEMONSET,
            api: Api::<DaemonSet>::all(client),
            convert: daemonset_event,
            synced: None,
        }
        .run(ingestor, health, shutdown.subscribe()),
    ));

    (
        handles,
        InitialSync {
            nodes: nodes_rx,
            pods: pods_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use std::collections::BTreeMap;

    fn deployment(name: &str) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(BTreeMap::from([("app".to_string(), name.to_string())])),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_deployment_events_become_workload_events() {
        match deployment_event(Event::Applied(deployment("web"))) {
            ClusterEvent::WorkloadApplied(w) => {
                assert_eq!(w.key(), "deployment/default/web");
                assert_eq!(w.match_labels["app"], "web");
            }
            other => panic!("unexpected event {other:?}"),
        }

        match deployment_event(Event::Restarted(vec![deployment("a"), deployment("b")])) {
            ClusterEvent::WorkloadsRestarted {
                workload_type,
                workloads,
            } => {
                assert_eq!(workload_type, "deployment");
                assert_eq!(workloads.len(), 2);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_pod_delete_maps_to_pod_deleted() {
        let pod = Pod::default();
        assert!(matches!(
            pod_event(Event::Deleted(pod)),
            ClusterEvent::PodDeleted(_)
        ));
    }
}
