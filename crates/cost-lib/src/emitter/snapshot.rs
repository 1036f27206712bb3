//! Snapshot builders for each emitter loop
//!
//! A tick resolves every price first and collects its gauge writes in a
//! [`Batch`]. Only then are the loop's metrics cleared and rewritten, with no
//! suspension point in between, so a scrape never sees a partial snapshot.

use super::{EmitterContext, EmitterLoop, TickReport};
use crate::cluster::{pod_key, WorkloadRef};
use crate::error::{CostError, Result};
use crate::models::{InstancePrice, NodeResourceRecord, ResourceKind};
use crate::schema::{self, labels::*, values, MetricSchema};
use crate::tracker::{resource_amounts, ResourceAmounts};
use crate::usage::ContainerUsage;
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

const NODE_SCHEMAS: &[MetricSchema] = &[
    schema::NODE_CPU_CORE_HOURLY_COST,
    schema::NODE_RAM_GB_HOURLY_COST,
    schema::NODE_TOTAL_HOURLY_COST,
    schema::NODE_RESOURCE_HOURLY_COST,
    schema::NODE_RESOURCE_TOTAL,
    schema::NODE_RESOURCE_CAPACITY,
    schema::NODE_RESOURCE_ALLOCATABLE,
    schema::NODE_RESOURCE_SYSTEM_TAKEN,
    schema::NODE_RESOURCE_AVAILABLE,
    schema::NODE_RESOURCE_USAGE,
];

const POD_SCHEMAS: &[MetricSchema] = &[
    schema::POD_RESOURCE_COST,
    schema::POD_RESOURCE_REQUEST,
    schema::POD_RESOURCE_USAGE,
];

const WORKLOAD_SCHEMAS: &[MetricSchema] = &[
    schema::WORKLOAD_RESOURCE_COST,
    schema::WORKLOAD_POD_COUNT,
    schema::WORKLOAD_RESOURCE_REQUEST,
    schema::WORKLOAD_RESOURCE_USAGE,
];

/// Hourly cost of a pod's requests priced at its node's per-unit rates
pub fn pod_hourly_cost(requests: &ResourceAmounts, price: &InstancePrice) -> f64 {
    requests
        .iter()
        .map(|(resource, amount)| amount * price.hourly_for(*resource))
        .sum()
}

/// Requests of every container of a pod, keyed by container name
fn container_requests(pod: &Pod) -> Result<ContainerUsage> {
    let mut requests = ContainerUsage::new();
    let containers = pod.spec.as_ref().map(|s| s.containers.as_slice()).unwrap_or_default();
    for container in containers {
        let list = container.resources.as_ref().and_then(|r| r.requests.as_ref());
        requests.insert(container.name.clone(), resource_amounts(list)?);
    }
    Ok(requests)
}

fn total_requests(containers: &ContainerUsage) -> ResourceAmounts {
    let mut total = ResourceAmounts::new();
    for amounts in containers.values() {
        for (resource, amount) in amounts {
            *total.entry(*resource).or_insert(0.0) += amount;
        }
    }
    total
}

/// Add per-container amounts into a running per-container sum
fn accumulate(into: &mut ContainerUsage, from: &ContainerUsage) {
    for (container, amounts) in from {
        let entry = into.entry(container.clone()).or_default();
        for (resource, amount) in amounts {
            *entry.entry(*resource).or_insert(0.0) += amount;
        }
    }
}

fn labels_json(labels: Option<&BTreeMap<String, String>>, entity: &str) -> Result<String> {
    let empty = BTreeMap::new();
    serde_json::to_string(labels.unwrap_or(&empty))
        .map_err(|e| CostError::per_entity("labels", entity, e.to_string()))
}

fn scheduled_node(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()
        .and_then(|s| s.node_name.as_deref())
        .filter(|n| !n.is_empty())
}

/// Prices resolved during one tick, failures included
type PriceMemo = HashMap<String, Result<InstancePrice>>;

/// Gauge writes collected during one tick
#[derive(Debug, Default)]
struct Batch {
    writes: Vec<(MetricSchema, Vec<(&'static str, String)>, f64)>,
}

impl Batch {
    fn set(&mut self, schema: &MetricSchema, labels: &[(&'static str, &str)], value: f64) {
        let labels = labels.iter().map(|(k, v)| (*k, v.to_string())).collect();
        self.writes.push((*schema, labels, value));
    }
}

impl EmitterContext {
    pub(crate) async fn tick(&self, which: EmitterLoop) -> TickReport {
        match which {
            EmitterLoop::Cluster => self.cluster_tick().await,
            EmitterLoop::Node => self.node_tick().await,
            EmitterLoop::Pod => self.pod_tick().await,
            EmitterLoop::Workload => self.workload_tick().await,
        }
    }

    /// Replace every series of `schemas` with the batch
    fn commit(&self, schemas: &[MetricSchema], batch: Batch) {
        for schema in schemas {
            self.sink.clear(schema);
        }
        for (schema, labels, value) in &batch.writes {
            let labels: Vec<(&str, &str)> = labels.iter().map(|(k, v)| (*k, v.as_str())).collect();
            self.sink.set_gauge(schema, &labels, *value);
        }
    }

    fn record(
        &self,
        report: &mut TickReport,
        which: EmitterLoop,
        entity: &str,
        outcome: Result<()>,
    ) {
        match outcome {
            Ok(()) => report.processed += 1,
            Err(e) => {
                report.skipped += 1;
                self.logger.log_entity_skipped(which.name(), entity, &e);
            }
        }
    }

    async fn node_price(&self, node_name: &str, memo: &mut PriceMemo) -> Result<InstancePrice> {
        if let Some(price) = memo.get(node_name) {
            return price.clone();
        }
        let price = match self.cache.node(node_name) {
            Some(node) => self.provider.node_hourly_price(&node).await,
            None => Err(CostError::per_entity("node", node_name, "not in cluster cache")),
        };
        memo.insert(node_name.to_string(), price.clone());
        price
    }

    async fn pod_usage(&self) -> HashMap<String, ContainerUsage> {
        self.usage.pod_usage().await.unwrap_or_else(|e| {
            warn!(error = %e, "Pod usage unavailable, skipping usage series");
            HashMap::new()
        })
    }

    async fn cluster_tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let nodes = self.cache.nodes();
        let Some(first) = nodes.first() else {
            return report;
        };

        let mut batch = Batch::default();
        let outcome = self.provider.node_hourly_price(first).await.map(|price| {
            batch.set(
                &schema::CLUSTER_ACTIVE,
                &[
                    (REGION, price.region.as_str()),
                    (CLOUD_PROVIDER, price.cloud_provider.as_str()),
                    (CLUSTER_NAME, self.identity.cluster_name.as_str()),
                    (CLUSTER_ID, self.identity.cluster_id.as_str()),
                ],
                1.0,
            );
        });
        self.record(&mut report, EmitterLoop::Cluster, "cluster", outcome);
        self.commit(&[schema::CLUSTER_ACTIVE], batch);
        report
    }

    async fn node_tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let nodes = self.cache.nodes();

        let records: HashMap<String, NodeResourceRecord> = match self.tracker.snapshot().await {
            Ok(records) => records
                .into_iter()
                .map(|r| (r.node_name.clone(), r))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Tracker snapshot unavailable, skipping resource series");
                HashMap::new()
            }
        };
        let usage = self.usage.node_usage().await.unwrap_or_else(|e| {
            warn!(error = %e, "Node usage unavailable, skipping usage series");
            HashMap::new()
        });

        let mut batch = Batch::default();
        for node in &nodes {
            let name = node.metadata.name.as_deref().unwrap_or_default();
            let outcome = self
                .emit_node(node, records.get(name), usage.get(name), &mut batch)
                .await;
            self.record(&mut report, EmitterLoop::Node, &format!("node/{name}"), outcome);
        }
        self.commit(NODE_SCHEMAS, batch);
        report
    }

    async fn emit_node(
        &self,
        node: &Node,
        record: Option<&NodeResourceRecord>,
        usage: Option<&ResourceAmounts>,
        batch: &mut Batch,
    ) -> Result<()> {
        let name = node.metadata.name.as_deref().unwrap_or_default();
        let price = self.provider.node_hourly_price(node).await?;
        let capacity = resource_amounts(node.status.as_ref().and_then(|s| s.capacity.as_ref()))?;

        let period = price.billing_period.to_string();
        let cost_labels = [
            (NODE, name),
            (INSTANCE_TYPE, price.instance_type.as_str()),
            (BILLING_MODE, price.billing_mode.as_str()),
            (BILLING_PERIOD, period.as_str()),
            (REGION, price.region.as_str()),
            (CLOUD_PROVIDER, price.cloud_provider.as_str()),
            (CLUSTER_NAME, self.identity.cluster_name.as_str()),
            (CLUSTER_ID, self.identity.cluster_id.as_str()),
        ];
        batch.set(&schema::NODE_CPU_CORE_HOURLY_COST, &cost_labels, price.cpu_hourly);
        batch.set(&schema::NODE_RAM_GB_HOURLY_COST, &cost_labels, price.ram_hourly);
        batch.set(&schema::NODE_TOTAL_HOURLY_COST, &cost_labels, price.total_hourly);

        for resource in ResourceKind::ALL {
            let mut labels = cost_labels.to_vec();
            labels.push((RESOURCE, resource.as_str()));
            batch.set(
                &schema::NODE_RESOURCE_HOURLY_COST,
                &labels,
                price.resource_hourly_cost(resource),
            );

            let labels = [
                (NODE, name),
                (CLUSTER_NAME, self.identity.cluster_name.as_str()),
                (CLUSTER_ID, self.identity.cluster_id.as_str()),
                (RESOURCE, resource.as_str()),
                (BILLING_MODE, price.billing_mode.as_str()),
            ];
            let total = price.capacity_for(resource);
            batch.set(&schema::NODE_RESOURCE_TOTAL, &labels, total);
            if let Some(capacity) = capacity.get(&resource) {
                batch.set(&schema::NODE_RESOURCE_CAPACITY, &labels, *capacity);
            }
            if let Some(record) = record {
                batch.set(
                    &schema::NODE_RESOURCE_ALLOCATABLE,
                    &labels,
                    record.allocatable(resource),
                );
                batch.set(
                    &schema::NODE_RESOURCE_SYSTEM_TAKEN,
                    &labels,
                    record.system_taken(resource, total),
                );
                batch.set(
                    &schema::NODE_RESOURCE_AVAILABLE,
                    &labels,
                    record.available(resource),
                );
            }
            if let Some(used) = usage.and_then(|u| u.get(&resource)) {
                batch.set(&schema::NODE_RESOURCE_USAGE, &labels, *used);
            }
        }
        Ok(())
    }

    async fn pod_tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let pods = self.cache.pods();
        let usage = self.pod_usage().await;
        let mut prices = PriceMemo::new();

        let mut batch = Batch::default();
        for pod in &pods {
            let key = pod_key(pod);
            let outcome = self
                .emit_pod(pod, usage.get(&key), &mut prices, &mut batch)
                .await;
            self.record(&mut report, EmitterLoop::Pod, &format!("pod/{key}"), outcome);
        }
        self.commit(POD_SCHEMAS, batch);
        report
    }

    async fn emit_pod(
        &self,
        pod: &Pod,
        usage: Option<&ContainerUsage>,
        prices: &mut PriceMemo,
        batch: &mut Batch,
    ) -> Result<()> {
        let key = pod_key(pod);
        let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
        let name = pod.metadata.name.as_deref().unwrap_or_default();
        let labels = labels_json(pod.metadata.labels.as_ref(), &key)?;
        let requests = container_requests(pod)?;

        let (cost, scheduled) = match scheduled_node(pod) {
            Some(node) => {
                let price = self.node_price(node, prices).await?;
                (pod_hourly_cost(&total_requests(&requests), &price), "true")
            }
            None => (0.0, "false"),
        };

        batch.set(
            &schema::POD_RESOURCE_COST,
            &[
                (NAMESPACE, namespace),
                (POD, name),
                (CLUSTER_NAME, self.identity.cluster_name.as_str()),
                (CLUSTER_ID, self.identity.cluster_id.as_str()),
                (RESOURCE, values::COST),
                (SCHEDULED, scheduled),
                (LABELS, labels.as_str()),
            ],
            cost,
        );

        let mut write = |metric: &MetricSchema, per_container: &ContainerUsage| {
            for (container, amounts) in per_container {
                for (resource, amount) in amounts {
                    batch.set(
                        metric,
                        &[
                            (NAMESPACE, namespace),
                            (POD, name),
                            (CLUSTER_NAME, self.identity.cluster_name.as_str()),
                            (CLUSTER_ID, self.identity.cluster_id.as_str()),
                            (RESOURCE, resource.as_str()),
                            (LABELS, labels.as_str()),
                            (CONTAINER, container.as_str()),
                        ],
                        *amount,
                    );
                }
            }
        };
        write(&schema::POD_RESOURCE_REQUEST, &requests);
        if let Some(usage) = usage {
            write(&schema::POD_RESOURCE_USAGE, usage);
        }
        Ok(())
    }

    async fn workload_tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let workloads = self.cache.workloads();
        let usage = self.pod_usage().await;
        let mut prices = PriceMemo::new();

        let mut batch = Batch::default();
        for workload in &workloads {
            let outcome = self
                .emit_workload(workload, &usage, &mut prices, &mut batch)
                .await;
            self.record(&mut report, EmitterLoop::Workload, &workload.key(), outcome);
        }
        self.commit(WORKLOAD_SCHEMAS, batch);
        report
    }

    async fn emit_workload(
        &self,
        workload: &WorkloadRef,
        usage: &HashMap<String, ContainerUsage>,
        prices: &mut PriceMemo,
        batch: &mut Batch,
    ) -> Result<()> {
        let pods = self.cache.pods_selected_by(workload);
        let labels = labels_json(Some(&workload.labels), &workload.key())?;

        let mut cost = 0.0;
        let mut requests = ContainerUsage::new();
        let mut used = ContainerUsage::new();
        for pod in &pods {
            let pod_requests = container_requests(pod)?;
            if let Some(node) = scheduled_node(pod) {
                let price = self.node_price(node, prices).await?;
                cost += pod_hourly_cost(&total_requests(&pod_requests), &price);
            }
            accumulate(&mut requests, &pod_requests);
            if let Some(pod_usage) = usage.get(&pod_key(pod)) {
                accumulate(&mut used, pod_usage);
            }
        }

        let base = [
            (WORKLOAD_TYPE, workload.workload_type),
            (WORKLOAD_NAME, workload.name.as_str()),
            (NAMESPACE, workload.namespace.as_str()),
            (CLUSTER_NAME, self.identity.cluster_name.as_str()),
            (CLUSTER_ID, self.identity.cluster_id.as_str()),
            (LABELS, labels.as_str()),
        ];
        let with_resource = |resource: &'static str| {
            let mut labels = base.to_vec();
            labels.push((RESOURCE, resource));
            labels
        };

        batch.set(
            &schema::WORKLOAD_POD_COUNT,
            &with_resource(values::POD),
            pods.len() as f64,
        );
        batch.set(&schema::WORKLOAD_RESOURCE_COST, &with_resource(values::COST), cost);

        for (metric, per_container) in [
            (&schema::WORKLOAD_RESOURCE_REQUEST, &requests),
            (&schema::WORKLOAD_RESOURCE_USAGE, &used),
        ] {
            for (container, amounts) in per_container {
                for (resource, amount) in amounts {
                    let mut labels = with_resource(resource.as_str());
                    labels.push((CONTAINER, container.as_str()));
                    batch.set(metric, &labels, *amount);
                }
            }
        }
        Ok(())
    }
}
