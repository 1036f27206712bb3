//! Typed cost views built on [`QueryAggregator::aggregate`]

use super::aggregator::{Dimension, EntityMapping, FieldMapping, Normalize, QueryAggregator};
use super::promql::{self, resource_matcher};
use crate::error::{CostError, Result};
use crate::models::{BillingMode, CostRecord, EntityKey, Field, ResourceKind, TimeWindow};
use crate::schema::{self, labels, workload_types};
use crate::units::{HOURS_PER_MONTH, HOUR_IN_SECONDS};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

fn mode_cost(value: &str) -> Option<Field> {
    value.parse::<BillingMode>().ok().map(Field::ModeCost)
}

fn node_count(value: &str) -> Option<Field> {
    value.parse::<BillingMode>().ok().map(Field::NodeCount)
}

fn scheduled(value: &str) -> Option<Field> {
    value.parse::<bool>().ok().map(Field::ScheduledPods)
}

fn resource_cost(value: &str) -> Option<Field> {
    value.parse::<ResourceKind>().ok().map(Field::ResourceCost)
}

fn resource_count(value: &str) -> Option<Field> {
    value.parse::<ResourceKind>().ok().map(Field::ResourceCount)
}

fn resource_usage(value: &str) -> Option<Field> {
    value.parse::<ResourceKind>().ok().map(Field::ResourceUsage)
}

fn resource_request(value: &str) -> Option<Field> {
    value.parse::<ResourceKind>().ok().map(Field::ResourceRequest)
}

fn resource_available(value: &str) -> Option<Field> {
    value.parse::<ResourceKind>().ok().map(Field::ResourceAvailable)
}

fn resource_system_taken(value: &str) -> Option<Field> {
    value.parse::<ResourceKind>().ok().map(Field::ResourceSystemTaken)
}

fn by_label(label: &'static str, field: fn(&str) -> Option<Field>) -> FieldMapping {
    FieldMapping::ByLabel { label, field }
}

fn by_resource(field: fn(&str) -> Option<Field>) -> FieldMapping {
    by_label(labels::RESOURCE, field)
}

/// Grouping of the workload cost view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregateBy {
    /// Every workload type
    #[default]
    All,
    Pod,
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl AggregateBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateBy::All => "all",
            AggregateBy::Pod => "pod",
            AggregateBy::Deployment => workload_types::DEPLOYMENT,
            AggregateBy::StatefulSet => workload_types::STATEFULSET,
            AggregateBy::DaemonSet => workload_types::DAEMONSET,
        }
    }

    /// Workload types selected, empty for the per-pod grouping
    pub fn workload_types(&self) -> &'static [&'static str] {
        match self {
            AggregateBy::All => &workload_types::ALL,
            AggregateBy::Pod => &[],
            AggregateBy::Deployment => &[workload_types::DEPLOYMENT],
            AggregateBy::StatefulSet => &[workload_types::STATEFULSET],
            AggregateBy::DaemonSet => &[workload_types::DAEMONSET],
        }
    }
}

impl fmt::Display for AggregateBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateBy {
    type Err = CostError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(AggregateBy::All),
            "pod" => Ok(AggregateBy::Pod),
            workload_types::DEPLOYMENT => Ok(AggregateBy::Deployment),
            workload_types::STATEFULSET => Ok(AggregateBy::StatefulSet),
            workload_types::DAEMONSET => Ok(AggregateBy::DaemonSet),
            other => Err(CostError::Config(format!(
                "unknown aggregation {other:?}, expected all|pod|deployment|statefulset|daemonset"
            ))),
        }
    }
}

/// Cluster-wide cost of one step
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterCostPoint {
    pub timestamp: i64,
    pub total_cost: f64,
    pub on_demand_cost: f64,
    pub spot_cost: f64,
    /// Monthly and yearly reservations together
    pub period_cost: f64,
    pub fallback_cost: f64,
    pub cpu_cost: f64,
    pub ram_cost: f64,
    pub cpu_core_count: f64,
    pub ram_gb_count: f64,
    pub cpu_core_usage: f64,
    pub ram_gb_usage: f64,
}

impl ClusterCostPoint {
    fn from_record(record: &CostRecord) -> Self {
        let mode = |m: BillingMode| record.get(Field::ModeCost(m));
        Self {
            timestamp: record.timestamp,
            total_cost: record.get(Field::TotalCost),
            on_demand_cost: mode(BillingMode::OnDemand),
            spot_cost: mode(BillingMode::Spot),
            period_cost: mode(BillingMode::Monthly) + mode(BillingMode::Yearly),
            fallback_cost: mode(BillingMode::Fallback),
            cpu_cost: record.get(Field::ResourceCost(ResourceKind::Cpu)),
            ram_cost: record.get(Field::ResourceCost(ResourceKind::Memory)),
            cpu_core_count: record.get(Field::ResourceCount(ResourceKind::Cpu)),
            ram_gb_count: record.get(Field::ResourceCount(ResourceKind::Memory)),
            cpu_core_usage: record.get(Field::ResourceUsage(ResourceKind::Cpu)),
            ram_gb_usage: record.get(Field::ResourceUsage(ResourceKind::Memory)),
        }
    }

    /// Sum of the per-billing-mode costs
    pub fn mode_cost_sum(&self) -> f64 {
        self.on_demand_cost + self.spot_cost + self.period_cost + self.fallback_cost
    }
}

/// Cost and utilization of a namespace or workload over one step
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityCost {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub timestamp: i64,
    pub cost: f64,
    pub pod_count: f64,
    pub cpu_core_request: f64,
    pub ram_gb_request: f64,
    pub cpu_core_usage: f64,
    pub ram_gb_usage: f64,
}

impl EntityCost {
    fn from_record(record: &CostRecord) -> Self {
        let (kind, namespace, name) = match &record.key {
            EntityKey::Namespace { namespace } => {
                ("namespace".to_string(), namespace.clone(), namespace.clone())
            }
            EntityKey::Workload {
                workload_type,
                namespace,
                name,
            } => (workload_type.clone(), namespace.clone(), name.clone()),
            EntityKey::Pod { namespace, name } => {
                ("pod".to_string(), namespace.clone(), name.clone())
            }
            other => (other.to_string(), String::new(), String::new()),
        };
        Self {
            kind,
            namespace,
            name,
            timestamp: record.timestamp,
            cost: record.get(Field::TotalCost),
            pod_count: record.get(Field::PodCount),
            cpu_core_request: record.get(Field::ResourceRequest(ResourceKind::Cpu)),
            ram_gb_request: record.get(Field::ResourceRequest(ResourceKind::Memory)),
            cpu_core_usage: record.get(Field::ResourceUsage(ResourceKind::Cpu)),
            ram_gb_usage: record.get(Field::ResourceUsage(ResourceKind::Memory)),
        }
    }
}

/// Cluster-wide amounts of one resource at one step
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourcePoint {
    pub timestamp: i64,
    pub total: f64,
    pub available: f64,
    pub system_taken: f64,
    pub request: f64,
    pub usage: f64,
}

/// Instant view of the cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterCurrentMetrics {
    pub timestamp: i64,
    pub on_demand_nodes: u64,
    pub spot_nodes: u64,
    pub period_nodes: u64,
    pub fallback_nodes: u64,
    pub running_pods: u64,
    pub unscheduled_pods: u64,
    pub cpu_core_total: f64,
    pub cpu_core_usage: f64,
    pub cpu_core_request: f64,
    pub cpu_core_available: f64,
    pub cpu_core_system_taken: f64,
    pub ram_gb_total: f64,
    pub ram_gb_usage: f64,
    pub ram_gb_request: f64,
    pub ram_gb_available: f64,
    pub ram_gb_system_taken: f64,
}

/// Cost of the current month so far and its projection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthCostSummary {
    pub start: i64,
    pub end: i64,
    pub cost_so_far: f64,
    pub active_seconds: f64,
    pub estimated_month_cost: f64,
    pub average_daily_cost: f64,
    pub average_hourly_core_cost: f64,
}

impl MonthCostSummary {
    /// Project the accumulated cost over the hours the cluster was active
    pub fn project(
        start: i64,
        end: i64,
        cost: f64,
        active_seconds: f64,
        cpu_cost: f64,
        cpu_core_hours: f64,
    ) -> Self {
        let active_hours = active_seconds / HOUR_IN_SECONDS as f64;
        let per_active_hour = |hours: f64| {
            if active_hours > 0.0 {
                hours * cost / active_hours
            } else {
                0.0
            }
        };
        Self {
            start,
            end,
            cost_so_far: cost,
            active_seconds,
            estimated_month_cost: per_active_hour(HOURS_PER_MONTH),
            average_daily_cost: per_active_hour(24.0),
            average_hourly_core_cost: if cpu_core_hours > 0.0 {
                cpu_cost / cpu_core_hours
            } else {
                0.0
            },
        }
    }
}

impl QueryAggregator {
    async fn run_view(
        &self,
        view: &str,
        window: &TimeWindow,
        dimensions: &[Dimension],
    ) -> Result<Vec<CostRecord>> {
        self.aggregate(window, dimensions).await.map_err(|e| {
            let failed = match &e {
                CostError::Aggregate(agg) => agg.len(),
                _ => 1,
            };
            warn!(
                event = "aggregate_failed",
                cluster_id = %self.cluster_id(),
                view = %view,
                failed_dimensions = failed,
                error = %e,
                "Aggregate query failed"
            );
            e
        })
    }

    /// Total, per-billing-mode and per-resource cost of every step
    pub async fn cluster_resource_costs(
        &self,
        window: &TimeWindow,
    ) -> Result<Vec<ClusterCostPoint>> {
        let id = self.cluster_id();
        let step = window.step_seconds;
        let cluster = EntityMapping::Cluster;

        let mut dims = vec![
            Dimension::range(
                "total_cost",
                promql::accumulated(&schema::NODE_TOTAL_HOURLY_COST, id, &[], step, &[]),
                cluster,
                FieldMapping::Fixed(Field::TotalCost),
            )
            .single(),
            Dimension::range(
                "billing_mode_cost",
                promql::accumulated(
                    &schema::NODE_TOTAL_HOURLY_COST,
                    id,
                    &[],
                    step,
                    &[labels::BILLING_MODE],
                ),
                cluster,
                by_label(labels::BILLING_MODE, mode_cost),
            ),
            Dimension::range(
                "resource_cost",
                promql::accumulated(
                    &schema::NODE_RESOURCE_HOURLY_COST,
                    id,
                    &[],
                    step,
                    &[labels::RESOURCE],
                ),
                cluster,
                by_resource(resource_cost),
            ),
        ];
        for resource in ResourceKind::ALL {
            let matcher = [resource_matcher(resource)];
            dims.push(
                Dimension::range(
                    "resource_count",
                    promql::accumulated(&schema::NODE_RESOURCE_TOTAL, id, &matcher, step, &[]),
                    cluster,
                    FieldMapping::Fixed(Field::ResourceCount(resource)),
                )
                .normalized(Normalize::PerStepHour),
            );
            dims.push(
                Dimension::range(
                    "resource_usage",
                    promql::accumulated(&schema::NODE_RESOURCE_USAGE, id, &matcher, step, &[]),
                    cluster,
                    FieldMapping::Fixed(Field::ResourceUsage(resource)),
                )
                .normalized(Normalize::PerStepHour),
            );
        }

        let records = self.run_view("cluster_resource_costs", window, &dims).await?;
        Ok(records.iter().map(ClusterCostPoint::from_record).collect())
    }

    /// Cost, pod count, requests and usage of every namespace and step
    pub async fn namespace_costs(&self, window: &TimeWindow) -> Result<Vec<EntityCost>> {
        let id = self.cluster_id();
        let step = window.step_seconds;
        let ns = EntityMapping::Namespace;

        let dims = [
            Dimension::range(
                "namespace_cost",
                promql::accumulated(
                    &schema::POD_RESOURCE_COST,
                    id,
                    &[],
                    step,
                    &[labels::NAMESPACE],
                ),
                ns,
                FieldMapping::Fixed(Field::TotalCost),
            ),
            Dimension::range(
                "namespace_pod_count",
                promql::sample_count(&schema::POD_RESOURCE_COST, id, step, &[labels::NAMESPACE]),
                ns,
                FieldMapping::Fixed(Field::PodCount),
            )
            .normalized(Normalize::SamplesPerStep),
            Dimension::range(
                "namespace_request",
                promql::accumulated(
                    &schema::POD_RESOURCE_REQUEST,
                    id,
                    &[],
                    step,
                    &[labels::NAMESPACE, labels::RESOURCE],
                ),
                ns,
                by_resource(resource_request),
            )
            .normalized(Normalize::PerStepHour),
            Dimension::range(
                "namespace_usage",
                promql::accumulated(
                    &schema::POD_RESOURCE_USAGE,
                    id,
                    &[],
                    step,
                    &[labels::NAMESPACE, labels::RESOURCE],
                ),
                ns,
                by_resource(resource_usage),
            )
            .normalized(Normalize::PerStepHour),
        ];

        let records = self.run_view("namespace_costs", window, &dims).await?;
        Ok(records.iter().map(EntityCost::from_record).collect())
    }

    /// Cost of pods or workloads of every step
    pub async fn workload_costs(
        &self,
        window: &TimeWindow,
        aggregate_by: AggregateBy,
    ) -> Result<Vec<EntityCost>> {
        let dims = match aggregate_by {
            AggregateBy::Pod => self.pod_dimensions(window.step_seconds),
            other => self.workload_dimensions(window.step_seconds, other.workload_types()),
        };

        let mut records = self.run_view("workload_costs", window, &dims).await?;
        if aggregate_by == AggregateBy::Pod {
            for record in &mut records {
                record.set(Field::PodCount, 1.0);
            }
        }
        Ok(records.iter().map(EntityCost::from_record).collect())
    }

    fn pod_dimensions(&self, step: u64) -> Vec<Dimension> {
        let id = self.cluster_id();
        let pod = EntityMapping::Pod;
        let by_pod = [labels::NAMESPACE, labels::POD];
        let by_pod_resource = [labels::NAMESPACE, labels::POD, labels::RESOURCE];

        vec![
            Dimension::range(
                "pod_cost",
                promql::accumulated(&schema::POD_RESOURCE_COST, id, &[], step, &by_pod),
                pod,
                FieldMapping::Fixed(Field::TotalCost),
            ),
            Dimension::range(
                "pod_request",
                promql::accumulated(&schema::POD_RESOURCE_REQUEST, id, &[], step, &by_pod_resource),
                pod,
                by_resource(resource_request),
            )
            .normalized(Normalize::PerStepHour),
            Dimension::range(
                "pod_usage",
                promql::accumulated(&schema::POD_RESOURCE_USAGE, id, &[], step, &by_pod_resource),
                pod,
                by_resource(resource_usage),
            )
            .normalized(Normalize::PerStepHour),
        ]
    }

    fn workload_dimensions(&self, step: u64, types: &[&str]) -> Vec<Dimension> {
        let id = self.cluster_id();
        let workload = EntityMapping::Workload;
        let by_workload = [labels::NAMESPACE, labels::WORKLOAD_NAME, labels::WORKLOAD_TYPE];
        let by_workload_resource = [
            labels::NAMESPACE,
            labels::WORKLOAD_NAME,
            labels::WORKLOAD_TYPE,
            labels::RESOURCE,
        ];

        vec![
            Dimension::range(
                "workload_cost",
                promql::workload_accumulated(
                    &schema::WORKLOAD_RESOURCE_COST,
                    id,
                    types,
                    step,
                    &by_workload,
                ),
                workload,
                FieldMapping::Fixed(Field::TotalCost),
            ),
            Dimension::range(
                "workload_pod_count",
                promql::workload_sample_sum(
                    &schema::WORKLOAD_POD_COUNT,
                    id,
                    types,
                    step,
                    &by_workload,
                ),
                workload,
                FieldMapping::Fixed(Field::PodCount),
            )
            .normalized(Normalize::SamplesPerStep),
            Dimension::range(
                "workload_request",
                promql::workload_accumulated(
                    &schema::WORKLOAD_RESOURCE_REQUEST,
                    id,
                    types,
                    step,
                    &by_workload_resource,
                ),
                workload,
                by_resource(resource_request),
            )
            .normalized(Normalize::PerStepHour),
            Dimension::range(
                "workload_usage",
                promql::workload_accumulated(
                    &schema::WORKLOAD_RESOURCE_USAGE,
                    id,
                    types,
                    step,
                    &by_workload_resource,
                ),
                workload,
                by_resource(resource_usage),
            )
            .normalized(Normalize::PerStepHour),
        ]
    }

    /// Total, available, system-taken, requested and used amounts of one resource
    pub async fn cluster_resource_metrics(
        &self,
        window: &TimeWindow,
        resource: ResourceKind,
    ) -> Result<Vec<ResourcePoint>> {
        let id = self.cluster_id();
        let matcher = [resource_matcher(resource)];
        let dim = |name: &'static str, metric: &schema::MetricSchema, field: Field| {
            Dimension::range(
                name,
                promql::current_sum(metric, id, &matcher, &[]),
                EntityMapping::Cluster,
                FieldMapping::Fixed(field),
            )
        };

        let dims = [
            dim("resource_total", &schema::NODE_RESOURCE_TOTAL, Field::ResourceCount(resource)),
            dim(
                "resource_available",
                &schema::NODE_RESOURCE_AVAILABLE,
                Field::ResourceAvailable(resource),
            ),
            dim(
                "resource_system_taken",
                &schema::NODE_RESOURCE_SYSTEM_TAKEN,
                Field::ResourceSystemTaken(resource),
            ),
            dim(
                "resource_request",
                &schema::POD_RESOURCE_REQUEST,
                Field::ResourceRequest(resource),
            ),
            dim("resource_usage", &schema::NODE_RESOURCE_USAGE, Field::ResourceUsage(resource)),
        ];

        let records = self.run_view("cluster_resource_metrics", window, &dims).await?;
        Ok(records
            .iter()
            .map(|r| ResourcePoint {
                timestamp: r.timestamp,
                total: r.get(Field::ResourceCount(resource)),
                available: r.get(Field::ResourceAvailable(resource)),
                system_taken: r.get(Field::ResourceSystemTaken(resource)),
                request: r.get(Field::ResourceRequest(resource)),
                usage: r.get(Field::ResourceUsage(resource)),
            })
            .collect())
    }

    /// Node and pod counts and resource amounts right now
    pub async fn cluster_current_metrics(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ClusterCurrentMetrics> {
        let id = self.cluster_id();
        let at = Some(now.timestamp());
        let cluster = EntityMapping::Cluster;
        let by_resource_sum = |name: &'static str,
                               metric: &schema::MetricSchema,
                               field: fn(&str) -> Option<Field>| {
            Dimension::instant(
                name,
                promql::current_sum(metric, id, &[], &[labels::RESOURCE]),
                at,
                cluster,
                by_resource(field),
            )
        };

        let dims = [
            Dimension::instant(
                "node_count",
                promql::current_count(&schema::NODE_TOTAL_HOURLY_COST, id, &[labels::BILLING_MODE]),
                at,
                cluster,
                by_label(labels::BILLING_MODE, node_count),
            ),
            Dimension::instant(
                "pod_count",
                promql::current_count(&schema::POD_RESOURCE_COST, id, &[labels::SCHEDULED]),
                at,
                cluster,
                by_label(labels::SCHEDULED, scheduled),
            ),
            by_resource_sum("resource_total", &schema::NODE_RESOURCE_TOTAL, resource_count),
            by_resource_sum("resource_usage", &schema::NODE_RESOURCE_USAGE, resource_usage),
            by_resource_sum("resource_request", &schema::POD_RESOURCE_REQUEST, resource_request),
            by_resource_sum(
                "resource_available",
                &schema::NODE_RESOURCE_AVAILABLE,
                resource_available,
            ),
            by_resource_sum(
                "resource_system_taken",
                &schema::NODE_RESOURCE_SYSTEM_TAKEN,
                resource_system_taken,
            ),
        ];

        // instant queries ignore the window beyond its step
        let window = TimeWindow::new(
            now.timestamp() - HOUR_IN_SECONDS as i64,
            now.timestamp(),
            HOUR_IN_SECONDS,
        )?;
        let records = self.run_view("cluster_current_metrics", &window, &dims).await?;

        let mut current = ClusterCurrentMetrics {
            timestamp: now.timestamp(),
            ..Default::default()
        };
        let Some(record) = records.iter().find(|r| r.key == EntityKey::Cluster) else {
            return Ok(current);
        };
        let count = |field| record.get(field).round() as u64;
        let cpu = ResourceKind::Cpu;
        let ram = ResourceKind::Memory;

        current.timestamp = record.timestamp;
        current.on_demand_nodes = count(Field::NodeCount(BillingMode::OnDemand));
        current.spot_nodes = count(Field::NodeCount(BillingMode::Spot));
        current.period_nodes = count(Field::NodeCount(BillingMode::Monthly))
            + count(Field::NodeCount(BillingMode::Yearly));
        current.fallback_nodes = count(Field::NodeCount(BillingMode::Fallback));
        current.running_pods = count(Field::ScheduledPods(true));
        current.unscheduled_pods = count(Field::ScheduledPods(false));
        current.cpu_core_total = record.get(Field::ResourceCount(cpu));
        current.cpu_core_usage = record.get(Field::ResourceUsage(cpu));
        current.cpu_core_request = record.get(Field::ResourceRequest(cpu));
        current.cpu_core_available = record.get(Field::ResourceAvailable(cpu));
        current.cpu_core_system_taken = record.get(Field::ResourceSystemTaken(cpu));
        current.ram_gb_total = record.get(Field::ResourceCount(ram));
        current.ram_gb_usage = record.get(Field::ResourceUsage(ram));
        current.ram_gb_request = record.get(Field::ResourceRequest(ram));
        current.ram_gb_available = record.get(Field::ResourceAvailable(ram));
        current.ram_gb_system_taken = record.get(Field::ResourceSystemTaken(ram));
        Ok(current)
    }

    /// Cost of the month containing `now`, projected over the whole month
    pub async fn cluster_month_cost(&self, now: DateTime<Utc>) -> Result<MonthCostSummary> {
        let id = self.cluster_id();
        let window = TimeWindow::current_month(now)?;
        let span = window.duration_seconds();
        let at = Some(window.end);
        let cluster = EntityMapping::Cluster;
        let cpu = [resource_matcher(ResourceKind::Cpu)];

        let dims = [
            Dimension::instant(
                "month_cost",
                promql::accumulated(&schema::NODE_TOTAL_HOURLY_COST, id, &[], span, &[]),
                at,
                cluster,
                FieldMapping::Fixed(Field::TotalCost),
            )
            .single(),
            Dimension::instant(
                "month_cpu_cost",
                promql::accumulated(&schema::NODE_RESOURCE_HOURLY_COST, id, &cpu, span, &[]),
                at,
                cluster,
                FieldMapping::Fixed(Field::ResourceCost(ResourceKind::Cpu)),
            ),
            Dimension::instant(
                "month_cpu_core_hours",
                promql::accumulated(&schema::NODE_RESOURCE_TOTAL, id, &cpu, span, &[]),
                at,
                cluster,
                FieldMapping::Fixed(Field::ResourceCount(ResourceKind::Cpu)),
            ),
            Dimension::instant(
                "month_active_seconds",
                promql::active_seconds(id, span),
                at,
                cluster,
                FieldMapping::Fixed(Field::ActiveSeconds),
            )
            .single(),
        ];

        let records = self.run_view("cluster_month_cost", &window, &dims).await?;
        let record = records
            .iter()
            .find(|r| r.key == EntityKey::Cluster)
            .cloned()
            .unwrap_or_else(|| CostRecord::new(EntityKey::Cluster, window.end));

        Ok(MonthCostSummary::project(
            window.start,
            window.end,
            record.get(Field::TotalCost),
            record.get(Field::ActiveSeconds),
            record.get(Field::ResourceCost(ResourceKind::Cpu)),
            record.get(Field::ResourceCount(ResourceKind::Cpu)),
        ))
    }
}
