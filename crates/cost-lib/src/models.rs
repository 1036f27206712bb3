//! Core data models for cost accounting

use crate::error::{CostError, Result};
use crate::units::{HOUR_IN_SECONDS, SAMPLE_PERIOD_SECONDS};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Pricing model of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingMode {
    OnDemand,
    Monthly,
    Yearly,
    Spot,
    Fallback,
}

impl BillingMode {
    pub const ALL: [BillingMode; 5] = [
        BillingMode::OnDemand,
        BillingMode::Monthly,
        BillingMode::Yearly,
        BillingMode::Spot,
        BillingMode::Fallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingMode::OnDemand => "ondemand",
            BillingMode::Monthly => "monthly",
            BillingMode::Yearly => "yearly",
            BillingMode::Spot => "spot",
            BillingMode::Fallback => "fallback",
        }
    }

    /// Reserved-capacity modes, reported together as "period" cost
    pub fn is_period(&self) -> bool {
        matches!(self, BillingMode::Monthly | BillingMode::Yearly)
    }
}

impl fmt::Display for BillingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingMode {
    type Err = CostError;

    fn from_str(s: &str) -> Result<Self> {
        BillingMode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| CostError::Config(format!("unknown billing mode {s:?}")))
    }
}

/// Resource dimension tracked and priced per node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Memory,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Cpu, ResourceKind::Memory];

    /// Kubernetes resource name, also used as the `resource` label value
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
        }
    }

    /// Unit the normalized values are reported in
    pub fn unit(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "core",
            ResourceKind::Memory => "gb",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = CostError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cpu" => Ok(ResourceKind::Cpu),
            "memory" | "ram" => Ok(ResourceKind::Memory),
            other => Err(CostError::Config(format!("unknown resource {other:?}"))),
        }
    }
}

/// Hourly price of one node, immutable once resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstancePrice {
    pub region: String,
    pub instance_type: String,
    pub total_hourly: f64,
    pub cpu_hourly: f64,
    pub ram_hourly: f64,
    pub cpu_core_count: f64,
    pub ram_capacity_gib: f64,
    pub billing_mode: BillingMode,
    /// Reservation length in months, 0 for on-demand
    pub billing_period: u32,
    pub cloud_provider: String,
}

impl InstancePrice {
    /// Split a total hourly price into per-core and per-GiB parts
    ///
    /// With ratio `r` one core costs `r` times one GiB relative to the whole
    /// node price: `cpu = total*r/(r+1)`, `ram = total/(r+1)`.
    pub fn split_hourly(total_hourly: f64, cpu_ram_ratio: f64) -> (f64, f64) {
        let denom = cpu_ram_ratio + 1.0;
        (total_hourly * cpu_ram_ratio / denom, total_hourly / denom)
    }

    pub fn hourly_for(&self, resource: ResourceKind) -> f64 {
        match resource {
            ResourceKind::Cpu => self.cpu_hourly,
            ResourceKind::Memory => self.ram_hourly,
        }
    }

    /// Capacity the price was computed for, in cores or GiB
    pub fn capacity_for(&self, resource: ResourceKind) -> f64 {
        match resource {
            ResourceKind::Cpu => self.cpu_core_count,
            ResourceKind::Memory => self.ram_capacity_gib,
        }
    }

    /// Hourly cost of the whole capacity of one resource
    pub fn resource_hourly_cost(&self, resource: ResourceKind) -> f64 {
        self.hourly_for(resource) * self.capacity_for(resource)
    }
}

/// Allocatable and requested resources of one tracked node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeResourceRecord {
    pub node_name: String,
    pub allocatable: BTreeMap<ResourceKind, f64>,
    pub requested: BTreeMap<ResourceKind, f64>,
}

impl NodeResourceRecord {
    pub fn new(node_name: impl Into<String>, allocatable: BTreeMap<ResourceKind, f64>) -> Self {
        Self {
            node_name: node_name.into(),
            allocatable,
            requested: BTreeMap::new(),
        }
    }

    pub fn allocatable(&self, resource: ResourceKind) -> f64 {
        self.allocatable.get(&resource).copied().unwrap_or(0.0)
    }

    pub fn requested(&self, resource: ResourceKind) -> f64 {
        self.requested.get(&resource).copied().unwrap_or(0.0)
    }

    /// Allocatable minus requested
    pub fn available(&self, resource: ResourceKind) -> f64 {
        self.allocatable(resource) - self.requested(resource)
    }

    /// Reported total capacity minus what the kubelet advertises as allocatable
    pub fn system_taken(&self, resource: ResourceKind, total: f64) -> f64 {
        total - self.allocatable(resource)
    }
}

/// Query window in unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
    pub step_seconds: u64,
}

impl TimeWindow {
    /// Default step for range views
    pub const DEFAULT_STEP_SECONDS: u64 = HOUR_IN_SECONDS;

    /// Default step for detailed per-entity views
    pub const DETAIL_STEP_SECONDS: u64 = 600;

    pub fn new(start: i64, end: i64, step_seconds: u64) -> Result<Self> {
        if end <= start {
            return Err(CostError::Config(format!(
                "window end {end} must be after start {start}"
            )));
        }
        if step_seconds < SAMPLE_PERIOD_SECONDS {
            return Err(CostError::Config(format!(
                "step {step_seconds}s is below the {SAMPLE_PERIOD_SECONDS}s sampling floor"
            )));
        }
        Ok(Self {
            start,
            end,
            step_seconds,
        })
    }

    /// Most points a range query may ask the backend for
    pub const MAX_POINTS: u64 = 10_000;

    /// Window with a step picked so the range stays under [`Self::MAX_POINTS`]
    pub fn auto_step(start: i64, end: i64) -> Result<Self> {
        let span = (end - start).max(0) as u64;
        Self::new(start, end, Self::min_resolution(span))
    }

    fn min_resolution(span: u64) -> u64 {
        (span / Self::MAX_POINTS).max(SAMPLE_PERIOD_SECONDS)
    }

    /// Point spacing to request from the backend
    ///
    /// `step_seconds` stays the lookback and normalization period of the
    /// query itself; only the returned resolution is coarsened for windows
    /// that would exceed [`Self::MAX_POINTS`].
    pub fn resolution_seconds(&self) -> u64 {
        self.step_seconds
            .max(Self::min_resolution(self.duration_seconds()))
    }

    /// From the first second of the month containing `now` up to `now`
    pub fn current_month(now: DateTime<Utc>) -> Result<Self> {
        let start = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .ok_or_else(|| CostError::Config("cannot compute month start".to_string()))?;
        let end = now.timestamp().max(start.timestamp() + SAMPLE_PERIOD_SECONDS as i64);
        Self::new(start.timestamp(), end, Self::DEFAULT_STEP_SECONDS)
    }

    pub fn duration_seconds(&self) -> u64 {
        (self.end - self.start) as u64
    }
}

/// Stable identifier used to join independently queried dimensions
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntityKey {
    Cluster,
    Namespace {
        namespace: String,
    },
    Workload {
        workload_type: String,
        namespace: String,
        name: String,
    },
    Pod {
        namespace: String,
        name: String,
    },
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Cluster => f.write_str("cluster"),
            EntityKey::Namespace { namespace } => write!(f, "namespace/{namespace}"),
            EntityKey::Workload {
                workload_type,
                namespace,
                name,
            } => write!(f, "{workload_type}/{namespace}/{name}"),
            EntityKey::Pod { namespace, name } => write!(f, "pod/{namespace}/{name}"),
        }
    }
}

/// Name and id of the cluster every emitted series is labeled with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterIdentity {
    pub cluster_name: String,
    pub cluster_id: String,
}

impl ClusterIdentity {
    pub fn new(cluster_name: impl Into<String>, cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            cluster_id: cluster_id.into(),
        }
    }

    /// Fails with a configuration error when the name or id is missing
    pub fn validate(&self) -> Result<()> {
        if self.cluster_name.is_empty() {
            return Err(CostError::Config("cluster name is required".to_string()));
        }
        if self.cluster_id.is_empty() {
            return Err(CostError::Config("cluster id is required".to_string()));
        }
        Ok(())
    }
}

/// A field of a joined cost record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    TotalCost,
    ModeCost(BillingMode),
    ResourceCost(ResourceKind),
    /// Average capacity over the step
    ResourceCount(ResourceKind),
    ResourceUsage(ResourceKind),
    ResourceRequest(ResourceKind),
    ResourceAvailable(ResourceKind),
    ResourceSystemTaken(ResourceKind),
    PodCount,
    ScheduledPods(bool),
    NodeCount(BillingMode),
    ActiveSeconds,
}

/// One joined record keyed by entity and timestamp
///
/// Fields not written by any dimension read as zero.
#[derive(Debug, Clone, PartialEq)]
pub struct CostRecord {
    pub key: EntityKey,
    pub timestamp: i64,
    pub values: BTreeMap<Field, f64>,
}

impl CostRecord {
    pub fn new(key: EntityKey, timestamp: i64) -> Self {
        Self {
            key,
            timestamp,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: Field) -> f64 {
        self.values.get(&field).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, field: Field, value: f64) {
        self.values.insert(field, value);
    }

    /// Whether some dimension wrote this field
    pub fn has(&self, field: Field) -> bool {
        self.values.contains_key(&field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_split_default_ratio() {
        let (cpu, ram) = InstancePrice::split_hourly(1.0, 3.0);
        assert!((cpu - 0.75).abs() < 1e-12);
        assert!((ram - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_billing_mode_round_trip_names() {
        for mode in BillingMode::ALL {
            assert_eq!(mode.as_str().parse::<BillingMode>().unwrap(), mode);
        }
        assert!("weekly".parse::<BillingMode>().is_err());
    }

    #[test]
    fn test_time_window_rejects_small_step() {
        assert!(TimeWindow::new(0, 3600, 14).is_err());
        assert!(TimeWindow::new(0, 3600, 15).is_ok());
        assert!(TimeWindow::new(100, 100, 60).is_err());
    }

    #[test]
    fn test_resolution_coarsened_for_long_windows() {
        let hours = TimeWindow::new(0, 7200, 60).unwrap();
        assert_eq!(hours.resolution_seconds(), 60);

        // 30 days at 15s would be 172800 points
        let month = TimeWindow::new(0, 30 * 86_400, 15).unwrap();
        assert_eq!(month.resolution_seconds(), 259);
        assert_eq!(month.step_seconds, 15);
        assert!(month.duration_seconds() / month.resolution_seconds() <= TimeWindow::MAX_POINTS);
    }

    #[test]
    fn test_time_window_auto_step_floor() {
        let w = TimeWindow::auto_step(0, 3600).unwrap();
        assert_eq!(w.step_seconds, 15);

        let w = TimeWindow::auto_step(0, 1_000_000).unwrap();
        assert_eq!(w.step_seconds, 100);
    }

    #[test]
    fn test_current_month_starts_on_first() {
        let now = Utc.with_ymd_and_hms(2024, 3, 17, 12, 0, 0).unwrap();
        let w = TimeWindow::current_month(now).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(w.start, start.timestamp());
        assert_eq!(w.end, now.timestamp());
    }

    #[test]
    fn test_node_record_available_and_system_taken() {
        let mut alloc = BTreeMap::new();
        alloc.insert(ResourceKind::Cpu, 3.5);
        let mut record = NodeResourceRecord::new("n1", alloc);
        record.requested.insert(ResourceKind::Cpu, 1.0);

        assert_eq!(record.available(ResourceKind::Cpu), 2.5);
        assert_eq!(record.system_taken(ResourceKind::Cpu, 4.0), 0.5);
        assert_eq!(record.available(ResourceKind::Memory), 0.0);
    }

    #[test]
    fn test_cluster_identity_validation() {
        assert!(ClusterIdentity::new("", "id").validate().is_err());
        assert!(ClusterIdentity::new("prod", "").validate().is_err());
        assert!(ClusterIdentity::new("prod", "id").validate().is_ok());
    }

    #[test]
    fn test_entity_key_display() {
        let key = EntityKey::Workload {
            workload_type: "deployment".into(),
            namespace: "default".into(),
            name: "web".into(),
        };
        assert_eq!(key.to_string(), "deployment/default/web");
    }
}
