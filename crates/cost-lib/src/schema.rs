//! Metric names and their fixed label schemas
//!
//! Every gauge the emitter writes is declared here exactly once. The
//! Prometheus sink registers from this table and the query templates read
//! the same names, so a series written by one side is always found by the
//! other.

/// Label keys
pub mod labels {
    pub const CLUSTER_NAME: &str = "cluster_name";
    pub const CLUSTER_ID: &str = "cluster_id";
    pub const NAMESPACE: &str = "namespace";
    pub const LABELS: &str = "labels";
    pub const RESOURCE: &str = "resource";
    pub const BILLING_MODE: &str = "billing_mode";
    pub const NODE: &str = "node";
    pub const CONTAINER: &str = "container";
    pub const WORKLOAD_TYPE: &str = "workload_type";
    pub const WORKLOAD_NAME: &str = "workload_name";
    pub const INSTANCE_TYPE: &str = "instance_type";
    pub const BILLING_PERIOD: &str = "billing_period";
    pub const REGION: &str = "region";
    pub const CLOUD_PROVIDER: &str = "cloud_provider";
    pub const POD: &str = "pod";
    pub const SCHEDULED: &str = "scheduled";
}

/// Values of the `resource` label that are not a resource kind
pub mod values {
    pub const COST: &str = "cost";
    pub const POD: &str = "pod";
}

/// Workload kinds the emitter aggregates pods into
pub mod workload_types {
    pub const DEPLOYMENT: &str = "deployment";
    pub const STATEFULSET: &str = "statefulset";
    pub const DAEMONSET: &str = "daemonset";

    pub const ALL: [&str; 3] = [DEPLOYMENT, STATEFULSET, DAEMONSET];
}

use labels::*;

const METRIC_PREFIX: &str = "costwise_";

/// A gauge name together with its ordered label keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSchema {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

impl MetricSchema {
    /// Full exported name including the prefix
    pub fn full_name(&self) -> String {
        format!("{}{}", METRIC_PREFIX, self.name)
    }
}

const NODE_COST_LABELS: &[&str] = &[
    NODE,
    INSTANCE_TYPE,
    BILLING_MODE,
    BILLING_PERIOD,
    REGION,
    CLOUD_PROVIDER,
    CLUSTER_NAME,
    CLUSTER_ID,
];

const NODE_RESOURCE_COST_LABELS: &[&str] = &[
    NODE,
    INSTANCE_TYPE,
    BILLING_MODE,
    BILLING_PERIOD,
    REGION,
    CLOUD_PROVIDER,
    CLUSTER_NAME,
    CLUSTER_ID,
    RESOURCE,
];

const NODE_RESOURCE_LABELS: &[&str] = &[NODE, CLUSTER_NAME, CLUSTER_ID, RESOURCE, BILLING_MODE];

const POD_COST_LABELS: &[&str] = &[
    NAMESPACE,
    POD,
    CLUSTER_NAME,
    CLUSTER_ID,
    RESOURCE,
    SCHEDULED,
    LABELS,
];

const POD_RESOURCE_LABELS: &[&str] = &[
    NAMESPACE,
    POD,
    CLUSTER_NAME,
    CLUSTER_ID,
    RESOURCE,
    LABELS,
    CONTAINER,
];

const WORKLOAD_LABELS: &[&str] = &[
    WORKLOAD_TYPE,
    WORKLOAD_NAME,
    NAMESPACE,
    CLUSTER_NAME,
    CLUSTER_ID,
    LABELS,
    RESOURCE,
];

const WORKLOAD_RESOURCE_LABELS: &[&str] = &[
    WORKLOAD_TYPE,
    WORKLOAD_NAME,
    NAMESPACE,
    CLUSTER_NAME,
    CLUSTER_ID,
    LABELS,
    RESOURCE,
    CONTAINER,
];

pub const CLUSTER_ACTIVE: MetricSchema = MetricSchema {
    name: "cluster_active",
    help: "Set to 1 while the agent of a cluster is reporting",
    labels: &[REGION, CLOUD_PROVIDER, CLUSTER_NAME, CLUSTER_ID],
};

pub const NODE_CPU_CORE_HOURLY_COST: MetricSchema = MetricSchema {
    name: "node_cpu_core_hourly_cost",
    help: "Hourly price of one CPU core on the node",
    labels: NODE_COST_LABELS,
};

pub const NODE_RAM_GB_HOURLY_COST: MetricSchema = MetricSchema {
    name: "node_ram_gb_hourly_cost",
    help: "Hourly price of one GiB of memory on the node",
    labels: NODE_COST_LABELS,
};

pub const NODE_TOTAL_HOURLY_COST: MetricSchema = MetricSchema {
    name: "node_total_hourly_cost",
    help: "Hourly price of the whole node",
    labels: NODE_COST_LABELS,
};

pub const NODE_RESOURCE_HOURLY_COST: MetricSchema = MetricSchema {
    name: "node_resource_hourly_cost",
    help: "Hourly price of the full capacity of one resource on the node",
    labels: NODE_RESOURCE_COST_LABELS,
};

pub const NODE_RESOURCE_TOTAL: MetricSchema = MetricSchema {
    name: "node_resource_total",
    help: "Resource total the node is priced for, in cores or GiB",
    labels: NODE_RESOURCE_LABELS,
};

pub const NODE_RESOURCE_CAPACITY: MetricSchema = MetricSchema {
    name: "node_resource_capacity",
    help: "Resource capacity reported by the kubelet",
    labels: NODE_RESOURCE_LABELS,
};

pub const NODE_RESOURCE_ALLOCATABLE: MetricSchema = MetricSchema {
    name: "node_resource_allocatable",
    help: "Resource allocatable as advertised by the kubelet",
    labels: NODE_RESOURCE_LABELS,
};

pub const NODE_RESOURCE_SYSTEM_TAKEN: MetricSchema = MetricSchema {
    name: "node_resource_system_taken",
    help: "Resource total minus allocatable",
    labels: NODE_RESOURCE_LABELS,
};

pub const NODE_RESOURCE_AVAILABLE: MetricSchema = MetricSchema {
    name: "node_resource_available",
    help: "Resource allocatable minus requested",
    labels: NODE_RESOURCE_LABELS,
};

pub const NODE_RESOURCE_USAGE: MetricSchema = MetricSchema {
    name: "node_resource_usage",
    help: "Resource usage reported by the usage source",
    labels: NODE_RESOURCE_LABELS,
};

pub const POD_RESOURCE_COST: MetricSchema = MetricSchema {
    name: "pod_resource_cost",
    help: "Hourly cost attributed to the pod from its requests",
    labels: POD_COST_LABELS,
};

pub const POD_RESOURCE_REQUEST: MetricSchema = MetricSchema {
    name: "pod_resource_request",
    help: "Resource request of one container of the pod",
    labels: POD_RESOURCE_LABELS,
};

pub const POD_RESOURCE_USAGE: MetricSchema = MetricSchema {
    name: "pod_resource_usage",
    help: "Resource usage of one container of the pod",
    labels: POD_RESOURCE_LABELS,
};

pub const WORKLOAD_RESOURCE_COST: MetricSchema = MetricSchema {
    name: "workload_resource_cost",
    help: "Hourly cost of the scheduled pods of a workload",
    labels: WORKLOAD_LABELS,
};

pub const WORKLOAD_POD_COUNT: MetricSchema = MetricSchema {
    name: "workload_pod_count",
    help: "Number of pods selected by a workload",
    labels: WORKLOAD_LABELS,
};

pub const WORKLOAD_RESOURCE_REQUEST: MetricSchema = MetricSchema {
    name: "workload_resource_request",
    help: "Resource request of one container summed over a workload's pods",
    labels: WORKLOAD_RESOURCE_LABELS,
};

pub const WORKLOAD_RESOURCE_USAGE: MetricSchema = MetricSchema {
    name: "workload_resource_usage",
    help: "Resource usage of one container summed over a workload's pods",
    labels: WORKLOAD_RESOURCE_LABELS,
};

/// Every schema the emitter may write
pub const ALL: &[MetricSchema] = &[
    CLUSTER_ACTIVE,
    NODE_CPU_CORE_HOURLY_COST,
    NODE_RAM_GB_HOURLY_COST,
    NODE_TOTAL_HOURLY_COST,
    NODE_RESOURCE_HOURLY_COST,
    NODE_RESOURCE_TOTAL,
    NODE_RESOURCE_CAPACITY,
    NODE_RESOURCE_ALLOCATABLE,
    NODE_RESOURCE_SYSTEM_TAKEN,
    NODE_RESOURCE_AVAILABLE,
    NODE_RESOURCE_USAGE,
    POD_RESOURCE_COST,
    POD_RESOURCE_REQUEST,
    POD_RESOURCE_USAGE,
    WORKLOAD_RESOURCE_COST,
    WORKLOAD_POD_COUNT,
    WORKLOAD_RESOURCE_REQUEST,
    WORKLOAD_RESOURCE_USAGE,
];

/// Look up a schema by its unprefixed name
pub fn find(name: &str) -> Option<&'static MetricSchema> {
    ALL.iter().find(|s| s.name == name)
}
