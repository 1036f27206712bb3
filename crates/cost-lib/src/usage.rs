//! Live resource usage
//!
//! Usage comes from outside the cluster cache (the metrics-server API in the
//! agent). Values are normalized to cores and GiB before they leave this
//! module.

use crate::error::{CostError, Result};
use crate::tracker::{resource_amounts, ResourceAmounts};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Per-container usage of one pod, keyed by container name
pub type ContainerUsage = BTreeMap<String, ResourceAmounts>;

/// Source of node and pod resource usage
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Usage of every node, keyed by node name
    async fn node_usage(&self) -> Result<HashMap<String, ResourceAmounts>>;

    /// Per-container usage of every pod, keyed by `namespace/name`
    async fn pod_usage(&self) -> Result<HashMap<String, ContainerUsage>>;
}

/// Usage source for clusters without a metrics API; reports nothing
pub struct NoUsage;

#[async_trait]
impl UsageSource for NoUsage {
    async fn node_usage(&self) -> Result<HashMap<String, ResourceAmounts>> {
        Ok(HashMap::new())
    }

    async fn pod_usage(&self) -> Result<HashMap<String, ContainerUsage>> {
        Ok(HashMap::new())
    }
}

#[derive(Deserialize)]
struct ContainerMetrics {
    name: String,
    #[serde(default)]
    usage: BTreeMap<String, Quantity>,
}

fn parse_error(what: &str, e: serde_json::Error) -> CostError {
    CostError::UpstreamQuery(format!("malformed {what} metrics: {e}"))
}

/// Parse the `usage` object of a `NodeMetrics` item
pub fn node_usage_from_json(usage: &serde_json::Value) -> Result<ResourceAmounts> {
    let list: BTreeMap<String, Quantity> =
        serde_json::from_value(usage.clone()).map_err(|e| parse_error("node", e))?;
    resource_amounts(Some(&list))
}

/// Parse the `containers` array of a `PodMetrics` item
pub fn pod_usage_from_json(containers: &serde_json::Value) -> Result<ContainerUsage> {
    let containers: Vec<ContainerMetrics> =
        serde_json::from_value(containers.clone()).map_err(|e| parse_error("pod", e))?;

    let mut usage = ContainerUsage::new();
    for container in containers {
        usage.insert(container.name, resource_amounts(Some(&container.usage))?);
    }
    Ok(usage)
}
