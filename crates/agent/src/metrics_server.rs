//! Usage source backed by the `metrics.k8s.io/v1beta1` API

use async_trait::async_trait;
use cost_lib::tracker::ResourceAmounts;
use cost_lib::usage::{node_usage_from_json, pod_usage_from_json, ContainerUsage, UsageSource};
use cost_lib::{CostError, Result};
use kube::api::{Api, ListParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::Client;
use std::collections::HashMap;
use tracing::warn;

const METRICS_GROUP: &str = "metrics.k8s.io";
const METRICS_VERSION: &str = "v1beta1";

fn metrics_resource(kind: &str, plural: &str) -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(METRICS_GROUP, METRICS_VERSION, kind),
        plural,
    )
}

/// Reads node and pod usage from metrics-server
pub struct MetricsServerUsage {
    nodes: Api<DynamicObject>,
    pods: Api<DynamicObject>,
}

impl MetricsServerUsage {
    pub fn new(client: Client) -> Self {
        Self {
            nodes: Api::all_with(client.clone(), &metrics_resource("NodeMetrics", "nodes")),
            pods: Api::all_with(client, &metrics_resource("PodMetrics", "pods")),
        }
    }

    async fn list(api: &Api<DynamicObject>, what: &str) -> Result<Vec<DynamicObject>> {
        api.list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| CostError::UpstreamQuery(format!("listing {what} metrics: {e}")))
    }
}

#[async_trait]
impl UsageSource for MetricsServerUsage {
    async fn node_usage(&self) -> Result<HashMap<String, ResourceAmounts>> {
        let mut usage = HashMap::new();
        for item in Self::list(&self.nodes, "node").await? {
            let Some(name) = item.metadata.name.clone() else {
                continue;
            };
            match node_usage_from_json(&item.data["usage"]) {
                Ok(amounts) => {
                    usage.insert(name, amounts);
                }
                Err(e) => warn!(node = %name, error = %e, "Ignoring node metrics"),
            }
        }
        Ok(usage)
    }

    async fn pod_usage(&self) -> Result<HashMap<String, ContainerUsage>> {
        let mut usage = HashMap::new();
        for item in Self::list(&self.pods, "pod").await? {
            let meta = &item.metadata;
            let (Some(namespace), Some(name)) = (meta.namespace.as_deref(), meta.name.as_deref())
            else {
                continue;
            };
            let key = format!("{namespace}/{name}");
            match pod_usage_from_json(&item.data["containers"]) {
                Ok(containers) => {
                    usage.insert(key, containers);
                }
                Err(e) => warn!(pod = %key, error = %e, "Ignoring pod metrics"),
            }
        }
        Ok(usage)
    }
}
