//! Node price providers

use super::resolver::PriceResolver;
use super::PriceProvider;
use crate::error::{CostError, Result};
use crate::models::{BillingMode, InstancePrice};
use crate::units::{quantity_to_cores, quantity_to_gib};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use std::sync::Arc;

pub const REGION_LABEL: &str = "topology.kubernetes.io/region";
pub const INSTANCE_TYPE_LABEL: &str = "node.kubernetes.io/instance-type";
pub const ACK_CLUSTER_ID_LABEL: &str = "ack.aliyun.com";

pub const DEFAULT_INSTANCE_TYPE: &str = "default_instance_type";
pub const DEFAULT_REGION: &str = "default_region";

pub const CLOUD_PROVIDER_ACK: &str = "ack";
pub const CLOUD_PROVIDER_DEFAULT: &str = "default";

fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or_default()
}

fn node_label<'a>(node: &'a Node, key: &str) -> Result<&'a str> {
    node.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(String::as_str)
        .ok_or_else(|| {
            CostError::per_entity("node", node_name(node), format!("missing label {key}"))
        })
}

/// Prices nodes from the cloud catalog by region and instance-type labels
pub struct CatalogPriceProvider {
    resolver: Arc<PriceResolver>,
}

impl CatalogPriceProvider {
    pub fn new(resolver: Arc<PriceResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl PriceProvider for CatalogPriceProvider {
    fn name(&self) -> &'static str {
        CLOUD_PROVIDER_ACK
    }

    async fn node_hourly_price(&self, node: &Node) -> Result<InstancePrice> {
        let region = node_label(node, REGION_LABEL)?;
        let instance_type = node_label(node, INSTANCE_TYPE_LABEL)?;
        self.resolver.hourly_price(region, instance_type).await
    }

    fn cluster_id_from_nodes(&self, nodes: &[Node]) -> Option<String> {
        nodes.iter().find_map(|node| {
            node.metadata
                .labels
                .as_ref()
                .and_then(|labels| labels.get(ACK_CLUSTER_ID_LABEL))
                .cloned()
        })
    }
}

/// Flat per-core and per-GiB rates for clusters without a catalog
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultPricing {
    pub cpu_core_hourly: f64,
    pub ram_gib_hourly: f64,
    /// Added to reported core capacity to approximate node overhead
    pub cpu_core_reserved: f64,
    /// Added to reported GiB capacity to approximate node overhead
    pub ram_gib_reserved: f64,
}

impl Default for DefaultPricing {
    fn default() -> Self {
        Self {
            cpu_core_hourly: 0.08,
            ram_gib_hourly: 0.02,
            cpu_core_reserved: 0.0,
            ram_gib_reserved: 0.0,
        }
    }
}

pub struct DefaultPriceProvider {
    pricing: DefaultPricing,
}

impl DefaultPriceProvider {
    pub fn new(pricing: DefaultPricing) -> Self {
        Self { pricing }
    }
}

#[async_trait]
impl PriceProvider for DefaultPriceProvider {
    fn name(&self) -> &'static str {
        CLOUD_PROVIDER_DEFAULT
    }

    async fn node_hourly_price(&self, node: &Node) -> Result<InstancePrice> {
        let capacity = node
            .status
            .as_ref()
            .and_then(|s| s.capacity.as_ref())
            .ok_or_else(|| CostError::per_entity("node", node_name(node), "no reported capacity"))?;

        let cpu_cores = match capacity.get("cpu") {
            Some(q) => quantity_to_cores(q)?,
            None => 0.0,
        };
        let ram_gib = match capacity.get("memory") {
            Some(q) => quantity_to_gib(q)?,
            None => 0.0,
        };

        let p = &self.pricing;
        Ok(InstancePrice {
            region: DEFAULT_REGION.to_string(),
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
            total_hourly: p.cpu_core_hourly * cpu_cores + p.ram_gib_hourly * ram_gib,
            cpu_hourly: p.cpu_core_hourly,
            ram_hourly: p.ram_gib_hourly,
            cpu_core_count: cpu_cores + p.cpu_core_reserved,
            ram_capacity_gib: ram_gib + p.ram_gib_reserved,
            billing_mode: BillingMode::OnDemand,
            billing_period: 0,
            cloud_provider: CLOUD_PROVIDER_DEFAULT.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::backend::{InstanceSpec, PricingBackend};
    use k8s_openapi::api::core::v1::NodeStatus;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    struct StaticBackend;

    #[async_trait]
    impl PricingBackend for StaticBackend {
        async fn fetch_catalog(&self) -> Result<Vec<(String, InstanceSpec)>> {
            Ok(vec![(
                "ecs.c6.xlarge".to_string(),
                InstanceSpec {
                    cpu_cores: 4.0,
                    memory_gib: 8.0,
                },
            )])
        }

        async fn fetch_quote(&self, _region: &str, _instance_type: &str) -> Result<f64> {
            Ok(2.0)
        }
    }

    fn node(labels: &[(&str, &str)], cpu: &str, memory: &str) -> Node {
        let mut capacity = BTreeMap::new();
        capacity.insert("cpu".to_string(), Quantity(cpu.to_string()));
        capacity.insert("memory".to_string(), Quantity(memory.to_string()));
        Node {
            metadata: ObjectMeta {
                name: Some("node-a".to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            status: Some(NodeStatus {
                capacity: Some(capacity),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_default_provider_flat_rates_with_padding() {
        let provider = DefaultPriceProvider::new(DefaultPricing {
            cpu_core_reserved: 0.5,
            ram_gib_reserved: 1.0,
            ..Default::default()
        });

        let price = provider
            .node_hourly_price(&node(&[], "4", "16Gi"))
            .await
            .unwrap();

        assert!((price.total_hourly - (0.08 * 4.0 + 0.02 * 16.0)).abs() < 1e-9);
        assert_eq!(price.cpu_core_count, 4.5);
        assert_eq!(price.ram_capacity_gib, 17.0);
        assert_eq!(price.instance_type, DEFAULT_INSTANCE_TYPE);
        assert_eq!(price.region, DEFAULT_REGION);
    }

    #[tokio::test]
    async fn test_catalog_provider_uses_node_labels() {
        let resolver = Arc::new(PriceResolver::new(
            Arc::new(StaticBackend),
            3.0,
            CLOUD_PROVIDER_ACK,
        ));
        let provider = CatalogPriceProvider::new(resolver);

        let n = node(
            &[(REGION_LABEL, "cn-beijing"), (INSTANCE_TYPE_LABEL, "ecs.c6.xlarge")],
            "4",
            "8Gi",
        );
        let price = provider.node_hourly_price(&n).await.unwrap();

        assert_eq!(price.region, "cn-beijing");
        assert_eq!(price.cpu_core_count, 4.0);
        assert!((price.cpu_hourly - 1.5).abs() < 1e-12);
        assert!((price.ram_hourly - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_catalog_provider_missing_label_is_per_entity() {
        let resolver = Arc::new(PriceResolver::new(
            Arc::new(StaticBackend),
            3.0,
            CLOUD_PROVIDER_ACK,
        ));
        let provider = CatalogPriceProvider::new(resolver);

        let err = provider
            .node_hourly_price(&node(&[(REGION_LABEL, "cn-beijing")], "4", "8Gi"))
            .await
            .unwrap_err();
        assert!(err.is_per_entity());
    }

    #[test]
    fn test_catalog_provider_cluster_id_label() {
        let resolver = Arc::new(PriceResolver::new(
            Arc::new(StaticBackend),
            3.0,
            CLOUD_PROVIDER_ACK,
        ));
        let provider = CatalogPriceProvider::new(resolver);

        let nodes = vec![
            node(&[], "1", "1Gi"),
            node(&[(ACK_CLUSTER_ID_LABEL, "c-123")], "1", "1Gi"),
        ];
        assert_eq!(provider.cluster_id_from_nodes(&nodes).as_deref(), Some("c-123"));
    }
}
