//! Node pricing
//!
//! This module resolves the hourly price of a node. A [`PriceProvider`] is
//! picked once at startup by [`select_provider`]:
//! - `ack` prices nodes from the cloud instance catalog through a cached
//!   [`PriceResolver`]
//! - every other cloud falls back to flat per-core and per-GiB rates

mod backend;
mod provider;
mod resolver;

pub use backend::{
    HttpPricingBackend, InstanceSpec, PricingBackend, DEFAULT_QUOTE_URL, DEFAULT_SPEC_URL,
};
pub use provider::{
    CatalogPriceProvider, DefaultPriceProvider, DefaultPricing, ACK_CLUSTER_ID_LABEL,
    CLOUD_PROVIDER_ACK, CLOUD_PROVIDER_DEFAULT, INSTANCE_TYPE_LABEL, REGION_LABEL,
};
pub use resolver::{PriceResolver, DEFAULT_CPU_RAM_RATIO};

use crate::error::{CostError, Result};
use crate::models::{ClusterIdentity, InstancePrice};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use std::sync::Arc;
use tracing::{info, warn};

/// Strategy for pricing the nodes of one cluster
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Cloud provider name reported in series labels
    fn name(&self) -> &'static str;

    /// Hourly price of one node
    async fn node_hourly_price(&self, node: &Node) -> Result<InstancePrice>;

    /// Cluster id advertised by the cloud on the nodes, if any
    fn cluster_id_from_nodes(&self, _nodes: &[Node]) -> Option<String> {
        None
    }
}

/// Settings needed to build any of the providers
#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// `ack`, `default`, or empty to detect from node provider ids
    pub cloud_provider: String,
    pub cpu_ram_ratio: f64,
    pub default_pricing: DefaultPricing,
    pub spec_url: String,
    pub quote_url: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            cloud_provider: String::new(),
            cpu_ram_ratio: DEFAULT_CPU_RAM_RATIO,
            default_pricing: DefaultPricing::default(),
            spec_url: DEFAULT_SPEC_URL.to_string(),
            quote_url: DEFAULT_QUOTE_URL.to_string(),
        }
    }
}

/// Cloud family detected from a node `spec.providerID`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedCloud {
    Aws,
    Gce,
    Azure,
    Unknown,
}

pub fn detect_cloud(provider_id: &str) -> DetectedCloud {
    let id = provider_id.to_ascii_lowercase();
    if id.starts_with("aws") {
        DetectedCloud::Aws
    } else if id.starts_with("gce") {
        DetectedCloud::Gce
    } else if id.starts_with("azure") {
        DetectedCloud::Azure
    } else {
        DetectedCloud::Unknown
    }
}

/// Pick the price provider for this cluster
pub fn select_provider(config: &PricingConfig, nodes: &[Node]) -> Result<Arc<dyn PriceProvider>> {
    if config.cloud_provider == CLOUD_PROVIDER_ACK {
        info!("Using catalog pricing for ack");
        let backend = Arc::new(HttpPricingBackend::new(&config.spec_url, &config.quote_url)?);
        let resolver = Arc::new(PriceResolver::new(
            backend,
            config.cpu_ram_ratio,
            CLOUD_PROVIDER_ACK,
        ));
        return Ok(Arc::new(CatalogPriceProvider::new(resolver)));
    }

    if config.cloud_provider.is_empty() {
        let provider_id = nodes
            .first()
            .and_then(|n| n.spec.as_ref())
            .and_then(|s| s.provider_id.as_deref())
            .unwrap_or_default();

        match detect_cloud(provider_id) {
            DetectedCloud::Unknown => {}
            cloud => warn!(
                cloud = ?cloud,
                "No pricing catalog for this cloud, using default pricing"
            ),
        }
    }

    info!(
        cpu_core_hourly = config.default_pricing.cpu_core_hourly,
        ram_gib_hourly = config.default_pricing.ram_gib_hourly,
        "Using default pricing"
    );
    Ok(Arc::new(DefaultPriceProvider::new(config.default_pricing)))
}

/// Complete the cluster identity from configuration, node labels or the
/// kube-system namespace uid, in that order
pub fn resolve_cluster_identity(
    cluster_name: &str,
    configured_id: Option<&str>,
    provider: &dyn PriceProvider,
    nodes: &[Node],
    system_namespace_uid: Option<&str>,
) -> Result<ClusterIdentity> {
    if cluster_name.is_empty() {
        return Err(CostError::Config(
            "cluster name must be set in the agent configuration".to_string(),
        ));
    }

    let cluster_id = configured_id
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .or_else(|| provider.cluster_id_from_nodes(nodes))
        .or_else(|| system_namespace_uid.map(str::to_string))
        .unwrap_or_default();

    let identity = ClusterIdentity::new(cluster_name, cluster_id);
    identity.validate()?;
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::NodeSpec;

    fn node_with_provider(id: &str) -> Node {
        Node {
            spec: Some(NodeSpec {
                provider_id: Some(id.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_detect_cloud() {
        assert_eq!(detect_cloud("aws:///us-east-1a/i-123"), DetectedCloud::Aws);
        assert_eq!(detect_cloud("gce://project/zone/vm"), DetectedCloud::Gce);
        assert_eq!(detect_cloud("Azure:///subscriptions/x"), DetectedCloud::Azure);
        assert_eq!(detect_cloud("kind://docker/kind/node"), DetectedCloud::Unknown);
    }

    #[test]
    fn test_select_provider_explicit_ack() {
        let config = PricingConfig {
            cloud_provider: CLOUD_PROVIDER_ACK.to_string(),
            ..Default::default()
        };
        let provider = select_provider(&config, &[]).unwrap();
        assert_eq!(provider.name(), CLOUD_PROVIDER_ACK);
    }

    #[test]
    fn test_select_provider_falls_back_to_default() {
        let config = PricingConfig::default();
        let provider = select_provider(&config, &[node_with_provider("gce://p/z/vm")]).unwrap();
        assert_eq!(provider.name(), CLOUD_PROVIDER_DEFAULT);

        let provider = select_provider(&config, &[]).unwrap();
        assert_eq!(provider.name(), CLOUD_PROVIDER_DEFAULT);
    }

    #[test]
    fn test_resolve_cluster_identity_order() {
        let provider = DefaultPriceProvider::new(DefaultPricing::default());

        let id =
            resolve_cluster_identity("prod", Some("cfg-id"), &provider, &[], Some("uid")).unwrap();
        assert_eq!(id.cluster_id, "cfg-id");

        let id = resolve_cluster_identity("prod", Some(""), &provider, &[], Some("uid")).unwrap();
        assert_eq!(id.cluster_id, "uid");

        let err = resolve_cluster_identity("", None, &provider, &[], Some("uid")).unwrap_err();
        assert!(matches!(err, CostError::Config(_)));

        let err = resolve_cluster_identity("prod", None, &provider, &[], None).unwrap_err();
        assert!(matches!(err, CostError::Config(_)));
    }
}
