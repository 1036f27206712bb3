//! Cached hourly price resolution per (region, instance type)

use super::backend::{InstanceSpec, PricingBackend};
use crate::error::{CostError, Result};
use crate::models::{BillingMode, InstancePrice};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Default CPU:RAM cost ratio
pub const DEFAULT_CPU_RAM_RATIO: f64 = 3.0;

/// Resolves and caches instance prices from a pricing backend
///
/// The spec catalog and the price quotes live in two caches, each behind
/// its own lock. A lock is never held across a backend call: concurrent
/// misses on the same key may fetch twice, and both store the same value.
/// Failures are returned to the caller and never cached.
pub struct PriceResolver {
    backend: Arc<dyn PricingBackend>,
    cpu_ram_ratio: f64,
    cloud_provider: String,
    specs: Mutex<HashMap<String, InstanceSpec>>,
    prices: Mutex<HashMap<(String, String), f64>>,
}

impl PriceResolver {
    pub fn new(
        backend: Arc<dyn PricingBackend>,
        cpu_ram_ratio: f64,
        cloud_provider: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            cpu_ram_ratio,
            cloud_provider: cloud_provider.into(),
            specs: Mutex::new(HashMap::new()),
            prices: Mutex::new(HashMap::new()),
        }
    }

    pub fn cpu_ram_ratio(&self) -> f64 {
        self.cpu_ram_ratio
    }

    /// Hourly price of `instance_type` in `region`
    pub async fn hourly_price(&self, region: &str, instance_type: &str) -> Result<InstancePrice> {
        let spec = self.instance_spec(region, instance_type).await?;
        let total = self.quote(region, instance_type).await?;
        let (cpu_hourly, ram_hourly) = InstancePrice::split_hourly(total, self.cpu_ram_ratio);

        Ok(InstancePrice {
            region: region.to_string(),
            instance_type: instance_type.to_string(),
            total_hourly: total,
            cpu_hourly,
            ram_hourly,
            cpu_core_count: spec.cpu_cores,
            ram_capacity_gib: spec.memory_gib,
            billing_mode: BillingMode::OnDemand,
            billing_period: 0,
            cloud_provider: self.cloud_provider.clone(),
        })
    }

    async fn instance_spec(&self, region: &str, instance_type: &str) -> Result<InstanceSpec> {
        if let Some(spec) = self.specs.lock().await.get(instance_type) {
            return Ok(*spec);
        }

        info!(instance_type = %instance_type, "Instance type not cached, fetching catalog");
        let catalog = self.backend.fetch_catalog().await?;

        let mut specs = self.specs.lock().await;
        for (name, spec) in catalog {
            specs.entry(name).or_insert(spec);
        }
        specs
            .get(instance_type)
            .copied()
            .ok_or_else(|| CostError::PriceResolution {
                region: region.to_string(),
                instance_type: instance_type.to_string(),
                reason: "instance type not found in catalog".to_string(),
            })
    }

    async fn quote(&self, region: &str, instance_type: &str) -> Result<f64> {
        let key = (region.to_string(), instance_type.to_string());
        if let Some(price) = self.prices.lock().await.get(&key) {
            return Ok(*price);
        }

        let price = self.backend.fetch_quote(region, instance_type).await?;
        debug!(region = %region, instance_type = %instance_type, price, "Caching price quote");

        self.prices.lock().await.insert(key, price);
        Ok(price)
    }

    /// Number of cached price quotes
    pub async fn cached_prices(&self) -> usize {
        self.prices.lock().await.len()
    }
}
