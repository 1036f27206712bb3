//! Agent configuration

use anyhow::{Context, Result};
use cost_lib::emitter::EmitterConfig;
use cost_lib::pricing::{
    DefaultPricing, PricingConfig, DEFAULT_CPU_RAM_RATIO, DEFAULT_QUOTE_URL, DEFAULT_SPEC_URL,
};
use cost_lib::CostError;
use serde::Deserialize;
use std::time::Duration;

/// Agent configuration, read from `COSTWISE_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name of the cluster, required
    #[serde(default)]
    pub cluster_name: String,

    /// Cluster id; detected from nodes or kube-system when empty
    #[serde(default)]
    pub cluster_id: String,

    /// `ack`, `default`, or empty to detect
    #[serde(default)]
    pub cloud_provider: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Emitter tick interval in seconds
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval_secs: u64,

    #[serde(default = "default_cpu_memory_cost_ratio")]
    pub cpu_memory_cost_ratio: f64,

    #[serde(default = "default_cpu_core_hour_price")]
    pub custom_cpu_core_hour_price: f64,

    #[serde(default = "default_ram_gb_hour_price")]
    pub custom_ram_gb_hour_price: f64,

    #[serde(default)]
    pub cpu_core_reserved: f64,

    #[serde(default)]
    pub ram_gb_reserved: f64,

    #[serde(default = "default_spec_url")]
    pub pricing_spec_url: String,

    #[serde(default = "default_quote_url")]
    pub pricing_quote_url: String,
}

fn default_api_port() -> u16 {
    8080
}

fn default_scrape_interval() -> u64 {
    15
}

fn default_cpu_memory_cost_ratio() -> f64 {
    DEFAULT_CPU_RAM_RATIO
}

fn default_cpu_core_hour_price() -> f64 {
    DefaultPricing::default().cpu_core_hourly
}

fn default_ram_gb_hour_price() -> f64 {
    DefaultPricing::default().ram_gib_hourly
}

fn default_spec_url() -> String {
    DEFAULT_SPEC_URL.to_string()
}

fn default_quote_url() -> String {
    DEFAULT_QUOTE_URL.to_string()
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let source = config::Config::builder()
            .add_source(config::Environment::with_prefix("COSTWISE"))
            .build()
            .context("Failed to read configuration")?;

        Self::from_config(source)
    }

    fn from_config(source: config::Config) -> Result<Self> {
        let config: AgentConfig = source
            .try_deserialize()
            .context("Invalid agent configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CostError> {
        if self.cluster_name.is_empty() {
            return Err(CostError::Config(
                "COSTWISE_CLUSTER_NAME must be set".to_string(),
            ));
        }
        if self.scrape_interval_secs == 0 {
            return Err(CostError::Config(
                "scrape interval must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pricing(&self) -> PricingConfig {
        PricingConfig {
            cloud_provider: self.cloud_provider.clone(),
            cpu_ram_ratio: self.cpu_memory_cost_ratio,
            default_pricing: DefaultPricing {
                cpu_core_hourly: self.custom_cpu_core_hour_price,
                ram_gib_hourly: self.custom_ram_gb_hour_price,
                cpu_core_reserved: self.cpu_core_reserved,
                ram_gib_reserved: self.ram_gb_reserved,
            },
            spec_url: self.pricing_spec_url.clone(),
            quote_url: self.pricing_quote_url.clone(),
        }
    }

    pub fn emitter(&self) -> EmitterConfig {
        EmitterConfig::uniform(Duration::from_secs(self.scrape_interval_secs))
    }

    /// Configured cluster id, `None` when it should be detected
    pub fn configured_cluster_id(&self) -> Option<&str> {
        Some(self.cluster_id.as_str()).filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(pairs: &[(&str, &str)]) -> config::Config {
        let mut builder = config::Config::builder();
        for (key, value) in pairs {
            builder = builder.set_override(*key, *value).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_defaults_apply() {
        let config = AgentConfig::from_config(build(&[("cluster_name", "prod")])).unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.scrape_interval_secs, 15);
        assert_eq!(config.cpu_memory_cost_ratio, 3.0);
        assert_eq!(config.configured_cluster_id(), None);
        assert_eq!(config.pricing().default_pricing.cpu_core_hourly, 0.08);
        assert_eq!(config.emitter().node_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_missing_cluster_name_is_rejected() {
        let err = AgentConfig::from_config(build(&[("api_port", "9000")])).unwrap_err();
        assert!(err.to_string().contains("COSTWISE_CLUSTER_NAME"));
    }

    #[test]
    fn test_overrides_flow_into_pricing() {
        let config = AgentConfig::from_config(build(&[
            ("cluster_name", "prod"),
            ("cluster_id", "c-123"),
            ("cloud_provider", "ack"),
            ("custom_ram_gb_hour_price", "0.05"),
            ("ram_gb_reserved", "1.5"),
        ]))
        .unwrap();

        assert_eq!(config.configured_cluster_id(), Some("c-123"));
        let pricing = config.pricing();
        assert_eq!(pricing.cloud_provider, "ack");
        assert_eq!(pricing.default_pricing.ram_gib_hourly, 0.05);
        assert_eq!(pricing.default_pricing.ram_gib_reserved, 1.5);
    }
}
