//! HTTP client for the cloud pricing backend
//!
//! Two endpoints are used:
//! - a bulk instance-type catalog (type -> cpu cores, memory GiB)
//! - a single (region, instance type) pay-as-you-go hourly quote

use crate::error::{CostError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default catalog endpoint of the ack pricing backend
pub const DEFAULT_SPEC_URL: &str =
    "https://query.aliyun.com/rest/sell.ecs.allInstanceTypes?domain=aliyun&saleStrategy=PostPaid";

/// Default quote endpoint of the ack pricing backend
pub const DEFAULT_QUOTE_URL: &str =
    "https://buy-api.aliyun.com/price/getLightWeightPrice2.json?tenant=TenantCalculator";

/// CPU and memory shape of one instance type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceSpec {
    pub cpu_cores: f64,
    pub memory_gib: f64,
}

/// Source of instance catalogs and price quotes
#[async_trait]
pub trait PricingBackend: Send + Sync {
    /// Fetch the whole instance-type catalog
    async fn fetch_catalog(&self) -> Result<Vec<(String, InstanceSpec)>>;

    /// Fetch the hourly price of one instance type in one region
    async fn fetch_quote(&self, region: &str, instance_type: &str) -> Result<f64>;
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    data: CatalogData,
}

#[derive(Debug, Deserialize)]
struct CatalogData {
    components: CatalogComponents,
}

#[derive(Debug, Deserialize)]
struct CatalogComponents {
    instance_type: CatalogInstanceTypes,
}

#[derive(Debug, Deserialize)]
struct CatalogInstanceTypes {
    instance_type: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    instance_type_id: String,
    cpu_core_count: String,
    memory_size: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRequest {
    tenant: &'static str,
    configurations: Vec<QuoteConfiguration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteConfiguration {
    commodity_code: &'static str,
    spec_code: &'static str,
    charge_type: &'static str,
    order_type: &'static str,
    quantity: u32,
    duration: u32,
    pricing_cycle: &'static str,
    use_time_unit: &'static str,
    use_time_quantity: u32,
    components: Vec<QuoteComponent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteComponent {
    component_code: &'static str,
    instance_property: Vec<QuoteProperty>,
}

#[derive(Debug, Serialize)]
struct QuoteProperty {
    code: &'static str,
    value: String,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    data: QuoteData,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    order: QuoteOrder,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteOrder {
    trade_amount: f64,
}

impl QuoteRequest {
    fn hourly_postpaid(region: &str, instance_type: &str) -> Self {
        let component = |code: &'static str, value: &str| QuoteComponent {
            component_code: code,
            instance_property: vec![QuoteProperty {
                code,
                value: value.to_string(),
            }],
        };

        Self {
            tenant: "TenantCalculator",
            configurations: vec![QuoteConfiguration {
                commodity_code: "ecs",
                spec_code: "ecs",
                charge_type: "POSTPAY",
                order_type: "BUY",
                quantity: 1,
                duration: 1,
                pricing_cycle: "Hour",
                use_time_unit: "Hour",
                use_time_quantity: 1,
                components: vec![
                    component("vm_region_no", region),
                    component("instance_type", instance_type),
                ],
            }],
        }
    }
}

/// reqwest-backed pricing backend
pub struct HttpPricingBackend {
    client: Client,
    spec_url: Url,
    quote_url: Url,
}

impl HttpPricingBackend {
    pub fn new(spec_url: &str, quote_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CostError::Config(format!("failed to create HTTP client: {e}")))?;

        let spec_url = Url::parse(spec_url)
            .map_err(|e| CostError::Config(format!("invalid catalog URL: {e}")))?;
        let quote_url = Url::parse(quote_url)
            .map_err(|e| CostError::Config(format!("invalid quote URL: {e}")))?;

        Ok(Self {
            client,
            spec_url,
            quote_url,
        })
    }

    async fn read_success(response: reqwest::Response, what: &str) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CostError::UpstreamQuery(format!(
                "{what} returned {status}: {body}"
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl PricingBackend for HttpPricingBackend {
    async fn fetch_catalog(&self) -> Result<Vec<(String, InstanceSpec)>> {
        let response = self.client.get(self.spec_url.clone()).send().await?;
        let body = Self::read_success(response, "instance catalog").await?;

        let parsed: CatalogResponse = serde_json::from_str(&body)
            .map_err(|e| CostError::UpstreamQuery(format!("malformed instance catalog: {e}")))?;

        let listed = parsed.data.components.instance_type.instance_type;
        let mut specs = Vec::with_capacity(listed.len());
        for entry in listed {
            let memory_gib: f64 = entry.memory_size.parse().map_err(|_| {
                CostError::UpstreamQuery(format!(
                    "instance type {} has unparsable memory size {:?}",
                    entry.instance_type_id, entry.memory_size
                ))
            })?;

            let cpu_cores: f64 = match entry.cpu_core_count.parse() {
                Ok(v) => v,
                Err(_) => {
                    warn!(
                        instance_type = %entry.instance_type_id,
                        cpu_core_count = %entry.cpu_core_count,
                        "Skipping catalog entry with unparsable cpu count"
                    );
                    continue;
                }
            };

            specs.push((
                entry.instance_type_id,
                InstanceSpec {
                    cpu_cores,
                    memory_gib,
                },
            ));
        }

        debug!(entries = specs.len(), "Fetched instance catalog");
        Ok(specs)
    }

    async fn fetch_quote(&self, region: &str, instance_type: &str) -> Result<f64> {
        let request = QuoteRequest::hourly_postpaid(region, instance_type);
        let response = self
            .client
            .post(self.quote_url.clone())
            .json(&request)
            .send()
            .await?;
        let body = Self::read_success(response, "price quote").await?;

        let parsed: QuoteResponse = serde_json::from_str(&body)
            .map_err(|e| CostError::UpstreamQuery(format!("malformed price quote: {e}")))?;

        debug!(
            region = %region,
            instance_type = %instance_type,
            price = parsed.data.order.trade_amount,
            "Fetched price quote"
        );
        Ok(parsed.data.order.trade_amount)
    }
}
