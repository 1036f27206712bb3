//! Read side of the pipeline
//!
//! - [`client`]: PromQL over HTTP against the metrics backend
//! - [`promql`]: query composition from the metric schema
//! - [`aggregator`]: concurrent dimension queries joined into records
//! - [`views`]: typed cost views for callers

pub mod aggregator;
pub mod client;
pub mod promql;
pub mod views;


pub use aggregator::{
    AggregatorConfig, Cardinality, Dimension, EntityMapping, FieldMapping, Normalize,
    QueryAggregator, QueryMode,
};
pub use client::{MetricsBackend, PromClient, Series};
pub use views::{
    AggregateBy, ClusterCostPoint, ClusterCurrentMetrics, EntityCost, MonthCostSummary,
    ResourcePoint,
};
