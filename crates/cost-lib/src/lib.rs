//! Cost accounting for Kubernetes clusters
//!
//! This crate provides the core functionality for:
//! - Node pricing from cloud catalogs or flat default rates
//! - Tracking allocatable and requested resources per node
//! - Periodic emission of cost and utilization gauges
//! - Querying the metrics backend and joining results into cost records
//! - Health checks and observability

pub mod cluster;
pub mod emitter;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pricing;
pub mod query;
pub mod schema;
pub mod sink;
pub mod tracker;
pub mod units;
pub mod usage;

pub use error::{AggregateError, CostError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
