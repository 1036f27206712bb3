//! Observability for the cost agent itself
//!
//! Provides:
//! - Prometheus metrics about the agent (tick latency, skipped entities,
//!   tracked nodes)
//! - Structured lifecycle logging with tracing

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for emitter tick durations (in seconds)
const TICK_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    tick_seconds: HistogramVec,
    entities_skipped: IntCounterVec,
    tracked_nodes: IntGauge,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            tick_seconds: register_histogram_vec!(
                "costwise_emitter_tick_seconds",
                "Time spent producing one emitter snapshot",
                &["loop"],
                TICK_BUCKETS.to_vec()
            )
            .expect("Failed to register emitter_tick_seconds"),

            entities_skipped: register_int_counter_vec!(
                "costwise_emitter_entities_skipped_total",
                "Entities skipped during a tick because their data was unavailable",
                &["loop"]
            )
            .expect("Failed to register emitter_entities_skipped_total"),

            tracked_nodes: register_int_gauge!(
                "costwise_tracker_nodes",
                "Nodes currently held by the resource tracker"
            )
            .expect("Failed to register tracker_nodes"),
        }
    }
}

/// Handle to the process-wide agent metrics
///
/// Every handle points at the same registered collectors.
#[derive(Clone, Copy)]
pub struct AgentMetrics {
    inner: &'static AgentMetricsInner,
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    pub fn new() -> Self {
        Self {
            inner: GLOBAL_METRICS.get_or_init(AgentMetricsInner::new),
        }
    }

    fn inner(&self) -> &AgentMetricsInner {
        self.inner
    }

    pub fn observe_tick(&self, loop_name: &str, duration_secs: f64) {
        self.inner()
            .tick_seconds
            .with_label_values(&[loop_name])
            .observe(duration_secs);
    }

    pub fn inc_entities_skipped(&self, loop_name: &str, count: u64) {
        self.inner()
            .entities_skipped
            .with_label_values(&[loop_name])
            .inc_by(count);
    }

    pub fn set_tracked_nodes(&self, count: i64) {
        self.inner().tracked_nodes.set(count);
    }
}

/// Structured logger for agent lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    cluster_name: String,
}

impl StructuredLogger {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str, cluster_id: &str, cloud_provider: &str) {
        info!(
            event = "agent_started",
            cluster_name = %self.cluster_name,
            cluster_id = %cluster_id,
            cloud_provider = %cloud_provider,
            agent_version = %version,
            "Cost agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            cluster_name = %self.cluster_name,
            reason = %reason,
            "Cost agent shutting down"
        );
    }

    /// One entity left out of a tick
    pub fn log_entity_skipped(&self, loop_name: &str, entity: &str, error: &dyn std::fmt::Display) {
        warn!(
            event = "entity_skipped",
            cluster_name = %self.cluster_name,
            loop_name = %loop_name,
            entity = %entity,
            error = %error,
            "Skipping entity for this tick"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_metrics_shared_instance() {
        let metrics = AgentMetrics::new();
        let other = AgentMetrics::default();
        assert!(std::ptr::eq(metrics.inner(), other.inner()));

        metrics.observe_tick("node", 0.01);
        metrics.inc_entities_skipped("pod", 2);
        other.set_tracked_nodes(3);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "costwise_tracker_nodes"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("prod");
        assert_eq!(logger.cluster_name, "prod");
        logger.log_entity_skipped("node", "node/n1", &"missing label");
    }
}
