//! Health tracking for the cost agent
//!
//! Emitter loops, the tracker and the cluster watchers report here; the
//! agent serves the result on its liveness and readiness probes.
//!
//! - Overall status is the worst component status
//! - Readiness requires the initial cluster listing and no unhealthy component
//! - Emitter loops report tick outcomes, graded by how many entities were skipped

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still producing output, but for fewer entities than it should
    Degraded,
    Unhealthy,
}

/// Outcome of the last emitter tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickOutcome {
    pub processed: usize,
    pub skipped: usize,
}

impl TickOutcome {
    fn grade(&self) -> (ComponentStatus, Option<String>) {
        if self.skipped == 0 {
            (ComponentStatus::Healthy, None)
        } else if self.processed == 0 {
            (
                ComponentStatus::Unhealthy,
                Some(format!("all {} entities skipped", self.skipped)),
            )
        } else {
            (
                ComponentStatus::Degraded,
                Some(format!(
                    "{} of {} entities skipped",
                    self.skipped,
                    self.processed + self.skipped
                )),
            )
        }
    }
}

/// Health of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix seconds of the last status change
    pub since: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tick: Option<TickOutcome>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            since: Utc::now().timestamp(),
            last_tick: None,
        }
    }

    /// Move to `status`, keeping `since` while the status is unchanged
    fn transition(&mut self, status: ComponentStatus, message: Option<String>) {
        if self.status != status {
            self.since = Utc::now().timestamp();
        }
        self.status = status;
        self.message = message;
    }
}

/// Body of the liveness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

/// Body of the readiness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const CLUSTER_LOOP: &str = "cluster_loop";
    pub const NODE_LOOP: &str = "node_loop";
    pub const POD_LOOP: &str = "pod_loop";
    pub const WORKLOAD_LOOP: &str = "workload_loop";
    pub const TRACKER: &str = "tracker";
    pub const WATCHER: &str = "watcher";

    pub const EMITTER_LOOPS: [&str; 4] = [CLUSTER_LOOP, NODE_LOOP, POD_LOOP, WORKLOAD_LOOP];
}

#[derive(Debug, Default)]
struct State {
    components: HashMap<String, ComponentHealth>,
    synced: bool,
}

/// Shared component health and cluster sync flag
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<State>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component as healthy; an existing entry is kept
    pub async fn register(&self, name: &str) {
        self.state
            .write()
            .await
            .components
            .entry(name.to_string())
            .or_insert_with(|| ComponentHealth::new(ComponentStatus::Healthy, None));
    }

    async fn set(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        let mut state = self.state.write().await;
        match state.components.get_mut(name) {
            Some(health) => health.transition(status, message),
            None => {
                state
                    .components
                    .insert(name.to_string(), ComponentHealth::new(status, message));
            }
        }
    }

    pub async fn set_healthy(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Mark whether the initial cluster listing has been applied
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.synced = ready;
    }

    /// Record the outcome of one emitter tick
    ///
    /// A tick that skipped some entities is degraded; a tick that had
    /// entities to process and skipped all of them is unhealthy.
    pub async fn record_tick(&self, name: &str, processed: usize, skipped: usize) {
        let outcome = TickOutcome { processed, skipped };
        let (status, message) = outcome.grade();
        self.set(name, status, message).await;
        if let Some(health) = self.state.write().await.components.get_mut(name) {
            health.last_tick = Some(outcome);
        }
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.state.read().await.components.clone();
        let status = components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        if !state.synced {
            return ReadinessResponse {
                ready: false,
                reason: Some("waiting for the initial node and pod listing".to_string()),
            };
        }

        let mut unhealthy: Vec<&str> = state
            .components
            .iter()
            .filter(|(_, h)| h.status == ComponentStatus::Unhealthy)
            .map(|(name, _)| name.as_str())
            .collect();
        if unhealthy.is_empty() {
            return ReadinessResponse {
                ready: true,
                reason: None,
            };
        }
        unhealthy.sort_unstable();
        ReadinessResponse {
            ready: false,
            reason: Some(format!("unhealthy: {}", unhealthy.join(", "))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_healthy_but_not_ready() {
        let registry = HealthRegistry::new();

        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.unwrap().contains("initial"));
    }

    #[tokio::test]
    async fn test_overall_status_is_worst_component() {
        let registry = HealthRegistry::new();
        for name in components::EMITTER_LOOPS {
            registry.register(name).await;
        }

        registry.set_degraded(components::NODE_LOOP, "2 of 5 entities skipped").await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry.set_unhealthy(components::TRACKER, "tracker stopped").await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_register_keeps_reported_status() {
        let registry = HealthRegistry::new();
        registry.set_degraded(components::WATCHER, "pod watch: timeout").await;
        registry.register(components::WATCHER).await;

        let health = registry.health().await;
        assert_eq!(
            health.components[components::WATCHER].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_record_tick_grades_skips() {
        let registry = HealthRegistry::new();

        registry.record_tick(components::POD_LOOP, 10, 0).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);

        registry.record_tick(components::POD_LOOP, 8, 2).await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::POD_LOOP].last_tick,
            Some(TickOutcome {
                processed: 8,
                skipped: 2
            })
        );

        registry.record_tick(components::POD_LOOP, 0, 3).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);

        registry.record_tick(components::POD_LOOP, 0, 0).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_readiness_names_unhealthy_components() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry.record_tick(components::NODE_LOOP, 0, 4).await;
        let readiness = registry.readiness().await;

        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("unhealthy: node_loop"));
    }
}
