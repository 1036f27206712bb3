//! Periodic cost and utilization emitter
//!
//! Four independent loops (cluster, node, pod, workload) each rebuild a
//! complete snapshot of their gauges on their own interval:
//! - inputs are the cluster cache, the resource tracker, the price provider
//!   and the usage source
//! - one entity failing (missing labels, unknown price, bad quantities) is
//!   logged and skipped for that tick only
//! - loops stop between ticks when the shutdown signal fires

mod snapshot;


pub use snapshot::pod_hourly_cost;

use crate::cluster::ClusterCache;
use crate::error::{CostError, Result};
use crate::health::{components, HealthRegistry};
use crate::models::ClusterIdentity;
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::pricing::PriceProvider;
use crate::sink::MetricsSink;
use crate::tracker::TrackerHandle;
use crate::units::SAMPLE_PERIOD_SECONDS;
use crate::usage::{NoUsage, UsageSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// One of the emitter's snapshot loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmitterLoop {
    Cluster,
    Node,
    Pod,
    Workload,
}

impl EmitterLoop {
    pub const ALL: [EmitterLoop; 4] = [
        EmitterLoop::Cluster,
        EmitterLoop::Node,
        EmitterLoop::Pod,
        EmitterLoop::Workload,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EmitterLoop::Cluster => "cluster",
            EmitterLoop::Node => "node",
            EmitterLoop::Pod => "pod",
            EmitterLoop::Workload => "workload",
        }
    }

    /// Health component reporting this loop
    pub fn component(&self) -> &'static str {
        match self {
            EmitterLoop::Cluster => components::CLUSTER_LOOP,
            EmitterLoop::Node => components::NODE_LOOP,
            EmitterLoop::Pod => components::POD_LOOP,
            EmitterLoop::Workload => components::WORKLOAD_LOOP,
        }
    }
}

/// Tick intervals of the emitter loops
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    pub cluster_interval: Duration,
    pub node_interval: Duration,
    pub pod_interval: Duration,
    pub workload_interval: Duration,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(SAMPLE_PERIOD_SECONDS))
    }
}

impl EmitterConfig {
    /// Same interval for every loop
    pub fn uniform(period: Duration) -> Self {
        Self {
            cluster_interval: period,
            node_interval: period,
            pod_interval: period,
            workload_interval: period,
        }
    }

    pub fn interval(&self, which: EmitterLoop) -> Duration {
        match which {
            EmitterLoop::Cluster => self.cluster_interval,
            EmitterLoop::Node => self.node_interval,
            EmitterLoop::Pod => self.pod_interval,
            EmitterLoop::Workload => self.workload_interval,
        }
    }
}

/// Outcome of one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub processed: usize,
    pub skipped: usize,
}

/// Everything a loop reads from or writes to
pub(crate) struct EmitterContext {
    pub(crate) identity: ClusterIdentity,
    pub(crate) provider: Arc<dyn PriceProvider>,
    pub(crate) tracker: TrackerHandle,
    pub(crate) cache: Arc<ClusterCache>,
    pub(crate) usage: Arc<dyn UsageSource>,
    pub(crate) sink: Arc<dyn MetricsSink>,
    pub(crate) logger: StructuredLogger,
}

/// Handle to the emitter loops
pub struct MetricsEmitter {
    ctx: Arc<EmitterContext>,
    config: EmitterConfig,
    health: HealthRegistry,
    metrics: AgentMetrics,
}

impl MetricsEmitter {
    /// Produce one snapshot of a loop's gauges
    pub async fn tick(&self, which: EmitterLoop) -> TickReport {
        self.ctx.tick(which).await
    }

    /// Spawn every loop; each subscribes to `shutdown` before returning
    ///
    /// Loops skip their ticks until the cluster cache is marked synced.
    pub async fn start(&self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(EmitterLoop::ALL.len());
        for which in EmitterLoop::ALL {
            self.health.register(which.component()).await;
            let runner = LoopRunner {
                which,
                period: self.config.interval(which),
                ctx: Arc::clone(&self.ctx),
                health: self.health.clone(),
                metrics: self.metrics,
            };
            handles.push(tokio::spawn(runner.run(shutdown.subscribe())));
        }
        handles
    }
}

struct LoopRunner {
    which: EmitterLoop,
    period: Duration,
    ctx: Arc<EmitterContext>,
    health: HealthRegistry,
    metrics: AgentMetrics,
}

impl LoopRunner {
    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let name = self.which.name();
        info!(
            loop_name = name,
            interval_secs = self.period.as_secs_f64(),
            "Starting emitter loop"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.ctx.cache.is_synced() {
                        debug!(loop_name = name, "Waiting for the initial cluster listing");
                        continue;
                    }
                    let start = Instant::now();
                    let report = self.ctx.tick(self.which).await;
                    let elapsed = start.elapsed();

                    self.metrics.observe_tick(name, elapsed.as_secs_f64());
                    if report.skipped > 0 {
                        self.metrics.inc_entities_skipped(name, report.skipped as u64);
                    }
                    self.health
                        .record_tick(self.which.component(), report.processed, report.skipped)
                        .await;

                    debug!(
                        loop_name = name,
                        processed = report.processed,
                        skipped = report.skipped,
                        elapsed_ms = elapsed.as_millis(),
                        "Emitter tick complete"
                    );
                }
                _ = shutdown.recv() => {
                    info!(loop_name = name, "Stopping emitter loop");
                    break;
                }
            }
        }
    }
}

/// Builder for [`MetricsEmitter`]
pub struct MetricsEmitterBuilder {
    identity: ClusterIdentity,
    provider: Option<Arc<dyn PriceProvider>>,
    tracker: Option<TrackerHandle>,
    cache: Option<Arc<ClusterCache>>,
    usage: Arc<dyn UsageSource>,
    sink: Option<Arc<dyn MetricsSink>>,
    config: EmitterConfig,
    health: HealthRegistry,
    metrics: AgentMetrics,
}

impl MetricsEmitterBuilder {
    pub fn new(identity: ClusterIdentity) -> Self {
        Self {
            identity,
            provider: None,
            tracker: None,
            cache: None,
            usage: Arc::new(NoUsage),
            sink: None,
            config: EmitterConfig::default(),
            health: HealthRegistry::new(),
            metrics: AgentMetrics::new(),
        }
    }

    pub fn price_provider(mut self, provider: Arc<dyn PriceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tracker(mut self, tracker: TrackerHandle) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn cache(mut self, cache: Arc<ClusterCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn usage_source(mut self, usage: Arc<dyn UsageSource>) -> Self {
        self.usage = usage;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(mut self, config: EmitterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn metrics(mut self, metrics: AgentMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> Result<MetricsEmitter> {
        self.identity.validate()?;
        let missing = |what: &str| CostError::Config(format!("emitter needs a {what}"));

        let logger = StructuredLogger::new(self.identity.cluster_name.clone());
        let ctx = EmitterContext {
            identity: self.identity,
            provider: self.provider.ok_or_else(|| missing("price provider"))?,
            tracker: self.tracker.ok_or_else(|| missing("tracker handle"))?,
            cache: self.cache.ok_or_else(|| missing("cluster cache"))?,
            usage: self.usage,
            sink: self.sink.ok_or_else(|| missing("metrics sink"))?,
            logger,
        };

        Ok(MetricsEmitter {
            ctx: Arc::new(ctx),
            config: self.config,
            health: self.health,
            metrics: self.metrics,
        })
    }
}
