//! Costwise agent
//!
//! Runs once per cluster. It watches nodes, pods and workloads, prices every
//! node and publishes cost and utilization gauges for the metrics backend to
//! scrape.

use anyhow::{Context, Result};
use cost_lib::cluster::{ClusterCache, EventIngestor};
use cost_lib::emitter::MetricsEmitterBuilder;
use cost_lib::health::{components, HealthRegistry};
use cost_lib::observability::{AgentMetrics, StructuredLogger};
use cost_lib::pricing::{resolve_cluster_identity, select_provider};
use cost_lib::sink::PrometheusSink;
use cost_lib::tracker::NodeResourceTracker;
use costwise_agent::{api, config::AgentConfig, metrics_server::MetricsServerUsage, watch};
use k8s_openapi::api::core::v1::{Namespace, Node};
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const SYSTEM_NAMESPACE: &str = "kube-system";
const TRACKER_BUFFER: usize = 1024;

async fn system_namespace_uid(client: &Client) -> Option<String> {
    match Api::<Namespace>::all(client.clone()).get(SYSTEM_NAMESPACE).await {
        Ok(ns) => ns.metadata.uid,
        Err(e) => {
            warn!(error = %e, "Could not read the kube-system namespace");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting costwise-agent");

    let config = AgentConfig::load()?;
    info!(cluster_name = %config.cluster_name, "Agent configured");

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let nodes = Api::<Node>::all(client.clone())
        .list(&ListParams::default())
        .await
        .context("Failed to list nodes")?
        .items;
    let provider = select_provider(&config.pricing(), &nodes)?;
    let system_uid = system_namespace_uid(&client).await;
    let identity = resolve_cluster_identity(
        &config.cluster_name,
        config.configured_cluster_id(),
        provider.as_ref(),
        &nodes,
        system_uid.as_deref(),
    )?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let health = HealthRegistry::new();
    health.register(components::TRACKER).await;
    health.register(components::WATCHER).await;

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&config.cluster_name);

    let (tracker, tracker_handle) = NodeResourceTracker::new(TRACKER_BUFFER);
    let mut handles = vec![tracker.with_metrics(metrics).spawn(shutdown_tx.subscribe())];

    let cache = Arc::new(ClusterCache::new());
    let ingestor = EventIngestor::new(Arc::clone(&cache), tracker_handle.clone());
    let (watch_handles, initial_sync) =
        watch::spawn_watchers(client.clone(), ingestor, health.clone(), &shutdown_tx);
    handles.extend(watch_handles);

    let sink = PrometheusSink::register(prometheus::default_registry())?;
    let emitter = MetricsEmitterBuilder::new(identity.clone())
        .price_provider(Arc::clone(&provider))
        .tracker(tracker_handle)
        .cache(Arc::clone(&cache))
        .usage_source(Arc::new(MetricsServerUsage::new(client)))
        .sink(Arc::new(sink))
        .config(config.emitter())
        .health(health.clone())
        .metrics(metrics)
        .build()?;

    logger.log_startup(AGENT_VERSION, &identity.cluster_id, provider.name());

    {
        let cache = Arc::clone(&cache);
        let health = health.clone();
        tokio::spawn(async move {
            let watch::InitialSync { nodes, pods } = initial_sync;
            if nodes.await.is_ok() && pods.await.is_ok() {
                cache.mark_synced();
                health.set_ready(true).await;
                info!("Initial cluster listing applied");
            }
        });
    }
    handles.extend(emitter.start(&shutdown_tx).await);

    let app_state = Arc::new(api::AppState::new(health.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, shutdown_tx.subscribe()));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Task ended abnormally");
        }
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server failed"),
        Err(e) => warn!(error = %e, "API server task ended abnormally"),
        Ok(Ok(())) => {}
    }

    Ok(())
}
