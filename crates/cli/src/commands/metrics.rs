//! Resource views: the current cluster state and resource amounts over time

use anyhow::Result;
use chrono::{DateTime, Utc};
use cost_lib::models::{ResourceKind, TimeWindow};
use cost_lib::query::{ClusterCurrentMetrics, QueryAggregator, ResourcePoint};
use tabled::Tabled;

use crate::output::{
    color_utilization, format_amount, format_timestamp, print_heading, print_json, print_table,
    OutputFormat,
};

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Total")]
    total: String,
    #[tabled(rename = "Available")]
    available: String,
    #[tabled(rename = "System")]
    system_taken: String,
    #[tabled(rename = "Requested")]
    request: String,
    #[tabled(rename = "Used")]
    usage: String,
    #[tabled(rename = "Use %")]
    utilization: String,
}

impl From<&ResourcePoint> for ResourceRow {
    fn from(p: &ResourcePoint) -> Self {
        Self {
            time: format_timestamp(p.timestamp),
            total: format_amount(p.total),
            available: format_amount(p.available),
            system_taken: format_amount(p.system_taken),
            request: format_amount(p.request),
            usage: format_amount(p.usage),
            utilization: color_utilization(p.usage, p.total),
        }
    }
}

#[derive(Tabled)]
struct CurrentRow {
    #[tabled(rename = "Resource")]
    resource: &'static str,
    #[tabled(rename = "Total")]
    total: String,
    #[tabled(rename = "Available")]
    available: String,
    #[tabled(rename = "System")]
    system_taken: String,
    #[tabled(rename = "Requested")]
    request: String,
    #[tabled(rename = "Used")]
    usage: String,
    #[tabled(rename = "Use %")]
    utilization: String,
}

fn current_rows(m: &ClusterCurrentMetrics) -> Vec<CurrentRow> {
    vec![
        CurrentRow {
            resource: "cpu (cores)",
            total: format_amount(m.cpu_core_total),
            available: format_amount(m.cpu_core_available),
            system_taken: format_amount(m.cpu_core_system_taken),
            request: format_amount(m.cpu_core_request),
            usage: format_amount(m.cpu_core_usage),
            utilization: color_utilization(m.cpu_core_usage, m.cpu_core_total),
        },
        CurrentRow {
            resource: "memory (GiB)",
            total: format_amount(m.ram_gb_total),
            available: format_amount(m.ram_gb_available),
            system_taken: format_amount(m.ram_gb_system_taken),
            request: format_amount(m.ram_gb_request),
            usage: format_amount(m.ram_gb_usage),
            utilization: color_utilization(m.ram_gb_usage, m.ram_gb_total),
        },
    ]
}

/// Node and pod counts plus resource amounts right now
pub async fn current(
    agg: &QueryAggregator,
    now: DateTime<Utc>,
    format: OutputFormat,
) -> Result<()> {
    let metrics = agg.cluster_current_metrics(now).await?;

    match format {
        OutputFormat::Json => print_json(&metrics)?,
        OutputFormat::Table => {
            print_heading("Cluster Now");
            println!(
                "Nodes:                  {} on-demand, {} spot, {} reserved, {} unpriced",
                metrics.on_demand_nodes,
                metrics.spot_nodes,
                metrics.period_nodes,
                metrics.fallback_nodes
            );
            println!(
                "Pods:                   {} running, {} unscheduled",
                metrics.running_pods, metrics.unscheduled_pods
            );
            println!();
            print_table(current_rows(&metrics));
        }
    }

    Ok(())
}

/// Amounts of one resource per step
pub async fn resource(
    agg: &QueryAggregator,
    window: &TimeWindow,
    resource: ResourceKind,
    format: OutputFormat,
) -> Result<()> {
    let points = agg.cluster_resource_metrics(window, resource).await?;

    match format {
        OutputFormat::Json => print_json(&points)?,
        OutputFormat::Table => {
            print_heading(&format!("Cluster {} ({})", resource, resource.unit()));
            print_table(points.iter().map(ResourceRow::from).collect());
        }
    }

    Ok(())
}
