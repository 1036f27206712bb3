//! Cost views over a time window

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use cost_lib::models::TimeWindow;
use cost_lib::query::{AggregateBy, ClusterCostPoint, EntityCost, QueryAggregator};
use tabled::Tabled;

use crate::output::{
    format_amount, format_cost, format_timestamp, print_heading, print_json, print_table,
    OutputFormat,
};

#[derive(Tabled)]
struct ClusterCostRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Total")]
    total: String,
    #[tabled(rename = "On-demand")]
    on_demand: String,
    #[tabled(rename = "Spot")]
    spot: String,
    #[tabled(rename = "Reserved")]
    period: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "RAM")]
    ram: String,
    #[tabled(rename = "Cores")]
    cores: String,
    #[tabled(rename = "RAM GiB")]
    ram_gb: String,
}

impl From<&ClusterCostPoint> for ClusterCostRow {
    fn from(p: &ClusterCostPoint) -> Self {
        Self {
            time: format_timestamp(p.timestamp),
            total: format_cost(p.total_cost),
            on_demand: format_cost(p.on_demand_cost),
            spot: format_cost(p.spot_cost),
            period: format_cost(p.period_cost),
            cpu: format_cost(p.cpu_cost),
            ram: format_cost(p.ram_cost),
            cores: format_amount(p.cpu_core_count),
            ram_gb: format_amount(p.ram_gb_count),
        }
    }
}

#[derive(Tabled)]
struct EntityCostRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "Pods")]
    pods: String,
    #[tabled(rename = "CPU req/used")]
    cpu: String,
    #[tabled(rename = "RAM GiB req/used")]
    ram: String,
}

impl From<&EntityCost> for EntityCostRow {
    fn from(e: &EntityCost) -> Self {
        Self {
            time: format_timestamp(e.timestamp),
            kind: e.kind.clone(),
            namespace: e.namespace.clone(),
            name: e.name.clone(),
            cost: format_cost(e.cost),
            pods: format!("{:.1}", e.pod_count),
            cpu: format!(
                "{} / {}",
                format_amount(e.cpu_core_request),
                format_amount(e.cpu_core_usage)
            ),
            ram: format!("{} / {}", format_amount(e.ram_gb_request), format_amount(e.ram_gb_usage)),
        }
    }
}

/// Cluster cost per step, split by billing mode and resource
pub async fn cluster(
    agg: &QueryAggregator,
    window: &TimeWindow,
    format: OutputFormat,
) -> Result<()> {
    let points = agg.cluster_resource_costs(window).await?;

    match format {
        OutputFormat::Json => print_json(&points)?,
        OutputFormat::Table => {
            print_heading("Cluster Cost");
            let total: f64 = points.iter().map(|p| p.total_cost).sum();
            print_table(points.iter().map(ClusterCostRow::from).collect());
            println!("{} {}", "Window total:".bold(), format_cost(total).green().bold());
        }
    }

    Ok(())
}

/// Cost per namespace and step
pub async fn namespaces(
    agg: &QueryAggregator,
    window: &TimeWindow,
    format: OutputFormat,
) -> Result<()> {
    let costs = agg.namespace_costs(window).await?;
    print_entities("Namespace Cost", &costs, format)
}

/// Cost per workload or pod and step
pub async fn workloads(
    agg: &QueryAggregator,
    window: &TimeWindow,
    by: AggregateBy,
    format: OutputFormat,
) -> Result<()> {
    let costs = agg.workload_costs(window, by).await?;
    print_entities(&format!("Workload Cost ({by})"), &costs, format)
}

fn print_entities(title: &str, costs: &[EntityCost], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(costs)?,
        OutputFormat::Table => {
            print_heading(title);
            print_table(costs.iter().map(EntityCostRow::from).collect());
        }
    }
    Ok(())
}

/// Month-to-date cost and its projection
pub async fn month(agg: &QueryAggregator, now: DateTime<Utc>, format: OutputFormat) -> Result<()> {
    let summary = agg.cluster_month_cost(now).await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_heading("Month Cost");
            println!(
                "Window:                 {} .. {}",
                format_timestamp(summary.start),
                format_timestamp(summary.end)
            );
            println!(
                "Active hours:           {:.1}",
                summary.active_seconds / 3600.0
            );
            println!("Cost so far:            {}", format_cost(summary.cost_so_far));
            println!("Average per day:        {}", format_cost(summary.average_daily_cost));
            println!(
                "Average per core-hour:  {}",
                format_cost(summary.average_hourly_core_cost)
            );
            println!();
            println!(
                "{} {}",
                "Estimated month cost:".bold(),
                format_cost(summary.estimated_month_cost).green().bold()
            );
        }
    }

    Ok(())
}
