//! Costwise CLI
//!
//! Queries the metrics backend the agents write to and joins the results
//! into cluster, namespace and workload cost reports.

mod commands;
mod config;
mod output;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use commands::{costs, metrics, settings, WindowArgs};
use config::Config;
use cost_lib::models::{ResourceKind, TimeWindow};
use cost_lib::query::AggregateBy;
use tracing_subscriber::EnvFilter;

/// Costwise CLI
#[derive(Parser)]
#[command(name = "cwctl")]
#[command(
    author,
    version,
    about = "Kubernetes cost reports from the metrics backend",
    long_about = None
)]
pub struct Cli {
    /// Query backend base URL
    #[arg(long, env = "COSTWISE_QUERY_BACKEND", global = true)]
    pub backend: Option<String>,

    /// Tenant sent with every query
    #[arg(long, env = "COSTWISE_TENANT", global = true)]
    pub tenant: Option<String>,

    /// Cluster to report on
    #[arg(long, env = "COSTWISE_CLUSTER_ID", global = true)]
    pub cluster_id: Option<String>,

    /// Output format
    #[arg(long, short, global = true)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Cost over a time window
    #[command(subcommand)]
    Costs(CostsCommands),

    /// Resource amounts and cluster state
    #[command(subcommand)]
    Metrics(MetricsCommands),

    /// Month-to-date cost and the projected month total
    Month,

    /// Manage saved defaults
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum CostsCommands {
    /// Cluster cost by billing mode and resource
    Cluster {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Cost per namespace
    Namespaces {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Cost per workload
    Workloads {
        /// all, pod, deployment, statefulset or daemonset
        #[arg(long, default_value = "all")]
        by: AggregateBy,

        #[command(flatten)]
        window: WindowArgs,
    },
}

#[derive(Subcommand)]
pub enum MetricsCommands {
    /// Node, pod and resource figures right now
    Current,

    /// One resource over a time window
    Resource {
        /// cpu or memory
        resource: ResourceKind,

        #[command(flatten)]
        window: WindowArgs,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show saved defaults
    Show,

    /// Save the global flags given with this command as defaults
    Set,
}

impl Cli {
    fn flags(&self) -> Config {
        Config {
            backend: self.backend.clone(),
            tenant: self.tenant.clone(),
            cluster_id: self.cluster_id.clone(),
            format: self.format,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Config(cmd) = &cli.command {
        return match cmd {
            ConfigCommands::Show => settings::show(),
            ConfigCommands::Set => settings::set(cli.flags()),
        };
    }

    let settings = Config::load()?.merged(cli.flags()).settings()?;
    let agg = commands::aggregator(&settings)?;
    let format = settings.format;
    let now = Utc::now();

    match cli.command {
        Commands::Costs(cmd) => match cmd {
            CostsCommands::Cluster { window } => {
                let window = window.resolve(now, TimeWindow::DEFAULT_STEP_SECONDS)?;
                costs::cluster(&agg, &window, format).await?;
            }
            CostsCommands::Namespaces { window } => {
                let window = window.resolve(now, TimeWindow::DETAIL_STEP_SECONDS)?;
                costs::namespaces(&agg, &window, format).await?;
            }
            CostsCommands::Workloads { by, window } => {
                let window = window.resolve(now, TimeWindow::DETAIL_STEP_SECONDS)?;
                costs::workloads(&agg, &window, by, format).await?;
            }
        },
        Commands::Metrics(cmd) => match cmd {
            MetricsCommands::Current => metrics::current(&agg, now, format).await?,
            MetricsCommands::Resource { resource, window } => {
                let window = window.resolve(now, TimeWindow::DEFAULT_STEP_SECONDS)?;
                metrics::resource(&agg, &window, resource, format).await?;
            }
        },
        Commands::Month => costs::month(&agg, now, format).await?,
        Commands::Config(_) => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workloads_by_statefulset() {
        let cli = Cli::try_parse_from([
            "cwctl",
            "--cluster-id",
            "c-123",
            "costs",
            "workloads",
            "--by",
            "statefulset",
            "--step",
            "600",
        ])
        .unwrap();

        match cli.command {
            Commands::Costs(CostsCommands::Workloads { by, window }) => {
                assert_eq!(by, AggregateBy::StatefulSet);
                assert_eq!(window.step, Some(commands::Step::Seconds(600)));
            }
            _ => panic!("expected costs workloads"),
        }
        assert_eq!(cli.cluster_id.as_deref(), Some("c-123"));
    }

    #[test]
    fn test_unknown_grouping_is_rejected() {
        let result = Cli::try_parse_from(["cwctl", "costs", "workloads", "--by", "replicaset"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_resource_accepts_ram_alias() {
        let cli =
            Cli::try_parse_from(["cwctl", "metrics", "resource", "ram", "--step", "auto"]).unwrap();
        match cli.command {
            Commands::Metrics(MetricsCommands::Resource { resource, window }) => {
                assert_eq!(resource, ResourceKind::Memory);
                assert_eq!(window.step, Some(commands::Step::Auto));
            }
            _ => panic!("expected metrics resource"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cwctl", "month", "--format", "json", "--tenant", "team-a",
        ])
        .unwrap();
        let flags = cli.flags();
        assert_eq!(flags.format, Some(output::OutputFormat::Json));
        assert_eq!(flags.tenant.as_deref(), Some("team-a"));
    }

    #[test]
    fn test_window_times_accept_rfc3339() {
        let cli = Cli::try_parse_from([
            "cwctl",
            "costs",
            "cluster",
            "--start",
            "2024-03-01T00:00:00Z",
            "--end",
            "1709337600",
        ])
        .unwrap();
        match cli.command {
            Commands::Costs(CostsCommands::Cluster { window }) => {
                assert_eq!(window.start, Some(1_709_251_200));
                assert_eq!(window.end, Some(1_709_337_600));
            }
            _ => panic!("expected costs cluster"),
        }
    }
}
