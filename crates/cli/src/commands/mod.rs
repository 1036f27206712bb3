//! Command implementations

pub mod costs;
pub mod metrics;
pub mod settings;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use cost_lib::models::TimeWindow;
use cost_lib::query::{AggregatorConfig, PromClient, QueryAggregator};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::config::Settings;

/// Resolution of a range query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Seconds(u64),
    /// Coarsest step keeping the range under the backend's point limit
    Auto,
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "auto" {
            return Ok(Step::Auto);
        }
        let seconds = s.strip_suffix('s').unwrap_or(s);
        seconds
            .parse()
            .map(Step::Seconds)
            .map_err(|_| format!("invalid step {s:?}, expected seconds or \"auto\""))
    }
}

/// Unix seconds or an RFC 3339 timestamp
pub fn parse_time(s: &str) -> Result<i64, String> {
    if let Ok(secs) = s.parse::<i64>() {
        return Ok(secs);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp())
        .map_err(|_| format!("invalid time {s:?}, expected unix seconds or RFC 3339"))
}

/// Query window flags shared by the range commands
#[derive(Debug, Clone, Default, Args)]
pub struct WindowArgs {
    /// Window start (defaults to the first second of the current month)
    #[arg(long, value_parser = parse_time)]
    pub start: Option<i64>,

    /// Window end (defaults to now)
    #[arg(long, value_parser = parse_time)]
    pub end: Option<i64>,

    /// Step in seconds, or "auto"
    #[arg(long)]
    pub step: Option<Step>,
}

impl WindowArgs {
    pub fn resolve(&self, now: DateTime<Utc>, default_step: u64) -> Result<TimeWindow> {
        let month = TimeWindow::current_month(now)?;
        let start = self.start.unwrap_or(month.start);
        let end = self.end.unwrap_or(month.end);
        let window = match self.step {
            Some(Step::Auto) => TimeWindow::auto_step(start, end)?,
            Some(Step::Seconds(step)) => TimeWindow::new(start, end, step)?,
            None => TimeWindow::new(start, end, default_step)?,
        };
        Ok(window)
    }
}

/// Aggregator over the configured backend
pub fn aggregator(settings: &Settings) -> Result<QueryAggregator> {
    debug!(
        backend = %settings.backend,
        cluster_id = %settings.cluster_id,
        tenant = ?settings.tenant,
        "Building query aggregator"
    );
    let backend = PromClient::new(&settings.backend)
        .with_context(|| format!("Invalid backend URL {}", settings.backend))?;
    let mut config = AggregatorConfig::new(settings.cluster_id.clone());
    if let Some(tenant) = &settings.tenant {
        config = config.with_tenant(tenant.clone());
    }
    Ok(QueryAggregator::new(Arc::new(backend), config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_step_parsing() {
        assert_eq!("600".parse::<Step>().unwrap(), Step::Seconds(600));
        assert_eq!("3600s".parse::<Step>().unwrap(), Step::Seconds(3600));
        assert_eq!("auto".parse::<Step>().unwrap(), Step::Auto);
        assert!("10m".parse::<Step>().is_err());
    }

    #[test]
    fn test_parse_time_accepts_both_forms() {
        assert_eq!(parse_time("1709251200").unwrap(), 1_709_251_200);
        assert_eq!(parse_time("2024-03-01T00:00:00Z").unwrap(), 1_709_251_200);
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_window_defaults_to_current_month() {
        let now = Utc.with_ymd_and_hms(2024, 3, 11, 12, 0, 0).unwrap();
        let window = WindowArgs::default().resolve(now, 3600).unwrap();

        assert_eq!(window.start, 1_709_251_200);
        assert_eq!(window.end, now.timestamp());
        assert_eq!(window.step_seconds, 3600);
    }

    #[test]
    fn test_window_rejects_step_below_sampling_period() {
        let args = WindowArgs {
            start: Some(0),
            end: Some(3600),
            step: Some(Step::Seconds(5)),
        };
        assert!(args.resolve(Utc::now(), 3600).is_err());
    }

    #[test]
    fn test_aggregator_uses_settings() {
        let settings = Settings {
            backend: "http://localhost:9090".to_string(),
            tenant: Some("team-a".to_string()),
            cluster_id: "c-123".to_string(),
            format: Default::default(),
        };
        assert_eq!(aggregator(&settings).unwrap().cluster_id(), "c-123");
    }
}
