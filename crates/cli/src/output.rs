//! Output formatting utilities

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print serializable data as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a table
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        print_warning("No data in the selected window");
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a section heading
pub fn print_heading(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(50));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Unix seconds as UTC date and time
pub fn format_timestamp(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => ts.to_string(),
    }
}

pub fn format_cost(amount: f64) -> String {
    format!("{:.4}", amount)
}

/// Cores or GiB with two decimals
pub fn format_amount(amount: f64) -> String {
    format!("{:.2}", amount)
}

/// Usage over a reference amount as a colored percentage
pub fn color_utilization(used: f64, total: f64) -> String {
    if total <= 0.0 {
        return "-".to_string();
    }
    let ratio = used / total;
    let formatted = format!("{:.0}%", ratio * 100.0);
    if ratio >= 0.9 {
        formatted.red().to_string()
    } else if ratio >= 0.6 {
        formatted.green().to_string()
    } else {
        formatted.yellow().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(1_709_251_200), "2024-03-01 00:00");
    }

    #[test]
    fn test_utilization_without_total() {
        assert_eq!(color_utilization(1.0, 0.0), "-");
    }

    #[test]
    fn test_utilization_percentage() {
        colored::control::set_override(false);
        assert_eq!(color_utilization(1.0, 4.0), "25%");
    }
}
