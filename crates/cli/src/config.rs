//! Configuration management for the CLI
//!
//! Flags and `COSTWISE_*` environment variables win over the values saved
//! in the config file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

const DEFAULT_BACKEND: &str = "http://localhost:9090";

/// Saved CLI defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Base URL of the Prometheus-compatible query backend
    pub backend: Option<String>,
    /// Tenant sent as `X-Scope-OrgID`
    pub tenant: Option<String>,
    pub cluster_id: Option<String>,
    pub format: Option<OutputFormat>,
}

/// Values a command runs with
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub backend: String,
    pub tenant: Option<String>,
    pub cluster_id: String,
    pub format: OutputFormat,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Overlay the set fields of `other`
    pub fn merged(self, other: Config) -> Config {
        Config {
            backend: other.backend.or(self.backend),
            tenant: other.tenant.or(self.tenant),
            cluster_id: other.cluster_id.or(self.cluster_id),
            format: other.format.or(self.format),
        }
    }

    /// Settings for a query command; the cluster id is mandatory
    pub fn settings(self) -> Result<Settings> {
        let cluster_id = match self.cluster_id {
            Some(id) if !id.is_empty() => id,
            _ => bail!("cluster id is required (--cluster-id or COSTWISE_CLUSTER_ID)"),
        };
        Ok(Settings {
            backend: self.backend.unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            tenant: self.tenant.filter(|t| !t.is_empty()),
            cluster_id,
            format: self.format.unwrap_or_default(),
        })
    }

    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("costwise").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            backend: Some("http://prom:9090".to_string()),
            cluster_id: Some("c-123".to_string()),
            format: Some(OutputFormat::Json),
            ..Default::default()
        };

        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_flags_override_saved_values() {
        let saved = Config {
            backend: Some("http://saved:9090".to_string()),
            tenant: Some("team-a".to_string()),
            cluster_id: Some("c-saved".to_string()),
            format: None,
        };
        let flags = Config {
            cluster_id: Some("c-flag".to_string()),
            ..Default::default()
        };

        let settings = saved.merged(flags).settings().unwrap();

        assert_eq!(settings.backend, "http://saved:9090");
        assert_eq!(settings.tenant.as_deref(), Some("team-a"));
        assert_eq!(settings.cluster_id, "c-flag");
        assert_eq!(settings.format, OutputFormat::Table);
    }

    #[test]
    fn test_cluster_id_is_required() {
        let err = Config::default().settings().unwrap_err();
        assert!(err.to_string().contains("cluster id"));
    }
}
