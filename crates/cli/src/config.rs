//! Configuration management for the CLI
//!
//! Flags and environment variables win over the config file, which wins over
//! the built-in defaults.

use affinity_core::config::{DEFAULT_PROMETHEUS_URL, DEFAULT_TENANT_NAMESPACE};
use affinity_core::{PluginConfig, Thresholds};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Defaults persisted in `~/.config/affinityctl/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub prometheus_url: Option<String>,
    pub tenant_namespace: Option<String>,
    pub cpu_usage_limit: Option<f64>,
    pub max_tenant_occupants: Option<usize>,
}

impl Config {
    /// Load the user's config file, or defaults when there is none
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("affinityctl").join("config.json"))
    }
}

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub prometheus_url: Option<String>,
    pub tenant_namespace: Option<String>,
    pub cpu_usage_limit: Option<f64>,
    pub max_tenant_occupants: Option<usize>,
    pub timeout_secs: Option<u64>,
}

/// Resolve the pipeline configuration from overrides, file and defaults
pub fn plugin_config(overrides: &Overrides, file: &Config) -> Result<PluginConfig> {
    let defaults = Thresholds::default();
    let mut config = PluginConfig::with_thresholds(Thresholds {
        cpu_usage_limit: overrides
            .cpu_usage_limit
            .or(file.cpu_usage_limit)
            .unwrap_or(defaults.cpu_usage_limit),
        max_tenant_occupants: overrides
            .max_tenant_occupants
            .or(file.max_tenant_occupants)
            .unwrap_or(defaults.max_tenant_occupants),
    });

    config.tenant_namespace = overrides
        .tenant_namespace
        .clone()
        .or_else(|| file.tenant_namespace.clone())
        .unwrap_or_else(|| DEFAULT_TENANT_NAMESPACE.to_string());
    config.metrics.endpoint = overrides
        .prometheus_url
        .clone()
        .or_else(|| file.prometheus_url.clone())
        .unwrap_or_else(|| DEFAULT_PROMETHEUS_URL.to_string());
    if let Some(secs) = overrides.timeout_secs {
        config.metrics.timeout = Duration::from_secs(secs);
    }

    config.validate().context("Invalid placement configuration")?;
    Ok(config)
}

/// Get kubeconfig path
pub fn kubeconfig_path(override_path: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(PathBuf::from(path));
    }

    let default = dirs_next::home_dir()?.join(".kube").join("config");
    default.exists().then_some(default)
}
