//! Extender configuration

use affinity_core::config::{
    DEFAULT_CPU_USAGE_LIMIT, DEFAULT_IDENTITY_LABEL, DEFAULT_MAX_TENANT_OCCUPANTS,
    DEFAULT_PROMETHEUS_URL, DEFAULT_QUERY_TIMEOUT, DEFAULT_TENANT_NAMESPACE,
};
use affinity_core::{MetricsConfig, PluginConfig, Thresholds};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "AFFINITY_CONFIG_FILE";

/// Extender configuration, read from `AFFINITY_*` environment variables
/// layered over an optional file
#[derive(Debug, Clone, Deserialize)]
pub struct ExtenderConfig {
    /// Listen port for the extender, health and metrics routes
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    #[serde(default = "default_cpu_usage_limit")]
    pub cpu_usage_limit: f64,

    #[serde(default = "default_max_tenant_occupants")]
    pub max_tenant_occupants: usize,

    #[serde(default = "default_tenant_namespace")]
    pub tenant_namespace: String,

    #[serde(default = "default_identity_label")]
    pub identity_label: String,

    /// Seconds between metrics backend health probes
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Name reported in structured logs
    #[serde(default = "default_instance")]
    pub instance: String,
}

fn default_port() -> u16 {
    8888
}

fn default_prometheus_url() -> String {
    DEFAULT_PROMETHEUS_URL.to_string()
}

fn default_query_timeout_secs() -> u64 {
    DEFAULT_QUERY_TIMEOUT.as_secs()
}

fn default_cpu_usage_limit() -> f64 {
    DEFAULT_CPU_USAGE_LIMIT
}

fn default_max_tenant_occupants() -> usize {
    DEFAULT_MAX_TENANT_OCCUPANTS
}

fn default_tenant_namespace() -> String {
    DEFAULT_TENANT_NAMESPACE.to_string()
}

fn default_identity_label() -> String {
    DEFAULT_IDENTITY_LABEL.to_string()
}

fn default_probe_interval_secs() -> u64 {
    30
}

fn default_instance() -> String {
    std::env::var("POD_NAME").unwrap_or_else(|_| "affinity-extender".to_string())
}

impl ExtenderConfig {
    /// Load from the process environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok();
        Self::load_from(file.as_deref(), config::Environment::with_prefix("AFFINITY"))
    }

    /// Load from an optional file overlaid with `env`
    pub fn load_from(file: Option<&str>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let settings = builder
            .add_source(env.try_parsing(true))
            .build()
            .context("failed to read extender configuration")?;

        settings
            .try_deserialize()
            .context("invalid extender configuration")
    }

    /// Library configuration for the placement pipeline
    pub fn plugin_config(&self) -> PluginConfig {
        let mut plugin = PluginConfig::with_thresholds(Thresholds {
            cpu_usage_limit: self.cpu_usage_limit,
            max_tenant_occupants: self.max_tenant_occupants,
        });
        plugin.tenant_namespace = self.tenant_namespace.clone();
        plugin.identity_label = self.identity_label.clone();
        plugin.metrics = MetricsConfig {
            endpoint: self.prometheus_url.clone(),
            timeout: Duration::from_secs(self.query_timeout_secs),
        };
        plugin
    }
}
