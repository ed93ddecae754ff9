//! Collector configuration

use anyhow::{Context, Result};
use collector_lib::sink::{PushGatewayConfig, DEFAULT_JOB_NAME};
use serde::Deserialize;
use std::time::Duration;

/// Optional config file, looked up in the working directory
const CONFIG_FILE: &str = "collector";

/// Environment variable prefix (e.g. `COLLECTOR_LIBVIRT_URI`)
const ENV_PREFIX: &str = "COLLECTOR";

/// Collector configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Hypervisor connection URI
    #[serde(default = "default_libvirt_uri")]
    pub libvirt_uri: String,

    /// Push gateway base URL
    #[serde(default = "default_pushgateway_url")]
    pub pushgateway_url: String,

    /// Job the pushed gauges are grouped under
    #[serde(default = "default_job_name")]
    pub job_name: String,

    /// Seconds between collection passes
    #[serde(default = "default_collect_interval")]
    pub collect_interval_secs: u64,

    /// Timeout for push gateway requests in seconds
    #[serde(default = "default_push_timeout")]
    pub push_timeout_secs: u64,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_libvirt_uri() -> String {
    "qemu:///system".to_string()
}

fn default_pushgateway_url() -> String {
    "http://localhost:9091".to_string()
}

fn default_job_name() -> String {
    DEFAULT_JOB_NAME.to_string()
}

fn default_collect_interval() -> u64 {
    30
}

fn default_push_timeout() -> u64 {
    10
}

fn default_api_port() -> u16 {
    9177
}

impl CollectorConfig {
    /// Load configuration from `collector.toml` (optional) and environment
    pub fn load() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX));

        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let config: Self = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.collect_interval_secs == 0 {
            anyhow::bail!("collect_interval_secs must be greater than zero");
        }
        if self.push_timeout_secs == 0 {
            anyhow::bail!("push_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.collect_interval_secs)
    }

    pub fn push_gateway(&self) -> PushGatewayConfig {
        PushGatewayConfig {
            url: self.pushgateway_url.clone(),
            job_name: self.job_name.clone(),
            timeout: Duration::from_secs(self.push_timeout_secs),
        }
    }
}
