//! Guardian configuration

use anyhow::Result;
use serde::Deserialize;

/// Guardian configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GuardianConfig {
    /// Identifier for this guardian instance
    #[serde(default = "default_guardian_id")]
    pub guardian_id: String,

    /// API server port for health/metrics/fleet endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Seconds of heartbeat silence before a node is marked offline
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: i64,

    /// Liveness sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Stuck-remediation cleanup interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_guardian_id() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "guardian".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_heartbeat_timeout() -> i64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    30
}

impl GuardianConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("GUARDIAN"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| GuardianConfig {
            guardian_id: default_guardian_id(),
            api_port: default_api_port(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            cleanup_interval_secs: default_cleanup_interval(),
        }))
    }
}
