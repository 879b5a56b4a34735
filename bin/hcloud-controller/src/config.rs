//! Controller settings read from the environment

use hcloud_client::DEFAULT_ENDPOINT;
use hcloud_core::EngineConfig;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive number of seconds, got {value:?}")]
    InvalidSeconds { name: &'static str, value: String },

    #[error("{name} must be a socket address, got {value:?}")]
    InvalidAddress { name: &'static str, value: String },

    #[error("LOG_FORMAT must be \"json\" or \"text\", got {0:?}")]
    InvalidLogFormat(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub hcloud_endpoint: String,
    /// Per-pass deadline after which outstanding calls are abandoned
    pub reconcile_deadline: Duration,
    pub metrics_addr: SocketAddr,
    /// Restrict the watch to one namespace
    pub watch_namespace: Option<String>,
    pub log_format: LogFormat,
    pub engine: EngineConfig,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut engine = EngineConfig::default();
        if let Some(timeout) = seconds(&lookup, "HCLOUD_CALL_TIMEOUT_SECS")? {
            engine.call_timeout = timeout;
        }
        if let Some(resync) = seconds(&lookup, "RESYNC_INTERVAL_SECS")? {
            engine.resync_interval = resync;
        }

        let metrics_addr = match lookup("METRICS_ADDR") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidAddress {
                name: "METRICS_ADDR",
                value,
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        };

        Ok(Self {
            hcloud_endpoint: lookup("HCLOUD_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            reconcile_deadline: seconds(&lookup, "RECONCILE_DEADLINE_SECS")?
                .unwrap_or(Duration::from_secs(120)),
            metrics_addr,
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            log_format,
            engine,
        })
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<Duration>, ConfigError> {
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Some(Duration::from_secs(secs))),
        _ => Err(ConfigError::InvalidSeconds { name, value }),
    }
}
