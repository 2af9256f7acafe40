//! Configuration data types.

use crate::policy::PolicyKind;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Selection policy to route with
    #[serde(default)]
    pub policy: PolicyKind,

    /// Balancer tuning (thresholds, cool-down, sweep cadence)
    #[serde(default)]
    pub balancer: BalancerConfig,

    /// Backend addresses, in rotation order
    #[serde(default)]
    pub backends: Vec<String>,

    /// Simulated traffic driver settings
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Whether the metrics endpoint is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind the metrics server
    #[serde(default = "default_metrics_address")]
    pub address: SocketAddr,

    /// Path for the metrics endpoint
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_metrics_address(),
            path: default_metrics_path(),
        }
    }
}

/// Balancer tuning knobs.
///
/// The defaults (3 failures, 2s cool-down, 10s sweeps) suit backends
/// that fail fast; slow-failing backends usually want a longer
/// cool-down.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BalancerConfig {
    /// Consecutive failures before a backend is excluded
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long an excluded backend stays out
    #[serde(default = "default_cool_down", with = "humantime_serde")]
    pub cool_down: Duration,

    /// How often the recovery sweeper scans for cooled-down backends
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cool_down: default_cool_down(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Simulated traffic driver settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DemoConfig {
    /// Total number of requests to fire
    #[serde(default = "default_demo_requests")]
    pub requests: u32,

    /// How many requests may be in flight at once
    #[serde(default = "default_demo_concurrency")]
    pub concurrency: u32,

    /// Simulated per-request backend latency
    #[serde(default = "default_demo_latency", with = "humantime_serde")]
    pub latency: Duration,

    /// Backends (by address) whose simulated invoker always fails
    #[serde(default)]
    pub fail_backends: Vec<String>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            requests: default_demo_requests(),
            concurrency: default_demo_concurrency(),
            latency: default_demo_latency(),
            fail_backends: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_true() -> bool {
    true
}

fn default_metrics_address() -> SocketAddr {
    "127.0.0.1:9090".parse().unwrap()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cool_down() -> Duration {
    Duration::from_secs(2)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_demo_requests() -> u32 {
    30
}

fn default_demo_concurrency() -> u32 {
    6
}

fn default_demo_latency() -> Duration {
    Duration::from_millis(15)
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
