//! Configuration structures.
//!
//! Configuration is loaded from an optional JSON file, then overridden by
//! `JEEVES_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::errors::{Error, Result};
use crate::validation::{validate_non_empty, validate_positive};

/// Global resilience configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Admin server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Backend health thresholds.
    #[serde(default)]
    pub health: HealthConfig,

    /// Network reachability probe.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Local (Ollama) backend probe.
    #[serde(default)]
    pub local_backend: LocalBackendConfig,

    /// Tool result cache.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Request queue and background processor.
    #[serde(default)]
    pub queue: QueueConfig,
}

impl Config {
    /// Load configuration from a JSON file. Missing sections fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `JEEVES_*` environment overrides on top of the current values.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (env-shaped keys).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("JEEVES_ADMIN_ADDR") {
            self.server.listen_addr = v;
        }
        if let Some(v) = lookup("JEEVES_LOG_FORMAT") {
            self.observability.json_logs = v.eq_ignore_ascii_case("json");
        }
        if let Some(v) = lookup("JEEVES_OLLAMA_URL") {
            self.local_backend.base_url = v;
        }
        if let Some(v) = lookup("JEEVES_NETWORK_PROBE_HOST") {
            self.network.probe_host = v;
        }
        if let Some(v) = lookup("JEEVES_NETWORK_PROBE_INTERVAL") {
            self.network.probe_interval = parse_duration("JEEVES_NETWORK_PROBE_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("JEEVES_QUEUE_MAX_SIZE") {
            self.queue.max_size = v.parse().map_err(|_| {
                Error::config(format!("JEEVES_QUEUE_MAX_SIZE is not a number: {}", v))
            })?;
        }
        if let Some(v) = lookup("JEEVES_QUEUE_TIMEOUT") {
            self.queue.timeout = parse_duration("JEEVES_QUEUE_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("JEEVES_CACHE_TTL") {
            self.cache.ttl = parse_duration("JEEVES_CACHE_TTL", &v)?;
        }
        self.validate()
    }

    /// Reject values that would make the core misbehave (zero sizes, zero intervals).
    pub fn validate(&self) -> Result<()> {
        validate_non_empty(&self.server.listen_addr, "server.listen_addr")?;
        validate_non_empty(&self.network.probe_host, "network.probe_host")?;
        validate_non_empty(&self.local_backend.base_url, "local_backend.base_url")?;
        validate_positive(u64::from(self.health.failure_threshold), "health.failure_threshold")?;
        validate_positive(self.queue.max_size as u64, "queue.max_size")?;
        validate_positive(self.queue.timeout.as_secs(), "queue.timeout")?;
        validate_positive(
            self.queue.processor_interval.as_millis() as u64,
            "queue.processor_interval",
        )?;
        validate_positive(self.cache.ttl.as_secs(), "cache.ttl")?;
        Ok(())
    }
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    humantime_serde::re::humantime::parse_duration(value)
        .map_err(|e| Error::config(format!("{} is not a duration ({}): {}", key, value, e)))
}

/// Admin server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Admin HTTP bind address.
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8089".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Backend health thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Consecutive failures before a backend is marked unavailable (default: 3).
    pub failure_threshold: u32,

    /// Upper bound reported by `wait_time` (default: 60s).
    #[serde(with = "humantime_serde")]
    pub default_retry_after: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            default_retry_after: Duration::from_secs(60),
        }
    }
}

/// Network reachability probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// `host:port` resolved to decide whether the network is up.
    pub probe_host: String,

    /// How long a probe result is reused before re-probing (default: 30s).
    #[serde(with = "humantime_serde")]
    pub probe_interval: Duration,

    /// Upper bound on a single probe (default: 5s).
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_host: "api.anthropic.com:443".to_string(),
            probe_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Local backend probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalBackendConfig {
    /// Ollama base URL.
    pub base_url: String,

    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Tool result cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime (default: 24h).
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Request queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum pending requests; enqueue beyond this is rejected (default: 100).
    pub max_size: usize,

    /// Age after which a pending request is dropped unexecuted (default: 5 minutes).
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Background drain tick (default: 10s).
    #[serde(with = "humantime_serde")]
    pub processor_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            timeout: Duration::from_secs(300),
            processor_interval: Duration::from_secs(10),
        }
    }
}
