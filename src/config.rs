//! Server configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// A storage root searched during path resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    /// Human-readable name used in logs
    pub name: String,

    /// Absolute filesystem path of the mount root
    pub root: PathBuf,
}

impl Mount {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }
}

/// Path cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for a resolved path in seconds
    pub ttl_secs: u64,

    /// Interval between background sweeps in seconds
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,           // 1 hour
            sweep_interval_secs: 600, // 10 minutes
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Mount fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Ceiling for a whole fan-out in milliseconds, independent of
    /// per-mount latency
    pub timeout_ms: u64,

    /// How long the coordinator waits for losing probes to finish
    pub grace_period_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            grace_period_ms: 250,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Shared HMAC secret for signed URLs
    #[serde(skip_serializing)]
    pub secret: String,

    /// Storage roots, searched concurrently
    pub mounts: Vec<Mount>,

    /// Path cache configuration
    pub cache: CacheConfig,

    /// Fan-out configuration
    pub search: SearchConfig,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 60002,
            secret: String::new(),
            mounts: Vec::new(),
            cache: CacheConfig::default(),
            search: SearchConfig::default(),
            cors_enabled: true,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secret", &"<redacted>")
            .field("mounts", &self.mounts)
            .field("cache", &self.cache)
            .field("search", &self.search)
            .field("cors_enabled", &self.cors_enabled)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
