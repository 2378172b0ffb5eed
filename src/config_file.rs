//! Configuration file support
//!
//! Loads and validates server configuration from TOML files.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::{CacheConfig, LogFormat, Mount, SearchConfig, ServerConfig};
use crate::error::{GatewayError, Result};

/// Environment variable that overrides the configured secret
pub const SECRET_ENV_VAR: &str = "MEDIA_GATEWAY_SECRET";

/// Name given to the mount declared by `storage_base_path`
pub const DEFAULT_MOUNT_NAME: &str = "default";

/// Configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Shared HMAC secret
    pub secret: Option<String>,
    /// Single-mount shorthand
    pub storage_base_path: Option<PathBuf>,
    /// Server settings
    #[serde(default)]
    pub server: ServerSettings,
    /// Storage mounts
    #[serde(default)]
    pub mounts: Vec<MountSettings>,
    /// Path cache settings
    #[serde(default)]
    pub cache: CacheSettings,
    /// Fan-out settings
    #[serde(default)]
    pub search: SearchSettings,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: Option<String>,
    /// Port to listen on
    pub port: Option<u16>,
    /// Enable CORS
    pub cors_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountSettings {
    pub name: String,
    pub root: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSettings {
    /// TTL for resolved paths in seconds
    pub ttl_secs: Option<u64>,
    /// Sweep interval in seconds
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Overall fan-out timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Drain period for losing probes in milliseconds
    pub grace_period_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| GatewayError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| GatewayError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Generate default configuration file
    pub fn default_config() -> Self {
        Self {
            secret: Some("change-me".to_string()),
            storage_base_path: None,
            server: ServerSettings {
                host: Some("0.0.0.0".to_string()),
                port: Some(60002),
                cors_enabled: Some(true),
            },
            mounts: vec![MountSettings {
                name: "media".to_string(),
                root: PathBuf::from("/srv/media"),
            }],
            cache: CacheSettings {
                ttl_secs: Some(3600),
                sweep_interval_secs: Some(600),
            },
            search: SearchSettings {
                timeout_ms: Some(10_000),
                grace_period_ms: Some(250),
            },
            logging: Some(LoggingSettings {
                level: "info".to_string(),
                format: Some("pretty".to_string()),
            }),
        }
    }

    /// Replace the secret when `secret` is set and non-empty.
    pub fn with_secret_override(mut self, secret: Option<String>) -> Self {
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            self.secret = Some(secret);
        }
        self
    }

    /// Apply the `MEDIA_GATEWAY_SECRET` environment override.
    pub fn with_env_overrides(self) -> Self {
        self.with_secret_override(std::env::var(SECRET_ENV_VAR).ok())
    }

    /// Convert to a validated ServerConfig
    pub fn into_server_config(self) -> Result<ServerConfig> {
        let defaults = ServerConfig::default();

        let secret = self
            .secret
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GatewayError::Config("secret must be set and non-empty".into()))?;

        let mut mounts: Vec<Mount> = self
            .mounts
            .into_iter()
            .map(|m| Mount::new(m.name, m.root))
            .collect();
        if let Some(base) = self.storage_base_path {
            mounts.push(Mount::new(DEFAULT_MOUNT_NAME, base));
        }
        validate_mounts(&mounts)?;

        let cache = CacheConfig {
            ttl_secs: self.cache.ttl_secs.unwrap_or(defaults.cache.ttl_secs),
            sweep_interval_secs: self
                .cache
                .sweep_interval_secs
                .unwrap_or(defaults.cache.sweep_interval_secs),
        };
        if cache.ttl_secs == 0 || cache.sweep_interval_secs == 0 {
            return Err(GatewayError::Config(
                "cache.ttl_secs and cache.sweep_interval_secs must be non-zero".into(),
            ));
        }

        let search = SearchConfig {
            timeout_ms: self.search.timeout_ms.unwrap_or(defaults.search.timeout_ms),
            grace_period_ms: self
                .search
                .grace_period_ms
                .unwrap_or(defaults.search.grace_period_ms),
        };
        if search.timeout_ms == 0 {
            return Err(GatewayError::Config(
                "search.timeout_ms must be non-zero".into(),
            ));
        }

        let (log_level, log_format) = match self.logging {
            Some(logging) => (
                parse_log_level(&logging.level)?,
                parse_log_format(logging.format.as_deref())?,
            ),
            None => (defaults.log_level, defaults.log_format),
        };

        Ok(ServerConfig {
            host: self.server.host.unwrap_or(defaults.host),
            port: self.server.port.unwrap_or(defaults.port),
            secret,
            mounts,
            cache,
            search,
            cors_enabled: self.server.cors_enabled.unwrap_or(defaults.cors_enabled),
            log_level,
            log_format,
        })
    }
}

fn validate_mounts(mounts: &[Mount]) -> Result<()> {
    if mounts.is_empty() {
        return Err(GatewayError::Config(
            "at least one mount (or storage_base_path) is required".into(),
        ));
    }
    let mut names = HashSet::new();
    for mount in mounts {
        if mount.name.is_empty() {
            return Err(GatewayError::Config("mount name must not be empty".into()));
        }
        if !mount.root.is_absolute() {
            return Err(GatewayError::Config(format!(
                "mount {} root must be absolute: {}",
                mount.name,
                mount.root.display()
            )));
        }
        if !names.insert(mount.name.as_str()) {
            return Err(GatewayError::Config(format!(
                "duplicate mount name: {}",
                mount.name
            )));
        }
    }
    Ok(())
}

fn parse_log_level(level: &str) -> Result<String> {
    let level = level.to_ascii_lowercase();
    if LOG_LEVELS.contains(&level.as_str()) {
        Ok(level)
    } else {
        Err(GatewayError::Config(format!("unknown log level: {}", level)))
    }
}

fn parse_log_format(format: Option<&str>) -> Result<LogFormat> {
    match format.map(str::to_ascii_lowercase).as_deref() {
        None | Some("pretty") => Ok(LogFormat::Pretty),
        Some("json") => Ok(LogFormat::Json),
        Some(other) => Err(GatewayError::Config(format!(
            "unknown log format: {}",
            other
        ))),
    }
}

/// Load, override from the environment and validate.
pub fn load<P: AsRef<Path>>(path: P) -> Result<ServerConfig> {
    ConfigFile::from_file(path)?
        .with_env_overrides()
        .into_server_config()
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let config = ConfigFile::default_config();
    config.to_file(path)?;
    Ok(())
}
