//! Throttle configuration.
//!
//! Loaded from a JSON, TOML or YAML file (auto-discovered with prefer or
//! given explicitly), then overridden from `THROTTLE_*` environment
//! variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::throttle::registry::{DEFAULT_LOCK_TIMEOUT, DEFAULT_SHARDS};

/// Name used for config file discovery (`domain-throttle.toml`, ...).
pub const CONFIG_NAME: &str = "domain-throttle";

/// Default spacing between requests to the same domain.
pub const DEFAULT_BACKOFF_INTERVAL_MS: u64 = 1_000;

/// Default idle time before a domain's state may be purged.
pub const DEFAULT_RETENTION_WINDOW_MS: u64 = 300_000;

/// Default interval between background purge passes.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

pub const ENV_BACKOFF_MS: &str = "THROTTLE_BACKOFF_MS";
pub const ENV_RETENTION_MS: &str = "THROTTLE_RETENTION_MS";
pub const ENV_SWEEP_INTERVAL_MS: &str = "THROTTLE_SWEEP_INTERVAL_MS";
pub const ENV_LOCK_TIMEOUT_MS: &str = "THROTTLE_LOCK_TIMEOUT_MS";
pub const ENV_SHARDS: &str = "THROTTLE_SHARDS";

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Throttle settings. All durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Minimum spacing between reservations for the same key.
    pub backoff_interval_ms: u64,
    /// Idle time after which a key's state may be purged.
    pub retention_window_ms: u64,
    /// How often the background sweeper runs.
    pub sweep_interval_ms: u64,
    /// Upper bound on waiting for a key's shard lock.
    pub lock_timeout_ms: u64,
    /// Number of lock stripes in the registry.
    pub shards: usize,
    /// Path to the file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            backoff_interval_ms: DEFAULT_BACKOFF_INTERVAL_MS,
            retention_window_ms: DEFAULT_RETENTION_WINDOW_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
            shards: DEFAULT_SHARDS,
            source_path: None,
        }
    }
}

impl ThrottleConfig {
    /// Discover a config file with prefer, falling back to defaults.
    /// Environment overrides are applied either way.
    pub async fn load() -> Result<Self, ConfigError> {
        match prefer::load(CONFIG_NAME).await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await,
                None => Ok(Self::default_with_env()),
            },
            Err(_) => {
                tracing::debug!("No {} config file found, using defaults", CONFIG_NAME);
                Ok(Self::default_with_env())
            }
        }
    }

    /// Defaults with environment overrides applied.
    pub fn default_with_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load configuration from a specific file path.
    /// The format is chosen from the extension; anything unknown is read as JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::load_from_path_with_overrides(path, |name| std::env::var(name).ok()).await
    }

    /// Like [`load_from_path`](Self::load_from_path), with overrides read from
    /// `lookup` instead of the process environment.
    pub async fn load_from_path_with_overrides(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        let path = PathBuf::from(expanded);

        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path);
        Ok(config.with_overrides_from(lookup))
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ConfigError> {
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            }),
            _ => serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            }),
        }
    }

    /// Apply `THROTTLE_*` environment variables on top of this config.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    /// Values that are missing or not valid integers are ignored.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).and_then(|s| s.trim().parse::<u64>().ok());

        if let Some(ms) = read(ENV_BACKOFF_MS) {
            self.backoff_interval_ms = ms;
        }
        if let Some(ms) = read(ENV_RETENTION_MS) {
            self.retention_window_ms = ms;
        }
        if let Some(ms) = read(ENV_SWEEP_INTERVAL_MS) {
            self.sweep_interval_ms = ms;
        }
        if let Some(ms) = read(ENV_LOCK_TIMEOUT_MS) {
            self.lock_timeout_ms = ms;
        }
        if let Some(n) = read(ENV_SHARDS) {
            self.shards = n as usize;
        }
        self
    }

    /// Check that the settings describe a usable throttle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("backoff_interval_ms", self.backoff_interval_ms),
            ("retention_window_ms", self.retention_window_ms),
            ("sweep_interval_ms", self.sweep_interval_ms),
            ("lock_timeout_ms", self.lock_timeout_ms),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{} must be greater than zero", field)));
        }
        if self.shards == 0 {
            return Err(ConfigError::Invalid("shards must be at least 1".to_string()));
        }
        if self.retention_window_ms <= self.backoff_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "retention_window_ms ({}) must exceed backoff_interval_ms ({})",
                self.retention_window_ms, self.backoff_interval_ms
            )));
        }
        Ok(())
    }

    pub fn backoff_interval(&self) -> Duration {
        Duration::from_millis(self.backoff_interval_ms)
    }

    pub fn retention_window(&self) -> Duration {
        Duration::from_millis(self.retention_window_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
