//! lborch configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use coordstore::{CoordinationStore, DEFAULT_BUSY_TIMEOUT_MS, StoreError};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main lborch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Coordination store backend
    pub store: StoreConfig,

    /// Queue worker settings
    pub worker: WorkerConfig,

    /// Maximum concurrent reads while building a snapshot
    #[serde(rename = "fetch-concurrency")]
    pub fetch_concurrency: usize,

    /// Log level (overridden by --log-level)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            worker: WorkerConfig::default(),
            fetch_concurrency: 16,
            log_level: None,
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidates() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Any failure yields `None`; the full load reports it later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = match config_path {
            Some(path) => path.clone(),
            None => Self::candidates().into_iter().find(|p| p.exists())?,
        };
        Self::load_from_file(&path).ok()?.log_level
    }

    /// `./.lborch.yml`, then `~/.config/lborch/lborch.yml`
    fn candidates() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(".lborch.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("lborch").join("lborch.yml"));
        }
        candidates
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Which coordination store backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local; state is lost on exit
    Memory,
    #[default]
    Sqlite,
}

/// Coordination store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Database file for the sqlite backend
    pub path: PathBuf,

    /// How long to wait on a locked database
    #[serde(rename = "busy-timeout-ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("lborch")
                .join("store.db"),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    pub fn open(&self) -> Result<CoordinationStore, StoreError> {
        match self.backend {
            StoreBackend::Memory => Ok(CoordinationStore::in_memory()),
            StoreBackend::Sqlite => {
                CoordinationStore::open_sqlite(&self.path, Duration::from_millis(self.busy_timeout_ms))
            }
        }
    }
}

/// Queue worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Whether `lb worker` polls at all
    pub enabled: bool,

    /// Pause between passes
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,

    /// Delay before the first pass
    #[serde(rename = "initial-delay-ms")]
    pub initial_delay_ms: u64,

    /// Most queue entries handled per pass
    #[serde(rename = "max-batch-size")]
    pub max_batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
            initial_delay_ms: 0,
            max_batch_size: 50,
        }
    }
}

impl WorkerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.worker.interval_ms, 1000);
        assert_eq!(config.worker.max_batch_size, 50);
        assert_eq!(config.fetch_concurrency, 16);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
store:
  backend: memory
worker:
  max-batch-size: 5
log-level: debug
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
        assert_eq!(config.worker.max_batch_size, 5);
        assert_eq!(config.worker.interval_ms, 1000);
        assert!(config.worker.enabled);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("lborch.yml");
        fs::write(&path, "fetch-concurrency: 3\nlog-level: warn\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.fetch_concurrency, 3);
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("warn"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let temp = tempdir().unwrap();
        assert!(Config::load(Some(&temp.path().join("absent.yml"))).is_err());
        assert!(Config::load_log_level(Some(&temp.path().join("absent.yml"))).is_none());
    }

    #[test]
    fn test_memory_backend_opens() {
        let store = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        let store = store.open().unwrap();
        assert!(store.exists("/").unwrap());
    }
}
