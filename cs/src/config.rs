//! Configuration for coordstore

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the SQLite store file
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// How long a commit waits on a locked database before giving up
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("coordstore")
        .join("store.db")
}

fn default_busy_timeout_ms() -> u64 {
    crate::DEFAULT_BUSY_TIMEOUT_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Config {
    /// Load config from file, or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            return Ok(config);
        }

        // Try default locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("coordstore").join("config.yml")),
            Some(PathBuf::from("coordstore.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                return Ok(config);
            }
        }

        Ok(Config::default())
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_explicit_file_with_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("coordstore.yml");
        std::fs::write(&path, "store_path: /tmp/cs-test.db\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.store_path, PathBuf::from("/tmp/cs-test.db"));
        assert_eq!(config.busy_timeout(), Duration::from_millis(crate::DEFAULT_BUSY_TIMEOUT_MS));
    }

    #[test]
    fn test_save_then_load() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("coordstore.yml");
        let config = Config {
            store_path: temp.path().join("store.db"),
            busy_timeout_ms: 250,
        };
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.busy_timeout_ms, 250);
        assert_eq!(loaded.store_path, config.store_path);
    }
}
