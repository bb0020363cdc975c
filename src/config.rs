//! Claim trie configuration

use crate::model::Height;
use crate::node::{
    ActivationParams, DEFAULT_ACTIVATION_FACTOR, DEFAULT_CACHE_LIMIT,
    DEFAULT_MAX_ACTIVATION_DELAY,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of heights of activation history kept for rollback
pub const DEFAULT_ROLLBACK_WINDOW: Height = 1_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Change-log file
    pub path: PathBuf,
    /// Resident nodes before the cache starts evicting
    pub cache_limit: usize,
    pub activation_factor: Height,
    pub max_activation_delay: Height,
    /// fsync the change log after every commit
    pub sync_on_commit: bool,
    pub rollback_window: Height,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            path: default_log_path(),
            cache_limit: DEFAULT_CACHE_LIMIT,
            activation_factor: DEFAULT_ACTIVATION_FACTOR,
            max_activation_delay: DEFAULT_MAX_ACTIVATION_DELAY,
            sync_on_commit: true,
            rollback_window: DEFAULT_ROLLBACK_WINDOW,
        }
    }
}

/// `<data dir>/claimtrie/changes.log`, or relative to the working directory
/// when the platform has no data dir
pub fn default_log_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("claimtrie")
        .join("changes.log")
}

impl Config {
    /// Defaults with the change log at `path`
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Config {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Read a JSON config file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_limit == 0 {
            return Err(Error::Config("cache_limit must be at least 1".into()));
        }
        if self.activation_factor == 0 {
            return Err(Error::Config("activation_factor must be at least 1".into()));
        }
        Ok(())
    }

    pub fn activation_params(&self) -> ActivationParams {
        ActivationParams {
            factor: self.activation_factor,
            max_delay: self.max_activation_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache_limit, 100_000);
        assert!(config.path.ends_with("claimtrie/changes.log"));
    }

    #[test]
    fn test_save_load_and_partial_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("claimtrie.json");

        let mut config = Config::with_path(dir.path().join("log"));
        config.cache_limit = 7;
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);

        std::fs::write(&path, r#"{"activation_factor": 16}"#).unwrap();
        let partial = Config::load(&path).unwrap();
        assert_eq!(partial.activation_factor, 16);
        assert_eq!(partial.max_activation_delay, 4032);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = Config::default();
        config.cache_limit = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.activation_factor = 0;
        assert!(config.validate().is_err());
    }
}
