//! Configuration system for Fanpoll
//!
//! Configuration values are resolved in the following order (highest priority wins):
//!
//! 1. **Code** (struct update syntax on the loaded value) - Highest priority
//! 2. **Environment Variables** (`FP_*`) - Override file config
//! 3. **Config File** (fanpoll.toml) - Override defaults
//! 4. **Defaults** - Lowest priority
//!
//! # Example
//!
//! ```no_run
//! use fanpoll_core::config::FanpollConfig;
//!
//! let config = FanpollConfig::load()?;
//! config.validate()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod cascade;
pub mod lifecycle;
pub mod logging;
pub mod storage;

pub use cascade::CascadeConfig;
pub use lifecycle::LifecycleConfig;
pub use logging::LoggingConfig;
pub use storage::StorageConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete Fanpoll configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FanpollConfig {
    pub storage: StorageConfig,
    pub lifecycle: LifecycleConfig,
    pub cascade: CascadeConfig,
    pub logging: LoggingConfig,
}

impl FanpollConfig {
    /// Load `fanpoll.toml` from the working directory (if present), then
    /// environment variables
    pub fn load() -> Result<Self> {
        Self::load_from("fanpoll.toml")
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut config = Self::default();

        if path.exists() {
            let file_config = Self::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.merge(file_config);
        }

        config.apply_env_vars();

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.as_ref().display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Merge another config into this one (other takes priority)
    pub fn merge(&mut self, other: Self) {
        self.storage.merge(other.storage);
        self.lifecycle.merge(other.lifecycle);
        self.cascade.merge(other.cascade);
        self.logging.merge(other.logging);
    }

    /// Apply environment variables to configuration
    pub fn apply_env_vars(&mut self) {
        self.storage.apply_env_vars();
        self.lifecycle.apply_env_vars();
        self.cascade.apply_env_vars();
        self.logging.apply_env_vars();
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        self.lifecycle.validate()?;
        self.cascade.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Parse a boolean environment value ("1", "true", "yes", "on")
pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FanpollConfig::default();
        assert!(!config.storage.journal_enabled);
        assert!(config.lifecycle.auto_sweep);
        assert!(config.lifecycle.strict_durations);
        assert!(config.cascade.retract_votes_on_option_delete);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_validation() {
        let config = FanpollConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FanpollConfig::from_toml(
            r#"
            [lifecycle]
            sweep_interval_secs = 5

            [cascade]
            retract_votes_on_option_delete = false
            "#,
        )
        .unwrap();

        assert_eq!(config.lifecycle.sweep_interval_secs, 5);
        assert!(config.lifecycle.strict_durations);
        assert!(!config.cascade.retract_votes_on_option_delete);
        assert_eq!(config.storage.data_dir, "./data");
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FanpollConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.lifecycle.sweep_interval_secs, 60);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
