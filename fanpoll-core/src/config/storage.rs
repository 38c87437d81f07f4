//! Storage configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the store journal
    /// Env: FP_DATA_DIR
    /// Default: "./data"
    pub data_dir: String,

    /// Persist every write to an append-only journal and replay it on start
    /// Env: FP_JOURNAL
    /// Default: false (volatile store)
    pub journal_enabled: bool,

    /// fsync the journal after each append
    /// Env: FP_FSYNC
    /// Default: true
    pub fsync_on_append: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: "./data".to_string(), journal_enabled: false, fsync_on_append: true }
    }
}

impl StorageConfig {
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    pub fn apply_env_vars(&mut self) {
        if let Ok(dir) = env::var("FP_DATA_DIR") {
            self.data_dir = dir;
        }
        if let Some(enabled) = env::var("FP_JOURNAL").ok().and_then(|v| super::parse_flag(&v)) {
            self.journal_enabled = enabled;
        }
        if let Some(fsync) = env::var("FP_FSYNC").ok().and_then(|v| super::parse_flag(&v)) {
            self.fsync_on_append = fsync;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.journal_enabled && self.data_dir.trim().is_empty() {
            bail!("Invalid data_dir: required when the journal is enabled");
        }
        Ok(())
    }
}
