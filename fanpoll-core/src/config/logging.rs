//! Logging configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Env: FP_LOG_LEVEL (error, warn, info, debug, trace)
    pub level: String,
    /// Env: FP_LOG_FORMAT (human, json, logfmt)
    pub format: String,
    /// Write to stderr instead of stdout
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "human".to_string(), stderr: false }
    }
}

impl LoggingConfig {
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    pub fn apply_env_vars(&mut self) {
        if let Ok(level) = env::var("FP_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(format) = env::var("FP_LOG_FORMAT") {
            self.format = format;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if crate::logging::LogLevel::parse(&self.level).is_none() {
            bail!("Invalid log level: {}", self.level);
        }
        if crate::logging::LogFormat::parse(&self.format).is_none() {
            bail!("Invalid log format: {}", self.format);
        }
        Ok(())
    }
}
