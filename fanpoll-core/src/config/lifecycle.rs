//! Campaign lifecycle configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Campaign durations (days) accepted in strict mode
pub const ALLOWED_TIME_COUNTS: [u32; 8] = [1, 2, 3, 5, 7, 14, 21, 28];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Run the transition sweeper in the background
    /// Env: FP_AUTO_SWEEP
    /// Default: true
    pub auto_sweep: bool,

    /// Seconds between two sweeps of due transitions
    /// Env: FP_SWEEP_INTERVAL
    /// Default: 60
    pub sweep_interval_secs: u64,

    /// Only accept `timeCount` values from ALLOWED_TIME_COUNTS
    /// Env: FP_STRICT_DURATIONS
    /// Default: true
    pub strict_durations: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { auto_sweep: true, sweep_interval_secs: 60, strict_durations: true }
    }
}

impl LifecycleConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    pub fn apply_env_vars(&mut self) {
        if let Some(enabled) = env::var("FP_AUTO_SWEEP").ok().and_then(|v| super::parse_flag(&v)) {
            self.auto_sweep = enabled;
        }
        if let Ok(interval) = env::var("FP_SWEEP_INTERVAL") {
            if let Ok(secs) = interval.parse() {
                self.sweep_interval_secs = secs;
            }
        }
        if let Some(strict) =
            env::var("FP_STRICT_DURATIONS").ok().and_then(|v| super::parse_flag(&v))
        {
            self.strict_durations = strict;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.auto_sweep && self.sweep_interval_secs == 0 {
            bail!("Invalid sweep_interval_secs: must be greater than 0");
        }
        Ok(())
    }
}
