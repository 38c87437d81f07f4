//! Cascading deletion configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// When an option is deleted, also pull its id from every fan's vote set.
    /// Off reproduces the legacy behavior that leaves dangling vote ids.
    /// Env: FP_RETRACT_VOTES_ON_OPTION_DELETE
    /// Default: true
    pub retract_votes_on_option_delete: bool,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self { retract_votes_on_option_delete: true }
    }
}

impl CascadeConfig {
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    pub fn apply_env_vars(&mut self) {
        if let Some(retract) = env::var("FP_RETRACT_VOTES_ON_OPTION_DELETE")
            .ok()
            .and_then(|v| super::parse_flag(&v))
        {
            self.retract_votes_on_option_delete = retract;
        }
    }

    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}
