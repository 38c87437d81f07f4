//! Shared handles every engine service works with

use crate::config::FanpollConfig;
use crate::lifecycle::{Clock, SystemClock};
use crate::locks::EntityLocks;
use crate::store::EntityStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Cheap to clone; all services built from the same context share the
/// store, the lock table and the clock.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn EntityStore>,
    pub locks: Arc<EntityLocks>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<FanpollConfig>,
}

impl EngineContext {
    pub fn new(store: Arc<dyn EntityStore>, config: FanpollConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn EntityStore>,
        config: FanpollConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, locks: Arc::new(EntityLocks::new()), clock, config: Arc::new(config) }
    }

    pub fn store(&self) -> &dyn EntityStore {
        self.store.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
