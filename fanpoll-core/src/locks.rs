//! Per-entity async locks
//!
//! The store only guarantees single-document atomicity. Operations that
//! touch several documents (a follow toggle writes both the fan and the
//! creator) take a lock per `(kind, id)` first, so two such operations on
//! the same entity run one after the other instead of interleaving.
//!
//! Deadlock freedom: within one [`EntityLocks::acquire`] call keys are taken
//! in `(kind, id)` order, and an operation that locks in several calls must
//! do so in ascending [`EntityKind`] order (creators, fans, projects,
//! options, transitions) and never go back to a kind it already passed.
//!
//! Slots are created on first use. Idle ones are dropped by the lifecycle
//! sweeper and, without one running, by `acquire` itself whenever the table
//! grows past its high-water mark.

use crate::id::{EntityId, EntityKind};
use scc::HashMap as SccHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub type LockKey = (EntityKind, EntityId);

/// Held locks; released on drop
#[must_use = "locks are released as soon as the guard is dropped"]
pub struct LockGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
    keys: Vec<LockKey>,
}

impl LockGuard {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }

    /// Keep several acquisitions alive together
    pub fn merge(mut self, other: LockGuard) -> LockGuard {
        self._guards.extend(other._guards);
        self.keys.extend(other.keys);
        self
    }
}

/// Table size that triggers an inline prune
pub const DEFAULT_PRUNE_THRESHOLD: usize = 4096;

pub struct EntityLocks {
    locks: SccHashMap<LockKey, Arc<Mutex<()>>>,
    prune_threshold: usize,
    next_prune: AtomicUsize,
}

impl Default for EntityLocks {
    fn default() -> Self {
        Self::with_prune_threshold(DEFAULT_PRUNE_THRESHOLD)
    }
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prune_threshold(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            locks: SccHashMap::default(),
            prune_threshold: threshold,
            next_prune: AtomicUsize::new(threshold),
        }
    }

    fn slot(&self, key: &LockKey) -> Arc<Mutex<()>> {
        self.locks.entry_sync(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).get().clone()
    }

    /// Lock every key, sorted and deduplicated
    pub async fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> LockGuard {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.slot(key).lock_owned().await);
        }
        self.prune_if_grown();
        LockGuard { _guards: guards, keys }
    }

    pub async fn acquire_one(&self, kind: EntityKind, id: &EntityId) -> LockGuard {
        self.acquire([(kind, id.clone())]).await
    }

    /// Drop lock slots nobody holds or waits on. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain_sync(|_, slot| Arc::strong_count(slot) > 1 || slot.try_lock().is_err());
        before.saturating_sub(self.locks.len())
    }

    /// Prune once the table reaches the high-water mark, then move the mark
    /// to twice the surviving size so a table full of held locks is not
    /// rescanned on every call
    fn prune_if_grown(&self) {
        if self.locks.len() < self.next_prune.load(Ordering::Relaxed) {
            return;
        }
        let pruned = self.prune_idle();
        let live = self.locks.len();
        self.next_prune.store(self.prune_threshold.max(live.saturating_mul(2)), Ordering::Relaxed);
        if pruned > 0 {
            log::debug!("Pruned {} idle entity lock(s), {} still in use", pruned, live);
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
