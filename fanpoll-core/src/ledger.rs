//! Fan votes and option counters
//!
//! A vote is the option id in `Fan.votes`; `PollOption.counter` is the
//! number of fans holding it. Both are written under the (fan, option)
//! lock pair, the vote set first, and the counter only moves when the set
//! actually changed. That makes voting idempotent per (fan, option).

use crate::context::EngineContext;
use crate::entity::{fields, Fan, PollOption};
use crate::error::{EngineError, EngineResult};
use crate::id::{EntityId, EntityKind};
use crate::store::{self, found, id_value, EntityStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteOutcome {
    /// `false` when the call was a no-op
    pub changed: bool,
    /// The option after the call; `None` if it no longer exists
    pub option: Option<PollOption>,
    pub votes: Vec<EntityId>,
}

#[derive(Clone)]
pub struct VoteLedger {
    ctx: EngineContext,
}

impl VoteLedger {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Add the option to the fan's votes, counting it once
    pub async fn record_vote(&self, fan_id: &EntityId, option_id: &EntityId) -> EngineResult<VoteOutcome> {
        let _guard = self.lock_pair(fan_id, option_id).await;
        let store = self.ctx.store();

        store::load::<Fan>(store, fan_id).await?;
        store::load::<PollOption>(store, option_id).await?;

        let added = found(
            store.add_to_set(EntityKind::Fan, fan_id, fields::VOTES, id_value(option_id)).await?,
            EntityKind::Fan,
            fan_id,
        )?;

        if added {
            if let Err(err) = store.increment_field(EntityKind::Option, option_id, fields::COUNTER, 1).await {
                return Err(self.undo_vote(fan_id, option_id, err).await);
            }
            log::info!("Fan {} voted for option {}", fan_id, option_id);
        } else {
            log::debug!("Fan {} already voted for option {}", fan_id, option_id);
        }

        self.outcome(fan_id, option_id, added).await
    }

    /// Remove the fan's vote. The counter only drops when a vote was
    /// really there, and never below zero.
    pub async fn retract_vote(&self, fan_id: &EntityId, option_id: &EntityId) -> EngineResult<VoteOutcome> {
        let _guard = self.lock_pair(fan_id, option_id).await;
        let store = self.ctx.store();

        let fan: Fan = store::load(store, fan_id).await?;
        let option_live = store::try_load::<PollOption>(store, option_id).await?.is_some();
        if !option_live && !fan.votes.contains(option_id) {
            return Err(EngineError::not_found(EntityKind::Option, option_id));
        }

        let removed = found(
            store.pull(EntityKind::Fan, fan_id, fields::VOTES, id_value(option_id)).await?,
            EntityKind::Fan,
            fan_id,
        )?;

        if removed && option_live {
            if let Err(err) = decrement_clamped(store, option_id).await {
                if restore_vote(store, fan_id, option_id, &err).await {
                    return Err(err);
                }
                return Err(EngineError::PartialFailure {
                    operation: "retractVote",
                    step: "decrement option counter",
                    committed: 1,
                    source: Box::new(err),
                });
            }
        }
        if removed {
            log::info!("Fan {} retracted vote for option {}", fan_id, option_id);
        }

        self.outcome(fan_id, option_id, removed).await
    }

    pub async fn has_voted(&self, fan_id: &EntityId, option_id: &EntityId) -> EngineResult<bool> {
        let fan: Fan = store::load(self.ctx.store(), fan_id).await?;
        Ok(fan.votes.contains(option_id))
    }

    async fn lock_pair(&self, fan_id: &EntityId, option_id: &EntityId) -> crate::locks::LockGuard {
        self.ctx
            .locks
            .acquire([(EntityKind::Fan, fan_id.clone()), (EntityKind::Option, option_id.clone())])
            .await
    }

    async fn undo_vote(&self, fan_id: &EntityId, option_id: &EntityId, err: EngineError) -> EngineError {
        let store = self.ctx.store();
        match store.pull(EntityKind::Fan, fan_id, fields::VOTES, id_value(option_id)).await {
            Ok(_) => err,
            Err(undo_err) => {
                log::error!(
                    "Vote of fan {} for option {} is recorded but not counted: {} (rollback: {})",
                    fan_id,
                    option_id,
                    err,
                    undo_err
                );
                EngineError::PartialFailure {
                    operation: "recordVote",
                    step: "increment option counter",
                    committed: 1,
                    source: Box::new(err),
                }
            }
        }
    }

    async fn outcome(&self, fan_id: &EntityId, option_id: &EntityId, changed: bool) -> EngineResult<VoteOutcome> {
        let store = self.ctx.store();
        let fan: Fan = store::load(store, fan_id).await?;
        let option = store::try_load::<PollOption>(store, option_id).await?;
        Ok(VoteOutcome { changed, option, votes: fan.votes })
    }
}

/// Decrement an option counter, stopping at zero. Caller holds the option
/// lock. `Ok(None)` when the option is gone.
pub(crate) async fn decrement_clamped(store: &dyn EntityStore, option_id: &EntityId) -> EngineResult<Option<u64>> {
    let Some(option) = store::try_load::<PollOption>(store, option_id).await? else {
        return Ok(None);
    };
    if option.counter == 0 {
        log::warn!("Counter of option {} already at zero, not decremented", option_id);
        return Ok(Some(0));
    }
    let counter = store.increment_field(EntityKind::Option, option_id, fields::COUNTER, -1).await?;
    Ok(counter.map(|c| c.max(0) as u64))
}

/// Put a pulled vote back after its counter could not be decremented, so
/// a retry finds it and counts it down. `false` if the vote stays pulled
/// with the counter one too high.
pub(crate) async fn restore_vote(
    store: &dyn EntityStore,
    fan_id: &EntityId,
    option_id: &EntityId,
    err: &EngineError,
) -> bool {
    match store.add_to_set(EntityKind::Fan, fan_id, fields::VOTES, id_value(option_id)).await {
        Ok(_) => true,
        Err(undo_err) => {
            log::error!(
                "Vote of fan {} for option {} removed but still counted: {} (rollback: {})",
                fan_id,
                option_id,
                err,
                undo_err
            );
            false
        }
    }
}
