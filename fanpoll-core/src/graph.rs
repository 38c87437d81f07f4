//! Creator <-> fan follow edges
//!
//! An edge is stored twice: the fan id in `Creator.fans` and the creator id
//! in `Fan.favoritCreators`. Both sides are only written while the pair is
//! locked, so the two arrays always mirror each other once a toggle
//! returns.

use crate::context::EngineContext;
use crate::entity::{fields, Creator, Fan};
use crate::error::{EngineError, EngineResult};
use crate::id::{EntityId, EntityKind};
use crate::store::{self, found, id_value, EntityStore};
use serde::{Deserialize, Serialize};

/// Both records after a toggle, passwords redacted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowOutcome {
    pub following: bool,
    pub fan: Fan,
    pub creator: Creator,
}

#[derive(Clone)]
pub struct RelationshipGraph {
    ctx: EngineContext,
}

impl RelationshipGraph {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Follow `creator_id` if the fan does not follow it yet, unfollow
    /// otherwise. The fan's side decides which one it is.
    pub async fn toggle_follow(
        &self,
        fan_id: &EntityId,
        creator_id: &EntityId,
    ) -> EngineResult<FollowOutcome> {
        let _guard = self
            .ctx
            .locks
            .acquire([
                (EntityKind::Creator, creator_id.clone()),
                (EntityKind::Fan, fan_id.clone()),
            ])
            .await;

        let store = self.ctx.store();
        let fan: Fan = store::load(store, fan_id).await?;
        store::load::<Creator>(store, creator_id).await?;

        let following = !fan.favorite_creators.contains(creator_id);
        let edge = Edge { fan_id, creator_id };

        edge.write_fan_side(store, following).await?;
        if let Err(err) = edge.write_creator_side(store, following).await {
            return Err(edge.roll_back_fan_side(store, following, err).await);
        }

        let fan: Fan = store::load(store, fan_id).await?;
        let creator: Creator = store::load(store, creator_id).await?;

        if following {
            log::info!("Fan {} now follows creator {}", fan_id, creator_id);
        } else {
            log::info!("Fan {} unfollowed creator {}", fan_id, creator_id);
        }
        Ok(FollowOutcome { following, fan: fan.redacted(), creator: creator.redacted() })
    }

    /// Whether the fan follows the creator, read from the fan's side
    pub async fn is_following(&self, fan_id: &EntityId, creator_id: &EntityId) -> EngineResult<bool> {
        let fan: Fan = store::load(self.ctx.store(), fan_id).await?;
        Ok(fan.favorite_creators.contains(creator_id))
    }

    /// Fans following a creator
    pub async fn followers(&self, creator_id: &EntityId) -> EngineResult<Vec<Fan>> {
        let creator: Creator = store::load(self.ctx.store(), creator_id).await?;
        let mut fans = Vec::with_capacity(creator.fans.len());
        for fan_id in &creator.fans {
            if let Some(fan) = store::try_load::<Fan>(self.ctx.store(), fan_id).await? {
                fans.push(fan.redacted());
            }
        }
        Ok(fans)
    }
}

struct Edge<'a> {
    fan_id: &'a EntityId,
    creator_id: &'a EntityId,
}

impl Edge<'_> {
    async fn write_fan_side(&self, store: &dyn EntityStore, add: bool) -> EngineResult<bool> {
        let value = id_value(self.creator_id);
        let changed = if add {
            store.add_to_set(EntityKind::Fan, self.fan_id, fields::FAVORITE_CREATORS, value).await?
        } else {
            store.pull(EntityKind::Fan, self.fan_id, fields::FAVORITE_CREATORS, value).await?
        };
        found(changed, EntityKind::Fan, self.fan_id)
    }

    async fn write_creator_side(&self, store: &dyn EntityStore, add: bool) -> EngineResult<bool> {
        let value = id_value(self.fan_id);
        let changed = if add {
            store.add_to_set(EntityKind::Creator, self.creator_id, fields::FANS, value).await?
        } else {
            store.pull(EntityKind::Creator, self.creator_id, fields::FANS, value).await?
        };
        found(changed, EntityKind::Creator, self.creator_id)
    }

    /// Undo the fan side after the creator side failed. Only if the undo
    /// fails too is the pair left asymmetric, reported as a partial failure.
    async fn roll_back_fan_side(
        &self,
        store: &dyn EntityStore,
        added: bool,
        err: EngineError,
    ) -> EngineError {
        match self.write_fan_side(store, !added).await {
            Ok(_) => {
                log::warn!(
                    "Follow toggle fan {} / creator {} rolled back: {}",
                    self.fan_id,
                    self.creator_id,
                    err
                );
                err
            }
            Err(undo_err) => {
                log::error!(
                    "Follow edge fan {} / creator {} left one-sided: {} (rollback: {})",
                    self.fan_id,
                    self.creator_id,
                    err,
                    undo_err
                );
                EngineError::PartialFailure {
                    operation: "toggleFollow",
                    step: "update creator fans",
                    committed: 1,
                    source: Box::new(err),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_toggle_twice_restores_empty_sets() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let fan = fx.fan("Finn").await;
        let graph = fx.graph();

        let first = graph.toggle_follow(&fan.id, &creator.id).await.unwrap();
        assert!(first.following);
        assert_eq!(first.fan.favorite_creators, vec![creator.id.clone()]);
        assert_eq!(first.creator.fans, vec![fan.id.clone()]);
        assert!(first.fan.password.is_empty());

        let second = graph.toggle_follow(&fan.id, &creator.id).await.unwrap();
        assert!(!second.following);
        assert!(second.fan.favorite_creators.is_empty());
        assert!(second.creator.fans.is_empty());
    }

    #[tokio::test]
    async fn test_missing_side_is_not_found_and_writes_nothing() {
        let fx = Fixture::new();
        let fan = fx.fan("Finn").await;
        let graph = fx.graph();

        let err = graph.toggle_follow(&fan.id, &EntityId::generate()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: EntityKind::Creator, .. }));
        assert!(fx.reload_fan(&fan.id).await.favorite_creators.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_toggles_keep_pair_symmetric() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let fan = fx.fan("Finn").await;
        let graph = Arc::new(fx.graph());

        let mut handles = vec![];
        for _ in 0..25 {
            let graph = graph.clone();
            let (fan_id, creator_id) = (fan.id.clone(), creator.id.clone());
            handles.push(tokio::spawn(async move {
                graph.toggle_follow(&fan_id, &creator_id).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // odd number of toggles: the edge exists on both sides exactly once
        let fan = fx.reload_fan(&fan.id).await;
        let creator = fx.reload_creator(&creator.id).await;
        assert_eq!(fan.favorite_creators, vec![creator.id.clone()]);
        assert_eq!(creator.fans, vec![fan.id.clone()]);
        assert!(fx.audit().await.is_consistent());
    }

    #[tokio::test]
    async fn test_followers() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let a = fx.fan("Ada").await;
        let b = fx.fan("Bo").await;
        let graph = fx.graph();
        graph.toggle_follow(&a.id, &creator.id).await.unwrap();
        graph.toggle_follow(&b.id, &creator.id).await.unwrap();

        let names: Vec<String> =
            graph.followers(&creator.id).await.unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["Ada", "Bo"]);
        assert!(graph.is_following(&a.id, &creator.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_creator_side_rolls_back_fan_side() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let fan = fx.fan("Finn").await;

        fx.faults.fail_nth_write(2);
        let err = fx.graph().toggle_follow(&fan.id, &creator.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
        assert!(fx.reload_fan(&fan.id).await.favorite_creators.is_empty());
        assert!(fx.reload_creator(&creator.id).await.fans.is_empty());
        assert!(fx.audit().await.is_consistent());

        let retried = fx.graph().toggle_follow(&fan.id, &creator.id).await.unwrap();
        assert!(retried.following);
        assert!(fx.audit().await.is_consistent());
    }

    #[tokio::test]
    async fn test_failed_rollback_is_partial() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let fan = fx.fan("Finn").await;

        fx.faults.fail_from_nth_write(2);
        let err = fx.graph().toggle_follow(&fan.id, &creator.id).await.unwrap_err();
        assert!(matches!(err, EngineError::PartialFailure { operation: "toggleFollow", committed: 1, .. }));
        fx.faults.heal();

        let report = fx.audit().await;
        assert_eq!(report.asymmetric_follows, vec![(fan.id.clone(), creator.id.clone())]);
    }
}
