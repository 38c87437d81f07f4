//! Cascading deletes
//!
//! Deleting a creator, fan, project or option removes every record and
//! every edge that depends on it. The store has no transactions, so a
//! cascade is a sequence of single-document steps:
//!
//! - every step is idempotent (deletes and set pulls), so re-running a
//!   cascade that stopped half-way finishes the job;
//! - the root record is deleted last, so a retry can still find it;
//! - a failure after at least one committed step is reported as
//!   [`EngineError::PartialFailure`].
//!
//! Locking: the root is locked first, then its dependents in ascending
//! kind order. An edge is only ever added while both of its endpoints are
//! locked, so holding the root's lock is enough to stop new edges to it
//! while the cascade runs.

use crate::context::EngineContext;
use crate::entity::{fields, Creator, Fan, PollOption, Project};
use crate::error::{EngineError, EngineResult};
use crate::id::{EntityId, EntityKind};
use crate::ledger::{decrement_clamped, restore_vote};
use crate::lifecycle::LifecycleScheduler;
use crate::locks::LockGuard;
use crate::steps::Steps;
use crate::store::{self, id_value, EntityStore, Filter};
use serde::{Deserialize, Serialize};

/// What a cascade removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    pub creators: usize,
    pub fans: usize,
    pub projects: usize,
    pub options: usize,
    /// Pending lifecycle timers dropped with their project
    pub transitions: usize,
    pub follow_edges: usize,
    pub vote_edges: usize,
    pub counters_decremented: usize,
}

#[derive(Clone)]
pub struct CascadeCoordinator {
    ctx: EngineContext,
    lifecycle: LifecycleScheduler,
}

impl CascadeCoordinator {
    pub fn new(ctx: EngineContext) -> Self {
        let lifecycle = LifecycleScheduler::new(ctx.clone());
        Self { ctx, lifecycle }
    }

    fn store(&self) -> &dyn EntityStore {
        self.ctx.store()
    }

    fn retract_votes(&self) -> bool {
        self.ctx.config.cascade.retract_votes_on_option_delete
    }

    /// Remove a creator with all their projects and options, and drop
    /// them from every follower's `favoritCreators`.
    pub async fn delete_creator(&self, creator_id: &EntityId) -> EngineResult<CascadeReport> {
        let creator_guard = self.ctx.locks.acquire_one(EntityKind::Creator, creator_id).await;
        let creator: Creator = store::load(self.store(), creator_id).await?;

        let project_ids = self.owned_projects(&creator).await?;
        let project_guard = self.lock_all(EntityKind::Project, &project_ids).await;

        let mut option_ids = Vec::new();
        for project_id in &project_ids {
            option_ids.extend(self.project_options(project_id).await?);
        }
        let option_guard = self.lock_all(EntityKind::Option, &option_ids).await;
        let _guard = creator_guard.merge(project_guard).merge(option_guard);

        let mut report = CascadeReport::default();
        let mut steps = Steps::new("deleteCreator");

        for project_id in &project_ids {
            report.transitions +=
                steps.run("cancel pending transitions", self.lifecycle.cancel_locked(project_id)).await?;
        }
        for option_id in &option_ids {
            report.vote_edges += steps.run("retract votes", self.drop_votes_on(option_id)).await?;
            report.options +=
                steps.run("delete options", self.delete_record(EntityKind::Option, option_id)).await?;
        }
        for project_id in &project_ids {
            report.projects +=
                steps.run("delete projects", self.delete_record(EntityKind::Project, project_id)).await?;
        }

        let followers = self.holders(EntityKind::Fan, fields::FAVORITE_CREATORS, creator_id, &creator.fans).await?;
        for fan_id in &followers {
            report.follow_edges += steps
                .run(
                    "unlink followers",
                    self.pull_edge(EntityKind::Fan, fan_id, fields::FAVORITE_CREATORS, creator_id),
                )
                .await?;
        }

        report.creators +=
            steps.run("delete creator", self.delete_record(EntityKind::Creator, creator_id)).await?;

        log::info!(
            "Creator {} deleted with {} project(s), {} option(s), {} follower edge(s)",
            creator_id,
            report.projects,
            report.options,
            report.follow_edges
        );
        Ok(report)
    }

    /// Remove a fan: their votes are uncounted and they leave every
    /// creator's `fans`.
    pub async fn delete_fan(&self, fan_id: &EntityId) -> EngineResult<CascadeReport> {
        let fan_guard = self.ctx.locks.acquire_one(EntityKind::Fan, fan_id).await;
        let fan: Fan = store::load(self.store(), fan_id).await?;
        let option_guard = self.lock_all(EntityKind::Option, &fan.votes).await;
        let _guard = fan_guard.merge(option_guard);

        let mut report = CascadeReport::default();
        let mut steps = Steps::new("deleteFan");

        // pull before decrement: a retry never counts the same vote down twice,
        // and a failed decrement puts the vote back for the retry to find
        for option_id in &fan.votes {
            let pulled = steps
                .run("uncount votes", self.pull_edge(EntityKind::Fan, fan_id, fields::VOTES, option_id))
                .await?;
            report.vote_edges += pulled;
            if pulled > 0 {
                let decrement = async {
                    let result = decrement_clamped(self.store(), option_id).await;
                    if let Err(err) = &result {
                        restore_vote(self.store(), fan_id, option_id, err).await;
                    }
                    result
                };
                let decremented = steps.run("uncount votes", decrement).await?;
                if decremented.is_some() {
                    report.counters_decremented += 1;
                }
            }
        }

        let followed =
            self.holders(EntityKind::Creator, fields::FANS, fan_id, &fan.favorite_creators).await?;
        for creator_id in &followed {
            report.follow_edges += steps
                .run("unlink followed creators", self.pull_edge(EntityKind::Creator, creator_id, fields::FANS, fan_id))
                .await?;
        }

        report.fans += steps.run("delete fan", self.delete_record(EntityKind::Fan, fan_id)).await?;

        log::info!(
            "Fan {} deleted, {} vote(s) uncounted, {} follow edge(s) removed",
            fan_id,
            report.counters_decremented,
            report.follow_edges
        );
        Ok(report)
    }

    /// Owner-only. Removes the project's options and pending timers, then
    /// unlinks the project from its creator.
    pub async fn delete_project(
        &self,
        creator_id: &EntityId,
        project_id: &EntityId,
    ) -> EngineResult<CascadeReport> {
        let project_guard = self.ctx.locks.acquire_one(EntityKind::Project, project_id).await;
        let project: Project = store::load(self.store(), project_id).await?;
        if project.creator != *creator_id {
            return Err(EngineError::Forbidden("You are not authorized to delete this project".into()));
        }

        let option_ids = self.project_options(project_id).await?;
        let option_guard = self.lock_all(EntityKind::Option, &option_ids).await;
        let _guard = project_guard.merge(option_guard);

        let mut report = CascadeReport::default();
        let mut steps = Steps::new("deleteProject");

        report.transitions +=
            steps.run("cancel pending transitions", self.lifecycle.cancel_locked(project_id)).await?;
        for option_id in &option_ids {
            report.vote_edges += steps.run("retract votes", self.drop_votes_on(option_id)).await?;
            report.options +=
                steps.run("delete options", self.delete_record(EntityKind::Option, option_id)).await?;
        }
        steps
            .run(
                "unlink from creator",
                self.pull_edge(EntityKind::Creator, &project.creator, fields::PROJECTS, project_id),
            )
            .await?;
        report.projects +=
            steps.run("delete project", self.delete_record(EntityKind::Project, project_id)).await?;

        log::info!("Project {} deleted with {} option(s)", project_id, report.options);
        Ok(report)
    }

    /// Owner-only. Unlinks the option from its project and deletes it.
    ///
    /// Votes for the option are pulled from the fans' vote sets when
    /// `cascade.retract_votes_on_option_delete` is on; otherwise they stay
    /// behind as dangling ids. Counters are never decremented here since
    /// the counter goes away with the option. An option whose project is
    /// already gone has no owner left and may be removed by any creator.
    pub async fn delete_option(
        &self,
        creator_id: &EntityId,
        option_id: &EntityId,
    ) -> EngineResult<CascadeReport> {
        let peek: PollOption = store::load(self.store(), option_id).await?;
        let _guard = self
            .ctx
            .locks
            .acquire([
                (EntityKind::Project, peek.project_id.clone()),
                (EntityKind::Option, option_id.clone()),
            ])
            .await;

        let option: PollOption = store::load(self.store(), option_id).await?;
        let project = store::try_load::<Project>(self.store(), &option.project_id).await?;
        match &project {
            Some(project) if project.creator != *creator_id => {
                return Err(EngineError::Forbidden("You are not authorized to delete this option".into()))
            }
            Some(_) => {}
            None => log::warn!(
                "Option {} outlived project {}; removing it for creator {}",
                option_id,
                option.project_id,
                creator_id
            ),
        }

        let mut report = CascadeReport::default();
        let mut steps = Steps::new("deleteOption");

        report.vote_edges += steps.run("retract votes", self.drop_votes_on(option_id)).await?;
        steps
            .run(
                "unlink from project",
                self.pull_edge(EntityKind::Project, &option.project_id, fields::OPTIONS, option_id),
            )
            .await?;
        report.options +=
            steps.run("delete option", self.delete_record(EntityKind::Option, option_id)).await?;

        log::info!("Option {} of project {} deleted", option_id, option.project_id);
        Ok(report)
    }

    async fn lock_all(&self, kind: EntityKind, ids: &[EntityId]) -> LockGuard {
        self.ctx.locks.acquire(ids.iter().map(|id| (kind, id.clone()))).await
    }

    /// Projects whose `creator` is this creator, plus any listed in the
    /// creator's `projects`
    async fn owned_projects(&self, creator: &Creator) -> EngineResult<Vec<EntityId>> {
        let scanned: Vec<Project> =
            store::load_where(self.store(), &Filter::eq(fields::CREATOR, id_value(&creator.id))).await?;
        let mut ids: Vec<EntityId> = scanned.into_iter().map(|p| p.id).collect();
        ids.extend(creator.projects.iter().cloned());
        Ok(dedup(ids))
    }

    /// Options pointing at the project, plus any listed in its `options`
    async fn project_options(&self, project_id: &EntityId) -> EngineResult<Vec<EntityId>> {
        let scanned: Vec<PollOption> =
            store::load_where(self.store(), &Filter::eq(fields::PROJECT_ID, id_value(project_id))).await?;
        let mut ids: Vec<EntityId> = scanned.into_iter().map(|o| o.id).collect();
        if let Some(project) = store::try_load::<Project>(self.store(), project_id).await? {
            ids.extend(project.options);
        }
        Ok(dedup(ids))
    }

    /// Records of `kind` whose array `field` holds `id`, plus the ids the
    /// other side says it is linked to
    async fn holders(
        &self,
        kind: EntityKind,
        field: &str,
        id: &EntityId,
        known: &[EntityId],
    ) -> EngineResult<Vec<EntityId>> {
        let scanned = self.store().find(kind, &Filter::contains(field, id_value(id))).await?;
        let mut ids = Vec::with_capacity(scanned.len() + known.len());
        for document in scanned {
            if let Some(raw) = document.get(fields::ID).and_then(|v| v.as_str()) {
                ids.push(EntityId::parse(raw)?);
            }
        }
        ids.extend(known.iter().cloned());
        Ok(dedup(ids))
    }

    /// Pull the option from every fan holding it, if configured to
    async fn drop_votes_on(&self, option_id: &EntityId) -> EngineResult<usize> {
        if !self.retract_votes() {
            return Ok(0);
        }
        let voters = self.holders(EntityKind::Fan, fields::VOTES, option_id, &[]).await?;
        let mut pulled = 0;
        for fan_id in &voters {
            pulled += self.pull_edge(EntityKind::Fan, fan_id, fields::VOTES, option_id).await?;
        }
        Ok(pulled)
    }

    /// 1 if the edge was there, 0 if it (or the record) was already gone
    async fn pull_edge(
        &self,
        kind: EntityKind,
        id: &EntityId,
        field: &str,
        target: &EntityId,
    ) -> EngineResult<usize> {
        let changed = self.store().pull(kind, id, field, id_value(target)).await?;
        Ok(usize::from(changed.unwrap_or(false)))
    }

    async fn delete_record(&self, kind: EntityKind, id: &EntityId) -> EngineResult<usize> {
        Ok(usize::from(self.store().delete_by_id(kind, id).await?))
    }
}

fn dedup(mut ids: Vec<EntityId>) -> Vec<EntityId> {
    ids.sort();
    ids.dedup();
    ids
}
