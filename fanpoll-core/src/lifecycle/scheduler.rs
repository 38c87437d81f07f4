//! Project creation and updates, and the transitions they arm

use super::{
    add_days, validate_time_count, ActivationWindow, NewProject, ProjectUpdate, ScheduledTransition,
    Transition,
};
use crate::context::EngineContext;
use crate::entity::{fields, Creator, Project};
use crate::error::{EngineError, EngineResult};
use crate::id::{EntityId, EntityKind};
use crate::steps::Steps;
use crate::store::{self, found, id_value, Filter, Patch};
use chrono::{DateTime, Utc};

/// Result of firing one transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The project went `Scheduled -> Active`
    Activated,
    /// The project was already active; the record was just consumed
    AlreadyActive,
    /// The project no longer exists; the orphaned record was removed
    ProjectGone,
    /// Nothing to fire: already fired, superseded or cancelled
    NotPending,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub due: usize,
    pub activated: usize,
    pub consumed: usize,
    pub failed: usize,
}

/// Owns every write to `inProgress` and to the transitions collection.
///
/// Transition records of a project are only touched while that project's
/// lock is held.
#[derive(Clone)]
pub struct LifecycleScheduler {
    ctx: EngineContext,
}

impl LifecycleScheduler {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    fn strict(&self) -> bool {
        self.ctx.config.lifecycle.strict_durations
    }

    /// Create a campaign for `creator_id` and link it into the creator's
    /// `projects`. A project whose window is still open starts `Scheduled`
    /// with an activation armed for the window end.
    pub async fn create_project(
        &self,
        creator_id: &EntityId,
        input: NewProject,
    ) -> EngineResult<Project> {
        require_text("title", &input.title)?;
        require_text("description", &input.description)?;
        validate_time_count(input.time_count, self.strict())?;

        let now = self.ctx.now();
        let window = ActivationWindow::new(input.start_date.unwrap_or(now), input.time_count)?;
        let status = window.initial_status(now, input.in_progress);

        let project = Project {
            id: EntityId::generate(),
            title: input.title.trim().to_string(),
            description: input.description,
            image: input.image,
            creator: creator_id.clone(),
            in_progress: status.in_progress(),
            time_count: input.time_count,
            start_date: window.start,
            options: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let _guard = self
            .ctx
            .locks
            .acquire([
                (EntityKind::Creator, creator_id.clone()),
                (EntityKind::Project, project.id.clone()),
            ])
            .await;

        let store = self.ctx.store();
        store::load::<Creator>(store, creator_id).await?;

        let mut steps = Steps::new("createProject");
        let created = steps.run("insert project", store::save_new(store, &project)).await?;

        let linked = steps
            .run("link project to creator", async {
                let changed = store
                    .add_to_set(EntityKind::Creator, creator_id, fields::PROJECTS, id_value(&project.id))
                    .await?;
                found(changed, EntityKind::Creator, creator_id)
            })
            .await;
        let armed = match linked {
            Ok(_) if !project.in_progress => steps
                .run("arm activation", self.arm_locked(&project.id, window.end))
                .await
                .map(|_| ()),
            other => other.map(|_| ()),
        };

        if let Err(err) = armed {
            return Err(self.undo_create(creator_id, &project.id, err).await);
        }

        log::info!(
            "Project {} created for creator {} ({:?}, window ends {})",
            created.id,
            creator_id,
            status,
            window.end
        );
        Ok(created)
    }

    /// Compensate a failed creation. The original error is returned when
    /// the compensation worked, since nothing is left behind.
    async fn undo_create(
        &self,
        creator_id: &EntityId,
        project_id: &EntityId,
        err: EngineError,
    ) -> EngineError {
        let store = self.ctx.store();
        let undo = async {
            self.cancel_locked(project_id).await?;
            store.pull(EntityKind::Creator, creator_id, fields::PROJECTS, id_value(project_id)).await?;
            store.delete_by_id(EntityKind::Project, project_id).await?;
            Ok::<_, EngineError>(())
        };
        match undo.await {
            Ok(()) => match err {
                EngineError::PartialFailure { source, .. } => *source,
                other => other,
            },
            Err(undo_err) => {
                log::error!("Could not roll back project {}: {}", project_id, undo_err);
                err
            }
        }
    }

    /// Owner-only partial update.
    ///
    /// Flipping `inProgress` from `true` to `false` re-arms an activation
    /// for `now + timeCount` days, using the new `timeCount` when one is
    /// supplied. Activating a project by hand drops its pending timer.
    pub async fn update_project(
        &self,
        creator_id: &EntityId,
        project_id: &EntityId,
        update: ProjectUpdate,
    ) -> EngineResult<Project> {
        if let Some(title) = &update.title {
            require_text("title", title)?;
        }
        if let Some(description) = &update.description {
            require_text("description", description)?;
        }
        if let Some(time_count) = update.time_count {
            validate_time_count(time_count, self.strict())?;
        }

        let _guard = self.ctx.locks.acquire_one(EntityKind::Project, project_id).await;
        let store = self.ctx.store();

        let before: Project = store::load(store, project_id).await?;
        if before.creator != *creator_id {
            return Err(EngineError::Forbidden(
                "You are not authorized to update this project".into(),
            ));
        }

        let deactivating = before.in_progress && update.in_progress == Some(false);
        let activating = update.in_progress == Some(true);
        let time_count = update.time_count.unwrap_or(before.time_count);

        let patch = Patch::new()
            .set_if(fields::TITLE, update.title.map(|t| t.trim().to_string()))
            .set_if(fields::DESCRIPTION, update.description)
            .set_if(fields::IMAGE, update.image)
            .set_if(fields::IN_PROGRESS, update.in_progress)
            .set_if(fields::TIME_COUNT, update.time_count)
            .set_if(fields::START_DATE, update.start_date.map(|d| d.to_rfc3339()));

        // Arm before writing the flip: if the write fails the retry still
        // sees `inProgress == true` and arms again, superseding this one.
        let mut steps = Steps::new("updateProject");
        if deactivating {
            let due = add_days(self.ctx.now(), time_count)?;
            steps.run("arm activation", self.arm_locked(project_id, due)).await?;
        }
        let after: Project =
            steps.run("update project", store::patch(store, project_id, &patch)).await?;

        if activating {
            if let Err(err) = self.cancel_locked(project_id).await {
                // a leftover timer only re-activates an active project
                log::warn!("Could not drop pending timer of project {}: {}", project_id, err);
            }
        }

        log::debug!("Project {} updated by creator {}", project_id, creator_id);
        Ok(after)
    }

    /// Arm an activation for `project_id`, superseding any pending one
    pub async fn arm(
        &self,
        project_id: &EntityId,
        due_at: DateTime<Utc>,
    ) -> EngineResult<ScheduledTransition> {
        let _guard = self.ctx.locks.acquire_one(EntityKind::Project, project_id).await;
        store::load::<Project>(self.ctx.store(), project_id).await?;
        self.arm_locked(project_id, due_at).await
    }

    /// Caller holds the project lock
    pub(crate) async fn arm_locked(
        &self,
        project_id: &EntityId,
        due_at: DateTime<Utc>,
    ) -> EngineResult<ScheduledTransition> {
        let superseded = self.cancel_locked(project_id).await?;
        if superseded > 0 {
            log::debug!("Superseded {} pending transition(s) of project {}", superseded, project_id);
        }

        let transition = ScheduledTransition {
            id: EntityId::generate(),
            project_id: project_id.clone(),
            due_at,
            transition: Transition::Activate,
            armed_at: self.ctx.now(),
        };
        let armed = store::save_new(self.ctx.store(), &transition).await?;
        log::info!("Activation of project {} armed for {}", project_id, due_at);
        Ok(armed)
    }

    /// Remove every pending transition of a project. Caller holds the
    /// project lock.
    pub(crate) async fn cancel_locked(&self, project_id: &EntityId) -> EngineResult<usize> {
        let store = self.ctx.store();
        let pending = self.pending(project_id).await?;
        let mut removed = 0;
        for transition in pending {
            if store.delete_by_id(EntityKind::Transition, &transition.id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Pending transitions of a project, soonest first
    pub async fn pending(&self, project_id: &EntityId) -> EngineResult<Vec<ScheduledTransition>> {
        let mut pending: Vec<ScheduledTransition> = store::load_where(
            self.ctx.store(),
            &Filter::eq(fields::PROJECT_ID, id_value(project_id)),
        )
        .await?;
        pending.sort_by_key(|t| t.due_at);
        Ok(pending)
    }

    /// Apply one transition. Safe to call any number of times.
    pub async fn fire(&self, transition_id: &EntityId) -> EngineResult<FireOutcome> {
        let store = self.ctx.store();

        let Some(peek) = store::try_load::<ScheduledTransition>(store, transition_id).await? else {
            return Ok(FireOutcome::NotPending);
        };
        let _guard = self.ctx.locks.acquire_one(EntityKind::Project, &peek.project_id).await;

        // re-read under the lock: a concurrent fire or re-arm may have won
        let Some(transition) = store::try_load::<ScheduledTransition>(store, transition_id).await?
        else {
            return Ok(FireOutcome::NotPending);
        };

        let outcome = match store::try_load::<Project>(store, &transition.project_id).await? {
            None => FireOutcome::ProjectGone,
            Some(project) if project.in_progress => FireOutcome::AlreadyActive,
            Some(_) => match transition.transition {
                Transition::Activate => {
                    let patch = Patch::new().set(fields::IN_PROGRESS, true);
                    store::patch::<Project>(store, &transition.project_id, &patch).await?;
                    FireOutcome::Activated
                }
            },
        };

        store.delete_by_id(EntityKind::Transition, transition_id).await?;

        match outcome {
            FireOutcome::Activated => {
                log::info!("Project {} activated by its timer", transition.project_id)
            }
            other => log::debug!("Transition {} consumed: {:?}", transition_id, other),
        }
        Ok(outcome)
    }

    /// Fire every transition due at `now`. One failing transition does
    /// not stop the others; it stays pending for the next sweep.
    pub async fn sweep_due(&self, now: DateTime<Utc>) -> EngineResult<SweepReport> {
        let all: Vec<ScheduledTransition> =
            store::load_where(self.ctx.store(), &Filter::All).await?;
        let mut due: Vec<ScheduledTransition> = all.into_iter().filter(|t| t.is_due(now)).collect();
        due.sort_by_key(|t| t.due_at);

        let mut report = SweepReport { due: due.len(), ..Default::default() };
        for transition in due {
            match self.fire(&transition.id).await {
                Ok(FireOutcome::Activated) => report.activated += 1,
                Ok(_) => report.consumed += 1,
                Err(err) => {
                    report.failed += 1;
                    log::error!("Transition {} failed to fire: {}", transition.id, err);
                }
            }
        }

        if report.due > 0 {
            log::info!(
                "Lifecycle sweep: {} due, {} activated, {} consumed, {} failed",
                report.due,
                report.activated,
                report.consumed,
                report.failed
            );
        }
        Ok(report)
    }
}

fn require_text(field: &str, value: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        Err(EngineError::ValidationFailed(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FanpollConfig;
    use crate::lifecycle::Clock;
    use crate::store::EntityStore;
    use crate::testing::Fixture;
    use chrono::Duration;

    fn new_project(time_count: u32) -> NewProject {
        NewProject {
            title: "Next album cover".into(),
            description: "Pick the artwork".into(),
            time_count,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_new_project_starts_scheduled_with_armed_timer() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let lifecycle = fx.lifecycle();

        let project = lifecycle.create_project(&creator.id, new_project(7)).await.unwrap();
        assert!(!project.in_progress);

        let pending = lifecycle.pending(&project.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].due_at, project.start_date + Duration::days(7));

        let creator = fx.reload_creator(&creator.id).await;
        assert_eq!(creator.projects, vec![project.id.clone()]);
    }

    #[tokio::test]
    async fn test_requested_activation_arms_nothing() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let lifecycle = fx.lifecycle();

        let input = NewProject { in_progress: true, ..new_project(7) };
        let project = lifecycle.create_project(&creator.id, input).await.unwrap();
        assert!(project.in_progress);
        assert!(lifecycle.pending(&project.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_elapsed_window_starts_active() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;

        let input =
            NewProject { start_date: Some(fx.clock.now() - Duration::days(10)), ..new_project(7) };
        let project = fx.lifecycle().create_project(&creator.id, input).await.unwrap();
        assert!(project.in_progress);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input_before_writing() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let lifecycle = fx.lifecycle();

        let err = lifecycle.create_project(&creator.id, new_project(4)).await.unwrap_err();
        assert!(matches!(err, EngineError::ValidationFailed(_)));

        let untitled = NewProject { title: "  ".into(), ..new_project(7) };
        assert!(lifecycle.create_project(&creator.id, untitled).await.is_err());

        let err = lifecycle.create_project(&EntityId::generate(), new_project(7)).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: EntityKind::Creator, .. }));

        assert_eq!(fx.store.count(EntityKind::Project).await.unwrap(), 0);
    }

    fn lenient() -> Fixture {
        let mut config = FanpollConfig::default();
        config.lifecycle.strict_durations = false;
        Fixture::with_config(config)
    }

    #[tokio::test]
    async fn test_create_rejects_window_past_representable_time() {
        let fx = lenient();
        let creator = fx.creator("Nina").await;
        let lifecycle = fx.lifecycle();

        let err = lifecycle.create_project(&creator.id, new_project(u32::MAX)).await.unwrap_err();
        assert!(matches!(err, EngineError::ValidationFailed(_)));

        let far = NewProject { start_date: Some(DateTime::<Utc>::MAX_UTC - Duration::days(1)), ..new_project(7) };
        let err = lifecycle.create_project(&creator.id, far).await.unwrap_err();
        assert!(matches!(err, EngineError::ValidationFailed(_)));

        assert_eq!(fx.store.count(EntityKind::Project).await.unwrap(), 0);
        assert!(fx.reload_creator(&creator.id).await.projects.is_empty());
    }

    #[tokio::test]
    async fn test_deactivation_rejects_out_of_range_time_count() {
        let fx = lenient();
        let creator = fx.creator("Nina").await;
        let lifecycle = fx.lifecycle();
        let input = NewProject { in_progress: true, ..new_project(7) };
        let project = lifecycle.create_project(&creator.id, input).await.unwrap();

        let update =
            ProjectUpdate { in_progress: Some(false), time_count: Some(u32::MAX), ..Default::default() };
        let err = lifecycle.update_project(&creator.id, &project.id, update).await.unwrap_err();
        assert!(matches!(err, EngineError::ValidationFailed(_)));

        let stored = fx.reload_project(&project.id).await;
        assert!(stored.in_progress);
        assert_eq!(stored.time_count, 7);
        assert!(lifecycle.pending(&project.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_arming_rolls_back_the_project() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;

        // writes: insert project, link into creator, insert transition
        fx.faults.fail_nth_write(3);
        let err = fx.lifecycle().create_project(&creator.id, new_project(7)).await.unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
        assert_eq!(fx.store.count(EntityKind::Project).await.unwrap(), 0);
        assert_eq!(fx.store.count(EntityKind::Transition).await.unwrap(), 0);
        assert!(fx.reload_creator(&creator.id).await.projects.is_empty());
        assert!(fx.audit().await.is_consistent());
    }

    #[tokio::test]
    async fn test_failed_rollback_of_create_is_partial() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;

        fx.faults.fail_from_nth_write(3);
        let err = fx.lifecycle().create_project(&creator.id, new_project(7)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::PartialFailure { operation: "createProject", step: "arm activation", committed: 2, .. }
        ));
        assert_eq!(fx.store.count(EntityKind::Project).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_activates_due_projects_once() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let lifecycle = fx.lifecycle();
        let project = lifecycle.create_project(&creator.id, new_project(7)).await.unwrap();

        let early = lifecycle.sweep_due(fx.clock.now() + Duration::days(6)).await.unwrap();
        assert_eq!(early.due, 0);
        assert!(!fx.reload_project(&project.id).await.in_progress);

        fx.clock.advance(Duration::days(7));
        let report = lifecycle.sweep_due(fx.clock.now()).await.unwrap();
        assert_eq!(report.activated, 1);
        assert!(fx.reload_project(&project.id).await.in_progress);

        let again = lifecycle.sweep_due(fx.clock.now()).await.unwrap();
        assert_eq!(again, SweepReport::default());
    }

    #[tokio::test]
    async fn test_fire_is_idempotent() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let lifecycle = fx.lifecycle();
        let project = lifecycle.create_project(&creator.id, new_project(1)).await.unwrap();
        let transition = lifecycle.pending(&project.id).await.unwrap().remove(0);

        let (a, b) = tokio::join!(lifecycle.fire(&transition.id), lifecycle.fire(&transition.id));
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| format!("{o:?}"));
        assert_eq!(outcomes, vec![FireOutcome::Activated, FireOutcome::NotPending]);
    }

    #[tokio::test]
    async fn test_deactivation_rearms_with_new_time_count() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let lifecycle = fx.lifecycle();
        let input = NewProject { in_progress: true, ..new_project(7) };
        let project = lifecycle.create_project(&creator.id, input).await.unwrap();

        fx.clock.advance(Duration::days(2));
        let update = ProjectUpdate { in_progress: Some(false), time_count: Some(14), ..Default::default() };
        let updated = lifecycle.update_project(&creator.id, &project.id, update).await.unwrap();
        assert!(!updated.in_progress);
        assert_eq!(updated.time_count, 14);

        let pending = lifecycle.pending(&project.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].due_at, fx.clock.now() + Duration::days(14));
    }

    #[tokio::test]
    async fn test_rearm_supersedes_pending_timer() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let lifecycle = fx.lifecycle();
        let project = lifecycle.create_project(&creator.id, new_project(7)).await.unwrap();

        let later = fx.clock.now() + Duration::days(21);
        lifecycle.arm(&project.id, later).await.unwrap();

        let pending = lifecycle.pending(&project.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].due_at, later);
    }

    #[tokio::test]
    async fn test_manual_activation_drops_timer() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let lifecycle = fx.lifecycle();
        let project = lifecycle.create_project(&creator.id, new_project(7)).await.unwrap();

        let update = ProjectUpdate { in_progress: Some(true), ..Default::default() };
        lifecycle.update_project(&creator.id, &project.id, update).await.unwrap();
        assert!(lifecycle.pending(&project.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_project_is_never_closed_by_a_timer() {
        // There is no Active -> Scheduled timer. An active campaign stays
        // active however much time passes.
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let lifecycle = fx.lifecycle();
        let input = NewProject { in_progress: true, ..new_project(1) };
        let project = lifecycle.create_project(&creator.id, input).await.unwrap();

        fx.clock.advance(Duration::days(90));
        lifecycle.sweep_due(fx.clock.now()).await.unwrap();
        assert!(fx.reload_project(&project.id).await.in_progress);
    }

    #[tokio::test]
    async fn test_only_owner_updates() {
        let fx = Fixture::new();
        let owner = fx.creator("Nina").await;
        let other = fx.creator("Otto").await;
        let lifecycle = fx.lifecycle();
        let project = lifecycle.create_project(&owner.id, new_project(7)).await.unwrap();

        let update = ProjectUpdate { title: Some("Hijacked".into()), ..Default::default() };
        let err = lifecycle.update_project(&other.id, &project.id, update).await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
        assert_eq!(fx.reload_project(&project.id).await.title, "Next album cover");
    }

    #[tokio::test]
    async fn test_orphaned_transition_is_consumed() {
        let fx = Fixture::new();
        let creator = fx.creator("Nina").await;
        let lifecycle = fx.lifecycle();
        let project = lifecycle.create_project(&creator.id, new_project(1)).await.unwrap();
        let transition = lifecycle.pending(&project.id).await.unwrap().remove(0);

        fx.store.delete_by_id(EntityKind::Project, &project.id).await.unwrap();
        assert_eq!(lifecycle.fire(&transition.id).await.unwrap(), FireOutcome::ProjectGone);
        assert_eq!(fx.store.count(EntityKind::Transition).await.unwrap(), 0);
    }
}
