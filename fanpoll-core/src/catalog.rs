//! Options of a campaign, and the read side of the platform

use crate::accounts::validation::require;
use crate::context::EngineContext;
use crate::entity::{fields, Creator, Fan, PollOption, Project};
use crate::error::{EngineError, EngineResult};
use crate::id::{EntityId, EntityKind};
use crate::store::{self, found, id_value, Filter, Patch};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOption {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub image: String,
}

/// Content fields a creator may change. The counter is not among them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptionEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

/// A project with its creator and options resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDetail {
    pub project: Project,
    pub creator: Creator,
    pub options: Vec<PollOption>,
}

#[derive(Clone)]
pub struct Catalog {
    ctx: EngineContext,
}

impl Catalog {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Add an option to one of the creator's projects
    pub async fn create_option(
        &self,
        creator_id: &EntityId,
        project_id: &EntityId,
        input: NewOption,
    ) -> EngineResult<PollOption> {
        require("title", &input.title)?;
        require("description", &input.description)?;

        let option = PollOption {
            id: EntityId::generate(),
            title: input.title.trim().to_string(),
            description: input.description,
            image: input.image,
            project_id: project_id.clone(),
            counter: 0,
        };

        let _guard = self
            .ctx
            .locks
            .acquire([
                (EntityKind::Project, project_id.clone()),
                (EntityKind::Option, option.id.clone()),
            ])
            .await;
        let store = self.ctx.store();

        let project: Project = store::load(store, project_id).await?;
        if project.creator != *creator_id {
            return Err(EngineError::Forbidden(
                "You are not authorized to add options to this project".into(),
            ));
        }

        let created = store::save_new(store, &option).await?;
        let linked = store
            .add_to_set(EntityKind::Project, project_id, fields::OPTIONS, id_value(&option.id))
            .await
            .and_then(|changed| found(changed, EntityKind::Project, project_id));
        if let Err(err) = linked {
            return Err(match store.delete_by_id(EntityKind::Option, &option.id).await {
                Ok(_) => err,
                Err(undo_err) => {
                    log::error!("Option {} left unlinked: {} (rollback: {})", option.id, err, undo_err);
                    EngineError::PartialFailure {
                        operation: "createOption",
                        step: "link option to project",
                        committed: 1,
                        source: Box::new(err),
                    }
                }
            });
        }

        log::info!("Option {} added to project {}", created.id, project_id);
        Ok(created)
    }

    /// Owner-only content edit. Never touches the vote ledger.
    pub async fn edit_option(
        &self,
        creator_id: &EntityId,
        option_id: &EntityId,
        edit: OptionEdit,
    ) -> EngineResult<PollOption> {
        if let Some(title) = &edit.title {
            require("title", title)?;
        }
        if let Some(description) = &edit.description {
            require("description", description)?;
        }

        let _guard = self.ctx.locks.acquire_one(EntityKind::Option, option_id).await;
        let store = self.ctx.store();

        let option: PollOption = store::load(store, option_id).await?;
        let owner = store::try_load::<Project>(store, &option.project_id).await?.map(|p| p.creator);
        if owner.as_ref() != Some(creator_id) {
            return Err(EngineError::Forbidden("You are not authorized to perform this action".into()));
        }

        let patch = Patch::new()
            .set_if(fields::TITLE, edit.title.map(|t| t.trim().to_string()))
            .set_if(fields::DESCRIPTION, edit.description)
            .set_if(fields::IMAGE, edit.image);
        if patch.is_empty() {
            return Ok(option);
        }
        let updated = store::patch(store, option_id, &patch).await?;
        log::debug!("Option {} edited by creator {}", option_id, creator_id);
        Ok(updated)
    }

    pub async fn list_creators(&self) -> EngineResult<Vec<Creator>> {
        let creators: Vec<Creator> = store::load_where(self.ctx.store(), &Filter::All).await?;
        Ok(creators.into_iter().map(Creator::redacted).collect())
    }

    pub async fn list_fans(&self) -> EngineResult<Vec<Fan>> {
        let fans: Vec<Fan> = store::load_where(self.ctx.store(), &Filter::All).await?;
        Ok(fans.into_iter().map(Fan::redacted).collect())
    }

    pub async fn get_creator(&self, id: &EntityId) -> EngineResult<Creator> {
        Ok(store::load::<Creator>(self.ctx.store(), id).await?.redacted())
    }

    pub async fn get_fan(&self, id: &EntityId) -> EngineResult<Fan> {
        Ok(store::load::<Fan>(self.ctx.store(), id).await?.redacted())
    }

    pub async fn list_projects(&self) -> EngineResult<Vec<Project>> {
        store::load_where(self.ctx.store(), &Filter::All).await
    }

    pub async fn creator_projects(&self, creator_id: &EntityId) -> EngineResult<Vec<Project>> {
        store::load_where(self.ctx.store(), &Filter::eq(fields::CREATOR, id_value(creator_id))).await
    }

    /// A creator's project with options and creator populated
    pub async fn project_detail(
        &self,
        creator_id: &EntityId,
        project_id: &EntityId,
    ) -> EngineResult<ProjectDetail> {
        let store = self.ctx.store();
        let project = match store::try_load::<Project>(store, project_id).await? {
            Some(project) if project.creator == *creator_id => project,
            _ => return Err(EngineError::not_found(EntityKind::Project, project_id)),
        };
        let creator = store::load::<Creator>(store, creator_id).await?.redacted();

        let mut options = Vec::with_capacity(project.options.len());
        for option_id in &project.options {
            if let Some(option) = store::try_load::<PollOption>(store, option_id).await? {
                options.push(option);
            }
        }
        Ok(ProjectDetail { project, creator, options })
    }

    pub async fn project_options(&self, project_id: &EntityId) -> EngineResult<Vec<PollOption>> {
        store::load_where(self.ctx.store(), &Filter::eq(fields::PROJECT_ID, id_value(project_id))).await
    }

    pub async fn get_option(&self, option_id: &EntityId) -> EngineResult<PollOption> {
        store::load(self.ctx.store(), option_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntityStore;
    use crate::testing::Fixture;


    fn new_option(title: &str) -> NewOption {
        NewOption { title: title.into(), description: "Option".into(), ..Default::default() }
    }

    #[tokio::test]
    async fn test_create_option_links_into_project() {
        let fx = Fixture::new();
        let (creator, project, existing) = fx.campaign().await;
        let catalog = fx.catalog();

        let option = catalog.create_option(&creator.id, &project.id, new_option("Green")).await.unwrap();
        assert_eq!(option.counter, 0);
        assert_eq!(fx.reload_project(&project.id).await.options, vec![existing.id, option.id]);
    }

    #[tokio::test]
    async fn test_create_option_on_foreign_project() {
        let fx = Fixture::new();
        let (_, project, _) = fx.campaign().await;
        let intruder = fx.creator("Otto").await;

        let err = fx.catalog().create_option(&intruder.id, &project.id, new_option("X")).await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
        assert_eq!(fx.catalog().project_options(&project.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_option_keeps_counter() {
        let fx = Fixture::new();
        let (creator, _, option) = fx.campaign().await;
        let fan = fx.fan("Finn").await;
        fx.ledger().record_vote(&fan.id, &option.id).await.unwrap();

        let edit = OptionEdit { title: Some("Renamed".into()), ..Default::default() };
        let edited = fx.catalog().edit_option(&creator.id, &option.id, edit).await.unwrap();
        assert_eq!(edited.title, "Renamed");
        assert_eq!(edited.counter, 1);
    }

    #[tokio::test]
    async fn test_project_detail_requires_matching_creator() {
        let fx = Fixture::new();
        let (creator, project, option) = fx.campaign().await;
        let other = fx.creator("Otto").await;
        let catalog = fx.catalog();

        let detail = catalog.project_detail(&creator.id, &project.id).await.unwrap();
        assert_eq!(detail.creator.id, creator.id);
        assert!(detail.creator.password.is_empty());
        assert_eq!(detail.options, vec![option]);

        let err = catalog.project_detail(&other.id, &project.id).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_listings() {
        let fx = Fixture::new();
        let (creator, _, _) = fx.campaign().await;
        fx.fan("Finn").await;
        let catalog = fx.catalog();

        assert_eq!(catalog.list_creators().await.unwrap().len(), 1);
        assert!(catalog.list_fans().await.unwrap().iter().all(|f| f.password.is_empty()));
        assert_eq!(catalog.creator_projects(&creator.id).await.unwrap().len(), 1);
        assert_eq!(catalog.creator_projects(&EntityId::generate()).await.unwrap().len(), 0);
        assert_eq!(catalog.list_projects().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_link_removes_the_new_option() {
        let fx = Fixture::new();
        let (creator, project, existing) = fx.campaign().await;

        // writes: insert option, link into project
        fx.faults.fail_nth_write(2);
        let err = fx.catalog().create_option(&creator.id, &project.id, new_option("Blue")).await.unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
        assert_eq!(fx.store.count(EntityKind::Option).await.unwrap(), 1);
        assert_eq!(fx.reload_project(&project.id).await.options, vec![existing.id.clone()]);
        assert!(fx.audit().await.is_consistent());
    }

    #[tokio::test]
    async fn test_unlinked_option_left_behind_is_partial() {
        let fx = Fixture::new();
        let (creator, project, _) = fx.campaign().await;

        fx.faults.fail_from_nth_write(2);
        let err = fx.catalog().create_option(&creator.id, &project.id, new_option("Blue")).await.unwrap_err();
        assert!(matches!(err, EngineError::PartialFailure { operation: "createOption", committed: 1, .. }));
        assert_eq!(fx.store.count(EntityKind::Option).await.unwrap(), 2);
    }
}
