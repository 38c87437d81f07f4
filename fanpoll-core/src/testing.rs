//! Fixtures for unit tests: an in-memory engine on a manual clock, plus
//! seed helpers that write records directly (no password hashing).
//!
//! The engine under test talks to the store through [`FaultyStore`], so a
//! test can make a chosen write fail. Seeders and reload helpers bypass it.

use crate::accounts::Accounts;
use crate::audit::{Auditor, ConsistencyReport};
use crate::cascade::CascadeCoordinator;
use crate::catalog::Catalog;
use crate::config::FanpollConfig;
use crate::context::EngineContext;
use crate::entity::{fields, Creator, Fan, PollOption, Project};
use crate::graph::RelationshipGraph;
use crate::id::{EntityId, EntityKind};
use crate::ledger::VoteLedger;
use crate::lifecycle::{Clock, LifecycleScheduler, ManualClock};
use crate::error::{EngineError, EngineResult};
use crate::store::{self, id_value, Document, EntityStore, Filter, MemoryEntityStore, Patch};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex};

pub const FIXTURE_EPOCH: &str = "2024-03-01T12:00:00Z";

struct Fault {
    at: usize,
    seen: usize,
    sticky: bool,
}

/// Store wrapper that fails writes on demand. Writes are counted from the
/// moment a fault is armed; reads always pass through.
pub struct FaultyStore {
    inner: Arc<MemoryEntityStore>,
    fault: Mutex<Option<Fault>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryEntityStore>) -> Self {
        Self { inner, fault: Mutex::new(None) }
    }

    /// The `n`th write from now fails once (1-based)
    pub fn fail_nth_write(&self, n: usize) {
        *self.fault.lock().unwrap() = Some(Fault { at: n, seen: 0, sticky: false });
    }

    /// The `n`th write from now and every write after it fail until
    /// [`FaultyStore::heal`]
    pub fn fail_from_nth_write(&self, n: usize) {
        *self.fault.lock().unwrap() = Some(Fault { at: n, seen: 0, sticky: true });
    }

    pub fn heal(&self) {
        *self.fault.lock().unwrap() = None;
    }

    fn write(&self, op: &str, kind: EntityKind) -> EngineResult<()> {
        let mut slot = self.fault.lock().unwrap();
        let Some(fault) = slot.as_mut() else {
            return Ok(());
        };
        fault.seen += 1;
        if fault.seen < fault.at {
            return Ok(());
        }
        if !fault.sticky {
            *slot = None;
        }
        Err(EngineError::Internal(format!("injected {} failure on {}", op, kind)))
    }
}

#[async_trait::async_trait]
impl EntityStore for FaultyStore {
    async fn find_by_id(&self, kind: EntityKind, id: &EntityId) -> EngineResult<Option<Document>> {
        self.inner.find_by_id(kind, id).await
    }

    async fn find(&self, kind: EntityKind, filter: &Filter) -> EngineResult<Vec<Document>> {
        self.inner.find(kind, filter).await
    }

    async fn insert(&self, kind: EntityKind, document: Document) -> EngineResult<Document> {
        self.write("insert", kind)?;
        self.inner.insert(kind, document).await
    }

    async fn update_by_id(
        &self,
        kind: EntityKind,
        id: &EntityId,
        patch: &Patch,
    ) -> EngineResult<Option<Document>> {
        self.write("update", kind)?;
        self.inner.update_by_id(kind, id, patch).await
    }

    async fn delete_by_id(&self, kind: EntityKind, id: &EntityId) -> EngineResult<bool> {
        self.write("delete", kind)?;
        self.inner.delete_by_id(kind, id).await
    }

    async fn add_to_set(
        &self,
        kind: EntityKind,
        id: &EntityId,
        field: &str,
        value: Value,
    ) -> EngineResult<Option<bool>> {
        self.write("addToSet", kind)?;
        self.inner.add_to_set(kind, id, field, value).await
    }

    async fn pull(
        &self,
        kind: EntityKind,
        id: &EntityId,
        field: &str,
        value: Value,
    ) -> EngineResult<Option<bool>> {
        self.write("pull", kind)?;
        self.inner.pull(kind, id, field, value).await
    }

    async fn increment_field(
        &self,
        kind: EntityKind,
        id: &EntityId,
        field: &str,
        delta: i64,
    ) -> EngineResult<Option<i64>> {
        self.write("increment", kind)?;
        self.inner.increment_field(kind, id, field, delta).await
    }
}

pub struct Fixture {
    pub ctx: EngineContext,
    pub store: Arc<MemoryEntityStore>,
    pub faults: Arc<FaultyStore>,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(FanpollConfig::default())
    }

    pub fn with_config(config: FanpollConfig) -> Self {
        let store = Arc::new(MemoryEntityStore::new());
        let epoch = DateTime::parse_from_rfc3339(FIXTURE_EPOCH).unwrap().with_timezone(&Utc);
        let clock = Arc::new(ManualClock::new(epoch));
        let faults = Arc::new(FaultyStore::new(store.clone()));
        let ctx = EngineContext::with_clock(faults.clone(), config, clock.clone());
        Self { ctx, store, faults, clock }
    }

    pub fn lifecycle(&self) -> LifecycleScheduler {
        LifecycleScheduler::new(self.ctx.clone())
    }

    pub fn graph(&self) -> RelationshipGraph {
        RelationshipGraph::new(self.ctx.clone())
    }

    pub fn ledger(&self) -> VoteLedger {
        VoteLedger::new(self.ctx.clone())
    }

    pub fn cascade(&self) -> CascadeCoordinator {
        CascadeCoordinator::new(self.ctx.clone())
    }

    pub fn accounts(&self) -> Accounts {
        Accounts::new(self.ctx.clone())
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.ctx.clone())
    }

    pub async fn audit(&self) -> ConsistencyReport {
        Auditor::new(self.ctx.clone()).check().await.unwrap()
    }

    fn email(name: &str) -> String {
        format!("{}-{}@example.com", name.to_lowercase(), EntityId::generate())
    }

    pub async fn creator(&self, name: &str) -> Creator {
        let now = self.clock.now();
        let creator = Creator {
            id: EntityId::generate(),
            name: name.into(),
            email: Self::email(name),
            password: "$argon2id$fixture".into(),
            category: "music".into(),
            description: String::new(),
            image: String::new(),
            social_media: vec![],
            projects: vec![],
            fans: vec![],
            created_at: now,
            updated_at: now,
        };
        store::save_new(self.store.as_ref(), &creator).await.unwrap()
    }

    pub async fn fan(&self, name: &str) -> Fan {
        let now = self.clock.now();
        let fan = Fan {
            id: EntityId::generate(),
            name: name.into(),
            email: Self::email(name),
            password: "$argon2id$fixture".into(),
            image: String::new(),
            social_media: vec![],
            votes: vec![],
            favorite_creators: vec![],
            created_at: now,
            updated_at: now,
        };
        store::save_new(self.store.as_ref(), &fan).await.unwrap()
    }

    /// Active project owned by `creator_id`, linked into the creator
    pub async fn project(&self, creator_id: &EntityId, title: &str) -> Project {
        let now = self.clock.now();
        let project = Project {
            id: EntityId::generate(),
            title: title.into(),
            description: "Fixture campaign".into(),
            image: String::new(),
            creator: creator_id.clone(),
            in_progress: true,
            time_count: 7,
            start_date: now,
            options: vec![],
            created_at: now,
            updated_at: now,
        };
        let project = store::save_new(self.store.as_ref(), &project).await.unwrap();
        self.store
            .add_to_set(EntityKind::Creator, creator_id, fields::PROJECTS, id_value(&project.id))
            .await
            .unwrap();
        project
    }

    /// Option linked into its project
    pub async fn option(&self, project_id: &EntityId, title: &str) -> PollOption {
        let option = PollOption {
            id: EntityId::generate(),
            title: title.into(),
            description: "Fixture option".into(),
            image: String::new(),
            project_id: project_id.clone(),
            counter: 0,
        };
        let option = store::save_new(self.store.as_ref(), &option).await.unwrap();
        self.store
            .add_to_set(EntityKind::Project, project_id, fields::OPTIONS, id_value(&option.id))
            .await
            .unwrap();
        option
    }

    /// Creator "Nina" with one active project holding option "Red"
    pub async fn campaign(&self) -> (Creator, Project, PollOption) {
        let creator = self.creator("Nina").await;
        let project = self.project(&creator.id, "Album cover").await;
        let option = self.option(&project.id, "Red").await;
        (self.reload_creator(&creator.id).await, self.reload_project(&project.id).await, option)
    }

    pub async fn reload_creator(&self, id: &EntityId) -> Creator {
        store::load(self.store.as_ref(), id).await.unwrap()
    }

    pub async fn reload_fan(&self, id: &EntityId) -> Fan {
        store::load(self.store.as_ref(), id).await.unwrap()
    }

    pub async fn reload_project(&self, id: &EntityId) -> Project {
        store::load(self.store.as_ref(), id).await.unwrap()
    }

    pub async fn reload_option(&self, id: &EntityId) -> PollOption {
        store::load(self.store.as_ref(), id).await.unwrap()
    }

    /// Fans whose vote set holds the option
    pub async fn count_voters(&self, option_id: &EntityId) -> usize {
        self.store
            .find(EntityKind::Fan, &Filter::contains(fields::VOTES, id_value(option_id)))
            .await
            .unwrap()
            .len()
    }
}
