//! Platform facade
//!
//! Owns the shared context and every service, dispatches commands on
//! behalf of an identity, and runs the lifecycle sweeper.
//!
//! ```no_run
//! use fanpoll_core::prelude::*;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let platform = Platform::open(FanpollConfig::load()?).await?;
//! let creator = platform.accounts().register_creator(Registration {
//!     name: "Nina".into(),
//!     email: "nina@example.com".into(),
//!     password: "Secret1".into(),
//!     category: "music".into(),
//!     ..Default::default()
//! }).await?;
//! let identity = Identity::creator(creator.id);
//! let outcome = platform
//!     .handle(Some(&identity), CreatorCommand::DeleteAccount.into())
//!     .await;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

use crate::accounts::Accounts;
use crate::audit::{Auditor, ConsistencyReport};
use crate::cascade::CascadeCoordinator;
use crate::catalog::Catalog;
use crate::commands::{Command, CreatorCommand, FanCommand, Outcome};
use crate::config::FanpollConfig;
use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult, ErrorKind, ErrorReport};
use crate::graph::RelationshipGraph;
use crate::id::EntityId;
use crate::identity::{authenticated, Identity};
use crate::ledger::VoteLedger;
use crate::lifecycle::{Clock, LifecycleScheduler, SweepReport, Sweeper, SystemClock};
use crate::store::{EntityStore, MemoryEntityStore};
use anyhow::{Context, Result};
use std::sync::Arc;

pub struct Platform {
    ctx: EngineContext,
    graph: RelationshipGraph,
    ledger: VoteLedger,
    lifecycle: LifecycleScheduler,
    cascade: CascadeCoordinator,
    accounts: Accounts,
    catalog: Catalog,
    auditor: Auditor,
    sweeper: Option<Sweeper>,
}

impl Platform {
    /// Validate the configuration, open the (possibly journaled) store,
    /// apply transitions that fell due while the process was down and
    /// start the background sweeper when enabled.
    pub async fn open(config: FanpollConfig) -> Result<Self> {
        config.validate().context("Invalid fanpoll configuration")?;
        let store = MemoryEntityStore::open(&config.storage)?;
        let mut platform = Self::with_store(Arc::new(store), config, Arc::new(SystemClock));

        let report = platform
            .sweep_now()
            .await
            .map_err(|e| anyhow::anyhow!("Initial lifecycle sweep failed: {}", e))?;
        if report.due > 0 {
            log::info!("Applied {} transition(s) that fell due while offline", report.due);
        }

        if platform.ctx.config.lifecycle.auto_sweep {
            platform.sweeper = Some(Sweeper::spawn(
                platform.lifecycle.clone(),
                platform.ctx.clock.clone(),
                platform.ctx.locks.clone(),
                platform.ctx.config.lifecycle.sweep_interval(),
            ));
        }
        Ok(platform)
    }

    /// Volatile platform without a background sweeper
    pub fn in_memory(config: FanpollConfig) -> Self {
        Self::with_store(Arc::new(MemoryEntityStore::new()), config, Arc::new(SystemClock))
    }

    /// Platform over any store and clock. No sweeper is started; call
    /// [`Platform::sweep_now`] to apply due transitions.
    pub fn with_store(
        store: Arc<dyn EntityStore>,
        config: FanpollConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ctx = EngineContext::with_clock(store, config, clock);
        Self {
            graph: RelationshipGraph::new(ctx.clone()),
            ledger: VoteLedger::new(ctx.clone()),
            lifecycle: LifecycleScheduler::new(ctx.clone()),
            cascade: CascadeCoordinator::new(ctx.clone()),
            accounts: Accounts::new(ctx.clone()),
            catalog: Catalog::new(ctx.clone()),
            auditor: Auditor::new(ctx.clone()),
            sweeper: None,
            ctx,
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    pub fn ledger(&self) -> &VoteLedger {
        &self.ledger
    }

    pub fn lifecycle(&self) -> &LifecycleScheduler {
        &self.lifecycle
    }

    pub fn cascade(&self) -> &CascadeCoordinator {
        &self.cascade
    }

    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn has_sweeper(&self) -> bool {
        self.sweeper.as_ref().is_some_and(Sweeper::is_running)
    }

    /// Run one command for `identity`. Role checks and id parsing happen
    /// before any store access.
    pub async fn execute(&self, identity: Option<&Identity>, command: Command) -> EngineResult<Outcome> {
        let identity = authenticated(identity)?;
        match command {
            Command::Fan(command) => self.execute_fan(identity, command).await,
            Command::Creator(command) => self.execute_creator(identity, command).await,
            Command::UpdateProfile(update) => {
                Ok(Outcome::Account(self.accounts.update_profile(identity, update).await?))
            }
            Command::ChangePassword { current, new } => {
                self.accounts.change_password(identity, &current, &new).await?;
                Ok(Outcome::PasswordChanged)
            }
        }
    }

    async fn execute_fan(&self, identity: &Identity, command: FanCommand) -> EngineResult<Outcome> {
        let fan_id = identity.require_fan()?;
        match command {
            FanCommand::ToggleFollow { creator_id } => {
                let creator_id = EntityId::parse(&creator_id)?;
                Ok(Outcome::Follow(self.graph.toggle_follow(fan_id, &creator_id).await?))
            }
            FanCommand::RecordVote { option_id } => {
                let option_id = EntityId::parse(&option_id)?;
                Ok(Outcome::Vote(self.ledger.record_vote(fan_id, &option_id).await?))
            }
            FanCommand::RetractVote { option_id } => {
                let option_id = EntityId::parse(&option_id)?;
                Ok(Outcome::Vote(self.ledger.retract_vote(fan_id, &option_id).await?))
            }
            FanCommand::DeleteAccount => Ok(Outcome::Deleted(self.cascade.delete_fan(fan_id).await?)),
        }
    }

    async fn execute_creator(&self, identity: &Identity, command: CreatorCommand) -> EngineResult<Outcome> {
        let creator_id = identity.require_creator()?;
        match command {
            CreatorCommand::CreateProject { project } => {
                Ok(Outcome::Project(self.lifecycle.create_project(creator_id, project).await?))
            }
            CreatorCommand::UpdateProject { project_id, update } => {
                let project_id = EntityId::parse(&project_id)?;
                Ok(Outcome::Project(self.lifecycle.update_project(creator_id, &project_id, update).await?))
            }
            CreatorCommand::DeleteProject { project_id } => {
                let project_id = EntityId::parse(&project_id)?;
                Ok(Outcome::Deleted(self.cascade.delete_project(creator_id, &project_id).await?))
            }
            CreatorCommand::CreateOption { project_id, option } => {
                let project_id = EntityId::parse(&project_id)?;
                Ok(Outcome::Option(self.catalog.create_option(creator_id, &project_id, option).await?))
            }
            CreatorCommand::EditOption { option_id, edit } => {
                let option_id = EntityId::parse(&option_id)?;
                Ok(Outcome::Option(self.catalog.edit_option(creator_id, &option_id, edit).await?))
            }
            CreatorCommand::DeleteOption { option_id } => {
                let option_id = EntityId::parse(&option_id)?;
                Ok(Outcome::Deleted(self.cascade.delete_option(creator_id, &option_id).await?))
            }
            CreatorCommand::DeleteAccount => {
                Ok(Outcome::Deleted(self.cascade.delete_creator(creator_id).await?))
            }
        }
    }

    /// [`Platform::execute`] for callers outside the engine: failures are
    /// logged in full and returned as a redacted [`ErrorReport`].
    pub async fn handle(&self, identity: Option<&Identity>, command: Command) -> Result<Outcome, ErrorReport> {
        let name = command.name();
        match self.execute(identity, command).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let report = ErrorReport::from(&err);
                match report.kind {
                    ErrorKind::Internal | ErrorKind::PartialFailure => {
                        log::error!("{} failed: {}", name, log_chain(&err))
                    }
                    _ => log::debug!("{} rejected: {}", name, err),
                }
                Err(report)
            }
        }
    }

    /// Apply every transition due now
    pub async fn sweep_now(&self) -> EngineResult<SweepReport> {
        self.lifecycle.sweep_due(self.ctx.now()).await
    }

    pub async fn check_consistency(&self) -> EngineResult<ConsistencyReport> {
        self.auditor.check().await
    }

    pub async fn repair_counters(&self) -> EngineResult<usize> {
        self.auditor.repair_counters().await
    }

    /// Stop the sweeper and flush the store
    pub async fn shutdown(mut self) -> Result<()> {
        self.sweeper.take();
        self.ctx.store.flush().await.context("Failed to flush store on shutdown")?;
        log::info!("Platform shut down");
        Ok(())
    }
}

fn log_chain(err: &EngineError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(&format!(": {}", cause));
        source = std::error::Error::source(cause);
    }
    message
}
