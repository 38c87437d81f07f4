use chrono::Duration;
use cucumber::World as CucumberWorld;
use fanpoll_core::accounts::Registration;
use fanpoll_core::commands::{Command, Outcome};
use fanpoll_core::config::FanpollConfig;
use fanpoll_core::error::{EngineError, ErrorReport};
use fanpoll_core::id::EntityId;
use fanpoll_core::identity::{Identity, Role};
use fanpoll_core::lifecycle::ManualClock;
use fanpoll_core::store::MemoryEntityStore;
use fanpoll_core::Platform;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const PASSWORD: &str = "Secret1";

/// One scenario: a volatile platform on a clock that only moves when a
/// step says so, plus the names the scenario gave its records.
#[derive(CucumberWorld)]
#[world(init = Self::new)]
pub struct FanpollWorld {
    pub platform: Platform,
    pub clock: Arc<ManualClock>,
    pub creators: HashMap<String, Identity>,
    pub fans: HashMap<String, Identity>,
    pub projects: HashMap<String, EntityId>,
    pub options: HashMap<String, EntityId>,
    pub last_outcome: Option<Outcome>,
    pub last_error: Option<ErrorReport>,
}

impl fmt::Debug for FanpollWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanpollWorld")
            .field("creators", &self.creators.keys().collect::<Vec<_>>())
            .field("fans", &self.fans.keys().collect::<Vec<_>>())
            .field("projects", &self.projects.keys().collect::<Vec<_>>())
            .field("options", &self.options.keys().collect::<Vec<_>>())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl FanpollWorld {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        let platform = Platform::with_store(
            Arc::new(MemoryEntityStore::new()),
            FanpollConfig::default(),
            clock.clone(),
        );
        Self {
            platform,
            clock,
            creators: HashMap::new(),
            fans: HashMap::new(),
            projects: HashMap::new(),
            options: HashMap::new(),
            last_outcome: None,
            last_error: None,
        }
    }

    fn registration(name: &str) -> Registration {
        Registration {
            name: name.to_string(),
            email: format!("{}@fanpoll.test", name.to_lowercase()),
            password: PASSWORD.to_string(),
            category: "music".to_string(),
            ..Default::default()
        }
    }

    pub async fn register_creator(&mut self, name: &str) {
        let creator = self
            .platform
            .accounts()
            .register(Role::Creator, Self::registration(name))
            .await
            .expect("creator registration");
        self.creators.insert(name.to_string(), Identity::creator(creator.id().clone()));
    }

    pub async fn register_fan(&mut self, name: &str) {
        let fan = self
            .platform
            .accounts()
            .register(Role::Fan, Self::registration(name))
            .await
            .expect("fan registration");
        self.fans.insert(name.to_string(), Identity::fan(fan.id().clone()));
    }

    pub fn creator(&self, name: &str) -> Identity {
        self.creators.get(name).cloned().unwrap_or_else(|| panic!("unknown creator {name}"))
    }

    pub fn fan(&self, name: &str) -> Identity {
        self.fans.get(name).cloned().unwrap_or_else(|| panic!("unknown fan {name}"))
    }

    pub fn project(&self, title: &str) -> EntityId {
        self.projects.get(title).cloned().unwrap_or_else(|| panic!("unknown project {title}"))
    }

    pub fn option(&self, title: &str) -> EntityId {
        self.options.get(title).cloned().unwrap_or_else(|| panic!("unknown option {title}"))
    }

    /// Run a command and keep its result for later `Then` steps
    pub async fn run(&mut self, identity: Identity, command: Command) -> Option<Outcome> {
        match self.platform.handle(Some(&identity), command).await {
            Ok(outcome) => {
                self.last_outcome = Some(outcome.clone());
                self.last_error = None;
                Some(outcome)
            }
            Err(report) => {
                self.last_outcome = None;
                self.last_error = Some(report);
                None
            }
        }
    }

    /// Move the clock forward and apply whatever fell due
    pub async fn advance_days(&mut self, days: i64) {
        self.clock.advance(Duration::days(days));
        self.platform.sweep_now().await.expect("lifecycle sweep");
    }

    pub fn is_not_found<T: fmt::Debug>(result: Result<T, EngineError>) -> bool {
        matches!(result, Err(EngineError::NotFound { .. }))
    }
}
