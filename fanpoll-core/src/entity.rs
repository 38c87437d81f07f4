//! Stored record types
//!
//! Field names on the wire follow the persisted schema (`favoritCreators`,
//! `inProgress`, `timeCount`, `projectId`, ...). They are a storage contract
//! and must not be renamed.

use crate::error::{EngineError, EngineResult};
use crate::id::{EntityId, EntityKind};
use crate::store::Document;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A record type stored in one of the engine's collections
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &EntityId;

    fn to_document(&self) -> EngineResult<Document> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(EngineError::Internal(format!(
                "{} serialized to a non-object value: {}",
                Self::KIND,
                other
            ))),
        }
    }

    fn from_document(document: Document) -> EngineResult<Self> {
        serde_json::from_value(serde_json::Value::Object(document)).map_err(|e| {
            EngineError::Internal(format!("Malformed {} record: {}", Self::KIND, e))
        })
    }
}

/// Account that owns campaigns and publishes voting options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub name: String,
    pub email: String,
    /// Argon2id PHC string, never the clear-text password
    pub password: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub social_media: Vec<String>,
    #[serde(default)]
    pub projects: Vec<EntityId>,
    #[serde(default)]
    pub fans: Vec<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Creator {
    /// Copy without the password hash, for returning to callers
    pub fn redacted(mut self) -> Self {
        self.password.clear();
        self
    }
}

impl Entity for Creator {
    const KIND: EntityKind = EntityKind::Creator;

    fn id(&self) -> &EntityId {
        &self.id
    }
}

/// Account that follows creators and votes on options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fan {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub social_media: Vec<String>,
    #[serde(default)]
    pub votes: Vec<EntityId>,
    #[serde(default, rename = "favoritCreators")]
    pub favorite_creators: Vec<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Fan {
    pub fn redacted(mut self) -> Self {
        self.password.clear();
        self
    }
}

impl Entity for Fan {
    const KIND: EntityKind = EntityKind::Fan;

    fn id(&self) -> &EntityId {
        &self.id
    }
}

/// A creator-owned, time-boxed campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub image: String,
    pub creator: EntityId,
    pub in_progress: bool,
    /// Campaign duration in days
    pub time_count: u32,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub options: Vec<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Project {
    const KIND: EntityKind = EntityKind::Project;

    fn id(&self) -> &EntityId {
        &self.id
    }
}

/// A votable item of a project. Named `PollOption` to keep clear of
/// `std::option::Option`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub image: String,
    pub project_id: EntityId,
    /// Number of fans whose vote set holds this option
    #[serde(default)]
    pub counter: u64,
}

impl Entity for PollOption {
    const KIND: EntityKind = EntityKind::Option;

    fn id(&self) -> &EntityId {
        &self.id
    }
}

/// Storage field names shared by the engine modules
pub mod fields {
    pub const ID: &str = "_id";
    pub const NAME: &str = "name";
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const IMAGE: &str = "image";
    pub const CATEGORY: &str = "category";
    pub const SOCIAL_MEDIA: &str = "socialMedia";
    pub const FANS: &str = "fans";
    pub const PROJECTS: &str = "projects";
    pub const FAVORITE_CREATORS: &str = "favoritCreators";
    pub const VOTES: &str = "votes";
    pub const OPTIONS: &str = "options";
    pub const COUNTER: &str = "counter";
    pub const CREATOR: &str = "creator";
    pub const PROJECT_ID: &str = "projectId";
    pub const IN_PROGRESS: &str = "inProgress";
    pub const TIME_COUNT: &str = "timeCount";
    pub const START_DATE: &str = "startDate";
    pub const EMAIL: &str = "email";
    pub const PASSWORD: &str = "password";
    pub const UPDATED_AT: &str = "updatedAt";
}
