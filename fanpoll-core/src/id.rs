//! Entity identifiers and collection kinds

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The collections managed by the engine.
///
/// The declaration order is also the lock acquisition order used by
/// [`crate::locks::EntityLocks`]; do not reorder variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Creator,
    Fan,
    Project,
    Option,
    /// Durable lifecycle transitions waiting for their due time
    Transition,
}

impl EntityKind {
    pub const COUNT: usize = 5;

    pub const ALL: [EntityKind; Self::COUNT] = [
        EntityKind::Creator,
        EntityKind::Fan,
        EntityKind::Project,
        EntityKind::Option,
        EntityKind::Transition,
    ];

    /// Storage collection name
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Creator => "creators",
            EntityKind::Fan => "fans",
            EntityKind::Project => "projects",
            EntityKind::Option => "options",
            EntityKind::Transition => "transitions",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Creator => "Creator",
            EntityKind::Fan => "Fan",
            EntityKind::Project => "Project",
            EntityKind::Option => "Option",
            EntityKind::Transition => "Transition",
        };
        f.write_str(name)
    }
}

/// Opaque, globally unique identifier of a stored record.
///
/// Identifiers are hyphenated UUID strings. Anything that does not parse as
/// one is rejected with [`EngineError::InvalidIdentifier`] before any store
/// access happens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Parse and normalize an identifier received from outside the engine
    pub fn parse(raw: &str) -> EngineResult<Self> {
        uuid::Uuid::parse_str(raw.trim())
            .map(|uuid| Self(uuid.hyphenated().to_string()))
            .map_err(|_| EngineError::InvalidIdentifier(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
