//! Caller identity as supplied by the token-verification collaborator
//!
//! The engine trusts `id` and `role` as given; verifying credentials or
//! tokens happens before a request reaches it.

use crate::error::{EngineError, EngineResult};
use crate::id::EntityId;
use serde::{Deserialize, Serialize};

/// Account role. Serialized with the collaborator's wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "creators")]
    Creator,
    #[serde(rename = "fans")]
    Fan,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Creator => f.write_str("creator"),
            Role::Fan => f.write_str("fan"),
        }
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: EntityId,
    pub role: Role,
}

impl Identity {
    pub fn creator(id: EntityId) -> Self {
        Self { id, role: Role::Creator }
    }

    pub fn fan(id: EntityId) -> Self {
        Self { id, role: Role::Fan }
    }

    /// Build from the collaborator's raw payload; a malformed id fails fast
    pub fn from_payload(raw_id: &str, role: Role) -> EngineResult<Self> {
        Ok(Self { id: EntityId::parse(raw_id)?, role })
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    /// Caller's id if it is a creator, `Forbidden` otherwise
    pub fn require_creator(&self) -> EngineResult<&EntityId> {
        self.require(Role::Creator)
    }

    /// Caller's id if it is a fan, `Forbidden` otherwise
    pub fn require_fan(&self) -> EngineResult<&EntityId> {
        self.require(Role::Fan)
    }

    fn require(&self, role: Role) -> EngineResult<&EntityId> {
        if self.has_role(role) {
            Ok(&self.id)
        } else {
            Err(EngineError::Forbidden(format!("Only {}s are allowed", role)))
        }
    }

    /// The caller must be exactly this account
    pub fn require_self(&self, role: Role, id: &EntityId) -> EngineResult<()> {
        let own = self.require(role)?;
        if own == id {
            Ok(())
        } else {
            Err(EngineError::Forbidden(format!("Not allowed to act on another {}'s account", role)))
        }
    }
}

/// Unwrap an optional identity, `Unauthorized` when the request carried none
pub fn authenticated(identity: Option<&Identity>) -> EngineResult<&Identity> {
    identity.ok_or_else(|| EngineError::Unauthorized("No valid identity supplied".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Creator).unwrap(), "\"creators\"");
        assert_eq!(serde_json::from_str::<Role>("\"fans\"").unwrap(), Role::Fan);
    }

    #[test]
    fn test_role_checks() {
        let fan = Identity::fan(EntityId::generate());
        assert!(fan.require_fan().is_ok());
        assert!(matches!(fan.require_creator(), Err(EngineError::Forbidden(_))));
    }

    #[test]
    fn test_require_self() {
        let id = EntityId::generate();
        let creator = Identity::creator(id.clone());
        assert!(creator.require_self(Role::Creator, &id).is_ok());
        assert!(creator.require_self(Role::Creator, &EntityId::generate()).is_err());
        assert!(creator.require_self(Role::Fan, &id).is_err());
    }

    #[test]
    fn test_missing_identity_is_unauthorized() {
        assert!(matches!(authenticated(None), Err(EngineError::Unauthorized(_))));
    }

    #[test]
    fn test_malformed_payload_id() {
        let err = Identity::from_payload("abc", Role::Fan).unwrap_err();
        assert!(matches!(err, EngineError::InvalidIdentifier(_)));
    }
}
