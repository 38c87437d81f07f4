//! Creator and fan accounts
//!
//! Registration, credential checks and profile edits. Emails are unique
//! across both account collections; every write that can introduce an
//! email runs under one registration lock so two sign-ups cannot both pass
//! the uniqueness check.

pub mod password;
pub mod validation;

pub use password::{PasswordError, PasswordHasherService};

use crate::context::EngineContext;
use crate::entity::{fields, Creator, Fan};
use crate::error::{EngineError, EngineResult};
use crate::id::{EntityId, EntityKind};
use crate::identity::{Identity, Role};
use crate::store::{self, Filter, Patch};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use validation::{normalize_email, require, validate_email, validate_password};

/// Sign-up form. `category` is mandatory for creators and ignored for fans.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub social_media: Vec<String>,
}

/// Profile edit; `None` keeps the current value. `category` and
/// `description` only exist on creators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
    pub social_media: Option<Vec<String>>,
    pub category: Option<String>,
    pub description: Option<String>,
}

/// A freshly registered or updated account, password redacted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "camelCase")]
pub enum Account {
    #[serde(rename = "creators")]
    Creator(Creator),
    #[serde(rename = "fans")]
    Fan(Fan),
}

impl Account {
    pub fn id(&self) -> &EntityId {
        match self {
            Account::Creator(c) => &c.id,
            Account::Fan(f) => &f.id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Account::Creator(_) => Role::Creator,
            Account::Fan(_) => Role::Fan,
        }
    }
}

#[derive(Clone)]
pub struct Accounts {
    ctx: EngineContext,
    hasher: PasswordHasherService,
    registration: Arc<Mutex<()>>,
}

impl Accounts {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx, hasher: PasswordHasherService::new(), registration: Arc::new(Mutex::new(())) }
    }

    pub async fn register(&self, role: Role, form: Registration) -> EngineResult<Account> {
        require("name", &form.name)?;
        let email = normalize_email(&form.email);
        validate_email(&email)?;
        validate_password(&form.password)?;
        if role == Role::Creator {
            require("category", &form.category)?;
        }

        let password = self.hasher.hash_async(form.password).await?;
        let now = self.ctx.now();

        let _registration = self.registration.lock().await;
        self.ensure_email_free(&email, None).await?;

        let store = self.ctx.store();
        let account = match role {
            Role::Creator => {
                let creator = Creator {
                    id: EntityId::generate(),
                    name: form.name.trim().to_string(),
                    email,
                    password,
                    category: form.category.trim().to_string(),
                    description: form.description,
                    image: form.image,
                    social_media: form.social_media,
                    projects: Vec::new(),
                    fans: Vec::new(),
                    created_at: now,
                    updated_at: now,
                };
                Account::Creator(store::save_new(store, &creator).await?.redacted())
            }
            Role::Fan => {
                let fan = Fan {
                    id: EntityId::generate(),
                    name: form.name.trim().to_string(),
                    email,
                    password,
                    image: form.image,
                    social_media: form.social_media,
                    votes: Vec::new(),
                    favorite_creators: Vec::new(),
                    created_at: now,
                    updated_at: now,
                };
                Account::Fan(store::save_new(store, &fan).await?.redacted())
            }
        };

        log::info!("Registered {} {}", role, account.id());
        Ok(account)
    }

    pub async fn register_creator(&self, form: Registration) -> EngineResult<Creator> {
        match self.register(Role::Creator, form).await? {
            Account::Creator(creator) => Ok(creator),
            Account::Fan(_) => Err(EngineError::Internal("Registered the wrong account kind".into())),
        }
    }

    pub async fn register_fan(&self, form: Registration) -> EngineResult<Fan> {
        match self.register(Role::Fan, form).await? {
            Account::Fan(fan) => Ok(fan),
            Account::Creator(_) => Err(EngineError::Internal("Registered the wrong account kind".into())),
        }
    }

    /// Check credentials against both collections. Unknown email and wrong
    /// password are indistinguishable to the caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> EngineResult<Identity> {
        let denied = || EngineError::Unauthorized("Unable to authenticate the fan/creator".into());
        if email.trim().is_empty() || password.is_empty() {
            return Err(denied());
        }

        let Some((identity, hash)) = self.find_credentials(&normalize_email(email)).await? else {
            return Err(denied());
        };
        if self.hasher.verify_async(password.to_string(), hash).await? {
            log::debug!("{} {} authenticated", identity.role, identity.id);
            Ok(identity)
        } else {
            log::debug!("Rejected credentials for {} {}", identity.role, identity.id);
            Err(denied())
        }
    }

    /// Owner-only profile edit
    pub async fn update_profile(&self, identity: &Identity, update: ProfileUpdate) -> EngineResult<Account> {
        if let Some(name) = &update.name {
            require("name", name)?;
        }
        if identity.role == Role::Fan && (update.category.is_some() || update.description.is_some()) {
            return Err(EngineError::ValidationFailed(
                "category and description only apply to creators".into(),
            ));
        }
        if identity.role == Role::Creator {
            if let Some(category) = &update.category {
                require("category", category)?;
            }
        }
        let email = match &update.email {
            Some(raw) => {
                let email = normalize_email(raw);
                validate_email(&email)?;
                Some(email)
            }
            None => None,
        };

        let patch = Patch::new()
            .set_if(fields::NAME, update.name.map(|n| n.trim().to_string()))
            .set_if(fields::IMAGE, update.image)
            .set_if(fields::SOCIAL_MEDIA, update.social_media)
            .set_if(fields::CATEGORY, update.category.map(|c| c.trim().to_string()))
            .set_if(fields::DESCRIPTION, update.description)
            .set_if(fields::EMAIL, email.clone());

        let _registration = match &email {
            Some(email) => {
                let guard = self.registration.lock().await;
                self.ensure_email_free(email, Some(&identity.id)).await?;
                Some(guard)
            }
            None => None,
        };

        let store = self.ctx.store();
        let account = match identity.role {
            Role::Creator => {
                Account::Creator(store::patch::<Creator>(store, &identity.id, &patch).await?.redacted())
            }
            Role::Fan => Account::Fan(store::patch::<Fan>(store, &identity.id, &patch).await?.redacted()),
        };
        log::debug!("Profile of {} {} updated", identity.role, identity.id);
        Ok(account)
    }

    /// Re-hash after checking the current password
    pub async fn change_password(&self, identity: &Identity, current: &str, new: &str) -> EngineResult<()> {
        validate_password(new)?;
        let kind = kind_of(identity.role);
        let document = store::found(
            self.ctx.store().find_by_id(kind, &identity.id).await?,
            kind,
            &identity.id,
        )?;
        let hash = document
            .get(fields::PASSWORD)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if !self.hasher.verify_async(current.to_string(), hash).await? {
            return Err(EngineError::Unauthorized("Current password is incorrect".into()));
        }

        let rehashed = self.hasher.hash_async(new.to_string()).await?;
        let patch = Patch::new().set(fields::PASSWORD, rehashed);
        store::found(self.ctx.store().update_by_id(kind, &identity.id, &patch).await?, kind, &identity.id)?;
        log::info!("Password of {} {} changed", identity.role, identity.id);
        Ok(())
    }

    async fn find_credentials(&self, email: &str) -> EngineResult<Option<(Identity, String)>> {
        let store = self.ctx.store();
        let filter = Filter::eq(fields::EMAIL, email);
        if let Some(fan) = store::load_where::<Fan>(store, &filter).await?.into_iter().next() {
            return Ok(Some((Identity::fan(fan.id), fan.password)));
        }
        if let Some(creator) = store::load_where::<Creator>(store, &filter).await?.into_iter().next() {
            return Ok(Some((Identity::creator(creator.id), creator.password)));
        }
        Ok(None)
    }

    /// `Conflict` if any account other than `owner` uses the email.
    /// Caller holds the registration lock.
    async fn ensure_email_free(&self, email: &str, owner: Option<&EntityId>) -> EngineResult<()> {
        let filter = Filter::eq(fields::EMAIL, email);
        for kind in [EntityKind::Creator, EntityKind::Fan] {
            for document in self.ctx.store().find(kind, &filter).await? {
                let id = document.get(fields::ID).and_then(|v| v.as_str());
                if owner.map(|o| o.as_str()) != id {
                    return Err(EngineError::Conflict("User with this email already exists.".into()));
                }
            }
        }
        Ok(())
    }
}

fn kind_of(role: Role) -> EntityKind {
    match role {
        Role::Creator => EntityKind::Creator,
        Role::Fan => EntityKind::Fan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    fn form(email: &str) -> Registration {
        Registration {
            name: "Nina".into(),
            email: email.into(),
            password: "Secret1".into(),
            category: "music".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let fx = Fixture::new();
        let accounts = fx.accounts();

        let creator = accounts.register_creator(form(" Nina@Example.com ")).await.unwrap();
        assert_eq!(creator.email, "nina@example.com");
        assert!(creator.password.is_empty());

        let identity = accounts.authenticate("nina@example.com", "Secret1").await.unwrap();
        assert_eq!(identity, Identity::creator(creator.id.clone()));

        let err = accounts.authenticate("nina@example.com", "Wrong1x").await.unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));
        let err = accounts.authenticate("nobody@example.com", "Secret1").await.unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_email_unique_across_roles() {
        let fx = Fixture::new();
        let accounts = fx.accounts();
        accounts.register_fan(form("a@example.com")).await.unwrap();

        let err = accounts.register_creator(form("A@example.com")).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_concurrent_signups_with_same_email() {
        let fx = Fixture::new();
        let accounts = fx.accounts();
        let (a, b) = tokio::join!(
            accounts.register_fan(form("same@example.com")),
            accounts.register_creator(form("same@example.com"))
        );
        assert!(a.is_ok() ^ b.is_ok());
        assert!(fx.audit().await.duplicate_emails.is_empty());
    }

    #[tokio::test]
    async fn test_registration_validation() {
        let fx = Fixture::new();
        let accounts = fx.accounts();

        let no_category = Registration { category: String::new(), ..form("c@example.com") };
        assert!(matches!(
            accounts.register_creator(no_category.clone()).await,
            Err(EngineError::ValidationFailed(_))
        ));
        // fans need no category
        assert!(accounts.register_fan(no_category).await.is_ok());

        let weak = Registration { password: "secret".into(), ..form("d@example.com") };
        assert!(accounts.register_fan(weak).await.is_err());
        assert!(accounts.register_fan(form("not-an-email")).await.is_err());
    }

    #[tokio::test]
    async fn test_profile_update_rechecks_email() {
        let fx = Fixture::new();
        let accounts = fx.accounts();
        accounts.register_fan(form("taken@example.com")).await.unwrap();
        let me = accounts.register_fan(form("me@example.com")).await.unwrap();
        let identity = Identity::fan(me.id.clone());

        let clash = ProfileUpdate { email: Some("taken@example.com".into()), ..Default::default() };
        assert!(matches!(
            accounts.update_profile(&identity, clash).await,
            Err(EngineError::Conflict(_))
        ));

        // keeping one's own email is fine
        let same = ProfileUpdate {
            email: Some("me@example.com".into()),
            name: Some("Me".into()),
            ..Default::default()
        };
        match accounts.update_profile(&identity, same).await.unwrap() {
            Account::Fan(fan) => assert_eq!(fan.name, "Me"),
            other => panic!("unexpected {other:?}"),
        }

        let creator_only = ProfileUpdate { category: Some("art".into()), ..Default::default() };
        assert!(accounts.update_profile(&identity, creator_only).await.is_err());
    }

    #[tokio::test]
    async fn test_change_password() {
        let fx = Fixture::new();
        let accounts = fx.accounts();
        let fan = accounts.register_fan(form("pw@example.com")).await.unwrap();
        let identity = Identity::fan(fan.id);

        assert!(accounts.change_password(&identity, "Nope123", "Better2").await.is_err());
        accounts.change_password(&identity, "Secret1", "Better2").await.unwrap();
        assert!(accounts.authenticate("pw@example.com", "Better2").await.is_ok());
        assert!(accounts.authenticate("pw@example.com", "Secret1").await.is_err());
    }
}
