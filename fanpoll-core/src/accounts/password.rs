//! Argon2id password hashing
//!
//! Stored passwords are PHC strings
//! (`$argon2id$v=19$m=19456,t=2,p=1$salt$hash`). Hashing is CPU bound, so
//! the async wrappers run it on the blocking pool.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use crate::error::{EngineError, EngineResult};

/// Password-related errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    HashingFailed(String),
    #[error("Invalid password hash: {0}")]
    InvalidHash(String),
    #[error("Password verification failed: {0}")]
    VerificationFailed(String),
}

impl From<PasswordError> for EngineError {
    fn from(err: PasswordError) -> Self {
        EngineError::Internal(err.to_string())
    }
}

/// Argon2id with the crate's default parameters (19 MiB, 2 iterations,
/// 1 lane)
#[derive(Default, Clone)]
pub struct PasswordHasherService {
    argon2: Argon2<'static>,
}

impl PasswordHasherService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_password(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }

    /// Constant-time check of `password` against a stored PHC string
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed_hash =
            PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
        }
    }

    pub async fn hash_async(&self, password: String) -> EngineResult<String> {
        let hasher = self.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash_password(&password))
            .await
            .map_err(|e| EngineError::Internal(format!("Hashing task failed: {}", e)))??;
        Ok(hash)
    }

    pub async fn verify_async(&self, password: String, hash: String) -> EngineResult<bool> {
        let hasher = self.clone();
        let ok = tokio::task::spawn_blocking(move || hasher.verify_password(&password, &hash))
            .await
            .map_err(|e| EngineError::Internal(format!("Verification task failed: {}", e)))??;
        Ok(ok)
    }
}
