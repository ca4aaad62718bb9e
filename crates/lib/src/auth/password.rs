//! Password hashing
//!
//! Argon2id with a configurable work factor, PHC string output. The server's
//! login/register paths and the `create-admin` command share this type, so a
//! hash written by one always verifies in the other.

use std::sync::{Arc, OnceLock};

use argon2::{
    Algorithm, Argon2, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core},
};

use super::errors::AuthError;
use crate::Result;
use crate::config::PasswordPolicy;

/// Plaintext hashed once to build the decoy used for equal-time failures.
const DECOY_PLAINTEXT: &str = "tally-decoy-credential";

/// Argon2id hasher bound to one [`PasswordPolicy`].
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    decoy: Arc<OnceLock<String>>,
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("params", self.argon2.params())
            .finish()
    }
}

impl CredentialHasher {
    pub fn new(policy: PasswordPolicy) -> Result<Self> {
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, policy.params()?),
            decoy: Arc::new(OnceLock::new()),
        })
    }

    /// Hash a password, returning the PHC string. Blocks for the configured work factor.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut rand_core::OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::HashingFailed {
                reason: e.to_string(),
            })?;
        Ok(hash.to_string())
    }

    /// Check a password against a PHC string.
    ///
    /// A hash that doesn't parse still costs one full verification, so a
    /// corrupted row can't be told apart from a wrong password by timing.
    pub fn verify(&self, password: &str, password_hash: &str) -> bool {
        match PasswordHash::new(password_hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => {
                self.equalize(password);
                false
            }
        }
    }

    /// Spend the same work as a failed verification without a real hash.
    pub fn equalize(&self, password: &str) {
        let decoy = self
            .decoy
            .get_or_init(|| self.hash(DECOY_PLAINTEXT).unwrap_or_default());
        if let Ok(parsed) = PasswordHash::new(decoy) {
            let _ = self.argon2.verify_password(password.as_bytes(), &parsed);
        }
    }

    /// [`CredentialHasher::hash`] on the blocking pool.
    pub async fn hash_password(&self, password: &str) -> Result<String> {
        let hasher = self.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::HashingFailed {
                reason: format!("hashing task failed: {e}"),
            })?
    }

    /// [`CredentialHasher::verify`] on the blocking pool. A failed task counts as a mismatch.
    pub async fn verify_password(&self, password: &str, password_hash: &str) -> bool {
        let hasher = self.clone();
        let password = password.to_string();
        let password_hash = password_hash.to_string();
        match tokio::task::spawn_blocking(move || hasher.verify(&password, &password_hash)).await {
            Ok(matched) => matched,
            Err(e) => {
                tracing::error!("password verification task failed: {e}");
                false
            }
        }
    }

    /// [`CredentialHasher::equalize`] on the blocking pool.
    pub async fn equalize_async(&self, password: &str) {
        let hasher = self.clone();
        let password = password.to_string();
        if let Err(e) = tokio::task::spawn_blocking(move || hasher.equalize(&password)).await {
            tracing::error!("password equalization task failed: {e}");
        }
    }
}
