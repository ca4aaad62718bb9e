//! Session issuance and resolution
//!
//! Tokens are 32 random bytes rendered as unpadded base64url. The store only
//! ever sees the SHA-256 digest of a token, so a leaked sessions table can't be
//! replayed as cookies.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tower_cookies::{Cookie, Cookies};

use super::errors::AuthError;
use super::password::CredentialHasher;
use super::types::Role;
use super::validate::{ValidationError, assert_present};
use crate::config::SessionPolicy;
use crate::store::{NewUser, Store, UserRecord};
use crate::{Clock, Result};

/// Random bytes per token.
pub const TOKEN_BYTES: usize = 32;

/// Encoded token length (base64url, no padding).
pub const TOKEN_LENGTH: usize = 43;

/// Shortest password accepted at registration.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// A persisted session row. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Hex SHA-256 of the token
    pub token_hash: String,
    pub user_id: i64,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Session {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis >= self.expires_at
    }
}

/// What a caller gets back after minting a session.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub user_id: i64,
    pub expires_at: i64,
}

/// Self-service registration request.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

/// Generate a fresh unguessable token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Digest under which a token is stored.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Cheap shape check so garbage never reaches the store.
pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LENGTH
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Lowercased, trimmed email used for every lookup and write.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Mints, resolves and destroys sessions, and bridges login to cookie state.
#[derive(Clone)]
pub struct SessionIssuer {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    hasher: CredentialHasher,
    policy: SessionPolicy,
}

impl SessionIssuer {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        hasher: CredentialHasher,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            hasher,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Create a session for a user and persist it.
    pub async fn create_session(&self, user_id: i64) -> Result<IssuedSession> {
        let token = generate_token();
        let now = self.clock.now_millis();
        let session = Session {
            token_hash: hash_token(&token),
            user_id,
            created_at: now,
            expires_at: now.saturating_add(self.policy.ttl_millis()),
        };
        self.store.insert_session(&session).await?;
        tracing::debug!(user_id, expires_at = session.expires_at, "session created");

        Ok(IssuedSession {
            token,
            user_id,
            expires_at: session.expires_at,
        })
    }

    /// Resolve a token to its user id.
    ///
    /// Unknown, malformed and expired tokens are `Ok(None)`; only storage
    /// failures are errors.
    pub async fn resolve_session(&self, token: &str) -> Result<Option<i64>> {
        if !is_well_formed(token) {
            return Ok(None);
        }
        let Some(session) = self.store.session_by_hash(&hash_token(token)).await? else {
            return Ok(None);
        };
        if session.is_expired(self.clock.now_millis()) {
            return Ok(None);
        }
        Ok(Some(session.user_id))
    }

    /// Invalidate a token. Destroying an unknown token is fine.
    pub async fn destroy_session(&self, token: &str) -> Result<()> {
        if !is_well_formed(token) {
            return Ok(());
        }
        self.store.delete_session(&hash_token(token)).await
    }

    /// Remove every expired session row. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let removed = self
            .store
            .purge_expired_sessions(self.clock.now_millis())
            .await?;
        if removed > 0 {
            tracing::info!(removed, "purged expired sessions");
        }
        Ok(removed)
    }

    /// The cookie carrying `token`, with attributes from the policy.
    pub fn session_cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build((self.policy.cookie_name.clone(), token.to_string()))
            .http_only(true)
            .secure(self.policy.secure)
            .same_site(self.policy.same_site)
            .path("/")
            .max_age(tower_cookies::cookie::time::Duration::seconds(
                self.policy.ttl.as_secs() as i64,
            ))
            .build()
    }

    pub fn set_session_cookie(&self, cookies: &Cookies, issued: &IssuedSession) {
        cookies.add(self.session_cookie(&issued.token));
    }

    pub fn clear_session_cookie(&self, cookies: &Cookies) {
        cookies.remove(
            Cookie::build((self.policy.cookie_name.clone(), ""))
                .path("/")
                .build(),
        );
    }

    /// Verify credentials and mint a session.
    ///
    /// Unknown email, wrong password and inactive account are indistinguishable
    /// to the caller, in message and in the work performed.
    pub async fn login(&self, email: &str, password: &str) -> Result<(UserRecord, IssuedSession)> {
        let email = normalize_email(email);
        let user = self.store.user_by_email(&email).await?;

        let user = match user {
            Some(user) => {
                let matched = self
                    .hasher
                    .verify_password(password, &user.password_hash)
                    .await;
                if !matched {
                    tracing::info!(user_id = user.id, "login rejected: password mismatch");
                    return Err(AuthError::InvalidCredentials.into());
                }
                if !user.is_active {
                    tracing::info!(user_id = user.id, "login rejected: account inactive");
                    return Err(AuthError::InvalidCredentials.into());
                }
                user
            }
            None => {
                self.hasher.equalize_async(password).await;
                tracing::info!("login rejected: unknown email");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let issued = self.create_session(user.id).await?;
        tracing::info!(user_id = user.id, role = %user.role, "user logged in");
        Ok((user, issued))
    }

    /// Create a self-registered account and log it in.
    pub async fn register(&self, registration: Registration) -> Result<(UserRecord, IssuedSession)> {
        let email = normalize_email(assert_present("email", &registration.email)?);
        if !email.contains('@') {
            return Err(ValidationError::Invalid {
                field: "email",
                reason: "missing '@'".to_string(),
            }
            .into());
        }
        if registration.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ValidationError::PasswordTooShort {
                min: MIN_PASSWORD_LENGTH,
            }
            .into());
        }
        let role = registration.role.unwrap_or(Role::Witness);
        if !role.is_self_assignable() {
            return Err(ValidationError::RoleNotSelfAssignable { role }.into());
        }

        let password_hash = self.hasher.hash_password(&registration.password).await?;
        let user = self
            .store
            .create_user(NewUser {
                email,
                password_hash,
                role,
                is_active: true,
                delegate_id: None,
                leader_id: None,
                created_at: self.clock.now_millis(),
            })
            .await?;
        tracing::info!(user_id = user.id, role = %user.role, "registered new user");

        let issued = self.create_session(user.id).await?;
        Ok((user, issued))
    }
}
