//! Repository interface over the relational store.
//!
//! The guard, the session issuer and the report handlers depend on [`Store`],
//! never on query strings. Two implementations ship:
//!
//! - [`InMemory`]: process-local maps, for tests and throwaway servers
//! - [`SqlStore`]: sqlx over SQLite or PostgreSQL (features `sqlite` / `postgres`)

mod errors;
mod memory;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

pub use errors::StoreError;
pub use memory::InMemory;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use sql::{DbKind, SqlStore};

use async_trait::async_trait;
use serde::Serialize;

use crate::Result;
use crate::auth::{DataScope, Role, Session};

/// A user row as the core reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    /// Stored lowercased
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub delegate_id: Option<String>,
    pub leader_id: Option<String>,
}

/// Input for creating or upserting a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub delegate_id: Option<String>,
    pub leader_id: Option<String>,
    /// Epoch milliseconds; kept unchanged when an upsert hits an existing row
    pub created_at: i64,
}

/// Lifecycle of a vote commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentStatus {
    Pending,
    Partial,
    Fulfilled,
    Failed,
}

impl CommitmentStatus {
    pub const ALL: [CommitmentStatus; 4] = [
        CommitmentStatus::Pending,
        CommitmentStatus::Partial,
        CommitmentStatus::Fulfilled,
        CommitmentStatus::Failed,
    ];

    pub const ALL_NAMES: [&'static str; 4] = ["pending", "partial", "fulfilled", "failed"];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentStatus::Pending => "pending",
            CommitmentStatus::Partial => "partial",
            CommitmentStatus::Fulfilled => "fulfilled",
            CommitmentStatus::Failed => "failed",
        }
    }

    /// Exact, case-sensitive match against the stored names.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

/// A leader's promise of votes, optionally attached to a delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Commitment {
    pub id: i64,
    pub leader_id: String,
    pub delegate_id: Option<String>,
    pub description: String,
    pub promised_votes: i64,
    pub reported_votes: i64,
    pub status: CommitmentStatus,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewCommitment {
    pub leader_id: String,
    pub delegate_id: Option<String>,
    pub description: String,
    pub promised_votes: i64,
    pub reported_votes: i64,
    pub created_at: i64,
}

/// Audit row written alongside every status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub commitment_id: i64,
    pub from_status: CommitmentStatus,
    pub to_status: CommitmentStatus,
    pub changed_by: i64,
    pub changed_at: i64,
}

/// Everything the core needs from the relational store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name for logs and health output.
    fn kind(&self) -> &'static str;

    /// Cheap round trip proving the store is reachable.
    async fn ping(&self) -> Result<()>;

    // Users

    async fn user_by_id(&self, id: i64) -> Result<Option<UserRecord>>;

    /// `email` must already be normalised.
    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    /// Insert a user; fails with `AlreadyExists` if the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<UserRecord>;

    /// Insert or overwrite the user with this email.
    async fn upsert_user(&self, user: NewUser) -> Result<UserRecord>;

    // Sessions

    async fn insert_session(&self, session: &Session) -> Result<()>;

    async fn session_by_hash(&self, token_hash: &str) -> Result<Option<Session>>;

    /// Deleting a missing session is not an error.
    async fn delete_session(&self, token_hash: &str) -> Result<()>;

    /// Delete sessions with `expires_at <= now_millis`.
    async fn purge_expired_sessions(&self, now_millis: i64) -> Result<u64>;

    // Commitments

    async fn insert_commitment(&self, commitment: NewCommitment) -> Result<Commitment>;

    async fn commitment(&self, id: i64) -> Result<Option<Commitment>>;

    /// Rows visible under `scope`, ordered by id.
    async fn commitments(&self, scope: &DataScope) -> Result<Vec<Commitment>>;

    /// Change the status and append a [`StatusChange`] atomically.
    async fn set_commitment_status(
        &self,
        id: i64,
        status: CommitmentStatus,
        changed_by: i64,
        changed_at: i64,
    ) -> Result<Commitment>;

    /// Audit trail for one commitment, oldest first.
    async fn status_history(&self, id: i64) -> Result<Vec<StatusChange>>;
}
