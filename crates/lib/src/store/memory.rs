//! In-memory store.
//!
//! Everything lives behind one `RwLock`, which also gives
//! `set_commitment_status` its atomicity. Data is lost on restart.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    Commitment, CommitmentStatus, NewCommitment, NewUser, StatusChange, Store, StoreError,
    UserRecord,
};
use crate::Result;
use crate::auth::{DataScope, Session};

#[derive(Default)]
struct MemoryState {
    next_user_id: i64,
    users: BTreeMap<i64, UserRecord>,
    sessions: HashMap<String, Session>,
    next_commitment_id: i64,
    commitments: BTreeMap<i64, Commitment>,
    history: Vec<StatusChange>,
}

impl MemoryState {
    fn user_id_for_email(&self, email: &str) -> Option<i64> {
        self.users
            .values()
            .find(|u| u.email == email)
            .map(|u| u.id)
    }
}

/// Process-local [`Store`].
#[derive(Default)]
pub struct InMemory {
    state: RwLock<MemoryState>,
}

impl InMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired ones included.
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }
}

#[async_trait]
impl Store for InMemory {
    fn kind(&self) -> &'static str {
        "inmemory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<UserRecord>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let state = self.state.read().await;
        Ok(state
            .user_id_for_email(email)
            .and_then(|id| state.users.get(&id).cloned()))
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord> {
        let mut state = self.state.write().await;
        if state.user_id_for_email(&user.email).is_some() {
            return Err(StoreError::AlreadyExists {
                entity: "user",
                key: user.email,
            }
            .into());
        }
        state.next_user_id += 1;
        let record = UserRecord {
            id: state.next_user_id,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            is_active: user.is_active,
            delegate_id: user.delegate_id,
            leader_id: user.leader_id,
        };
        state.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn upsert_user(&self, user: NewUser) -> Result<UserRecord> {
        let mut state = self.state.write().await;
        let id = match state.user_id_for_email(&user.email) {
            Some(id) => id,
            None => {
                state.next_user_id += 1;
                state.next_user_id
            }
        };
        let record = UserRecord {
            id,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            is_active: user.is_active,
            delegate_id: user.delegate_id,
            leader_id: user.leader_id,
        };
        state.users.insert(id, record.clone());
        Ok(record)
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        self.state
            .write()
            .await
            .sessions
            .insert(session.token_hash.clone(), session.clone());
        Ok(())
    }

    async fn session_by_hash(&self, token_hash: &str) -> Result<Option<Session>> {
        Ok(self.state.read().await.sessions.get(token_hash).cloned())
    }

    async fn delete_session(&self, token_hash: &str) -> Result<()> {
        self.state.write().await.sessions.remove(token_hash);
        Ok(())
    }

    async fn purge_expired_sessions(&self, now_millis: i64) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| !s.is_expired(now_millis));
        Ok((before - state.sessions.len()) as u64)
    }

    async fn insert_commitment(&self, commitment: NewCommitment) -> Result<Commitment> {
        let mut state = self.state.write().await;
        state.next_commitment_id += 1;
        let record = Commitment {
            id: state.next_commitment_id,
            leader_id: commitment.leader_id,
            delegate_id: commitment.delegate_id,
            description: commitment.description,
            promised_votes: commitment.promised_votes,
            reported_votes: commitment.reported_votes,
            status: CommitmentStatus::Pending,
            updated_at: commitment.created_at,
        };
        state.commitments.insert(record.id, record.clone());
        Ok(record)
    }

    async fn commitment(&self, id: i64) -> Result<Option<Commitment>> {
        Ok(self.state.read().await.commitments.get(&id).cloned())
    }

    async fn commitments(&self, scope: &DataScope) -> Result<Vec<Commitment>> {
        Ok(self
            .state
            .read()
            .await
            .commitments
            .values()
            .filter(|c| scope.permits(&c.leader_id, c.delegate_id.as_deref()))
            .cloned()
            .collect())
    }

    async fn set_commitment_status(
        &self,
        id: i64,
        status: CommitmentStatus,
        changed_by: i64,
        changed_at: i64,
    ) -> Result<Commitment> {
        let mut state = self.state.write().await;
        let Some(commitment) = state.commitments.get_mut(&id) else {
            return Err(StoreError::NotFound {
                entity: "commitment",
                id: id.to_string(),
            }
            .into());
        };
        let change = StatusChange {
            commitment_id: id,
            from_status: commitment.status,
            to_status: status,
            changed_by,
            changed_at,
        };
        commitment.status = status;
        commitment.updated_at = changed_at;
        let updated = commitment.clone();
        state.history.push(change);
        Ok(updated)
    }

    async fn status_history(&self, id: i64) -> Result<Vec<StatusChange>> {
        Ok(self
            .state
            .read()
            .await
            .history
            .iter()
            .filter(|c| c.commitment_id == id)
            .cloned()
            .collect())
    }
}
