//! SQL-backed [`Store`] using sqlx.
//!
//! Uses `AnyPool` so one implementation serves SQLite (feature `sqlite`) and
//! PostgreSQL (feature `postgres`). Booleans are stored as BIGINT 0/1 and
//! timestamps as epoch milliseconds to stay within what the `Any` driver
//! decodes on both dialects.

/// Schema definition and migration system.
pub mod schema;

use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::{Any, AnyPool, Transaction};

use super::{
    Commitment, CommitmentStatus, NewCommitment, NewUser, StatusChange, Store, StoreError,
    UserRecord,
};
use crate::Result;
use crate::auth::{DataScope, Role, Session};

/// Extension trait for sqlx Result types to simplify error handling.
///
/// Converts sqlx errors into `StoreError::Sqlx` with a context message. A
/// pool that can't hand out a connection is reported as `Unavailable`.
pub(crate) trait SqlxResultExt<T> {
    fn sql_context(self, context: &str) -> Result<T>;
}

impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn sql_context(self, context: &str) -> Result<T> {
        self.map_err(|e| {
            match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                    StoreError::Unavailable {
                        reason: format!("{context}: {e}"),
                    }
                }
                e => StoreError::Sqlx {
                    reason: format!("{context}: {e}"),
                    source: Some(e),
                },
            }
            .into()
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Database backend kind for SQL dialect selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    Postgres,
}

type UserRow = (i64, String, String, String, i64, Option<String>, Option<String>);
type SessionRow = (String, i64, i64, i64);
type CommitmentRow = (i64, String, Option<String>, String, i64, i64, String, i64);
type StatusChangeRow = (i64, String, String, i64, i64);

const USER_COLUMNS: &str =
    "id, email, password_hash, role, is_active, delegate_id, leader_id";
const COMMITMENT_COLUMNS: &str =
    "id, leader_id, delegate_id, description, promised_votes, reported_votes, status, updated_at";

fn parse_status(value: &str) -> Result<CommitmentStatus> {
    CommitmentStatus::parse(value).ok_or_else(|| {
        StoreError::Corrupt {
            reason: format!("unknown commitment status '{value}'"),
        }
        .into()
    })
}

fn user_from_row(row: UserRow) -> Result<UserRecord> {
    let (id, email, password_hash, role, is_active, delegate_id, leader_id) = row;
    let role: Role = role.parse().map_err(|_| StoreError::Corrupt {
        reason: format!("user {id} has unknown role '{role}'"),
    })?;
    Ok(UserRecord {
        id,
        email,
        password_hash,
        role,
        is_active: is_active != 0,
        delegate_id,
        leader_id,
    })
}

fn commitment_from_row(row: CommitmentRow) -> Result<Commitment> {
    let (id, leader_id, delegate_id, description, promised_votes, reported_votes, status, updated_at) =
        row;
    Ok(Commitment {
        id,
        leader_id,
        delegate_id,
        description,
        promised_votes,
        reported_votes,
        status: parse_status(&status)?,
        updated_at,
    })
}

/// sqlx-backed [`Store`].
pub struct SqlStore {
    pool: AnyPool,
    kind: DbKind,
}

impl SqlStore {
    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn db_kind(&self) -> DbKind {
        self.kind
    }

    async fn finish_connect(pool: AnyPool, kind: DbKind) -> Result<Self> {
        let store = Self { pool, kind };
        schema::initialize(&store).await?;
        Ok(store)
    }

    /// Update a commitment and write its audit row on an open transaction.
    async fn apply_status_change(
        tx: &mut Transaction<'_, Any>,
        id: i64,
        status: CommitmentStatus,
        changed_by: i64,
        changed_at: i64,
    ) -> Result<Commitment> {
        let row: Option<CommitmentRow> = sqlx::query_as(&format!(
            "SELECT {COMMITMENT_COLUMNS} FROM commitments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .sql_context("Failed to load commitment")?;

        let Some(row) = row else {
            return Err(StoreError::NotFound {
                entity: "commitment",
                id: id.to_string(),
            }
            .into());
        };
        let mut commitment = commitment_from_row(row)?;
        let from_status = commitment.status;

        sqlx::query("UPDATE commitments SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(changed_at)
            .bind(id)
            .execute(&mut **tx)
            .await
            .sql_context("Failed to update commitment status")?;

        sqlx::query(
            "INSERT INTO commitment_status_history
                (commitment_id, from_status, to_status, changed_by, changed_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(from_status.as_str())
        .bind(status.as_str())
        .bind(changed_by)
        .bind(changed_at)
        .execute(&mut **tx)
        .await
        .sql_context("Failed to write status history")?;

        commitment.status = status;
        commitment.updated_at = changed_at;
        Ok(commitment)
    }
}

#[cfg(feature = "sqlite")]
impl SqlStore {
    /// Open (creating if needed) a SQLite database file.
    pub async fn open_sqlite<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        // mode=rwc: read-write-create
        let url = format!("sqlite:{}?mode=rwc", path.as_ref().display());
        Self::connect_sqlite(&url).await
    }

    /// Connect to a SQLite database using a connection URL.
    pub async fn connect_sqlite(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let is_in_memory = url.contains("mode=memory");

        // An in-memory database disappears with its last connection, so keep one open.
        let pool = if is_in_memory {
            AnyPoolOptions::new()
                .max_connections(5)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(url)
                .await
                .sql_context("Failed to connect to SQLite")?
        } else {
            AnyPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .sql_context("Failed to connect to SQLite")?
        };

        if is_in_memory {
            sqlx::query("PRAGMA busy_timeout = 5000;")
                .execute(&pool)
                .await
                .sql_context("Failed to configure SQLite")?;
        } else {
            sqlx::query(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )
            .execute(&pool)
            .await
            .sql_context("Failed to configure SQLite")?;
        }

        Self::finish_connect(pool, DbKind::Sqlite).await
    }

    /// Private in-memory SQLite database, unique per call.
    pub async fn sqlite_in_memory() -> Result<Self> {
        let unique_id = uuid::Uuid::new_v4();
        let url = format!("sqlite:file:mem_{unique_id}?mode=memory&cache=shared");
        Self::connect_sqlite(&url).await
    }
}

#[cfg(feature = "postgres")]
impl SqlStore {
    /// Connect to PostgreSQL, creating the schema in the default search path.
    pub async fn connect_postgres(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| StoreError::Unavailable {
                reason: format!("Failed to connect to PostgreSQL: {e}"),
            })?;

        Self::finish_connect(pool, DbKind::Postgres).await
    }
}

#[async_trait]
impl Store for SqlStore {
    fn kind(&self) -> &'static str {
        match self.kind {
            DbKind::Sqlite => "sqlite",
            DbKind::Postgres => "postgres",
        }
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .sql_context("Ping failed")?;
        Ok(())
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<UserRecord>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .sql_context("Failed to get user by id")?;
        row.map(user_from_row).transpose()
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .sql_context("Failed to get user by email")?;
        row.map(user_from_row).transpose()
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord> {
        let inserted: std::result::Result<(i64,), sqlx::Error> = sqlx::query_as(
            "INSERT INTO users
                (email, password_hash, role, is_active, delegate_id, leader_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(i64::from(user.is_active))
        .bind(user.delegate_id.clone())
        .bind(user.leader_id.clone())
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await;

        let (id,) = match inserted {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::AlreadyExists {
                    entity: "user",
                    key: user.email,
                }
                .into());
            }
            Err(e) => return Err(e).sql_context("Failed to create user"),
        };

        Ok(UserRecord {
            id,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            is_active: user.is_active,
            delegate_id: user.delegate_id,
            leader_id: user.leader_id,
        })
    }

    async fn upsert_user(&self, user: NewUser) -> Result<UserRecord> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO users
                (email, password_hash, role, is_active, delegate_id, leader_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (email) DO UPDATE SET
                password_hash = excluded.password_hash,
                role = excluded.role,
                is_active = excluded.is_active,
                delegate_id = excluded.delegate_id,
                leader_id = excluded.leader_id
             RETURNING id",
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(i64::from(user.is_active))
        .bind(user.delegate_id.clone())
        .bind(user.leader_id.clone())
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .sql_context("Failed to upsert user")?;

        Ok(UserRecord {
            id,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            is_active: user.is_active,
            delegate_id: user.delegate_id,
            leader_id: user.leader_id,
        })
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&session.token_hash)
        .bind(session.user_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .sql_context("Failed to insert session")?;
        Ok(())
    }

    async fn session_by_hash(&self, token_hash: &str) -> Result<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT token_hash, user_id, created_at, expires_at FROM sessions WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .sql_context("Failed to get session")?;

        Ok(row.map(|(token_hash, user_id, created_at, expires_at)| Session {
            token_hash,
            user_id,
            created_at,
            expires_at,
        }))
    }

    async fn delete_session(&self, token_hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .sql_context("Failed to delete session")?;
        Ok(())
    }

    async fn purge_expired_sessions(&self, now_millis: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now_millis)
            .execute(&self.pool)
            .await
            .sql_context("Failed to purge sessions")?;
        Ok(result.rows_affected())
    }

    async fn insert_commitment(&self, commitment: NewCommitment) -> Result<Commitment> {
        let status = CommitmentStatus::Pending;
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO commitments
                (leader_id, delegate_id, description, promised_votes, reported_votes, status, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(&commitment.leader_id)
        .bind(commitment.delegate_id.clone())
        .bind(&commitment.description)
        .bind(commitment.promised_votes)
        .bind(commitment.reported_votes)
        .bind(status.as_str())
        .bind(commitment.created_at)
        .fetch_one(&self.pool)
        .await
        .sql_context("Failed to insert commitment")?;

        Ok(Commitment {
            id,
            leader_id: commitment.leader_id,
            delegate_id: commitment.delegate_id,
            description: commitment.description,
            promised_votes: commitment.promised_votes,
            reported_votes: commitment.reported_votes,
            status,
            updated_at: commitment.created_at,
        })
    }

    async fn commitment(&self, id: i64) -> Result<Option<Commitment>> {
        let row: Option<CommitmentRow> = sqlx::query_as(&format!(
            "SELECT {COMMITMENT_COLUMNS} FROM commitments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .sql_context("Failed to get commitment")?;
        row.map(commitment_from_row).transpose()
    }

    async fn commitments(&self, scope: &DataScope) -> Result<Vec<Commitment>> {
        let rows: Vec<CommitmentRow> = match scope {
            DataScope::All => {
                sqlx::query_as(&format!(
                    "SELECT {COMMITMENT_COLUMNS} FROM commitments ORDER BY id"
                ))
                .fetch_all(&self.pool)
                .await
            }
            DataScope::Leader(leader_id) => {
                sqlx::query_as(&format!(
                    "SELECT {COMMITMENT_COLUMNS} FROM commitments WHERE leader_id = $1 ORDER BY id"
                ))
                .bind(leader_id)
                .fetch_all(&self.pool)
                .await
            }
            DataScope::Delegate(delegate_id) => {
                sqlx::query_as(&format!(
                    "SELECT {COMMITMENT_COLUMNS} FROM commitments WHERE delegate_id = $1 ORDER BY id"
                ))
                .bind(delegate_id)
                .fetch_all(&self.pool)
                .await
            }
            DataScope::Nothing => return Ok(Vec::new()),
        }
        .sql_context("Failed to list commitments")?;

        rows.into_iter().map(commitment_from_row).collect()
    }

    async fn set_commitment_status(
        &self,
        id: i64,
        status: CommitmentStatus,
        changed_by: i64,
        changed_at: i64,
    ) -> Result<Commitment> {
        let mut tx = self
            .pool
            .begin()
            .await
            .sql_context("Failed to begin transaction")?;

        match Self::apply_status_change(&mut tx, id, status, changed_by, changed_at).await {
            Ok(commitment) => {
                tx.commit()
                    .await
                    .sql_context("Failed to commit status change")?;
                Ok(commitment)
            }
            Err(e) => {
                // The original error wins even if the rollback fails too.
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(commitment_id = id, "rollback failed: {rollback_err}");
                }
                Err(e)
            }
        }
    }

    async fn status_history(&self, id: i64) -> Result<Vec<StatusChange>> {
        let rows: Vec<StatusChangeRow> = sqlx::query_as(
            "SELECT commitment_id, from_status, to_status, changed_by, changed_at
             FROM commitment_status_history WHERE commitment_id = $1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .sql_context("Failed to load status history")?;

        rows.into_iter()
            .map(|(commitment_id, from, to, changed_by, changed_at)| {
                Ok(StatusChange {
                    commitment_id,
                    from_status: parse_status(&from)?,
                    to_status: parse_status(&to)?,
                    changed_by,
                    changed_at,
                })
            })
            .collect()
    }
}
