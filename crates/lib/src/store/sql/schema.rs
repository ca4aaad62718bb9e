//! SQL schema definitions.
//!
//! Portable between SQLite and PostgreSQL except for the auto-increment key,
//! which is substituted per dialect.
//!
//! # Adding a migration
//!
//! 1. Increment `SCHEMA_VERSION`
//! 2. Add a `migrate_vN_to_vM` async function
//! 3. Call it from `run_migration`

use crate::Result;
use crate::store::StoreError;

use super::{DbKind, SqlStore};

/// Current schema version.
pub const SCHEMA_VERSION: i64 = 1;

const ID_PLACEHOLDER: &str = "{id}";

/// Table DDL. `{id}` becomes the dialect's auto-increment primary key.
pub const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        version BIGINT PRIMARY KEY
    )",
    // Credential store; email is unique and stored lowercased
    "CREATE TABLE IF NOT EXISTS users (
        id {id},
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL,
        is_active BIGINT NOT NULL DEFAULT 1,
        delegate_id TEXT,
        leader_id TEXT,
        created_at BIGINT NOT NULL
    )",
    // Only the SHA-256 of the token is stored
    "CREATE TABLE IF NOT EXISTS sessions (
        token_hash TEXT PRIMARY KEY NOT NULL,
        user_id BIGINT NOT NULL,
        created_at BIGINT NOT NULL,
        expires_at BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS commitments (
        id {id},
        leader_id TEXT NOT NULL,
        delegate_id TEXT,
        description TEXT NOT NULL,
        promised_votes BIGINT NOT NULL,
        reported_votes BIGINT NOT NULL DEFAULT 0,
        status TEXT NOT NULL,
        updated_at BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS commitment_status_history (
        id {id},
        commitment_id BIGINT NOT NULL,
        from_status TEXT NOT NULL,
        to_status TEXT NOT NULL,
        changed_by BIGINT NOT NULL,
        changed_at BIGINT NOT NULL
    )",
];

pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at)",
    "CREATE INDEX IF NOT EXISTS idx_commitments_leader ON commitments(leader_id)",
    "CREATE INDEX IF NOT EXISTS idx_commitments_delegate ON commitments(delegate_id)",
    "CREATE INDEX IF NOT EXISTS idx_status_history_commitment ON commitment_status_history(commitment_id)",
];

fn id_column(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        DbKind::Postgres => "BIGSERIAL PRIMARY KEY",
    }
}

/// DDL for one table, specialised to `kind`.
pub fn table_ddl(statement: &str, kind: DbKind) -> String {
    statement.replace(ID_PLACEHOLDER, id_column(kind))
}

/// Create tables and indexes if missing, then migrate to [`SCHEMA_VERSION`].
pub async fn initialize(store: &SqlStore) -> Result<()> {
    let pool = store.pool();

    for statement in CREATE_TABLES {
        let ddl = table_ddl(statement, store.db_kind());
        sqlx::query(&ddl)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Sqlx {
                reason: format!("Schema creation failed: {e} - SQL: {ddl}"),
                source: Some(e),
            })?;
    }

    for statement in CREATE_INDEXES {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Sqlx {
                reason: format!("Index creation failed: {e} - SQL: {statement}"),
                source: Some(e),
            })?;
    }

    let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM schema_version")
        .fetch_optional(pool)
        .await
        .map_err(|e| StoreError::Sqlx {
            reason: format!("Failed to check schema version: {e}"),
            source: Some(e),
        })?;

    match row {
        None => {
            sqlx::query("INSERT INTO schema_version (version) VALUES ($1)")
                .bind(SCHEMA_VERSION)
                .execute(pool)
                .await
                .map_err(|e| StoreError::Sqlx {
                    reason: format!("Failed to record schema version: {e}"),
                    source: Some(e),
                })?;
            tracing::info!(version = SCHEMA_VERSION, "initialized schema");
        }
        Some((version,)) if version < SCHEMA_VERSION => {
            for from in version..SCHEMA_VERSION {
                run_migration(store, from).await?;
            }
        }
        Some((version,)) if version > SCHEMA_VERSION => {
            return Err(StoreError::Unavailable {
                reason: format!(
                    "database schema v{version} is newer than supported v{SCHEMA_VERSION}"
                ),
            }
            .into());
        }
        Some(_) => {}
    }

    Ok(())
}

async fn run_migration(_store: &SqlStore, from: i64) -> Result<()> {
    // No migrations exist yet; v1 is the first schema.
    Err(StoreError::Unavailable {
        reason: format!("no migration from schema v{from}"),
    }
    .into())
}
