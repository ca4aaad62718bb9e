//! Store creation and utility functions.

use std::path::PathBuf;
use std::sync::Arc;

use tally::store::{InMemory, SqlStore, Store};

use crate::cli::{Backend, BackendArgs};

const SQLITE_FILE: &str = "tally.db";

/// Redact credentials from a PostgreSQL connection URL for safe logging
pub fn redact_postgres_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut redacted = parsed.clone();
        if !parsed.username().is_empty() {
            let _ = redacted.set_username("***");
        }
        if parsed.password().is_some() {
            let _ = redacted.set_password(Some("***"));
        }
        redacted.to_string()
    } else {
        "postgres://***@<unparsable-url>".to_string()
    }
}

/// Open the store selected on the command line
pub async fn create_store(
    args: &BackendArgs,
) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    match args.backend {
        Backend::Sqlite => {
            let data_dir = args.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
            tokio::fs::create_dir_all(&data_dir).await?;

            let db_path = data_dir.join(SQLITE_FILE);
            tracing::info!("Using SQLite store at {}", db_path.display());
            Ok(Arc::new(SqlStore::open_sqlite(&db_path).await?))
        }
        Backend::Postgres => {
            let url = args
                .postgres_url
                .as_ref()
                .ok_or("PostgreSQL backend requires --postgres-url or TALLY_POSTGRES_URL")?;

            let display_url = redact_postgres_url(url);
            tracing::info!("Connecting to PostgreSQL store at {}", display_url);

            match SqlStore::connect_postgres(url).await {
                Ok(store) => {
                    tracing::info!("Connected to PostgreSQL successfully");
                    Ok(Arc::new(store))
                }
                Err(e) => {
                    Err(format!("Failed to connect to PostgreSQL at {display_url}: {e}").into())
                }
            }
        }
        Backend::Inmemory => {
            tracing::warn!("Using in-memory store; all data is lost on exit");
            Ok(Arc::new(InMemory::new()))
        }
    }
}
