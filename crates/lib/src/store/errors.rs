//! Storage error types.

use thiserror::Error;

use crate::Error as CrateError;

/// Errors that can occur while talking to the credential/reporting store.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Unique key already taken.
    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    /// The store could not be reached or was never configured.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    /// A row could not be mapped back into a record.
    #[error("corrupt row: {reason}")]
    Corrupt { reason: String },

    /// Query or transaction failure from sqlx.
    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("SQL error: {reason}")]
    Sqlx {
        reason: String,
        #[source]
        source: Option<sqlx::Error>,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

impl From<StoreError> for CrateError {
    fn from(err: StoreError) -> Self {
        CrateError::Store(err)
    }
}
