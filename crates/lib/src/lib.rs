//!
//! Tally: the operations core behind a campaign dashboard.
//!
//! ## Core Concepts
//!
//! * **Sessions (`auth::SessionIssuer`)**: opaque cookie tokens bound to a user id with a fixed TTL.
//! * **Guard (`auth::Guard`)**: the single choke point that turns a request into an
//!   [`auth::AuthorizationContext`] or rejects it as unauthenticated / forbidden.
//! * **Update bus (`bus::UpdateBus`)**: in-process publish/subscribe feeding the live dashboard stream.
//! * **Store (`store::Store`)**: the repository interface over the relational credential and reporting tables.
//! * **Reports (`reports`)**: role-scoped projections and writes built on top of the guard and the store.
//! * **Web (`web`)**: the axum router exposing all of the above over HTTP.

pub mod auth;
pub mod bus;
pub mod clock;
pub mod config;
pub mod reports;
pub mod store;
pub mod web;

pub use clock::{Clock, SystemClock};

#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;

pub use config::Config;

/// Result type used throughout the Tally library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Tally library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Invalid or missing configuration.
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Structured authentication / authorization errors from the auth module
    #[error(transparent)]
    Auth(auth::AuthError),

    /// Malformed caller input
    #[error(transparent)]
    Validation(auth::ValidationError),

    /// Structured storage errors from the store module
    #[error(transparent)]
    Store(store::StoreError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Auth(_) => "auth",
            Error::Validation(_) => "validation",
            Error::Store(_) => "store",
            Error::Config { .. } => "config",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error means "no valid session" (or bad credentials).
    pub fn is_authentication_error(&self) -> bool {
        match self {
            Error::Auth(auth_err) => auth_err.is_authentication_error(),
            _ => false,
        }
    }

    /// Check if this error means a valid session lacked the required role.
    pub fn is_authorization_error(&self) -> bool {
        match self {
            Error::Auth(auth_err) => auth_err.is_forbidden(),
            _ => false,
        }
    }

    /// Check if this error was caused by malformed input.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error indicates a conflict (already exists).
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_already_exists(),
            _ => false,
        }
    }

    /// Check if this error means a required dependency is missing or misconfigured.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Error::Config { .. } => true,
            Error::Store(store_err) => store_err.is_unavailable(),
            _ => false,
        }
    }

    /// Check if this error came out of the storage layer.
    pub fn is_storage_error(&self) -> bool {
        match self {
            Error::Store(store_err) => !store_err.is_not_found() && !store_err.is_already_exists(),
            _ => false,
        }
    }
}
