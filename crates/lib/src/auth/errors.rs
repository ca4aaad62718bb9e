//! Authentication error types for the Tally library.
//!
//! Every variant here ends up in front of a caller, so the display strings are
//! deliberately uniform: the cause of a failed session lookup or login is
//! logged, never returned.

use thiserror::Error as ThisError;

use super::types::Role;
use crate::Error;

/// Errors raised by the session issuer and the guard.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum AuthError {
    /// No valid session: missing, malformed, unknown, expired, or the owning
    /// user is gone or inactive.
    #[error("unauthenticated")]
    Unauthenticated,

    /// A valid session whose role is not in the allowed set.
    #[error("forbidden")]
    Forbidden {
        /// The role the session actually holds
        role: Role,
    },

    /// Login failed. Wrong email, wrong password and disabled account all map here.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The password hashing primitive itself failed.
    #[error("password hashing failed: {reason}")]
    HashingFailed { reason: String },
}

impl AuthError {
    /// Check if this error means the caller has no usable identity.
    pub fn is_authentication_error(&self) -> bool {
        matches!(
            self,
            AuthError::Unauthenticated | AuthError::InvalidCredentials
        )
    }

    /// Check if this error means the caller is known but not allowed.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, AuthError::Forbidden { .. })
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        Error::Auth(err)
    }
}
