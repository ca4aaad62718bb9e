//! Precondition checks used by write endpoints right after the guard passes.

use thiserror::Error as ThisError;

use super::types::Role;
use crate::Error;
use crate::store::CommitmentStatus;

/// Malformed caller input. Messages are safe to show to the caller.
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum ValidationError {
    #[error("{field} must be a positive integer, got '{value}'")]
    NotPositiveInteger { field: &'static str, value: String },

    #[error("invalid status '{value}', expected one of: {}", CommitmentStatus::ALL_NAMES.join(", "))]
    InvalidStatus { value: String },

    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("invalid role '{value}'")]
    InvalidRole { value: String },

    #[error("role '{role}' cannot be self-assigned")]
    RoleNotSelfAssignable { role: Role },

    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

/// Fail unless `value` is strictly positive.
pub fn assert_positive_int(field: &'static str, value: i64) -> crate::Result<i64> {
    if value > 0 {
        Ok(value)
    } else {
        Err(ValidationError::NotPositiveInteger {
            field,
            value: value.to_string(),
        }
        .into())
    }
}

/// Parse a raw path/query value and require a positive integer.
pub fn parse_positive_int(field: &'static str, raw: &str) -> crate::Result<i64> {
    match raw.trim().parse::<i64>() {
        Ok(value) => assert_positive_int(field, value),
        Err(_) => Err(ValidationError::NotPositiveInteger {
            field,
            value: raw.to_string(),
        }
        .into()),
    }
}

/// Fail unless `value` names a commitment status.
pub fn assert_status(value: &str) -> crate::Result<CommitmentStatus> {
    CommitmentStatus::parse(value).ok_or_else(|| {
        ValidationError::InvalidStatus {
            value: value.to_string(),
        }
        .into()
    })
}

/// Fail when a required text field is blank.
pub fn assert_present<'a>(field: &'static str, value: &'a str) -> crate::Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::MissingField { field }.into())
    } else {
        Ok(trimmed)
    }
}
