//! Mapping of library errors onto HTTP responses.
//!
//! Callers only ever see a status code and a short, stable message. Anything
//! carrying internal detail (storage, hashing, I/O) is logged here and replaced
//! by a generic message.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::Error;
use crate::auth::AuthError;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// A rejected request: status plus a message safe to show the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if let Error::Auth(AuthError::InvalidCredentials) = err {
            return Self::new(StatusCode::UNAUTHORIZED, "invalid credentials");
        }
        if err.is_authentication_error() {
            return Self::new(StatusCode::UNAUTHORIZED, "unauthenticated");
        }
        if err.is_authorization_error() {
            return Self::new(StatusCode::FORBIDDEN, "forbidden");
        }
        if err.is_validation_error() {
            return Self::bad_request(err.to_string());
        }
        if err.is_not_found() {
            return Self::new(StatusCode::NOT_FOUND, "not found");
        }
        if err.is_conflict() {
            return Self::new(StatusCode::CONFLICT, "already exists");
        }
        if err.is_configuration_error() {
            tracing::error!(module = err.module(), "server configuration error: {err}");
            return Self::new(StatusCode::SERVICE_UNAVAILABLE, "server configuration error");
        }
        tracing::error!(module = err.module(), "request failed: {err}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: &self.message,
            }),
        )
            .into_response()
    }
}

/// Result type for handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
