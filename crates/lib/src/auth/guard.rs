//! The authorization guard.
//!
//! `extract token -> resolve session -> load user -> check role` as a chain of
//! small functions, so the whole decision can be tested without an HTTP request.

use axum::http::{HeaderMap, header};
use tower_cookies::Cookie;

use super::errors::AuthError;
use super::session::SessionIssuer;
use super::types::{AuthorizationContext, Role};
use crate::Result;

/// Pull the session token out of request headers.
///
/// The named cookie wins; an `Authorization: Bearer` header is accepted for
/// non-browser clients.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| Cookie::split_parse(raw).filter_map(|c| c.ok()))
        .find(|cookie| cookie.name() == cookie_name)
        .map(|cookie| cookie.value().to_string());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
    })
}

/// Single choke point in front of every protected operation.
#[derive(Clone)]
pub struct Guard {
    issuer: SessionIssuer,
}

impl Guard {
    pub fn new(issuer: SessionIssuer) -> Self {
        Self { issuer }
    }

    pub fn issuer(&self) -> &SessionIssuer {
        &self.issuer
    }

    /// Resolve a token into an authorization context for one of `allowed`.
    ///
    /// Read-only: a failed check never touches session state.
    pub async fn authorize(
        &self,
        token: Option<&str>,
        allowed: &[Role],
    ) -> Result<AuthorizationContext> {
        let Some(token) = token else {
            return Err(AuthError::Unauthenticated.into());
        };
        let Some(user_id) = self.issuer.resolve_session(token).await? else {
            return Err(AuthError::Unauthenticated.into());
        };
        let Some(user) = self.issuer.store().user_by_id(user_id).await? else {
            tracing::warn!(user_id, "session refers to a missing user");
            return Err(AuthError::Unauthenticated.into());
        };
        if !user.is_active {
            return Err(AuthError::Unauthenticated.into());
        }
        if !allowed.contains(&user.role) {
            tracing::debug!(user_id, role = %user.role, "role not permitted");
            return Err(AuthError::Forbidden { role: user.role }.into());
        }
        Ok(AuthorizationContext::from_user(&user))
    }

    /// [`Guard::authorize`] with the token taken from request headers.
    pub async fn require_session(
        &self,
        headers: &HeaderMap,
        allowed: &[Role],
    ) -> Result<AuthorizationContext> {
        let token = extract_token(headers, &self.issuer.policy().cookie_name);
        self.authorize(token.as_deref(), allowed).await
    }
}
