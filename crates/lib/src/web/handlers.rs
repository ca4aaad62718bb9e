//! JSON handlers for authentication, commitments and alerts.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;

use super::AppState;
use super::error::ApiResult;
use crate::auth::{
    AuthorizationContext, IssuedSession, Registration, Role, extract_token, parse_positive_int,
};
use crate::reports::{AlertReceipt, CommitmentInput, CommitmentView};
use crate::store::{StatusChange, UserRecord};

const ANY_ROLE: &[Role] = &Role::ALL;
const MANAGERS: &[Role] = &[Role::Admin, Role::Leader];
const ADMIN_ONLY: &[Role] = &[Role::Admin];

#[derive(Deserialize)]
pub(super) struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub(super) struct StatusRequest {
    status: String,
}

#[derive(Deserialize)]
pub(super) struct AlertRequest {
    message: String,
}

/// Body returned after login or registration. The token itself only travels in the cookie.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SessionResponse {
    email: String,
    user: AuthorizationContext,
    expires_at: i64,
}

impl SessionResponse {
    fn new(user: &UserRecord, issued: &IssuedSession) -> Self {
        Self {
            email: user.email.clone(),
            user: AuthorizationContext::from_user(user),
            expires_at: issued.expires_at,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    backend: &'static str,
}

/// Handler for GET /health
pub(super) async fn health(State(state): State<AppState>) -> Response {
    let store = state.store();
    match store.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "healthy",
            backend: store.kind(),
        })
        .into_response(),
        Err(e) => {
            tracing::warn!(backend = store.kind(), "health check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    backend: store.kind(),
                }),
            )
                .into_response()
        }
    }
}

/// Handler for POST /api/auth/login
pub(super) async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    let Json(body) = body?;
    let (user, issued) = state.issuer().login(&body.email, &body.password).await?;
    state.issuer().set_session_cookie(&cookies, &issued);
    Ok(Json(SessionResponse::new(&user, &issued)))
}

/// Handler for POST /api/auth/register
pub(super) async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    body: Result<Json<Registration>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let Json(registration) = body?;
    let (user, issued) = state.issuer().register(registration).await?;
    state.issuer().set_session_cookie(&cookies, &issued);
    Ok((StatusCode::CREATED, Json(SessionResponse::new(&user, &issued))))
}

/// Handler for POST /api/auth/logout
///
/// Succeeds whether or not the presented session was still valid.
pub(super) async fn logout(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let issuer = state.issuer();
    // The browser forgets the cookie even if the store is unreachable.
    issuer.clear_session_cookie(&cookies);
    if let Some(token) = extract_token(&headers, &issuer.policy().cookie_name) {
        issuer.destroy_session(&token).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/me
pub(super) async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<AuthorizationContext>> {
    let ctx = state.guard().require_session(&headers, ANY_ROLE).await?;
    Ok(Json(ctx))
}

/// Handler for GET /api/commitments
pub(super) async fn list_commitments(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<CommitmentView>>> {
    let ctx = state.guard().require_session(&headers, ANY_ROLE).await?;
    Ok(Json(state.reports().list_commitments(&ctx).await?))
}

/// Handler for POST /api/commitments
pub(super) async fn create_commitment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CommitmentInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CommitmentView>)> {
    let ctx = state.guard().require_session(&headers, MANAGERS).await?;
    let Json(input) = body?;
    let created = state.reports().create_commitment(&ctx, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Handler for POST /api/commitments/{id}/status
pub(super) async fn update_commitment_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> ApiResult<Json<CommitmentView>> {
    let ctx = state.guard().require_session(&headers, MANAGERS).await?;
    let id = parse_positive_int("id", &id)?;
    let Json(body) = body?;
    let updated = state
        .reports()
        .update_commitment_status(&ctx, id, &body.status)
        .await?;
    Ok(Json(updated))
}

/// Handler for GET /api/commitments/{id}/history
pub(super) async fn commitment_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<StatusChange>>> {
    let ctx = state.guard().require_session(&headers, ANY_ROLE).await?;
    let id = parse_positive_int("id", &id)?;
    Ok(Json(state.reports().status_history(&ctx, id).await?))
}

/// Handler for POST /api/alerts
pub(super) async fn publish_alert(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AlertRequest>, JsonRejection>,
) -> ApiResult<Json<AlertReceipt>> {
    let ctx = state.guard().require_session(&headers, ADMIN_ONLY).await?;
    let Json(body) = body?;
    Ok(Json(state.reports().publish_alert(&ctx, &body.message).await?))
}
