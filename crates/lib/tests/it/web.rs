use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, header};
use serde_json::{Value, json};
use tally::auth::{DataScope, Session};
use tally::store::{
    Commitment, CommitmentStatus, InMemory, NewCommitment, NewUser, StatusChange, Store,
    StoreError, UserRecord,
};
use tally::web::{AppState, WebServer};
use tally::{Clock, FixedClock};

use crate::helpers::*;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

async fn start() -> (WebServer, AppState, Client) {
    let (state, _clock) = test_state().await;
    seed_standard_users(state.issuer()).await;
    let server = WebServer::start("127.0.0.1:0", state.clone())
        .await
        .expect("server starts");
    (server, state, Client::new())
}

/// The `name=value` pair of the session cookie set by `response`.
fn session_cookie(response: &Response) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("tally_session="))
        .and_then(|v| v.split(';').next())
        .expect("session cookie set")
        .to_string()
}

async fn login(server: &WebServer, client: &Client, email: &str) -> String {
    let response = client
        .post(server.url("/api/auth/login"))
        .json(&json!({"email": email, "password": PASSWORD}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    session_cookie(&response)
}

async fn error_of(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let body: Value = response.json().await.unwrap();
    (status, body["error"].as_str().unwrap_or_default().to_string())
}

#[tokio::test]
async fn health_reports_backend() {
    let (server, state, client) = start().await;
    let response = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backend"], state.store().kind());
    server.stop().await.unwrap();
}

#[tokio::test]
async fn protected_routes_need_a_session() {
    let (server, _state, client) = start().await;
    for path in ["/api/me", "/api/commitments", "/api/live"] {
        let response = client.get(server.url(path)).send().await.unwrap();
        assert_eq!(
            error_of(response).await,
            (StatusCode::UNAUTHORIZED, "unauthenticated".to_string()),
            "{path}"
        );
    }
    server.stop().await.unwrap();
}

#[tokio::test]
async fn login_sets_hardened_cookie() {
    let (server, _state, client) = start().await;
    let response = client
        .post(server.url("/api/auth/login"))
        .json(&json!({"email": "ADMIN@tally.test", "password": PASSWORD}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let raw = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(raw.contains("HttpOnly"));
    assert!(raw.contains("SameSite=Lax"));
    assert!(raw.contains("Path=/"));
    assert!(raw.contains(&format!("Max-Age={}", TEST_TTL.as_secs())));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], ADMIN_EMAIL);
    assert_eq!(body["user"]["role"], "admin");
    assert!(body.get("token").is_none());
    server.stop().await.unwrap();
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let (server, _state, client) = start().await;
    for email in [ADMIN_EMAIL, "ghost@tally.test"] {
        let response = client
            .post(server.url("/api/auth/login"))
            .json(&json!({"email": email, "password": "Wrong9999!"}))
            .send()
            .await
            .unwrap();
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(
            error_of(response).await,
            (StatusCode::UNAUTHORIZED, "invalid credentials".to_string())
        );
    }
    server.stop().await.unwrap();
}

#[tokio::test]
async fn register_then_me() {
    let (server, _state, client) = start().await;
    let response = client
        .post(server.url("/api/auth/register"))
        .json(&json!({"email": "new@tally.test", "password": "Fresh1234!"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let cookie = session_cookie(&response);

    let me: Value = client
        .get(server.url("/api/me"))
        .header(header::COOKIE, cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["role"], "witness");

    let response = client
        .post(server.url("/api/auth/register"))
        .json(&json!({"email": "boss@tally.test", "password": "Fresh1234!", "role": "admin"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn alerts_are_admin_only() {
    let (server, _state, client) = start().await;
    let leader = login(&server, &client, LEADER_EMAIL).await;
    let response = client
        .post(server.url("/api/alerts"))
        .header(header::COOKIE, &leader)
        .json(&json!({"message": "polls closing"}))
        .send()
        .await
        .unwrap();
    assert_eq!(
        error_of(response).await,
        (StatusCode::FORBIDDEN, "forbidden".to_string())
    );

    // Session survives the failed role check.
    let response = client
        .get(server.url("/api/me"))
        .header(header::COOKIE, &leader)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let admin = login(&server, &client, ADMIN_EMAIL).await;
    let response = client
        .post(server.url("/api/alerts"))
        .header(header::COOKIE, &admin)
        .json(&json!({"message": "polls closing"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn commitments_lifecycle() {
    let (server, _state, client) = start().await;
    let admin = login(&server, &client, ADMIN_EMAIL).await;
    let leader = login(&server, &client, LEADER_EMAIL).await;

    let create = |cookie: &str, body: Value| {
        client
            .post(server.url("/api/commitments"))
            .header(header::COOKIE, cookie.to_string())
            .json(&body)
            .send()
    };

    let own = create(
        &leader,
        json!({"delegateId": "D3", "description": "north ward", "promisedVotes": 40}),
    )
    .await
    .unwrap();
    assert_eq!(own.status(), StatusCode::CREATED);
    let own: Value = own.json().await.unwrap();
    assert_eq!(own["leaderId"], "L7");
    assert_eq!(own["status"], "pending");

    let other = create(
        &admin,
        json!({"leaderId": "L8", "description": "south ward", "promisedVotes": 10}),
    )
    .await
    .unwrap();
    assert_eq!(other.status(), StatusCode::CREATED);
    let other: Value = other.json().await.unwrap();

    let listed: Vec<Value> = client
        .get(server.url("/api/commitments"))
        .header(header::COOKIE, &leader)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], own["id"]);

    let status_url = |id: &Value| server.url(&format!("/api/commitments/{id}/status"));

    let response = client
        .post(status_url(&own["id"]))
        .header(header::COOKIE, &leader)
        .json(&json!({"status": "fulfilled"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["status"], "fulfilled");

    let response = client
        .post(status_url(&other["id"]))
        .header(header::COOKIE, &leader)
        .json(&json!({"status": "failed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(
        error_of(response).await,
        (StatusCode::NOT_FOUND, "not found".to_string())
    );

    let response = client
        .post(status_url(&own["id"]))
        .header(header::COOKIE, &leader)
        .json(&json!({"status": "Done"}))
        .send()
        .await
        .unwrap();
    let (status, message) = error_of(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(message.contains("invalid status"), "{message}");

    let response = client
        .post(server.url("/api/commitments/abc/status"))
        .header(header::COOKIE, &leader)
        .json(&json!({"status": "failed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let history: Vec<Value> = client
        .get(server.url(&format!("/api/commitments/{}/history", own["id"])))
        .header(header::COOKIE, &admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["fromStatus"], "pending");
    assert_eq!(history[0]["toStatus"], "fulfilled");
    server.stop().await.unwrap();
}

#[tokio::test]
async fn witness_cannot_write_commitments() {
    let (server, _state, client) = start().await;
    let witness = login(&server, &client, WITNESS_EMAIL).await;
    let response = client
        .post(server.url("/api/commitments"))
        .header(header::COOKIE, &witness)
        .json(&json!({"description": "x", "promisedVotes": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn logout_ends_the_session() {
    let (server, _state, client) = start().await;
    let cookie = login(&server, &client, ADMIN_EMAIL).await;

    let response = client
        .post(server.url("/api/auth/logout"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.starts_with("tally_session=;") && v.contains("Max-Age=0"))
    );

    let response = client
        .get(server.url("/api/me"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A second logout with the dead cookie still succeeds.
    let response = client
        .post(server.url("/api/auth/logout"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    server.stop().await.unwrap();
}

/// Read from `response` until the accumulated text contains `needle`.
async fn read_until(response: &mut Response, buffer: &mut String, needle: &str) {
    tokio::time::timeout(READ_TIMEOUT, async {
        while !buffer.contains(needle) {
            let chunk = response
                .chunk()
                .await
                .expect("stream readable")
                .expect("stream still open");
            buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {needle:?}, got {buffer:?}"));
}

async fn wait_for_subscribers(state: &AppState, expected: usize) {
    tokio::time::timeout(READ_TIMEOUT, async {
        while state.bus().subscriber_count() != expected {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("subscriber count settles");
}

#[tokio::test]
async fn live_feed_relays_alerts_and_cleans_up() {
    let (server, state, client) = start().await;
    let witness = login(&server, &client, WITNESS_EMAIL).await;
    let admin = login(&server, &client, ADMIN_EMAIL).await;
    let baseline = state.bus().subscriber_count();

    let mut feed = client
        .get(server.url("/api/live"))
        .header(header::COOKIE, &witness)
        .send()
        .await
        .unwrap();
    assert_eq!(feed.status(), StatusCode::OK);
    assert_eq!(
        feed.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "text/event-stream"
    );
    assert_eq!(feed.headers()[header::CACHE_CONTROL].to_str().unwrap(), "no-cache");
    assert_eq!(feed.headers()[header::CONNECTION].to_str().unwrap(), "keep-alive");

    let now = state.clock().now_millis();
    let ready_frame = format!("event: ready\ndata: {{\"ts\":{now}}}\n\n");
    let mut buffer = String::new();
    read_until(&mut feed, &mut buffer, &ready_frame).await;
    assert!(buffer.starts_with(&ready_frame), "{buffer:?}");
    assert_eq!(state.bus().subscriber_count(), baseline + 1);

    // Idle feed: the 50ms test heartbeat shows up as a bare comment.
    read_until(&mut feed, &mut buffer, ": ping\n\n").await;

    let response = client
        .post(server.url("/api/alerts"))
        .header(header::COOKIE, &admin)
        .json(&json!({"message": "recount at station 4"}))
        .send()
        .await
        .unwrap();
    let receipt: Value = response.json().await.unwrap();
    assert_eq!(receipt["delivered"], 1);

    let update_frame = format!(
        "event: update\ndata: {{\"ts\":{now},\"source\":\"alerts\",\"type\":\"alert\"}}\n\n"
    );
    read_until(&mut feed, &mut buffer, &update_frame).await;
    assert_eq!(buffer.matches("event: update").count(), 1);
    assert!(!buffer.contains("recount"));

    drop(feed);
    // The heartbeat write notices the closed socket.
    wait_for_subscribers(&state, baseline).await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn shutdown_completes_with_open_feed() {
    let (server, state, client) = start().await;
    let witness = login(&server, &client, WITNESS_EMAIL).await;

    let mut feed = client
        .get(server.url("/api/live"))
        .header(header::COOKIE, &witness)
        .send()
        .await
        .unwrap();
    let mut buffer = String::new();
    read_until(&mut feed, &mut buffer, "event: ready").await;

    tokio::time::timeout(READ_TIMEOUT, server.stop())
        .await
        .expect("shutdown does not hang")
        .unwrap();

    let rest = tokio::time::timeout(READ_TIMEOUT, async {
        while let Ok(Some(_)) = feed.chunk().await {}
    })
    .await;
    assert!(rest.is_ok(), "feed ends after shutdown");
    wait_for_subscribers(&state, 0).await;
}

/// In-memory store whose session deletes always fail.
struct UnreachableOnDelete(InMemory);

#[async_trait]
impl Store for UnreachableOnDelete {
    fn kind(&self) -> &'static str {
        "flaky"
    }

    async fn ping(&self) -> tally::Result<()> {
        self.0.ping().await
    }

    async fn user_by_id(&self, id: i64) -> tally::Result<Option<UserRecord>> {
        self.0.user_by_id(id).await
    }

    async fn user_by_email(&self, email: &str) -> tally::Result<Option<UserRecord>> {
        self.0.user_by_email(email).await
    }

    async fn create_user(&self, user: NewUser) -> tally::Result<UserRecord> {
        self.0.create_user(user).await
    }

    async fn upsert_user(&self, user: NewUser) -> tally::Result<UserRecord> {
        self.0.upsert_user(user).await
    }

    async fn insert_session(&self, session: &Session) -> tally::Result<()> {
        self.0.insert_session(session).await
    }

    async fn session_by_hash(&self, token_hash: &str) -> tally::Result<Option<Session>> {
        self.0.session_by_hash(token_hash).await
    }

    async fn delete_session(&self, _token_hash: &str) -> tally::Result<()> {
        Err(StoreError::Unavailable {
            reason: "connection refused".to_string(),
        }
        .into())
    }

    async fn purge_expired_sessions(&self, now_millis: i64) -> tally::Result<u64> {
        self.0.purge_expired_sessions(now_millis).await
    }

    async fn insert_commitment(&self, commitment: NewCommitment) -> tally::Result<Commitment> {
        self.0.insert_commitment(commitment).await
    }

    async fn commitment(&self, id: i64) -> tally::Result<Option<Commitment>> {
        self.0.commitment(id).await
    }

    async fn commitments(&self, scope: &DataScope) -> tally::Result<Vec<Commitment>> {
        self.0.commitments(scope).await
    }

    async fn set_commitment_status(
        &self,
        id: i64,
        status: CommitmentStatus,
        changed_by: i64,
        changed_at: i64,
    ) -> tally::Result<Commitment> {
        self.0
            .set_commitment_status(id, status, changed_by, changed_at)
            .await
    }

    async fn status_history(&self, id: i64) -> tally::Result<Vec<StatusChange>> {
        self.0.status_history(id).await
    }
}

#[tokio::test]
async fn logout_clears_cookie_even_when_store_fails() {
    let state = AppState::new(
        Arc::new(UnreachableOnDelete(InMemory::new())),
        Arc::new(FixedClock::default()),
        test_config(),
    )
    .expect("test config is valid");
    seed_standard_users(state.issuer()).await;
    let server = WebServer::start("127.0.0.1:0", state).await.unwrap();
    let client = Client::new();
    let cookie = login(&server, &client, ADMIN_EMAIL).await;

    let response = client
        .post(server.url("/api/auth/logout"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    let cleared = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("tally_session="))
        .map(str::to_string)
        .expect("removal cookie sent");
    assert!(cleared.contains("Max-Age=0"), "{cleared}");
    assert_eq!(
        error_of(response).await,
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "server configuration error".to_string()
        )
    );
    server.stop().await.unwrap();
}
