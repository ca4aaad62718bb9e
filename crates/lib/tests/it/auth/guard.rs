use axum::http::{HeaderMap, HeaderValue, header};
use tally::auth::{DataScope, Guard, Role};
use tally::store::NewUser;

use crate::helpers::*;

async fn guard_with_users() -> (Guard, String, String, String) {
    let (issuer, _clock) = test_issuer().await;
    let (admin, leader, witness) = seed_standard_users(&issuer).await;
    let admin_token = issuer.create_session(admin.id).await.unwrap().token;
    let leader_token = issuer.create_session(leader.id).await.unwrap().token;
    let witness_token = issuer.create_session(witness.id).await.unwrap().token;
    (Guard::new(issuer), admin_token, leader_token, witness_token)
}

fn cookie_headers(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::COOKIE,
        HeaderValue::from_str(&format!("tally_session={token}")).unwrap(),
    );
    headers
}

#[tokio::test]
async fn no_token_is_unauthenticated() {
    let (guard, ..) = guard_with_users().await;
    let err = guard.authorize(None, &[Role::Admin]).await.unwrap_err();
    assert!(err.is_authentication_error());

    let err = guard
        .require_session(&HeaderMap::new(), &Role::ALL)
        .await
        .unwrap_err();
    assert!(err.is_authentication_error());
}

#[tokio::test]
async fn leader_is_forbidden_from_admin_routes() {
    let (guard, _, leader_token, _) = guard_with_users().await;

    let err = guard
        .authorize(Some(&leader_token), &[Role::Admin])
        .await
        .unwrap_err();
    assert!(err.is_authorization_error());
    assert!(!err.is_authentication_error());

    let ctx = guard
        .authorize(Some(&leader_token), &[Role::Leader])
        .await
        .unwrap();
    assert_eq!(ctx.role, Role::Leader);
    assert_eq!(ctx.leader_id.as_deref(), Some("L7"));
    assert_eq!(ctx.scope(), DataScope::Leader("L7".to_string()));
}

#[tokio::test]
async fn admin_passes_admin_check() {
    let (guard, admin_token, ..) = guard_with_users().await;
    let ctx = guard
        .require_session(&cookie_headers(&admin_token), &[Role::Admin])
        .await
        .unwrap();
    assert!(ctx.is_admin());
    assert_eq!(ctx.scope(), DataScope::All);
}

#[tokio::test]
async fn witness_role_is_exact_but_scopes_as_delegate() {
    let (guard, _, _, witness_token) = guard_with_users().await;

    let err = guard
        .authorize(Some(&witness_token), &[Role::Delegate])
        .await
        .unwrap_err();
    assert!(err.is_authorization_error());

    let ctx = guard
        .authorize(Some(&witness_token), &[Role::Delegate, Role::Witness])
        .await
        .unwrap();
    assert_eq!(ctx.scope(), DataScope::Delegate("D3".to_string()));
}

#[tokio::test]
async fn failed_check_leaves_session_intact() {
    let (guard, _, leader_token, _) = guard_with_users().await;
    for _ in 0..3 {
        assert!(guard.authorize(Some(&leader_token), &[Role::Admin]).await.is_err());
    }
    assert!(
        guard
            .issuer()
            .resolve_session(&leader_token)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn deactivated_user_loses_access_immediately() {
    let (issuer, _clock) = test_issuer().await;
    let user = seed_user(&issuer, LEADER_EMAIL, Role::Leader, None, Some("L7")).await;
    let token = issuer.create_session(user.id).await.unwrap().token;
    let guard = Guard::new(issuer);
    assert!(guard.authorize(Some(&token), &[Role::Leader]).await.is_ok());

    guard
        .issuer()
        .store()
        .upsert_user(NewUser {
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            role: Role::Leader,
            is_active: false,
            delegate_id: None,
            leader_id: Some("L7".to_string()),
            created_at: SEEDED_AT,
        })
        .await
        .unwrap();

    let err = guard.authorize(Some(&token), &[Role::Leader]).await.unwrap_err();
    assert!(err.is_authentication_error());
}

#[tokio::test]
async fn bearer_header_is_accepted() {
    let (guard, admin_token, ..) = guard_with_users().await;
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {admin_token}")).unwrap(),
    );
    assert!(guard.require_session(&headers, &[Role::Admin]).await.is_ok());
}

#[tokio::test]
async fn expired_and_destroyed_sessions_read_the_same() {
    let (issuer, clock) = test_issuer().await;
    let user = seed_user(&issuer, ADMIN_EMAIL, Role::Admin, None, None).await;
    let expiring = issuer.create_session(user.id).await.unwrap().token;
    let destroyed = issuer.create_session(user.id).await.unwrap().token;
    issuer.destroy_session(&destroyed).await.unwrap();
    let guard = Guard::new(issuer);
    clock.advance(TEST_TTL.as_millis() as i64);

    for token in [expiring.as_str(), destroyed.as_str(), "malformed"] {
        let err = guard.authorize(Some(token), &[Role::Admin]).await.unwrap_err();
        assert_eq!(err.to_string(), "unauthenticated");
    }
}
