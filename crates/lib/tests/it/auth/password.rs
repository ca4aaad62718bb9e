use tally::auth::Role;
use tally::store::NewUser;

use crate::helpers::*;

#[tokio::test]
async fn hash_from_another_policy_still_logs_in() {
    let (issuer, _clock) = test_issuer().await;
    // Stronger work factor than the issuer's own, as an operator tool might use
    let strong = tally::auth::CredentialHasher::new(tally::config::PasswordPolicy {
        memory_kib: 1024,
        iterations: 2,
        parallelism: 1,
    })
    .unwrap();
    let password_hash = strong.hash_password(PASSWORD).await.unwrap();
    issuer
        .store()
        .upsert_user(NewUser {
            email: ADMIN_EMAIL.to_string(),
            password_hash,
            role: Role::Admin,
            is_active: true,
            delegate_id: None,
            leader_id: None,
            created_at: SEEDED_AT,
        })
        .await
        .unwrap();

    let (user, _) = issuer.login(ADMIN_EMAIL, PASSWORD).await.unwrap();
    assert_eq!(user.role, Role::Admin);
}

#[tokio::test]
async fn corrupt_stored_hash_is_just_a_failed_login() {
    let (issuer, _clock) = test_issuer().await;
    issuer
        .store()
        .create_user(NewUser {
            email: "broken@tally.test".to_string(),
            password_hash: "not-a-phc-string".to_string(),
            role: Role::Delegate,
            is_active: true,
            delegate_id: Some("D1".to_string()),
            leader_id: None,
            created_at: SEEDED_AT,
        })
        .await
        .unwrap();

    let err = issuer.login("broken@tally.test", PASSWORD).await.unwrap_err();
    assert!(err.is_authentication_error());
    assert_eq!(err.to_string(), "invalid credentials");
}

#[tokio::test]
async fn async_verify_matches_exactly() {
    let hasher = test_hasher();
    let hash = hasher.hash_password("Admin1234!").await.unwrap();
    assert!(hasher.verify_password("Admin1234!", &hash).await);
    assert!(!hasher.verify_password("admin1234!", &hash).await);
    assert!(!hasher.verify_password("", &hash).await);
    assert!(!hasher.verify_password("Admin1234!", "").await);
}
