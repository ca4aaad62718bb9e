//! Create-admin command - upserts a privileged account.

use tally::auth::session::{MIN_PASSWORD_LENGTH, normalize_email};
use tally::auth::{CredentialHasher, Role};
use tally::config::PasswordPolicy;
use tally::store::{NewUser, Store, UserRecord};
use tally::{Clock, SystemClock};

use crate::backend::create_store;
use crate::cli::CreateAdminArgs;

/// Hash with the server's own hasher and write the admin row, replacing any
/// existing account with the same email.
pub async fn upsert_admin(
    store: &dyn Store,
    hasher: &CredentialHasher,
    clock: &dyn Clock,
    email: &str,
    password: &str,
) -> Result<UserRecord, Box<dyn std::error::Error>> {
    let email = normalize_email(email);
    if !email.contains('@') {
        return Err(format!("'{email}' is not an email address").into());
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!("password must be at least {MIN_PASSWORD_LENGTH} characters").into());
    }

    let password_hash = hasher.hash_password(password).await?;
    let user = store
        .upsert_user(NewUser {
            email,
            password_hash,
            role: Role::Admin,
            is_active: true,
            delegate_id: None,
            leader_id: None,
            created_at: clock.now_millis(),
        })
        .await?;
    Ok(user)
}

/// Run the create-admin command
pub async fn run(args: &CreateAdminArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = create_store(&args.backend_config).await?;
    let hasher = CredentialHasher::new(PasswordPolicy::default())?;

    let user = upsert_admin(
        store.as_ref(),
        &hasher,
        &SystemClock,
        &args.email,
        &args.password,
    )
    .await?;
    tracing::info!(user_id = user.id, "admin account written");
    println!("Admin {} ready (id {})", user.email, user.id);
    Ok(())
}
