//! Local email/password account tests

mod common;

use std::sync::Arc;
use std::time::Instant;

use common::*;
use pc_identity::ledger::EMAIL_PROVIDER_TYPE;
use pc_identity::{
    Argon2Config, AuthError, IdentityStatus, Ledger, LocalAuthService, MemoryLedger, PasswordPolicy,
    PasswordService, SessionContext, UserProfile,
};

const EMAIL: &str = "Alice@Example.com";
const PASSWORD: &str = "correct horse battery";

#[tokio::test]
async fn test_signup_then_login() {
    let h = harness().await;

    let identity = h
        .local
        .signup_with_password(TENANT, EMAIL, PASSWORD, UserProfile::default())
        .await
        .unwrap();
    assert_eq!(identity.provider_type, EMAIL_PROVIDER_TYPE);
    assert_eq!(identity.provider_uid, "alice@example.com");
    let hash = identity.credential.clone().unwrap();
    assert!(hash.starts_with("$argon2id$"));
    assert!(!hash.contains(PASSWORD));

    let user = h.ledger.get_user(TENANT, &identity.user_id).await.unwrap();
    assert_eq!(user.email.as_deref(), Some("alice@example.com"));

    let login = h
        .local
        .login_with_password(TENANT, "  alice@example.COM", PASSWORD, SessionContext::default())
        .await
        .unwrap();
    assert_eq!(login.identity.id, identity.id);
    assert_eq!(login.session.user_id, identity.user_id);
    assert!(login.identity.last_signin_at.is_some());

    let found = h.ledger.find_session(TENANT, &login.session.auth_token).await.unwrap();
    assert_eq!(found.map(|s| s.id), Some(login.session.id));
}

#[tokio::test]
async fn test_wrong_password_and_unknown_email_look_the_same() {
    let h = harness().await;
    h.local
        .signup_with_password(TENANT, EMAIL, PASSWORD, UserProfile::default())
        .await
        .unwrap();

    let wrong = h
        .local
        .login_with_password(TENANT, EMAIL, "not the password", SessionContext::default())
        .await
        .unwrap_err();
    let unknown = h
        .local
        .login_with_password(TENANT, "bob@example.com", PASSWORD, SessionContext::default())
        .await
        .unwrap_err();
    let other_tenant = h
        .local
        .login_with_password("t2", EMAIL, PASSWORD, SessionContext::default())
        .await
        .unwrap_err();

    assert!(matches!(wrong, AuthError::InvalidCredentials));
    assert!(matches!(unknown, AuthError::InvalidCredentials));
    assert!(matches!(other_tenant, AuthError::InvalidCredentials));
    assert_eq!(wrong.to_string(), unknown.to_string());
    assert_eq!(h.ledger.session_count(), 0);
}

#[tokio::test]
async fn test_unknown_email_pays_for_a_verification() {
    let passwords = Arc::new(
        PasswordService::new(
            Argon2Config {
                memory_cost: 8192,
                time_cost: 3,
                parallelism: 1,
            },
            PasswordPolicy::lenient(),
        )
        .unwrap(),
    );
    let hash = passwords.hash_password(PASSWORD).unwrap();
    let started = Instant::now();
    assert!(!passwords.verify_password("not the password", &hash).unwrap());
    let one_verify = started.elapsed();

    let ledger = Arc::new(MemoryLedger::new());
    let local = LocalAuthService::new(ledger.clone(), passwords, chrono::Duration::hours(1));
    let started = Instant::now();
    let err = local
        .login_with_password(TENANT, "nobody@example.com", PASSWORD, SessionContext::default())
        .await
        .unwrap_err();
    let unknown = started.elapsed();

    assert!(matches!(err, AuthError::InvalidCredentials));
    assert!(unknown * 2 >= one_verify, "unknown email took {:?}, a verify takes {:?}", unknown, one_verify);
    assert_eq!(ledger.session_count(), 0);
}

#[tokio::test]
async fn test_duplicate_signup_rejected() {
    let h = harness().await;
    h.local
        .signup_with_password(TENANT, EMAIL, PASSWORD, UserProfile::default())
        .await
        .unwrap();

    let err = h
        .local
        .signup_with_password(TENANT, "alice@example.com", "another password", UserProfile::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Duplicate { .. }));
    assert_eq!(h.ledger.user_count(), 1);
}

#[tokio::test]
async fn test_signup_validates_input() {
    let h = harness().await;

    let err = h
        .local
        .signup_with_password(TENANT, "not-an-email", PASSWORD, UserProfile::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidArgument { .. }));

    let err = h
        .local
        .signup_with_password(TENANT, EMAIL, "short", UserProfile::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidArgument { .. }));
    assert_eq!(h.ledger.identity_count(), 0);
}

#[tokio::test]
async fn test_disabled_identity_cannot_login() {
    let h = harness().await;
    let identity = h
        .local
        .signup_with_password(TENANT, EMAIL, PASSWORD, UserProfile::default())
        .await
        .unwrap();
    h.ledger
        .set_identity_status(TENANT, &identity.id, IdentityStatus::Inactive)
        .await
        .unwrap();

    let err = h
        .local
        .login_with_password(TENANT, EMAIL, PASSWORD, SessionContext::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn test_reset_password() {
    let h = harness().await;
    h.local
        .signup_with_password(TENANT, EMAIL, PASSWORD, UserProfile::default())
        .await
        .unwrap();

    h.local
        .reset_password(TENANT, EMAIL, "a brand new password")
        .await
        .unwrap();

    let err = h
        .local
        .login_with_password(TENANT, EMAIL, PASSWORD, SessionContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    h.local
        .login_with_password(TENANT, EMAIL, "a brand new password", SessionContext::default())
        .await
        .unwrap();

    let err = h
        .local
        .reset_password(TENANT, "nobody@example.com", "a brand new password")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound { .. }));
}

#[tokio::test]
async fn test_login_upgrades_outdated_hash() {
    let ledger = Arc::new(MemoryLedger::new());
    let old = LocalAuthService::new(ledger.clone(), password_service(), chrono::Duration::hours(1));
    let identity = old
        .signup_with_password(TENANT, EMAIL, PASSWORD, UserProfile::default())
        .await
        .unwrap();
    let old_hash = identity.credential.unwrap();

    let stronger = Arc::new(
        PasswordService::new(
            Argon2Config {
                memory_cost: 8192,
                ..Argon2Config::testing()
            },
            PasswordPolicy::lenient(),
        )
        .unwrap(),
    );
    assert!(stronger.needs_rehash(&old_hash));
    let upgraded = LocalAuthService::new(ledger.clone(), stronger.clone(), chrono::Duration::hours(1));

    upgraded
        .login_with_password(TENANT, EMAIL, PASSWORD, SessionContext::default())
        .await
        .unwrap();

    let stored = ledger.get_identity(TENANT, &identity.id).await.unwrap();
    let new_hash = stored.credential.unwrap();
    assert_ne!(new_hash, old_hash);
    assert!(!stronger.needs_rehash(&new_hash));
    assert!(stronger.verify_password(PASSWORD, &new_hash).unwrap());
}
