//! Local email/password authentication
//!
//! Local accounts are `EMAIL` identities whose credential is an Argon2id
//! hash. They share users and sessions with OAuth2 logins.

use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};

use crate::ledger::{
    Identity, IdentityClaim, Ledger, Session, SessionContext, UserProfile, EMAIL_PROVIDER_TYPE,
};
use crate::local::password_service::PasswordService;
use crate::shared::error::{AuthError, Result};

/// Session and identity of a successful password login.
#[derive(Debug, Clone)]
pub struct LocalLogin {
    pub session: Session,
    pub identity: Identity,
}

#[derive(Clone)]
pub struct LocalAuthService {
    ledger: Arc<dyn Ledger>,
    passwords: Arc<PasswordService>,
    session_ttl: Duration,
}

/// Lowercased, trimmed email; the identity's provider uid.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.starts_with('.') => Ok(email),
        _ => Err(AuthError::invalid_argument("a valid email address is required")),
    }
}

impl LocalAuthService {
    pub fn new(ledger: Arc<dyn Ledger>, passwords: Arc<PasswordService>, session_ttl: Duration) -> Self {
        Self {
            ledger,
            passwords,
            session_ttl,
        }
    }

    /// Create a user and its `EMAIL` identity.
    pub async fn signup_with_password(
        &self,
        tenant_id: &str,
        email: &str,
        password: &str,
        mut profile: UserProfile,
    ) -> Result<Identity> {
        let email = normalize_email(email)?;
        let hash = self.hash(password.to_string(), true).await?;

        if profile.email.is_none() {
            profile.email = Some(email.clone());
        }
        let claim = IdentityClaim::new(EMAIL_PROVIDER_TYPE, email)
            .with_credential(hash)
            .with_profile(profile);
        let identity = self.ledger.create_identity(tenant_id, claim).await?;

        info!(tenant_id, user_id = %identity.user_id, "Local account created");
        Ok(identity)
    }

    /// Verify the password and open a session.
    ///
    /// Unknown email, wrong password and a disabled identity all answer
    /// `InvalidCredentials`.
    pub async fn login_with_password(
        &self,
        tenant_id: &str,
        email: &str,
        password: &str,
        context: SessionContext,
    ) -> Result<LocalLogin> {
        let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;

        let Some(identity) = self
            .ledger
            .find_identity(tenant_id, EMAIL_PROVIDER_TYPE, &email)
            .await?
        else {
            return Err(self.reject_without_hash(password).await);
        };
        if !identity.is_active() {
            warn!(tenant_id, identity_id = %identity.id, status = identity.status.as_str(), "Password login for disabled identity");
            return Err(self.reject_without_hash(password).await);
        }
        let Some(stored) = identity.credential.clone() else {
            return Err(self.reject_without_hash(password).await);
        };

        if !self.verify(password.to_string(), stored.clone()).await? {
            warn!(tenant_id, identity_id = %identity.id, "Password login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if self.passwords.needs_rehash(&stored) {
            self.upgrade_hash(tenant_id, &identity, password).await;
        }

        let identity = self
            .ledger
            .upsert_identity(tenant_id, IdentityClaim::new(EMAIL_PROVIDER_TYPE, email))
            .await?;
        let user = self.ledger.get_user(tenant_id, &identity.user_id).await?;
        if !user.is_active() {
            warn!(tenant_id, user_id = %user.id, "Password login for inactive user");
            return Err(AuthError::InvalidCredentials);
        }

        let session = self
            .ledger
            .create_session(tenant_id, &identity.user_id, &identity.id, self.session_ttl, context)
            .await?;

        info!(tenant_id, user_id = %identity.user_id, "Password login completed");
        Ok(LocalLogin { session, identity })
    }

    /// Replace the credential of an existing local account.
    pub async fn reset_password(&self, tenant_id: &str, email: &str, new_password: &str) -> Result<()> {
        let email = normalize_email(email)?;
        let identity = self
            .ledger
            .find_identity(tenant_id, EMAIL_PROVIDER_TYPE, &email)
            .await?
            .ok_or_else(|| AuthError::not_found("Identity", format!("{}/{}", EMAIL_PROVIDER_TYPE, email)))?;

        let hash = self.hash(new_password.to_string(), true).await?;
        self.ledger.update_credential(tenant_id, &identity.id, hash).await?;

        info!(tenant_id, identity_id = %identity.id, "Password reset");
        Ok(())
    }

    async fn upgrade_hash(&self, tenant_id: &str, identity: &Identity, password: &str) {
        let result = match self.hash(password.to_string(), false).await {
            Ok(hash) => self
                .ledger
                .update_credential(tenant_id, &identity.id, hash)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => info!(tenant_id, identity_id = %identity.id, "Password hash upgraded"),
            Err(e) => warn!(tenant_id, identity_id = %identity.id, error = %e, "Password hash upgrade failed"),
        }
    }

    /// Argon2 is CPU bound, keep it off the async workers.
    async fn hash(&self, password: String, check_policy: bool) -> Result<String> {
        let passwords = self.passwords.clone();
        tokio::task::spawn_blocking(move || {
            if check_policy {
                passwords.hash_password(&password)
            } else {
                passwords.rehash_password(&password)
            }
        })
        .await
        .map_err(|e| AuthError::internal(format!("hashing task failed: {}", e)))?
    }

    /// Same Argon2 cost as a wrong password, so timing does not reveal the account.
    async fn reject_without_hash(&self, password: &str) -> AuthError {
        let passwords = self.passwords.clone();
        let password = password.to_string();
        if let Err(e) = tokio::task::spawn_blocking(move || passwords.verify_decoy(&password)).await {
            warn!(error = %e, "Decoy verification task failed");
        }
        AuthError::InvalidCredentials
    }

    async fn verify(&self, password: String, hash: String) -> Result<bool> {
        let passwords = self.passwords.clone();
        tokio::task::spawn_blocking(move || passwords.verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::internal(format!("verification task failed: {}", e)))?
    }
}
