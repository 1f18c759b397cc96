//! Ledger contract
//!
//! Durable identities, users and sessions. Every operation is tenant-scoped;
//! a record from another tenant behaves exactly like a missing one.

use async_trait::async_trait;
use chrono::Duration;

use crate::ledger::identity::{Identity, IdentityClaim, IdentityStatus};
use crate::ledger::session::{Session, SessionContext};
use crate::ledger::user::{DeleteMode, User, UserPatch, UserProfile};
use crate::shared::error::{AuthError, Result};

#[async_trait]
pub trait Ledger: Send + Sync {
    // ------------------------------------------------------------------
    // Identities
    // ------------------------------------------------------------------

    /// Resolve the identity for `(provider_type, provider_uid)`.
    ///
    /// An existing identity is touched (sign-in time, ACTIVE) and keeps its
    /// user. Otherwise it is created, together with a new user when the
    /// claim names none. Repeated calls return the same identity id.
    async fn upsert_identity(&self, tenant_id: &str, claim: IdentityClaim) -> Result<Identity>;

    /// Like `upsert_identity` but fails with `Duplicate` if the identity exists.
    async fn create_identity(&self, tenant_id: &str, claim: IdentityClaim) -> Result<Identity>;

    async fn get_identity(&self, tenant_id: &str, identity_id: &str) -> Result<Identity>;

    async fn find_identity(
        &self,
        tenant_id: &str,
        provider_type: &str,
        provider_uid: &str,
    ) -> Result<Option<Identity>>;

    async fn list_identities(&self, tenant_id: &str, user_id: &str) -> Result<Vec<Identity>>;

    async fn set_identity_status(
        &self,
        tenant_id: &str,
        identity_id: &str,
        status: IdentityStatus,
    ) -> Result<Identity>;

    async fn update_credential(
        &self,
        tenant_id: &str,
        identity_id: &str,
        credential: String,
    ) -> Result<Identity>;

    /// Soft delete marks the identity DELETED and drops its credential.
    /// Sessions opened through it are removed in both modes.
    async fn delete_identity(&self, tenant_id: &str, identity_id: &str, mode: DeleteMode) -> Result<bool>;

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    async fn create_user(&self, tenant_id: &str, profile: UserProfile) -> Result<User>;

    async fn get_user(&self, tenant_id: &str, user_id: &str) -> Result<User>;

    /// Replace all mutable profile fields.
    async fn update_user(&self, tenant_id: &str, user_id: &str, profile: UserProfile) -> Result<User>;

    async fn patch_user(&self, tenant_id: &str, user_id: &str, patch: UserPatch) -> Result<User>;

    /// Removes the user's sessions; identities follow `mode`.
    async fn delete_user(&self, tenant_id: &str, user_id: &str, mode: DeleteMode) -> Result<bool>;

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Always a new session, prior sessions stay valid.
    async fn create_session(
        &self,
        tenant_id: &str,
        user_id: &str,
        identity_id: &str,
        ttl: Duration,
        context: SessionContext,
    ) -> Result<Session>;

    /// Unexpired session for a bearer token.
    async fn find_session(&self, tenant_id: &str, auth_token: &str) -> Result<Option<Session>>;

    /// `expires_at = max(expires_at, now + ttl)`. Expired sessions are `NotFound`.
    async fn refresh_session(&self, tenant_id: &str, session_id: &str, ttl: Duration) -> Result<Session>;

    async fn delete_session(&self, tenant_id: &str, session_id: &str) -> Result<bool>;
}

pub(crate) fn validate_claim(claim: &IdentityClaim) -> Result<()> {
    if claim.provider_type.trim().is_empty() {
        return Err(AuthError::invalid_argument("provider_type is required"));
    }
    if claim.provider_uid.trim().is_empty() {
        return Err(AuthError::invalid_argument("provider_uid is required"));
    }
    Ok(())
}

pub(crate) fn validate_ttl(ttl: Duration) -> Result<()> {
    if ttl <= Duration::zero() {
        return Err(AuthError::invalid_argument("session ttl must be positive"));
    }
    Ok(())
}

pub(crate) fn identity_key(claim: &IdentityClaim) -> String {
    format!("{}/{}", claim.provider_type, claim.provider_uid)
}
