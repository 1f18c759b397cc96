//! In-memory Ledger
//!
//! All tables sit behind one lock so an identity upsert and the user it
//! creates land together.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::ledger::identity::{Identity, IdentityClaim, IdentityStatus};
use crate::ledger::session::{Session, SessionContext};
use crate::ledger::store::{identity_key, validate_claim, validate_ttl, Ledger};
use crate::ledger::user::{DeleteMode, User, UserPatch, UserProfile};
use crate::shared::error::{AuthError, Result};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    identities: HashMap<String, Identity>,
    sessions: HashMap<String, Session>,
}

impl Tables {
    fn identity_by_key(&self, tenant_id: &str, provider_type: &str, provider_uid: &str) -> Option<&Identity> {
        self.identities.values().find(|i| {
            i.tenant_id == tenant_id && i.provider_type == provider_type && i.provider_uid == provider_uid
        })
    }

    fn identity_mut(&mut self, tenant_id: &str, identity_id: &str) -> Result<&mut Identity> {
        self.identities
            .get_mut(identity_id)
            .filter(|i| i.tenant_id == tenant_id)
            .ok_or_else(|| AuthError::not_found("Identity", identity_id))
    }

    fn user_mut(&mut self, tenant_id: &str, user_id: &str) -> Result<&mut User> {
        self.users
            .get_mut(user_id)
            .filter(|u| u.tenant_id == tenant_id)
            .ok_or_else(|| AuthError::not_found("User", user_id))
    }

    /// Resolve the claim's user, creating one when none is named.
    fn resolve_user(&mut self, tenant_id: &str, claim: &IdentityClaim) -> Result<String> {
        match &claim.user_id {
            Some(user_id) => {
                self.user_mut(tenant_id, user_id)?;
                Ok(user_id.clone())
            }
            None => {
                let user = User::new(tenant_id, claim.profile.clone());
                let user_id = user.id.clone();
                debug!(tenant_id, user_id = %user_id, "Created user");
                self.users.insert(user_id.clone(), user);
                Ok(user_id)
            }
        }
    }

    fn insert_identity(&mut self, tenant_id: &str, claim: IdentityClaim) -> Result<Identity> {
        let user_id = self.resolve_user(tenant_id, &claim)?;
        let identity = claim.into_identity(tenant_id, user_id);
        self.identities.insert(identity.id.clone(), identity.clone());
        Ok(identity)
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    tables: RwLock<Tables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.tables.read().users.len()
    }

    pub fn identity_count(&self) -> usize {
        self.tables.read().identities.len()
    }

    pub fn session_count(&self) -> usize {
        self.tables.read().sessions.len()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn upsert_identity(&self, tenant_id: &str, claim: IdentityClaim) -> Result<Identity> {
        validate_claim(&claim)?;
        let mut tables = self.tables.write();

        let existing = tables
            .identity_by_key(tenant_id, &claim.provider_type, &claim.provider_uid)
            .map(|i| i.id.clone());
        if let Some(identity_id) = existing {
            let identity = tables.identity_mut(tenant_id, &identity_id)?;
            identity.touch_signin(&claim.props);
            return Ok(identity.clone());
        }

        tables.insert_identity(tenant_id, claim)
    }

    async fn create_identity(&self, tenant_id: &str, claim: IdentityClaim) -> Result<Identity> {
        validate_claim(&claim)?;
        let mut tables = self.tables.write();

        if tables
            .identity_by_key(tenant_id, &claim.provider_type, &claim.provider_uid)
            .is_some()
        {
            return Err(AuthError::duplicate("Identity", identity_key(&claim)));
        }
        tables.insert_identity(tenant_id, claim)
    }

    async fn get_identity(&self, tenant_id: &str, identity_id: &str) -> Result<Identity> {
        self.tables
            .read()
            .identities
            .get(identity_id)
            .filter(|i| i.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| AuthError::not_found("Identity", identity_id))
    }

    async fn find_identity(
        &self,
        tenant_id: &str,
        provider_type: &str,
        provider_uid: &str,
    ) -> Result<Option<Identity>> {
        Ok(self
            .tables
            .read()
            .identity_by_key(tenant_id, provider_type, provider_uid)
            .cloned())
    }

    async fn list_identities(&self, tenant_id: &str, user_id: &str) -> Result<Vec<Identity>> {
        let mut identities: Vec<Identity> = self
            .tables
            .read()
            .identities
            .values()
            .filter(|i| i.tenant_id == tenant_id && i.user_id == user_id)
            .cloned()
            .collect();
        identities.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(identities)
    }

    async fn set_identity_status(
        &self,
        tenant_id: &str,
        identity_id: &str,
        status: IdentityStatus,
    ) -> Result<Identity> {
        let mut tables = self.tables.write();
        let identity = tables.identity_mut(tenant_id, identity_id)?;
        identity.set_status(status);
        Ok(identity.clone())
    }

    async fn update_credential(
        &self,
        tenant_id: &str,
        identity_id: &str,
        credential: String,
    ) -> Result<Identity> {
        let mut tables = self.tables.write();
        let identity = tables.identity_mut(tenant_id, identity_id)?;
        identity.credential = Some(credential);
        identity.updated_at = Utc::now();
        Ok(identity.clone())
    }

    async fn delete_identity(&self, tenant_id: &str, identity_id: &str, mode: DeleteMode) -> Result<bool> {
        let mut tables = self.tables.write();
        if tables.identity_mut(tenant_id, identity_id).is_err() {
            return Ok(false);
        }

        match mode {
            DeleteMode::Soft => tables.identity_mut(tenant_id, identity_id)?.mark_deleted(),
            DeleteMode::Hard => {
                tables.identities.remove(identity_id);
            }
        }
        tables.sessions.retain(|_, s| s.identity_id != identity_id);
        Ok(true)
    }

    async fn create_user(&self, tenant_id: &str, profile: UserProfile) -> Result<User> {
        let user = User::new(tenant_id, profile);
        self.tables.write().users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, tenant_id: &str, user_id: &str) -> Result<User> {
        self.tables
            .read()
            .users
            .get(user_id)
            .filter(|u| u.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| AuthError::not_found("User", user_id))
    }

    async fn update_user(&self, tenant_id: &str, user_id: &str, profile: UserProfile) -> Result<User> {
        let mut tables = self.tables.write();
        let user = tables.user_mut(tenant_id, user_id)?;
        user.replace_profile(profile);
        Ok(user.clone())
    }

    async fn patch_user(&self, tenant_id: &str, user_id: &str, patch: UserPatch) -> Result<User> {
        let mut tables = self.tables.write();
        let user = tables.user_mut(tenant_id, user_id)?;
        user.apply_patch(patch);
        Ok(user.clone())
    }

    async fn delete_user(&self, tenant_id: &str, user_id: &str, mode: DeleteMode) -> Result<bool> {
        let mut tables = self.tables.write();
        if tables.user_mut(tenant_id, user_id).is_err() {
            return Ok(false);
        }

        match mode {
            DeleteMode::Soft => {
                tables.user_mut(tenant_id, user_id)?.mark_deleted();
                for identity in tables.identities.values_mut().filter(|i| i.user_id == user_id) {
                    identity.mark_deleted();
                }
            }
            DeleteMode::Hard => {
                tables.users.remove(user_id);
                tables.identities.retain(|_, i| i.user_id != user_id);
            }
        }
        tables.sessions.retain(|_, s| s.user_id != user_id);
        Ok(true)
    }

    async fn create_session(
        &self,
        tenant_id: &str,
        user_id: &str,
        identity_id: &str,
        ttl: Duration,
        context: SessionContext,
    ) -> Result<Session> {
        validate_ttl(ttl)?;
        let session = Session::new(tenant_id, user_id, identity_id, ttl, context);
        self.tables.write().sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn find_session(&self, tenant_id: &str, auth_token: &str) -> Result<Option<Session>> {
        Ok(self
            .tables
            .read()
            .sessions
            .values()
            .find(|s| s.tenant_id == tenant_id && s.auth_token == auth_token && !s.is_expired())
            .cloned())
    }

    async fn refresh_session(&self, tenant_id: &str, session_id: &str, ttl: Duration) -> Result<Session> {
        validate_ttl(ttl)?;
        let mut tables = self.tables.write();
        let session = tables
            .sessions
            .get_mut(session_id)
            .filter(|s| s.tenant_id == tenant_id && !s.is_expired())
            .ok_or_else(|| AuthError::not_found("Session", session_id))?;
        session.refresh(ttl);
        Ok(session.clone())
    }

    async fn delete_session(&self, tenant_id: &str, session_id: &str) -> Result<bool> {
        let mut tables = self.tables.write();
        let owned = tables
            .sessions
            .get(session_id)
            .is_some_and(|s| s.tenant_id == tenant_id);
        if owned {
            tables.sessions.remove(session_id);
        }
        Ok(owned)
    }
}
