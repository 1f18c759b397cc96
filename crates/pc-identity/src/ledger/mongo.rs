//! MongoDB Ledger
//!
//! Identity uniqueness comes from the unique (tenantId, providerType,
//! providerUid) index. A racing insert that loses the index check discards
//! the user it created and falls back to touching the winner's identity.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    options::ReturnDocument,
    Collection, Database,
};
use tracing::{debug, warn};

use crate::ledger::identity::{Identity, IdentityClaim, IdentityStatus};
use crate::ledger::session::{Session, SessionContext};
use crate::ledger::store::{identity_key, validate_claim, validate_ttl, Ledger};
use crate::ledger::user::{DeleteMode, User, UserPatch, UserProfile, UserStatus};
use crate::shared::error::{is_duplicate_key, AuthError, Result};
use crate::shared::indexes::collections;

pub struct MongoLedger {
    users: Collection<User>,
    identities: Collection<Identity>,
    sessions: Collection<Session>,
}

fn now_bson() -> bson::DateTime {
    bson::DateTime::from_chrono(Utc::now())
}

impl MongoLedger {
    pub fn new(db: &Database) -> Self {
        Self {
            users: db.collection(collections::USERS),
            identities: db.collection(collections::IDENTITIES),
            sessions: db.collection(collections::SESSIONS),
        }
    }

    fn identity_filter(tenant_id: &str, claim: &IdentityClaim) -> Document {
        doc! {
            "tenantId": tenant_id,
            "providerType": &claim.provider_type,
            "providerUid": &claim.provider_uid,
        }
    }

    async fn touch_identity(&self, tenant_id: &str, claim: &IdentityClaim) -> Result<Option<Identity>> {
        let now = now_bson();
        let mut set = doc! {
            "status": IdentityStatus::Active.as_str(),
            "lastSigninAt": now,
            "updatedAt": now,
        };
        if !claim.props.is_empty() {
            set.insert("props", bson::to_bson(&claim.props)?);
        }

        Ok(self
            .identities
            .find_one_and_update(
                Self::identity_filter(tenant_id, claim),
                doc! { "$set": set, "$unset": { "deletedAt": "" } },
            )
            .return_document(ReturnDocument::After)
            .await?)
    }

    /// Insert a new identity, creating its user when the claim names none.
    /// Returns `Ok(None)` when another writer holds the identity key.
    async fn insert_identity(&self, tenant_id: &str, claim: IdentityClaim) -> Result<Option<Identity>> {
        let (user_id, created_user) = match &claim.user_id {
            Some(user_id) => {
                self.get_user(tenant_id, user_id).await?;
                (user_id.clone(), false)
            }
            None => {
                let user = User::new(tenant_id, claim.profile.clone());
                self.users.insert_one(&user).await?;
                debug!(tenant_id, user_id = %user.id, "Created user");
                (user.id, true)
            }
        };

        let identity = claim.into_identity(tenant_id, user_id.clone());
        match self.identities.insert_one(&identity).await {
            Ok(_) => Ok(Some(identity)),
            Err(e) if is_duplicate_key(&e) => {
                if created_user {
                    self.users.delete_one(doc! { "_id": &user_id }).await?;
                }
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_identity_doc(&self, tenant_id: &str, identity_id: &str, update: Document) -> Result<Identity> {
        self.identities
            .find_one_and_update(doc! { "_id": identity_id, "tenantId": tenant_id }, update)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| AuthError::not_found("Identity", identity_id))
    }

    async fn replace_user(&self, user: &User) -> Result<()> {
        self.users
            .replace_one(doc! { "_id": &user.id, "tenantId": &user.tenant_id }, user)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for MongoLedger {
    async fn upsert_identity(&self, tenant_id: &str, claim: IdentityClaim) -> Result<Identity> {
        validate_claim(&claim)?;

        if let Some(identity) = self.touch_identity(tenant_id, &claim).await? {
            return Ok(identity);
        }

        let key = identity_key(&claim);
        let retry = claim.clone();
        if let Some(identity) = self.insert_identity(tenant_id, claim).await? {
            return Ok(identity);
        }

        warn!(tenant_id, identity = %key, "Concurrent identity insert, using existing record");
        self.touch_identity(tenant_id, &retry)
            .await?
            .ok_or_else(|| AuthError::internal(format!("identity {} vanished during upsert", key)))
    }

    async fn create_identity(&self, tenant_id: &str, claim: IdentityClaim) -> Result<Identity> {
        validate_claim(&claim)?;
        let key = identity_key(&claim);
        self.insert_identity(tenant_id, claim)
            .await?
            .ok_or_else(|| AuthError::duplicate("Identity", key))
    }

    async fn get_identity(&self, tenant_id: &str, identity_id: &str) -> Result<Identity> {
        self.identities
            .find_one(doc! { "_id": identity_id, "tenantId": tenant_id })
            .await?
            .ok_or_else(|| AuthError::not_found("Identity", identity_id))
    }

    async fn find_identity(
        &self,
        tenant_id: &str,
        provider_type: &str,
        provider_uid: &str,
    ) -> Result<Option<Identity>> {
        Ok(self
            .identities
            .find_one(doc! {
                "tenantId": tenant_id,
                "providerType": provider_type,
                "providerUid": provider_uid,
            })
            .await?)
    }

    async fn list_identities(&self, tenant_id: &str, user_id: &str) -> Result<Vec<Identity>> {
        let cursor = self
            .identities
            .find(doc! { "tenantId": tenant_id, "userId": user_id })
            .sort(doc! { "createdAt": 1, "_id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn set_identity_status(
        &self,
        tenant_id: &str,
        identity_id: &str,
        status: IdentityStatus,
    ) -> Result<Identity> {
        let mut identity = self.get_identity(tenant_id, identity_id).await?;
        identity.set_status(status);
        self.identities
            .replace_one(doc! { "_id": identity_id, "tenantId": tenant_id }, &identity)
            .await?;
        Ok(identity)
    }

    async fn update_credential(
        &self,
        tenant_id: &str,
        identity_id: &str,
        credential: String,
    ) -> Result<Identity> {
        self.update_identity_doc(
            tenant_id,
            identity_id,
            doc! { "$set": { "credential": credential, "updatedAt": now_bson() } },
        )
        .await
    }

    async fn delete_identity(&self, tenant_id: &str, identity_id: &str, mode: DeleteMode) -> Result<bool> {
        let filter = doc! { "_id": identity_id, "tenantId": tenant_id };
        let removed = match mode {
            DeleteMode::Soft => {
                let now = now_bson();
                let result = self
                    .identities
                    .update_one(filter, doc! {
                        "$set": { "status": IdentityStatus::Deleted.as_str(), "deletedAt": now, "updatedAt": now },
                        "$unset": { "credential": "" },
                    })
                    .await?;
                result.matched_count > 0
            }
            DeleteMode::Hard => self.identities.delete_one(filter).await?.deleted_count > 0,
        };

        if removed {
            self.sessions
                .delete_many(doc! { "tenantId": tenant_id, "identityId": identity_id })
                .await?;
        }
        Ok(removed)
    }

    async fn create_user(&self, tenant_id: &str, profile: UserProfile) -> Result<User> {
        let user = User::new(tenant_id, profile);
        self.users.insert_one(&user).await?;
        Ok(user)
    }

    async fn get_user(&self, tenant_id: &str, user_id: &str) -> Result<User> {
        self.users
            .find_one(doc! { "_id": user_id, "tenantId": tenant_id })
            .await?
            .ok_or_else(|| AuthError::not_found("User", user_id))
    }

    async fn update_user(&self, tenant_id: &str, user_id: &str, profile: UserProfile) -> Result<User> {
        let mut user = self.get_user(tenant_id, user_id).await?;
        user.replace_profile(profile);
        self.replace_user(&user).await?;
        Ok(user)
    }

    async fn patch_user(&self, tenant_id: &str, user_id: &str, patch: UserPatch) -> Result<User> {
        let mut user = self.get_user(tenant_id, user_id).await?;
        user.apply_patch(patch);
        self.replace_user(&user).await?;
        Ok(user)
    }

    async fn delete_user(&self, tenant_id: &str, user_id: &str, mode: DeleteMode) -> Result<bool> {
        let filter = doc! { "_id": user_id, "tenantId": tenant_id };
        let owned = doc! { "tenantId": tenant_id, "userId": user_id };

        let removed = match mode {
            DeleteMode::Soft => {
                let now = now_bson();
                let result = self
                    .users
                    .update_one(filter, doc! {
                        "$set": { "status": UserStatus::Deleted.as_str(), "deletedAt": now, "updatedAt": now },
                    })
                    .await?;
                if result.matched_count > 0 {
                    self.identities
                        .update_many(owned.clone(), doc! {
                            "$set": { "status": IdentityStatus::Deleted.as_str(), "deletedAt": now, "updatedAt": now },
                            "$unset": { "credential": "" },
                        })
                        .await?;
                }
                result.matched_count > 0
            }
            DeleteMode::Hard => {
                let removed = self.users.delete_one(filter).await?.deleted_count > 0;
                if removed {
                    self.identities.delete_many(owned.clone()).await?;
                }
                removed
            }
        };

        if removed {
            self.sessions.delete_many(owned).await?;
        }
        Ok(removed)
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
        self.sessions.insert_one(&session).await?;
        Ok(session)
    }

    async fn find_session(&self, tenant_id: &str, auth_token: &str) -> Result<Option<Session>> {
        Ok(self
            .sessions
            .find_one(doc! {
                "tenantId": tenant_id,
                "authToken": auth_token,
                "expiresAt": { "$gt": now_bson() },
            })
            .await?)
    }

    async fn refresh_session(&self, tenant_id: &str, session_id: &str, ttl: Duration) -> Result<Session> {
        validate_ttl(ttl)?;
        let now = Utc::now();
        let extended = bson::DateTime::from_chrono(now + ttl);
        let now = bson::DateTime::from_chrono(now);

        // $max keeps the later of the stored and requested expiry.
        self.sessions
            .find_one_and_update(
                doc! { "_id": session_id, "tenantId": tenant_id, "expiresAt": { "$gt": now } },
                doc! {
                    "$max": { "expiresAt": extended },
                    "$set": { "refreshedAt": now, "updatedAt": now },
                },
            )
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| AuthError::not_found("Session", session_id))
    }

    async fn delete_session(&self, tenant_id: &str, session_id: &str) -> Result<bool> {
        let result = self
            .sessions
            .delete_one(doc! { "_id": session_id, "tenantId": tenant_id })
            .await?;
        Ok(result.deleted_count > 0)
    }
}

