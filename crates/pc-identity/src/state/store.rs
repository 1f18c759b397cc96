//! Login State Store
//!
//! `consume` is a single atomic read-and-delete: of any number of concurrent
//! callers presenting the same token, exactly one receives the state and the
//! rest get `NotFound`. An expired state is removed and reported as `Expired`,
//! never returned as valid.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mongodb::{bson::doc, Collection, Database};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::shared::crypto::generate_token;
use crate::shared::error::{is_duplicate_key, AuthError, Result};
use crate::shared::indexes::collections;
use crate::state::entity::{AuthState, NewAuthState};

/// Attempts at finding an unused token before giving up.
const MAX_ISSUE_ATTEMPTS: usize = 3;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist a new state and return it as stored, token included.
    async fn issue(&self, state: NewAuthState, ttl: Duration) -> Result<AuthState>;

    /// Remove and return the state for `token`.
    async fn consume(&self, token: &str) -> Result<AuthState>;

    /// Delete all expired states, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}

fn check_ttl(ttl: Duration) -> Result<()> {
    if ttl <= Duration::zero() {
        return Err(AuthError::invalid_argument("state ttl must be positive"));
    }
    Ok(())
}

fn unexpired(state: AuthState) -> Result<AuthState> {
    if state.is_expired() {
        debug!(tenant_id = %state.tenant_id, provider = %state.provider_id, "Rejected expired login state");
        return Err(AuthError::Expired);
    }
    Ok(state)
}

// ============================================================================
// In-memory State Store
// ============================================================================

#[derive(Default)]
pub struct MemoryStateStore {
    states: Arc<RwLock<HashMap<String, AuthState>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    pub fn peek(&self, token: &str) -> Option<AuthState> {
        self.states.read().get(token).cloned()
    }

    /// Insert a fully built state as-is (test fixtures with past expiry).
    pub fn insert_raw(&self, state: AuthState) {
        self.states.write().insert(state.state.clone(), state);
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn issue(&self, state: NewAuthState, ttl: Duration) -> Result<AuthState> {
        check_ttl(ttl)?;

        let mut states = self.states.write();
        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let token = generate_token();
            if states.contains_key(&token) {
                continue;
            }
            let issued = state.into_state(token.clone(), ttl);
            states.insert(token, issued.clone());
            return Ok(issued);
        }
        Err(AuthError::internal("could not allocate a unique state token"))
    }

    async fn consume(&self, token: &str) -> Result<AuthState> {
        let removed = self.states.write().remove(token);
        match removed {
            Some(state) => unexpired(state),
            None => Err(AuthError::not_found("AuthState", "<redacted>")),
        }
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut states = self.states.write();
        let before = states.len();
        states.retain(|_, state| !state.is_expired_at(now));
        Ok((before - states.len()) as u64)
    }
}

// ============================================================================
// MongoDB State Store
// ============================================================================

pub struct MongoStateStore {
    collection: Collection<AuthState>,
}

impl MongoStateStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(collections::OAUTH2_STATES),
        }
    }
}

#[async_trait]
impl StateStore for MongoStateStore {
    async fn issue(&self, state: NewAuthState, ttl: Duration) -> Result<AuthState> {
        check_ttl(ttl)?;

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let token = generate_token();
            let record = state.clone().into_state(token, ttl);
            match self.collection.insert_one(&record).await {
                Ok(_) => return Ok(record),
                Err(e) if is_duplicate_key(&e) => {
                    warn!(attempt, "State token collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(AuthError::internal("could not allocate a unique state token"))
    }

    async fn consume(&self, token: &str) -> Result<AuthState> {
        match self.collection.find_one_and_delete(doc! { "_id": token }).await? {
            Some(state) => unexpired(state),
            None => Err(AuthError::not_found("AuthState", "<redacted>")),
        }
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = mongodb::bson::DateTime::from_chrono(Utc::now());
        let result = self
            .collection
            .delete_many(doc! { "expiresAt": { "$lte": now } })
            .await?;
        Ok(result.deleted_count)
    }
}
