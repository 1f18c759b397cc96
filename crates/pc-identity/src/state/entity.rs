//! Login State Entity
//!
//! Binds a random state token to the login it was issued for. The state token
//! doubles as the MongoDB `_id`. Created once, consumed once, never updated.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::pkce::PkceMethod;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    /// Anti-forgery token round-tripped through the provider
    #[serde(rename = "_id")]
    pub state: String,

    pub tenant_id: String,

    pub provider_id: String,

    pub client_id: String,

    /// Kept server-side; only the challenge goes to the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pkce_verifier: Option<String>,

    pub pkce_method: PkceMethod,

    /// Normalized scope sent on the authorize request
    #[serde(default)]
    pub scope: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
}

/// Everything but the token and timestamps, supplied when issuing a state.
#[derive(Debug, Clone)]
pub struct NewAuthState {
    pub tenant_id: String,
    pub provider_id: String,
    pub client_id: String,
    pub pkce_verifier: Option<String>,
    pub pkce_method: PkceMethod,
    pub scope: String,
    pub return_url: Option<String>,
}

impl NewAuthState {
    pub fn new(
        tenant_id: impl Into<String>,
        provider_id: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            provider_id: provider_id.into(),
            client_id: client_id.into(),
            pkce_verifier: None,
            pkce_method: PkceMethod::None,
            scope: String::new(),
            return_url: None,
        }
    }

    pub fn with_pkce(mut self, method: PkceMethod, verifier: Option<String>) -> Self {
        self.pkce_method = method;
        self.pkce_verifier = verifier;
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_return_url(mut self, return_url: Option<String>) -> Self {
        self.return_url = return_url;
        self
    }

    pub fn into_state(self, state: String, ttl: Duration) -> AuthState {
        // Millisecond precision, as stored
        let now = Utc::now().trunc_subsecs(3);
        AuthState {
            state,
            tenant_id: self.tenant_id,
            provider_id: self.provider_id,
            client_id: self.client_id,
            pkce_verifier: self.pkce_verifier,
            pkce_method: self.pkce_method,
            scope: self.scope,
            return_url: self.return_url,
            created_at: now,
            expires_at: now + ttl,
        }
    }
}

impl AuthState {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
