//! OAuth2 Token Entity
//!
//! Tokens obtained from a provider. Every exchange inserts a new record; a
//! refreshed token supersedes older ones rather than updating them.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::props::Props;
use crate::TsidGenerator;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2Token {
    #[serde(rename = "_id")]
    pub id: String,

    pub tenant_id: String,

    pub user_id: String,

    pub provider: String,

    pub client_id: String,

    pub access_token: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default)]
    pub scope: String,

    #[serde(skip_serializing_if = "Option::is_none", default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub props: Props,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// Token fields known after an exchange.
#[derive(Debug, Clone)]
pub struct NewToken {
    pub user_id: String,
    pub provider: String,
    pub client_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: String,
    /// Lifetime reported by the provider (`expires_in`)
    pub expires_in: Option<i64>,
}

impl OAuth2Token {
    pub fn new(tenant_id: impl Into<String>, token: NewToken) -> Self {
        let now = Utc::now();
        Self {
            id: TsidGenerator::generate(),
            tenant_id: tenant_id.into(),
            user_id: token.user_id,
            provider: token.provider,
            client_id: token.client_id,
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            token_type: token.token_type,
            scope: token.scope,
            expires_at: token
                .expires_in
                .filter(|secs| *secs > 0)
                .and_then(Duration::try_seconds)
                .and_then(|lifetime| now.checked_add_signed(lifetime)),
            props: Props::new(),
            created_at: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}
