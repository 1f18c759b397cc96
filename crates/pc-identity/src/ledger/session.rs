//! Session Entity

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::crypto::generate_token;
use crate::shared::props::Props;
use crate::TsidGenerator;

/// Request details captured when a session is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(rename = "_id")]
    pub id: String,

    pub tenant_id: String,

    pub user_id: String,

    pub identity_id: String,

    /// Bearer value handed to the client
    pub auth_token: String,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none", default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub refreshed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    #[serde(default)]
    pub props: Props,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        identity_id: impl Into<String>,
        ttl: Duration,
        context: SessionContext,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TsidGenerator::generate(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            identity_id: identity_id.into(),
            auth_token: generate_token(),
            expires_at: now + ttl,
            refreshed_at: None,
            user_agent: context.user_agent,
            ip_address: context.ip_address,
            props: Props::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Extend to `now + ttl`. Never moves `expires_at` backwards.
    pub fn refresh(&mut self, ttl: Duration) {
        let now = Utc::now();
        self.expires_at = self.expires_at.max(now + ttl);
        self.refreshed_at = Some(now);
        self.updated_at = now;
    }

    /// Seconds until expiry, zero once expired.
    pub fn remaining_secs(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}
