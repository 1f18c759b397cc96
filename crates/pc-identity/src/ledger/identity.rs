//! Identity Entity
//!
//! A single authentication method bound to a user: an external provider
//! account (`OAUTH_<PROVIDER>`) or a local email/password credential (`EMAIL`).

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::user::UserProfile;
use crate::shared::props::Props;
use crate::TsidGenerator;

/// Provider type of local email/password identities.
pub const EMAIL_PROVIDER_TYPE: &str = "EMAIL";

/// Provider type for an OAuth2 provider id, e.g. `github` -> `OAUTH_GITHUB`.
pub fn oauth_provider_type(provider_id: &str) -> String {
    format!("OAUTH_{}", provider_id.trim().to_ascii_uppercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityStatus {
    Active,
    Inactive,
    Deleted,
}

impl Default for IdentityStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl IdentityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Deleted => "DELETED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(rename = "_id")]
    pub id: String,

    pub tenant_id: String,

    pub user_id: String,

    pub provider_type: String,

    /// Subject at the provider, or the normalized email for `EMAIL`
    pub provider_uid: String,

    /// Password hash, local identities only
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub credential: Option<String>,

    #[serde(default)]
    pub status: IdentityStatus,

    #[serde(skip_serializing_if = "Option::is_none", default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub last_signin_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub props: Props,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none", default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }

    /// Record a successful sign-in. Reactivates the identity and, when the
    /// provider sent any attributes, replaces the stored ones.
    pub fn touch_signin(&mut self, props: &Props) {
        let now = Utc::now();
        self.status = IdentityStatus::Active;
        self.last_signin_at = Some(now);
        self.deleted_at = None;
        if !props.is_empty() {
            self.props = props.clone();
        }
        self.updated_at = now;
    }

    pub fn set_status(&mut self, status: IdentityStatus) {
        if status == IdentityStatus::Deleted {
            self.mark_deleted();
            return;
        }
        self.status = status;
        self.deleted_at = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_deleted(&mut self) {
        let now = Utc::now();
        self.status = IdentityStatus::Deleted;
        self.deleted_at = Some(now);
        self.credential = None;
        self.updated_at = now;
    }
}

/// What a login knows about an identity before it is resolved.
#[derive(Debug, Clone, Default)]
pub struct IdentityClaim {
    pub provider_type: String,
    pub provider_uid: String,
    /// Link to this user instead of creating one
    pub user_id: Option<String>,
    pub credential: Option<String>,
    pub props: Props,
    /// Used when a new user has to be created
    pub profile: UserProfile,
}

impl IdentityClaim {
    pub fn new(provider_type: impl Into<String>, provider_uid: impl Into<String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            provider_uid: provider_uid.into(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Build the identity row for `user_id`, signed in now.
    pub fn into_identity(self, tenant_id: impl Into<String>, user_id: impl Into<String>) -> Identity {
        let now = Utc::now();
        Identity {
            id: TsidGenerator::generate(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            provider_type: self.provider_type,
            provider_uid: self.provider_uid,
            credential: self.credential,
            status: IdentityStatus::Active,
            last_signin_at: Some(now),
            props: self.props,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}
