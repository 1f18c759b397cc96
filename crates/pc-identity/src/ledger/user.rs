//! User Entity
//!
//! One record per human. Identities and sessions point at it by id.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::props::Props;
use crate::TsidGenerator;

/// User lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Inactive,
    Deleted,
}

impl Default for UserStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Deleted => "DELETED",
        }
    }
}

/// How a record is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Mark DELETED and stamp `deleted_at`; the row stays.
    Soft,
    /// Remove the row.
    Hard,
}

/// Profile fields supplied when a user is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<UserStatus>,
    pub props: Option<Props>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,

    pub tenant_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default)]
    pub status: UserStatus,

    #[serde(default)]
    pub props: Props,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none", default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(tenant_id: impl Into<String>, profile: UserProfile) -> Self {
        let now = Utc::now();
        Self {
            id: TsidGenerator::generate(),
            tenant_id: tenant_id.into(),
            username: profile.username,
            nickname: profile.nickname,
            email: profile.email,
            phone: profile.phone,
            status: UserStatus::Active,
            props: Props::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Replace every mutable profile field.
    pub fn replace_profile(&mut self, profile: UserProfile) {
        self.username = profile.username;
        self.nickname = profile.nickname;
        self.email = profile.email;
        self.phone = profile.phone;
        self.updated_at = Utc::now();
    }

    pub fn apply_patch(&mut self, patch: UserPatch) {
        if let Some(username) = patch.username {
            self.username = Some(username);
        }
        if let Some(nickname) = patch.nickname {
            self.nickname = Some(nickname);
        }
        if let Some(email) = patch.email {
            self.email = Some(email);
        }
        if let Some(phone) = patch.phone {
            self.phone = Some(phone);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(props) = patch.props {
            self.props.extend(props);
        }
        self.updated_at = Utc::now();
    }

    pub fn mark_deleted(&mut self) {
        let now = Utc::now();
        self.status = UserStatus::Deleted;
        self.deleted_at = Some(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            username: Some("octocat".to_string()),
            nickname: Some("The Octocat".to_string()),
            email: Some("octo@example.com".to_string()),
            phone: None,
        }
    }

    #[test]
    fn test_new_user_is_active() {
        let user = User::new("t1", profile());
        assert!(user.is_active());
        assert!(TsidGenerator::is_valid(&user.id));
        assert!(user.deleted_at.is_none());
    }

    #[test]
    fn test_patch_only_touches_supplied_fields() {
        let mut user = User::new("t1", profile());
        user.apply_patch(UserPatch {
            phone: Some("+100".to_string()),
            ..Default::default()
        });

        assert_eq!(user.phone.as_deref(), Some("+100"));
        assert_eq!(user.username.as_deref(), Some("octocat"));
    }

    #[test]
    fn test_replace_clears_missing_fields() {
        let mut user = User::new("t1", profile());
        user.replace_profile(UserProfile {
            username: Some("renamed".to_string()),
            ..Default::default()
        });

        assert_eq!(user.username.as_deref(), Some("renamed"));
        assert!(user.email.is_none());
    }

    #[test]
    fn test_status_serializes_screaming() {
        let json = serde_json::to_string(&UserStatus::Inactive).unwrap();
        assert_eq!(json, "\"INACTIVE\"");
    }
}
