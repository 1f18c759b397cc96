//! Provider Entity
//!
//! Static reference data describing an OAuth2 identity provider's endpoints.

use serde::{Deserialize, Serialize};

use crate::shared::error::{AuthError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: String,
    /// Browser redirect target, never called server-side
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    /// Clients for this provider must use a PKCE method other than `none`
    #[serde(default)]
    pub pkce_required: bool,
}

impl Provider {
    pub fn new(
        id: impl Into<String>,
        authorize_url: impl Into<String>,
        token_url: impl Into<String>,
        userinfo_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            authorize_url: authorize_url.into(),
            token_url: token_url.into(),
            userinfo_url: userinfo_url.into(),
            pkce_required: false,
        }
    }

    pub fn with_pkce_required(mut self, required: bool) -> Self {
        self.pkce_required = required;
        self
    }

    pub fn github() -> Self {
        Self::new(
            "github",
            "https://github.com/login/oauth/authorize",
            "https://github.com/login/oauth/access_token",
            "https://api.github.com/user",
        )
    }

    pub fn google() -> Self {
        Self::new(
            "google",
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
            "https://openidconnect.googleapis.com/v1/userinfo",
        )
        .with_pkce_required(true)
    }

    pub fn gitlab() -> Self {
        Self::new(
            "gitlab",
            "https://gitlab.com/oauth/authorize",
            "https://gitlab.com/oauth/token",
            "https://gitlab.com/oauth/userinfo",
        )
        .with_pkce_required(true)
    }

    /// Built-in provider by id.
    pub fn preset(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "github" => Some(Self::github()),
            "google" => Some(Self::google()),
            "gitlab" => Some(Self::gitlab()),
            _ => None,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("id", &self.id),
            ("authorize_url", &self.authorize_url),
            ("token_url", &self.token_url),
            ("userinfo_url", &self.userinfo_url),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::invalid_argument(format!("provider {} must not be empty", field)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(Provider::preset("GitHub").map(|p| p.id), Some("github".to_string()));
        assert!(Provider::preset("google").is_some_and(|p| p.pkce_required));
        assert!(Provider::preset("myspace").is_none());
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        let provider = Provider::new("acme", "https://acme/authorize", " ", "https://acme/userinfo");
        assert!(matches!(provider.validate(), Err(AuthError::InvalidArgument { .. })));
        assert!(Provider::github().validate().is_ok());
    }
}
