//! Registered OAuth2 Client Entity
//!
//! A tenant's credentials for one provider. Always looked up by
//! (tenant, provider, client_id); a record never leaks across tenants.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::pkce::PkceMethod;
use crate::flow::scope::normalize_scope_list;
use crate::provider::Provider;
use crate::shared::error::{AuthError, Result};
use crate::TsidGenerator;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredClient {
    #[serde(rename = "_id")]
    pub id: String,

    pub tenant_id: String,

    pub provider_id: String,

    pub client_id: String,

    /// Absent for public clients that authenticate with PKCE only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Allowed scope, normalized (sorted, unique)
    #[serde(default)]
    pub scope: Vec<String>,

    pub redirect_uri: String,

    pub pkce_method: PkceMethod,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl RegisteredClient {
    pub fn new(
        tenant_id: impl Into<String>,
        provider_id: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            id: TsidGenerator::generate(),
            tenant_id: tenant_id.into(),
            provider_id: provider_id.into(),
            client_id: client_id.into(),
            client_secret: None,
            scope: Vec::new(),
            redirect_uri: redirect_uri.into(),
            pkce_method: PkceMethod::S256,
            created_at: Utc::now(),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.client_secret = if secret.is_empty() { None } else { Some(secret) };
        self
    }

    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = normalize_scope_list(scope.into_iter().map(Into::into).collect::<Vec<String>>());
        self
    }

    pub fn with_pkce_method(mut self, method: PkceMethod) -> Self {
        self.pkce_method = method;
        self
    }

    pub fn matches(&self, tenant_id: &str, provider_id: &str) -> bool {
        self.tenant_id == tenant_id && self.provider_id == provider_id
    }

    /// Registration checks: required fields present, and the PKCE method allowed
    /// by the provider.
    pub fn validate(&self, provider: &Provider) -> Result<()> {
        for (field, value) in [
            ("tenant_id", &self.tenant_id),
            ("provider_id", &self.provider_id),
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::invalid_argument(format!("client {} must not be empty", field)));
            }
        }

        if self.provider_id != provider.id {
            return Err(AuthError::invalid_argument(format!(
                "client provider {} does not match {}",
                self.provider_id, provider.id
            )));
        }

        // Without PKCE the secret is the only proof of possession.
        if self.pkce_method == PkceMethod::None && self.client_secret.is_none() {
            return Err(AuthError::invalid_argument(
                "client_secret must not be empty when pkce_method is none",
            ));
        }

        if self.pkce_method == PkceMethod::None && provider.pkce_required {
            return Err(AuthError::invalid_argument(format!(
                "provider {} requires PKCE",
                provider.id
            )));
        }

        Ok(())
    }
}
