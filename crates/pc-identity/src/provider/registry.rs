//! Provider Registry
//!
//! Read-mostly map of provider id to endpoints. Populated at startup; a second
//! registration for the same id replaces the first (with a warning) so
//! configuration can override the built-in presets.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::provider::entity::Provider;
use crate::shared::error::{AuthError, Result};

#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a provider.
    pub fn register(&self, provider: Provider) -> Result<()> {
        provider.validate()?;

        let mut providers = self.providers.write();
        if providers.contains_key(&provider.id) {
            warn!(provider = %provider.id, "OAuth2 provider already registered, replaced by new definition");
        } else {
            debug!(provider = %provider.id, "OAuth2 provider registered");
        }
        providers.insert(provider.id.clone(), provider);
        Ok(())
    }

    pub fn get(&self, provider_id: &str) -> Result<Provider> {
        self.providers
            .read()
            .get(provider_id)
            .cloned()
            .ok_or_else(|| AuthError::not_found("Provider", provider_id))
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.providers.read().contains_key(provider_id)
    }

    /// All providers, sorted by id.
    pub fn list(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.providers.read().values().cloned().collect();
        providers.sort_by(|a, b| a.id.cmp(&b.id));
        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_unknown_is_not_found() {
        let registry = ProviderRegistry::new();
        assert!(matches!(registry.get("github"), Err(AuthError::NotFound { .. })));
    }

    #[test]
    fn test_last_writer_wins() {
        let registry = ProviderRegistry::new();
        registry.register(Provider::github()).unwrap();
        registry
            .register(Provider::new(
                "github",
                "https://ghe.example.com/login/oauth/authorize",
                "https://ghe.example.com/login/oauth/access_token",
                "https://ghe.example.com/api/v3/user",
            ))
            .unwrap();

        let provider = registry.get("github").unwrap();
        assert_eq!(provider.authorize_url, "https://ghe.example.com/login/oauth/authorize");
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_register_rejects_empty_id() {
        let registry = ProviderRegistry::new();
        let result = registry.register(Provider::new("", "a", "b", "c"));
        assert!(matches!(result, Err(AuthError::InvalidArgument { .. })));
        assert!(registry.list().is_empty());
    }
}
