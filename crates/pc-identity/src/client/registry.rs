//! Client Registry
//!
//! Tenant-scoped lookup of registered OAuth2 clients. When no client id is
//! given, the first client registered for (tenant, provider) is returned; this
//! is a convenience for tenants with one client per provider and is not
//! deterministic across restarts of a persisted registry with several clients.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::client::entity::RegisteredClient;
use crate::provider::ProviderRegistry;
use crate::shared::error::{AuthError, Result};

#[async_trait]
pub trait ClientRegistry: Send + Sync {
    async fn get(
        &self,
        tenant_id: &str,
        provider_id: &str,
        client_id: Option<&str>,
    ) -> Result<RegisteredClient>;

    /// Insert or replace the (tenant, provider, client_id) record.
    async fn register(&self, client: RegisteredClient) -> Result<()>;

    /// Returns false when nothing matched.
    async fn remove(&self, tenant_id: &str, provider_id: &str, client_id: &str) -> Result<bool>;

    async fn list(&self, tenant_id: &str) -> Result<Vec<RegisteredClient>>;
}

pub(crate) fn require_non_empty(pairs: &[(&str, &str)]) -> Result<()> {
    for (field, value) in pairs {
        if value.trim().is_empty() {
            return Err(AuthError::invalid_argument(format!("{} must not be empty", field)));
        }
    }
    Ok(())
}

pub(crate) fn client_not_found(tenant_id: &str, provider_id: &str, client_id: Option<&str>) -> AuthError {
    AuthError::not_found(
        "RegisteredClient",
        format!("{}/{}/{}", tenant_id, provider_id, client_id.unwrap_or("*")),
    )
}

/// Registration-time validation shared by every registry backend.
pub(crate) fn validate_registration(providers: &ProviderRegistry, client: &RegisteredClient) -> Result<()> {
    let provider = providers.get(&client.provider_id).map_err(|_| {
        AuthError::invalid_argument(format!("unknown provider: {}", client.provider_id))
    })?;
    client.validate(&provider)
}

// ============================================================================
// In-memory Client Registry
// ============================================================================

pub struct MemoryClientRegistry {
    providers: Arc<ProviderRegistry>,
    /// Registration order is preserved for the "first client" fallback
    clients: RwLock<Vec<RegisteredClient>>,
}

impl MemoryClientRegistry {
    pub fn new(providers: Arc<ProviderRegistry>) -> Self {
        Self {
            providers,
            clients: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ClientRegistry for MemoryClientRegistry {
    async fn get(
        &self,
        tenant_id: &str,
        provider_id: &str,
        client_id: Option<&str>,
    ) -> Result<RegisteredClient> {
        let clients = self.clients.read();
        clients
            .iter()
            .filter(|c| c.matches(tenant_id, provider_id))
            .find(|c| client_id.map_or(true, |id| c.client_id == id))
            .cloned()
            .ok_or_else(|| client_not_found(tenant_id, provider_id, client_id))
    }

    async fn register(&self, client: RegisteredClient) -> Result<()> {
        validate_registration(&self.providers, &client)?;

        let mut clients = self.clients.write();
        let existing = clients.iter_mut().find(|c| {
            c.matches(&client.tenant_id, &client.provider_id) && c.client_id == client.client_id
        });

        match existing {
            Some(slot) => {
                warn!(
                    tenant_id = %client.tenant_id,
                    provider = %client.provider_id,
                    client_id = %client.client_id,
                    "OAuth2 client already registered, replaced"
                );
                // Keep the original position so fallback order is stable.
                *slot = client;
            }
            None => {
                info!(
                    tenant_id = %client.tenant_id,
                    provider = %client.provider_id,
                    client_id = %client.client_id,
                    "OAuth2 client registered"
                );
                clients.push(client);
            }
        }
        Ok(())
    }

    async fn remove(&self, tenant_id: &str, provider_id: &str, client_id: &str) -> Result<bool> {
        require_non_empty(&[
            ("tenant_id", tenant_id),
            ("provider_id", provider_id),
            ("client_id", client_id),
        ])?;

        let mut clients = self.clients.write();
        let before = clients.len();
        clients.retain(|c| !(c.matches(tenant_id, provider_id) && c.client_id == client_id));
        Ok(clients.len() < before)
    }

    async fn list(&self, tenant_id: &str) -> Result<Vec<RegisteredClient>> {
        Ok(self
            .clients
            .read()
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::pkce::PkceMethod;
    use crate::provider::Provider;

    fn registry() -> MemoryClientRegistry {
        let providers = ProviderRegistry::new();
        providers.register(Provider::github()).unwrap();
        providers.register(Provider::google()).unwrap();
        MemoryClientRegistry::new(Arc::new(providers))
    }

    fn client(tenant: &str, provider: &str, id: &str) -> RegisteredClient {
        RegisteredClient::new(tenant, provider, id, "https://app/cb").with_secret("secret")
    }

    #[tokio::test]
    async fn test_get_by_id_and_fallback() {
        let registry = registry();
        registry.register(client("t1", "github", "c1")).await.unwrap();
        registry.register(client("t1", "github", "c2")).await.unwrap();

        assert_eq!(registry.get("t1", "github", Some("c2")).await.unwrap().client_id, "c2");
        assert_eq!(registry.get("t1", "github", None).await.unwrap().client_id, "c1");
    }

    #[tokio::test]
    async fn test_lookup_is_tenant_scoped() {
        let registry = registry();
        registry.register(client("t1", "github", "c1")).await.unwrap();

        let result = registry.get("t2", "github", Some("c1")).await;
        assert!(matches!(result, Err(AuthError::NotFound { .. })));
        assert!(registry.get("t2", "github", None).await.is_err());
    }

    #[tokio::test]
    async fn test_register_replaces_in_place() {
        let registry = registry();
        registry.register(client("t1", "github", "c1")).await.unwrap();
        registry.register(client("t1", "github", "c2")).await.unwrap();
        registry
            .register(client("t1", "github", "c1").with_scope(["repo"]))
            .await
            .unwrap();

        let clients = registry.list("t1").await.unwrap();
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].client_id, "c1");
        assert_eq!(clients[0].scope, vec!["repo"]);
    }

    #[tokio::test]
    async fn test_register_rejects_invalid() {
        let registry = registry();

        let unknown_provider = client("t1", "myspace", "c1");
        assert!(matches!(
            registry.register(unknown_provider).await,
            Err(AuthError::InvalidArgument { .. })
        ));

        let blank_id = client("t1", "github", " ");
        assert!(registry.register(blank_id).await.is_err());

        let no_pkce = client("t1", "google", "c1").with_pkce_method(PkceMethod::None);
        assert!(registry.register(no_pkce).await.is_err());

        assert!(registry.list("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = registry();
        registry.register(client("t1", "github", "c1")).await.unwrap();

        assert!(matches!(
            registry.remove("t1", "", "c1").await,
            Err(AuthError::InvalidArgument { .. })
        ));
        assert!(!registry.remove("t2", "github", "c1").await.unwrap());
        assert!(registry.remove("t1", "github", "c1").await.unwrap());
        assert!(registry.get("t1", "github", None).await.is_err());
    }
}
