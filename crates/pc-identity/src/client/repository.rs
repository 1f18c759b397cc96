//! MongoDB-backed Client Registry

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, Collection, Database};
use tracing::{info, warn};

use crate::client::entity::RegisteredClient;
use crate::client::registry::{client_not_found, require_non_empty, validate_registration, ClientRegistry};
use crate::provider::ProviderRegistry;
use crate::shared::error::Result;
use crate::shared::indexes::collections;

pub struct MongoClientRegistry {
    providers: Arc<ProviderRegistry>,
    collection: Collection<RegisteredClient>,
}

impl MongoClientRegistry {
    pub fn new(db: &Database, providers: Arc<ProviderRegistry>) -> Self {
        Self {
            providers,
            collection: db.collection(collections::OAUTH2_CLIENTS),
        }
    }
}

#[async_trait]
impl ClientRegistry for MongoClientRegistry {
    async fn get(
        &self,
        tenant_id: &str,
        provider_id: &str,
        client_id: Option<&str>,
    ) -> Result<RegisteredClient> {
        let mut filter = doc! { "tenantId": tenant_id, "providerId": provider_id };
        if let Some(client_id) = client_id {
            filter.insert("clientId", client_id);
        }

        self.collection
            .find_one(filter)
            .sort(doc! { "createdAt": 1, "_id": 1 })
            .await?
            .ok_or_else(|| client_not_found(tenant_id, provider_id, client_id))
    }

    async fn register(&self, client: RegisteredClient) -> Result<()> {
        validate_registration(&self.providers, &client)?;

        let filter = doc! {
            "tenantId": &client.tenant_id,
            "providerId": &client.provider_id,
            "clientId": &client.client_id,
        };

        match self.collection.find_one(filter.clone()).await? {
            Some(existing) => {
                warn!(
                    tenant_id = %client.tenant_id,
                    provider = %client.provider_id,
                    client_id = %client.client_id,
                    "OAuth2 client already registered, replaced"
                );
                let replacement = RegisteredClient {
                    id: existing.id,
                    created_at: existing.created_at,
                    ..client
                };
                self.collection.replace_one(filter, &replacement).await?;
            }
            None => {
                info!(
                    tenant_id = %client.tenant_id,
                    provider = %client.provider_id,
                    client_id = %client.client_id,
                    "OAuth2 client registered"
                );
                self.collection.insert_one(&client).await?;
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

        let result = self
            .collection
            .delete_one(doc! {
                "tenantId": tenant_id,
                "providerId": provider_id,
                "clientId": client_id,
            })
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn list(&self, tenant_id: &str) -> Result<Vec<RegisteredClient>> {
        let cursor = self
            .collection
            .find(doc! { "tenantId": tenant_id })
            .sort(doc! { "createdAt": 1, "_id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }
}
