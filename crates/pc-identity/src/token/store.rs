//! Token Store
//!
//! Append-only: stale tokens are never deleted here.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, Collection, Database};
use parking_lot::RwLock;

use crate::shared::error::Result;
use crate::shared::indexes::collections;
use crate::token::entity::{NewToken, OAuth2Token};

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save_token(&self, tenant_id: &str, token: NewToken) -> Result<OAuth2Token>;

    /// Most recently saved token for the (user, provider, client) triple.
    async fn latest_token(
        &self,
        tenant_id: &str,
        user_id: &str,
        provider: &str,
        client_id: &str,
    ) -> Result<Option<OAuth2Token>>;

    /// Newest first.
    async fn list_tokens(&self, tenant_id: &str, user_id: &str) -> Result<Vec<OAuth2Token>>;
}

// ============================================================================
// In-memory Token Store
// ============================================================================

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Arc<RwLock<Vec<OAuth2Token>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn save_token(&self, tenant_id: &str, token: NewToken) -> Result<OAuth2Token> {
        let token = OAuth2Token::new(tenant_id, token);
        self.tokens.write().push(token.clone());
        Ok(token)
    }

    async fn latest_token(
        &self,
        tenant_id: &str,
        user_id: &str,
        provider: &str,
        client_id: &str,
    ) -> Result<Option<OAuth2Token>> {
        // Insertion order is save order, so the last match is the newest.
        Ok(self
            .tokens
            .read()
            .iter()
            .rev()
            .find(|t| {
                t.tenant_id == tenant_id
                    && t.user_id == user_id
                    && t.provider == provider
                    && t.client_id == client_id
            })
            .cloned())
    }

    async fn list_tokens(&self, tenant_id: &str, user_id: &str) -> Result<Vec<OAuth2Token>> {
        Ok(self
            .tokens
            .read()
            .iter()
            .rev()
            .filter(|t| t.tenant_id == tenant_id && t.user_id == user_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// MongoDB Token Store
// ============================================================================

pub struct MongoTokenStore {
    collection: Collection<OAuth2Token>,
}

impl MongoTokenStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(collections::OAUTH2_TOKENS),
        }
    }
}

#[async_trait]
impl TokenStore for MongoTokenStore {
    async fn save_token(&self, tenant_id: &str, token: NewToken) -> Result<OAuth2Token> {
        let token = OAuth2Token::new(tenant_id, token);
        self.collection.insert_one(&token).await?;
        Ok(token)
    }

    async fn latest_token(
        &self,
        tenant_id: &str,
        user_id: &str,
        provider: &str,
        client_id: &str,
    ) -> Result<Option<OAuth2Token>> {
        Ok(self
            .collection
            .find_one(doc! {
                "tenantId": tenant_id,
                "userId": user_id,
                "provider": provider,
                "clientId": client_id,
            })
            .sort(doc! { "createdAt": -1, "_id": -1 })
            .await?)
    }

    async fn list_tokens(&self, tenant_id: &str, user_id: &str) -> Result<Vec<OAuth2Token>> {
        let cursor = self
            .collection
            .find(doc! { "tenantId": tenant_id, "userId": user_id })
            .sort(doc! { "createdAt": -1, "_id": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_token(user: &str, access: &str) -> NewToken {
        NewToken {
            user_id: user.to_string(),
            provider: "github".to_string(),
            client_id: "c1".to_string(),
            access_token: access.to_string(),
            refresh_token: Some(format!("{}-refresh", access)),
            token_type: Some("bearer".to_string()),
            scope: "read:user".to_string(),
            expires_in: Some(3600),
        }
    }

    #[tokio::test]
    async fn test_save_always_inserts() {
        let store = MemoryTokenStore::new();
        store.save_token("t1", new_token("u1", "first")).await.unwrap();
        store.save_token("t1", new_token("u1", "second")).await.unwrap();

        assert_eq!(store.len(), 2);
        let latest = store.latest_token("t1", "u1", "github", "c1").await.unwrap().unwrap();
        assert_eq!(latest.access_token, "second");
    }

    #[tokio::test]
    async fn test_tokens_are_tenant_scoped() {
        let store = MemoryTokenStore::new();
        store.save_token("t1", new_token("u1", "mine")).await.unwrap();

        assert!(store.latest_token("t2", "u1", "github", "c1").await.unwrap().is_none());
        assert!(store.list_tokens("t2", "u1").await.unwrap().is_empty());

        let listed = store.list_tokens("t1", "u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].refresh_token.as_deref(), Some("mine-refresh"));
    }
}
