//! Per-provision sync token persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use idsync_connector::SyncToken;
use idsync_core::ResourceKey;

/// Stores the last processed sync token of each (resource, any type).
#[async_trait]
pub trait SyncTokenStore: Send + Sync {
    async fn get(&self, resource: &ResourceKey, any_type: &str) -> Option<SyncToken>;

    async fn put(&self, resource: &ResourceKey, any_type: &str, token: SyncToken);

    /// Forget the token so the next pull starts over.
    async fn clear(&self, resource: &ResourceKey, any_type: &str);
}

/// Process-local token store.
#[derive(Debug, Default)]
pub struct InMemorySyncTokenStore {
    tokens: RwLock<HashMap<(ResourceKey, String), SyncToken>>,
}

impl InMemorySyncTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncTokenStore for InMemorySyncTokenStore {
    async fn get(&self, resource: &ResourceKey, any_type: &str) -> Option<SyncToken> {
        self.tokens
            .read()
            .await
            .get(&(resource.clone(), any_type.to_string()))
            .cloned()
    }

    async fn put(&self, resource: &ResourceKey, any_type: &str, token: SyncToken) {
        self.tokens
            .write()
            .await
            .insert((resource.clone(), any_type.to_string()), token);
    }

    async fn clear(&self, resource: &ResourceKey, any_type: &str) {
        self.tokens
            .write()
            .await
            .remove(&(resource.clone(), any_type.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokens_per_any_type() {
        let store = InMemorySyncTokenStore::new();
        let resource = ResourceKey::from("resource-ldap");

        store.put(&resource, "USER", SyncToken::new(42)).await;
        assert_eq!(store.get(&resource, "USER").await, Some(SyncToken::new(42)));
        assert_eq!(store.get(&resource, "GROUP").await, None);

        store.clear(&resource, "USER").await;
        assert_eq!(store.get(&resource, "USER").await, None);
    }
}
