//! In-memory entity store.
//!
//! Keeps entities in insertion order, which is the "store-defined order"
//! ambiguity resolution relies on. Suitable for embedding and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::ids::EntityKey;
use crate::kind::AnyTypeKind;
use crate::traits::EntityStore;

/// Entity store backed by a vector under an async lock.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    entities: RwLock<Vec<Entity>>,
    /// (role, application) -> privilege keys.
    privileges: RwLock<HashMap<(String, String), Vec<String>>>,
}

impl InMemoryEntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant privileges of an application to a role.
    pub async fn grant_privileges(&self, role: &str, application: &str, privileges: Vec<String>) {
        self.privileges
            .write()
            .await
            .insert((role.to_string(), application.to_string()), privileges);
    }

    /// Number of stored entities across all kinds.
    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn find(&self, kind: AnyTypeKind, key: EntityKey) -> CoreResult<Option<Entity>> {
        Ok(self
            .entities
            .read()
            .await
            .iter()
            .find(|e| e.kind == kind && e.key == key)
            .cloned())
    }

    async fn find_by_name(&self, kind: AnyTypeKind, name: &str) -> CoreResult<Option<Entity>> {
        Ok(self
            .entities
            .read()
            .await
            .iter()
            .find(|e| e.kind == kind && e.name == name)
            .cloned())
    }

    async fn find_by_plain_attr(
        &self,
        kind: AnyTypeKind,
        any_type: &str,
        schema: &str,
        value: &str,
    ) -> CoreResult<Vec<Entity>> {
        Ok(self
            .entities
            .read()
            .await
            .iter()
            .filter(|e| e.kind == kind && e.any_type == any_type)
            .filter(|e| {
                e.plain_attr(schema)
                    .is_some_and(|attr| attr.values_as_strings().iter().any(|v| v == value))
            })
            .cloned()
            .collect())
    }

    async fn list(
        &self,
        kind: AnyTypeKind,
        any_type: &str,
        offset: usize,
        limit: usize,
    ) -> CoreResult<Vec<Entity>> {
        Ok(self
            .entities
            .read()
            .await
            .iter()
            .filter(|e| e.kind == kind && e.any_type == any_type)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, kind: AnyTypeKind, any_type: &str) -> CoreResult<usize> {
        Ok(self
            .entities
            .read()
            .await
            .iter()
            .filter(|e| e.kind == kind && e.any_type == any_type)
            .count())
    }

    async fn save(&self, mut entity: Entity) -> CoreResult<Entity> {
        let mut entities = self.entities.write().await;

        if entities
            .iter()
            .any(|e| e.kind == entity.kind && e.name == entity.name && e.key != entity.key)
        {
            return Err(CoreError::AlreadyExists {
                kind: entity.kind,
                name: entity.name,
            });
        }

        match entities.iter_mut().find(|e| e.key == entity.key) {
            Some(existing) => {
                entity.last_change_date = Some(Utc::now());
                *existing = entity.clone();
            }
            None => entities.push(entity.clone()),
        }

        debug!(kind = %entity.kind, key = %entity.key, "Saved entity");
        Ok(entity)
    }

    async fn delete(&self, kind: AnyTypeKind, key: EntityKey) -> CoreResult<()> {
        let mut entities = self.entities.write().await;
        let before = entities.len();
        entities.retain(|e| !(e.kind == kind && e.key == key));
        if entities.len() == before {
            return Err(CoreError::not_found(kind, key));
        }
        Ok(())
    }

    async fn privileges(&self, roles: &[String], application: &str) -> CoreResult<Vec<String>> {
        let privileges = self.privileges.read().await;
        let mut result: Vec<String> = roles
            .iter()
            .filter_map(|role| privileges.get(&(role.clone(), application.to_string())))
            .flatten()
            .cloned()
            .collect();
        result.sort();
        result.dedup();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_find_delete() {
        let store = InMemoryEntityStore::new();
        let user = store.save(Entity::user("rossini")).await.unwrap();

        let found = store.find(AnyTypeKind::User, user.key).await.unwrap();
        assert_eq!(found.unwrap().name, "rossini");
        assert!(store
            .find(AnyTypeKind::Group, user.key)
            .await
            .unwrap()
            .is_none());

        store.delete(AnyTypeKind::User, user.key).await.unwrap();
        assert!(store.is_empty().await);
        assert!(store.delete(AnyTypeKind::User, user.key).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let store = InMemoryEntityStore::new();
        store.save(Entity::user("verdi")).await.unwrap();
        let err = store.save(Entity::user("verdi")).await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_find_by_plain_attr_keeps_insertion_order() {
        let store = InMemoryEntityStore::new();
        let first = store
            .save(Entity::user("first").with_plain("surname", vec!["Bianchi"]))
            .await
            .unwrap();
        let second = store
            .save(Entity::user("second").with_plain("surname", vec!["Bianchi"]))
            .await
            .unwrap();

        let found = store
            .find_by_plain_attr(AnyTypeKind::User, "USER", "surname", "Bianchi")
            .await
            .unwrap();
        assert_eq!(
            found.iter().map(|e| e.key).collect::<Vec<_>>(),
            vec![first.key, second.key]
        );
    }

    #[tokio::test]
    async fn test_privileges_deduplicated() {
        let store = InMemoryEntityStore::new();
        store
            .grant_privileges("User manager", "mightyApp", vec!["postMighty".into()])
            .await;
        store
            .grant_privileges("Other", "mightyApp", vec!["postMighty".into(), "getMighty".into()])
            .await;

        let privileges = store
            .privileges(&["User manager".into(), "Other".into()], "mightyApp")
            .await
            .unwrap();
        assert_eq!(privileges, vec!["getMighty".to_string(), "postMighty".to_string()]);
    }
}
