//! Entity lifecycle transitions.
//!
//! Reconciliation never writes entities directly; every create, update,
//! delete and resource (un)link goes through a [`WorkflowAdapter`] so an
//! approval layer can be put in between.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use idsync_core::{AnyTypeKind, Entity, EntityKey, EntityStore, ResourceKey};

use crate::error::Result;

/// Applies lifecycle transitions to entities.
#[async_trait]
pub trait WorkflowAdapter: Send + Sync {
    async fn create(&self, entity: Entity) -> Result<Entity>;

    async fn update(&self, entity: Entity) -> Result<Entity>;

    async fn delete(&self, kind: AnyTypeKind, key: EntityKey) -> Result<()>;

    /// Add a resource link.
    async fn link(&self, entity: Entity, resource: &ResourceKey) -> Result<Entity>;

    /// Drop a resource link.
    async fn unlink(&self, entity: Entity, resource: &ResourceKey) -> Result<Entity>;
}

/// Workflow that writes straight to the entity store.
#[derive(Clone)]
pub struct StoreWorkflowAdapter {
    store: Arc<dyn EntityStore>,
}

impl StoreWorkflowAdapter {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for StoreWorkflowAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreWorkflowAdapter").finish_non_exhaustive()
    }
}

#[async_trait]
impl WorkflowAdapter for StoreWorkflowAdapter {
    #[instrument(skip_all, fields(entity = %entity.key, name = %entity.name))]
    async fn create(&self, entity: Entity) -> Result<Entity> {
        Ok(self.store.save(entity).await?)
    }

    #[instrument(skip_all, fields(entity = %entity.key))]
    async fn update(&self, entity: Entity) -> Result<Entity> {
        Ok(self.store.save(entity).await?)
    }

    #[instrument(skip(self))]
    async fn delete(&self, kind: AnyTypeKind, key: EntityKey) -> Result<()> {
        Ok(self.store.delete(kind, key).await?)
    }

    async fn link(&self, mut entity: Entity, resource: &ResourceKey) -> Result<Entity> {
        if !entity.resources.insert(resource.clone()) {
            debug!(entity = %entity.key, resource = %resource, "Already linked");
            return Ok(entity);
        }
        Ok(self.store.save(entity).await?)
    }

    async fn unlink(&self, mut entity: Entity, resource: &ResourceKey) -> Result<Entity> {
        if !entity.resources.remove(resource) {
            debug!(entity = %entity.key, resource = %resource, "Not linked");
            return Ok(entity);
        }
        Ok(self.store.save(entity).await?)
    }
}
