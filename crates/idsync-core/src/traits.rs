//! Store traits.
//!
//! Persistence is owned by the embedding platform; the provisioning core
//! only reads and writes through these seams.

use async_trait::async_trait;

use crate::entity::Entity;
use crate::error::CoreResult;
use crate::ids::EntityKey;
use crate::kind::AnyTypeKind;
use crate::schema::{DerSchema, PlainSchema, VirSchema};

/// Read-only lookup of schemas by key.
///
/// Lookups are synchronous: callers resolve against a catalog snapshot and
/// expect the same answer for the same key until the snapshot changes.
pub trait SchemaStore: Send + Sync {
    /// Find a plain schema.
    fn find_plain(&self, key: &str) -> Option<PlainSchema>;

    /// Find a derived schema.
    fn find_derived(&self, key: &str) -> Option<DerSchema>;

    /// Find a virtual schema.
    fn find_virtual(&self, key: &str) -> Option<VirSchema>;
}

/// Read/write access to users, groups and any objects.
///
/// Methods returning several entities return them in store-defined order;
/// reconciliation relies on that order when resolving ambiguous matches.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Find an entity by key.
    async fn find(&self, kind: AnyTypeKind, key: EntityKey) -> CoreResult<Option<Entity>>;

    /// Find an entity by username (users) or name (groups, any objects).
    async fn find_by_name(&self, kind: AnyTypeKind, name: &str) -> CoreResult<Option<Entity>>;

    /// Find entities of an any type holding `value` for a plain schema.
    async fn find_by_plain_attr(
        &self,
        kind: AnyTypeKind,
        any_type: &str,
        schema: &str,
        value: &str,
    ) -> CoreResult<Vec<Entity>>;

    /// List one page of entities of an any type.
    async fn list(
        &self,
        kind: AnyTypeKind,
        any_type: &str,
        offset: usize,
        limit: usize,
    ) -> CoreResult<Vec<Entity>>;

    /// Count entities of an any type.
    async fn count(&self, kind: AnyTypeKind, any_type: &str) -> CoreResult<usize>;

    /// Create or replace an entity.
    async fn save(&self, entity: Entity) -> CoreResult<Entity>;

    /// Delete an entity.
    async fn delete(&self, kind: AnyTypeKind, key: EntityKey) -> CoreResult<()>;

    /// Privilege keys granted by `roles` for an application.
    async fn privileges(&self, roles: &[String], application: &str) -> CoreResult<Vec<String>> {
        let _ = (roles, application);
        Ok(Vec::new())
    }
}
