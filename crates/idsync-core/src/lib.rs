//! idsync Core Library
//!
//! Identity records, schemas and the store seams shared by the connector
//! and provisioning crates.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (EntityKey, ResourceKey)
//! - [`kind`] - Entity kinds (USER, GROUP, ANY_OBJECT)
//! - [`entity`] - Users, groups, any objects and their attributes
//! - [`schema`] - Plain, derived and virtual schemas
//! - [`traits`] - Store seams (EntityStore, SchemaStore)
//! - [`memory`] - In-memory entity store
//! - [`error`] - Store error type (CoreError)
//!
//! # Example
//!
//! ```
//! use idsync_core::{AnyTypeKind, Entity, ResourceKey};
//!
//! let user = Entity::user("rossini")
//!     .with_unique("email", "rossini@example.com")
//!     .with_resource("resource-ldap");
//!
//! assert_eq!(user.kind, AnyTypeKind::User);
//! assert!(user.has_resource(&ResourceKey::from("resource-ldap")));
//! ```

pub mod entity;
pub mod error;
pub mod ids;
pub mod kind;
pub mod memory;
pub mod schema;
pub mod traits;

pub use entity::{
    Entity, LinkedAccount, Membership, PlainAttr, PlainValue, Relationship, GROUP_TYPE, USER_TYPE,
};
pub use error::{CoreError, CoreResult};
pub use ids::{EntityKey, ParseIdError, ResourceKey};
pub use kind::{AnyTypeKind, ParseAnyTypeKindError};
pub use memory::InMemoryEntityStore;
pub use schema::{AttrSchemaType, DerSchema, PlainSchema, SchemaCatalog, SchemaType, VirSchema};
pub use traits::{EntityStore, SchemaStore};
