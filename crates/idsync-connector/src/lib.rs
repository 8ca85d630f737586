//! # Connector Framework
//!
//! Connector abstractions and provisioning configuration for keeping
//! internal identities synchronized with external resources (directories,
//! databases, SaaS systems).
//!
//! ## Architecture
//!
//! - [`Connector`] - One trait per target system, inspired by `ConnId`;
//!   operations default to unsupported
//! - [`ConnectorGateway`] - Capability-gated, timeout-bounded access to one
//!   resource on a shared worker pool
//! - [`ConnectorRegistry`] - Gateways keyed by resource
//! - [`ExternalResource`], [`Provision`], [`Mapping`], [`Item`] - What to
//!   provision and how attributes translate
//!
//! ## Example
//!
//! ```ignore
//! use idsync_connector::prelude::*;
//!
//! let registry = ConnectorRegistry::new(GatewaySettings::default());
//! let resource = ExternalResource::new("resource-ldap", full_capabilities());
//! let gateway = registry.register(resource, Arc::new(ldap_connector)).await;
//!
//! let uid = gateway
//!     .create(&ObjectClass::account(), AttributeSet::new().with("uid", "rossini"))
//!     .await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`error`] - Error types with transient/permanent classification
//! - [`capability`] - Capabilities a resource may declare
//! - [`traits`] - The connector trait
//! - [`operation`] - Operation types (Uid, `AttributeSet`, Filter, `SyncDelta`)
//! - [`schema`] - Remote schema description
//! - [`mapping`] - Resources, provisions, mappings and transformers
//! - [`transform`] - Transformer chain engine
//! - [`crypto`] - Stored-secret encryption
//! - [`config`] - Gateway settings
//! - [`gateway`] - Async connector gateway
//! - [`registry`] - Gateway registry

pub mod capability;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod mapping;
pub mod operation;
pub mod registry;
pub mod schema;
pub mod traits;
pub mod transform;

pub use capability::{full_capabilities, Capabilities, ConnectorCapability};
pub use config::GatewaySettings;
pub use crypto::SecretCipher;
pub use error::{ConnectorError, ConnectorResult};
pub use gateway::ConnectorGateway;
pub use mapping::{
    CorrelationRule, ExternalResource, Item, ItemTransformer, Mapping, MappingDirection,
    Provision, Transform,
};
pub use operation::{
    AttributeSet, AttributeValue, ConnectorObject, Filter, ObjectClass, PageRequest,
    SearchResult, SyncDelta, SyncDeltaType, SyncResult, SyncToken, Uid,
};
pub use registry::ConnectorRegistry;
pub use traits::Connector;
pub use transform::TransformEngine;

/// Prelude module for convenient imports.
///
/// ```
/// use idsync_connector::prelude::*;
/// ```
pub mod prelude {
    pub use crate::capability::{full_capabilities, Capabilities, ConnectorCapability};
    pub use crate::config::GatewaySettings;
    pub use crate::crypto::SecretCipher;
    pub use crate::error::{ConnectorError, ConnectorResult};
    pub use crate::gateway::ConnectorGateway;
    pub use crate::mapping::{
        CorrelationRule, ExternalResource, Item, ItemTransformer, Mapping, MappingDirection,
        Provision, Transform,
    };
    pub use crate::operation::{
        AttributeSet, AttributeValue, ConnectorObject, Filter, ObjectClass, PageRequest,
        SearchResult, SyncDelta, SyncDeltaType, SyncResult, SyncToken, Uid,
    };
    pub use crate::registry::ConnectorRegistry;
    pub use crate::schema::{AttributeInfo, ObjectClassInfo, Schema};
    pub use crate::traits::Connector;
    pub use crate::transform::TransformEngine;
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;
