//! # Provisioning Core
//!
//! Attribute mapping, propagation and reconciliation between internal
//! identity entities and external resources.
//!
//! This crate provides:
//! - Internal attribute expression resolution (`groups[admins].office`,
//!   `memberships[staff].role`, `privileges[app]`, ...)
//! - Outbound and inbound attribute mapping with transformer chains,
//!   mandatory conditions and password handling
//! - A TTL cache for virtual attributes read from resources
//! - Propagation tasks, executed by priority tier through the connector
//!   gateways with a before-update read of the remote object
//! - Pull and push reconciliation with matching, unmatching and ambiguity
//!   rules, dry runs and structured reports
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐      ┌──────────────────┐      ┌─────────────────────┐
//! │ ReconciliationEngine│────►│  MappingEngine   │◄─────│ PropagationTask     │
//! │  (pull / push)      │     │ (resolver, cache)│      │ Builder             │
//! └─────────┬──────────┘      └──────────────────┘      └──────────┬──────────┘
//!           │                                                      │
//!           ▼                                                      ▼
//! ┌────────────────────┐                              ┌──────────────────────┐
//! │  WorkflowAdapter   │                              │ PriorityPropagation  │
//! │  (entity store)    │                              │ Executor             │
//! └────────────────────┘                              └──────────┬───────────┘
//!                                                                ▼
//!                                                     ┌──────────────────────┐
//!                                                     │ ConnectorRegistry /  │
//!                                                     │ ConnectorGateway     │
//!                                                     └──────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use idsync_provisioning::{ProvisioningService, PropagationByResource, ResourceOperation};
//! use idsync_provisioning::mapping::outbound::OutboundOptions;
//!
//! let service = ProvisioningService::builder(schemas, store).build()?;
//! service.register(resource, connector).await;
//!
//! let by_resource = PropagationByResource::new()
//!     .with(ResourceOperation::Create, "resource-ldap".into());
//! let statuses = service
//!     .provision(&user, &by_resource, &OutboundOptions::new().with_password(Some(password)))
//!     .await;
//! ```

pub mod accessor;
pub mod cache;
pub mod config;
pub mod error;
pub mod expression;
pub mod mapping;
pub mod propagation;
pub mod reconciliation;
pub mod remote;
pub mod resolver;
pub mod service;
pub mod workflow;

pub use cache::{VirAttrCache, VirAttrCacheKey};
pub use config::{ExpressionLimits, ProvisioningConfig};
pub use error::{ProvisioningError, Result};
pub use expression::{ExpressionContext, ExpressionEvaluator, RhaiExpressionEvaluator};
pub use mapping::outbound::OutboundOptions;
pub use mapping::{
    InboundTarget, MappingEngine, PasswordGenerator, PreparedAttributes, RandomPasswordGenerator,
};
pub use propagation::{
    ExecStatus, ExecutionOutcome, LinkedAccountPropagation, PriorityPropagationExecutor,
    PropagationByResource, PropagationPlan, PropagationStatus, PropagationTask, PropagationTaskBuilder,
    ResourceOperation,
};
pub use reconciliation::{
    AmbiguityPolicy, InMemorySyncTokenStore, MatchingRule, ProvisioningResult, PullOptions,
    PushFilter, PushOptions, ReconciliationEngine, ReconciliationReport, ReconciliationStatus,
    SyncTokenStore, UnmatchingRule,
};
pub use resolver::{AttrTarget, IntAttrNameResolver, InternalAttrReference, Qualifier};
pub use service::{ProvisioningService, ProvisioningServiceBuilder};
pub use workflow::{StoreWorkflowAdapter, WorkflowAdapter};
