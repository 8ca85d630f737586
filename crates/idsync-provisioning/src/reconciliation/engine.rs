//! Reconciliation engine.
//!
//! Shared state and helpers for pull (remote to internal) and push
//! (internal to remote). The rule handling lives in `pull` and `push`,
//! entity matching in `matcher`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use idsync_connector::{ConnectorGateway, ConnectorRegistry, ExternalResource, Provision, Uid};
use idsync_core::{AnyTypeKind, Entity, EntityStore, ResourceKey};

use super::rules::{AmbiguityPolicy, MatchingRule, UnmatchingRule};
use crate::cache::VirAttrCacheKey;
use crate::config::ProvisioningConfig;
use crate::error::{ProvisioningError, Result};
use crate::mapping::outbound::OutboundOptions;
use crate::mapping::{MappingEngine, OWNER_MARKER};
use crate::propagation::{
    PriorityPropagationExecutor, PropagationByResource, PropagationStatus, PropagationTaskBuilder,
};
use crate::workflow::WorkflowAdapter;

/// Message recorded on results of dry runs.
pub const DRY_RUN: &str = "dry run: no change applied";

/// Rules and switches for a pull run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullOptions {
    #[serde(default)]
    pub matching_rule: MatchingRule,
    #[serde(default)]
    pub unmatching_rule: UnmatchingRule,
    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,
    /// Decide and report, but change nothing.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_true")]
    pub perform_create: bool,
    #[serde(default = "default_true")]
    pub perform_update: bool,
    #[serde(default = "default_true")]
    pub perform_delete: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PullOptions {
    fn default() -> Self {
        Self {
            matching_rule: MatchingRule::default(),
            unmatching_rule: UnmatchingRule::default(),
            ambiguity: AmbiguityPolicy::default(),
            dry_run: false,
            perform_create: true,
            perform_update: true,
            perform_delete: true,
        }
    }
}

impl PullOptions {
    #[must_use]
    pub fn with_rules(mut self, matching: MatchingRule, unmatching: UnmatchingRule) -> Self {
        self.matching_rule = matching;
        self.unmatching_rule = unmatching;
        self
    }

    #[must_use]
    pub fn with_ambiguity(mut self, ambiguity: AmbiguityPolicy) -> Self {
        self.ambiguity = ambiguity;
        self
    }

    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Entities considered by a push run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushFilter {
    /// Only entities in this realm or below.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    /// Only entities already linked to the resource.
    #[serde(default)]
    pub linked_only: bool,
}

impl PushFilter {
    #[must_use]
    pub fn matches(&self, entity: &Entity, resource: &ResourceKey) -> bool {
        let in_realm = self.realm.as_deref().map_or(true, |realm| {
            entity.realm == realm
                || entity
                    .realm
                    .strip_prefix(realm)
                    .is_some_and(|rest| realm.ends_with('/') || rest.starts_with('/'))
        });
        in_realm && (!self.linked_only || entity.has_resource(resource))
    }
}

/// Rules and switches for a push run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushOptions {
    #[serde(default = "default_push_matching_rule")]
    pub matching_rule: MatchingRule,
    #[serde(default = "default_push_unmatching_rule")]
    pub unmatching_rule: UnmatchingRule,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_true")]
    pub perform_create: bool,
    #[serde(default = "default_true")]
    pub perform_update: bool,
    #[serde(default = "default_true")]
    pub perform_delete: bool,
    #[serde(default)]
    pub filter: PushFilter,
}

fn default_push_matching_rule() -> MatchingRule {
    MatchingRule::Link
}

fn default_push_unmatching_rule() -> UnmatchingRule {
    UnmatchingRule::Assign
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            matching_rule: default_push_matching_rule(),
            unmatching_rule: default_push_unmatching_rule(),
            dry_run: false,
            perform_create: true,
            perform_update: true,
            perform_delete: true,
            filter: PushFilter::default(),
        }
    }
}

impl PushOptions {
    #[must_use]
    pub fn with_rules(mut self, matching: MatchingRule, unmatching: UnmatchingRule) -> Self {
        self.matching_rule = matching;
        self.unmatching_rule = unmatching;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: PushFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Matches remote objects to entities and drives the resulting state
/// transitions.
pub struct ReconciliationEngine {
    pub(super) mapping: Arc<MappingEngine>,
    pub(super) registry: Arc<ConnectorRegistry>,
    pub(super) store: Arc<dyn EntityStore>,
    pub(super) workflow: Arc<dyn WorkflowAdapter>,
    builder: PropagationTaskBuilder,
    executor: PriorityPropagationExecutor,
    pub(super) config: ProvisioningConfig,
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    pub fn new(
        mapping: Arc<MappingEngine>,
        registry: Arc<ConnectorRegistry>,
        workflow: Arc<dyn WorkflowAdapter>,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            store: Arc::clone(mapping.store()),
            builder: PropagationTaskBuilder::new(Arc::clone(&mapping), Arc::clone(&registry)),
            executor: PriorityPropagationExecutor::new(Arc::clone(&registry)),
            mapping,
            registry,
            workflow,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// Gateway and provision for a resource and any type.
    pub(super) async fn target(
        &self,
        resource: &ResourceKey,
        any_type: &str,
    ) -> Result<(Arc<ConnectorGateway>, Provision)> {
        let gateway = self
            .registry
            .find(resource)
            .await
            .ok_or_else(|| ProvisioningError::ResourceNotFound {
                resource: resource.clone(),
            })?;
        let provision = gateway
            .resource()
            .provision(any_type)
            .cloned()
            .ok_or_else(|| ProvisioningError::ProvisionNotFound {
                resource: resource.clone(),
                any_type: any_type.to_string(),
            })?;
        Ok((gateway, provision))
    }

    /// Fail unless the provision maps a connector key.
    pub(super) fn require_connector_key(resource: &ExternalResource, provision: &Provision) -> Result<()> {
        if provision.mapping.conn_object_key_item().is_none() {
            return Err(ProvisioningError::MissingConnectorKey {
                resource: resource.key.clone(),
                any_type: provision.any_type.clone(),
            });
        }
        Ok(())
    }

    /// Build and run propagation tasks. In async mode statuses of tasks
    /// without priority are not awaited and do not appear in the result.
    pub(super) async fn propagate(
        &self,
        entity: &Entity,
        by_resource: &PropagationByResource,
        options: &OutboundOptions,
        excluded: &[ResourceKey],
    ) -> Vec<PropagationStatus> {
        let plan = self
            .builder
            .build(entity, by_resource, None, options, excluded)
            .await;
        let outcome = self.executor.execute(plan, self.config.async_propagation).await;
        if !outcome.is_complete() {
            debug!(pending = outcome.pending.len(), "Propagation continues in the background");
        }
        outcome.statuses
    }

    /// Cache virtual values read on pull, now that the entity has a key.
    pub(super) async fn cache_virtual_values(
        &self,
        entity: &Entity,
        values: BTreeMap<String, Vec<String>>,
    ) {
        for (schema, values) in values {
            self.mapping
                .cache()
                .put(VirAttrCacheKey::new(&entity.any_type, entity.key, schema), values)
                .await;
        }
    }

    /// Replace the owner marker written by inbound mapping with the owning
    /// user or group.
    ///
    /// The marker holds the owner's remote key on `resource`; it is matched
    /// through the resource's USER then GROUP provision, falling back to a
    /// lookup by name.
    pub(super) async fn resolve_owner(&self, resource: &ExternalResource, entity: &mut Entity) {
        let Some(marker) = entity.plain_attrs.remove(OWNER_MARKER) else {
            return;
        };
        let Some(owner_key) = marker.values_as_strings().into_iter().next() else {
            return;
        };
        if entity.kind != AnyTypeKind::Group {
            debug!(entity = %entity.key, "Ownership only applies to groups");
            return;
        }

        for kind in [AnyTypeKind::User, AnyTypeKind::Group] {
            let Some(provision) = resource.provision(kind.as_str()) else {
                continue;
            };
            match self
                .match_entities(resource, provision, &Uid::new(owner_key.clone()), None)
                .await
            {
                Ok(owners) => {
                    if let Some(owner) = owners.into_iter().find(|o| o.key != entity.key) {
                        set_owner(entity, &owner);
                        return;
                    }
                }
                Err(e) => debug!(error = %e, "Owner lookup through provision failed"),
            }
        }

        for kind in [AnyTypeKind::User, AnyTypeKind::Group] {
            if let Ok(Some(owner)) = self.store.find_by_name(kind, &owner_key).await {
                set_owner(entity, &owner);
                return;
            }
        }
        warn!(entity = %entity.key, owner = %owner_key, "Owner not found");
    }
}

fn set_owner(entity: &mut Entity, owner: &Entity) {
    match owner.kind {
        AnyTypeKind::User => {
            entity.user_owner = Some(owner.key);
            entity.group_owner = None;
        }
        AnyTypeKind::Group => {
            entity.group_owner = Some(owner.key);
            entity.user_owner = None;
        }
        AnyTypeKind::AnyObject => {}
    }
}
