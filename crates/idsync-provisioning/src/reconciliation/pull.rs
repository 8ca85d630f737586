//! Pull: remote changes into internal state.

use tracing::{error, info, instrument, warn};

use idsync_connector::{ConnectorObject, ExternalResource, PageRequest, Provision, SyncDelta};
use idsync_core::{AnyTypeKind, Entity, ResourceKey};

use super::engine::{PullOptions, ReconciliationEngine, DRY_RUN};
use super::report::ReconciliationReport;
use super::result::ProvisioningResult;
use super::rules::{MatchingRule, UnmatchingRule};
use super::token::SyncTokenStore;
use crate::error::{ProvisioningError, Result};
use crate::mapping::outbound::OutboundOptions;
use crate::mapping::InboundTarget;
use crate::propagation::{PropagationByResource, ResourceOperation};

impl ReconciliationEngine {
    /// Reconcile one delta from `resource` for `any_type`.
    ///
    /// Never fails: errors are reported as a FAILURE result.
    pub async fn reconcile(
        &self,
        resource: &ResourceKey,
        any_type: &str,
        delta: &SyncDelta,
        options: &PullOptions,
    ) -> ProvisioningResult {
        match self.target(resource, any_type).await {
            Ok((gateway, provision)) => {
                self.reconcile_delta(gateway.resource(), &provision, delta, options)
                    .await
            }
            Err(e) => ProvisioningResult::new(any_type, ResourceOperation::None)
                .with_uid(delta.uid.value())
                .failed(e.to_string()),
        }
    }

    #[instrument(skip_all, fields(resource = %resource.key, uid = %delta.uid.value(), delta = ?delta.delta_type))]
    pub(super) async fn reconcile_delta(
        &self,
        resource: &ExternalResource,
        provision: &Provision,
        delta: &SyncDelta,
        options: &PullOptions,
    ) -> ProvisioningResult {
        let base = ProvisioningResult::new(&provision.any_type, ResourceOperation::None)
            .with_uid(delta.uid.value());
        match self
            .try_reconcile(resource, provision, delta, options, base.clone())
            .await
        {
            Ok(result) => {
                info!(operation = %result.operation, status = %result.status, "Delta reconciled");
                result
            }
            Err(e) => {
                error!(error = %e, "Reconciliation failed");
                base.failed(e.to_string())
            }
        }
    }

    async fn try_reconcile(
        &self,
        resource: &ExternalResource,
        provision: &Provision,
        delta: &SyncDelta,
        options: &PullOptions,
        base: ProvisioningResult,
    ) -> Result<ProvisioningResult> {
        let matches = self
            .match_entities(resource, provision, &delta.uid, delta.object.as_ref())
            .await?;
        let count = matches.len();
        let chosen = options
            .ambiguity
            .choose(count)
            .and_then(|index| matches.into_iter().nth(index));
        if count > 1 {
            match &chosen {
                Some(entity) => {
                    info!(matches = count, chosen = %entity.key, "Several entities match, ambiguity policy picked one");
                }
                None => {
                    warn!(matches = count, "Several entities match, ignoring");
                    return Ok(base.ignored(format!("{count} entities match")));
                }
            }
        }

        if delta.delta_type.is_delete() {
            let base = base.with_operation(ResourceOperation::Delete);
            return match chosen {
                Some(entity) => self.pull_delete(resource, entity, options, base).await,
                None => Ok(base.ignored("no matching entity")),
            };
        }

        let object = delta
            .object
            .as_ref()
            .ok_or_else(|| ProvisioningError::reconciliation("delta carries no remote object"))?;
        match chosen {
            Some(entity) => {
                self.pull_matched(resource, provision, object, entity, options, base)
                    .await
            }
            None => {
                self.pull_unmatched(resource, provision, object, options, base)
                    .await
            }
        }
    }

    async fn pull_unmatched(
        &self,
        resource: &ExternalResource,
        provision: &Provision,
        object: &ConnectorObject,
        options: &PullOptions,
        base: ProvisioningResult,
    ) -> Result<ProvisioningResult> {
        let rule = options.unmatching_rule;
        let base = base.with_name(object.name.clone()).with_rule(rule);

        match rule {
            UnmatchingRule::Ignore => Ok(base.ignored("no matching entity")),
            UnmatchingRule::Unlink => Ok(base.ignored("no matching entity to unlink")),
            UnmatchingRule::Assign | UnmatchingRule::Provision => {
                let base = base.with_operation(ResourceOperation::Create);
                if !options.perform_create {
                    return Ok(base.ignored("create not allowed"));
                }

                let kind = AnyTypeKind::for_any_type(&provision.any_type);
                let mut target = InboundTarget::new(Entity::new(
                    kind,
                    provision.any_type.clone(),
                    object.name.clone(),
                ));
                self.mapping
                    .apply_inbound_object(object, provision, &mut target, false)
                    .await;
                if options.dry_run {
                    return Ok(base.with_name(target.entity.name).with_message(DRY_RUN));
                }
                self.resolve_owner(resource, &mut target.entity).await;
                if rule == UnmatchingRule::Assign {
                    target.entity.resources.insert(resource.key.clone());
                }

                let entity = self.workflow.create(target.entity).await?;
                self.cache_virtual_values(&entity, target.virtual_values)
                    .await;

                let by_resource =
                    PropagationByResource::new().with(ResourceOperation::Create, resource.key.clone());
                let outbound = OutboundOptions::new().with_password(target.password);
                let statuses = self.propagate(&entity, &by_resource, &outbound, &[]).await;
                Ok(base.with_entity(&entity).with_propagation(statuses))
            }
        }
    }

    async fn pull_matched(
        &self,
        resource: &ExternalResource,
        provision: &Provision,
        object: &ConnectorObject,
        entity: Entity,
        options: &PullOptions,
        base: ProvisioningResult,
    ) -> Result<ProvisioningResult> {
        let rule = options.matching_rule;
        let base = base.with_entity(&entity).with_rule(rule);

        match rule {
            MatchingRule::Ignore => Ok(base.ignored("matching rule is IGNORE")),
            MatchingRule::Update => {
                let base = base.with_operation(ResourceOperation::Update);
                if !options.perform_update {
                    return Ok(base.ignored("update not allowed"));
                }
                if options.dry_run {
                    return Ok(base.with_message(DRY_RUN));
                }

                let mut target = InboundTarget::new(entity);
                self.mapping
                    .apply_inbound_object(object, provision, &mut target, true)
                    .await;
                self.resolve_owner(resource, &mut target.entity).await;
                let entity = self.workflow.update(target.entity).await?;
                self.cache_virtual_values(&entity, target.virtual_values)
                    .await;

                let mut by_resource = PropagationByResource::new();
                by_resource.add_all(ResourceOperation::Update, entity.resources.iter().cloned());
                let outbound = match target.password {
                    Some(password) => OutboundOptions::new().with_password(Some(password)),
                    None => OutboundOptions::new(),
                };
                let statuses = self
                    .propagate(&entity, &by_resource, &outbound, &[resource.key.clone()])
                    .await;
                Ok(base.with_entity(&entity).with_propagation(statuses))
            }
            MatchingRule::Deprovision | MatchingRule::Unassign => {
                let base = base.with_operation(ResourceOperation::Delete);
                if !options.perform_delete {
                    return Ok(base.ignored("delete not allowed"));
                }
                if options.dry_run {
                    return Ok(base.with_message(DRY_RUN));
                }

                let by_resource =
                    PropagationByResource::new().with(ResourceOperation::Delete, resource.key.clone());
                let statuses = self
                    .propagate(&entity, &by_resource, &OutboundOptions::new(), &[])
                    .await;
                if rule == MatchingRule::Unassign {
                    self.workflow.unlink(entity, &resource.key).await?;
                }
                Ok(base.with_propagation(statuses))
            }
            MatchingRule::Link | MatchingRule::Unlink => {
                if !options.perform_update {
                    return Ok(base.ignored("update not allowed"));
                }
                if options.dry_run {
                    return Ok(base.with_message(DRY_RUN));
                }
                let entity = if rule == MatchingRule::Link {
                    self.workflow.link(entity, &resource.key).await?
                } else {
                    self.workflow.unlink(entity, &resource.key).await?
                };
                Ok(base.with_entity(&entity))
            }
        }
    }

    /// Delete the matched entity after removing it from its other resources.
    async fn pull_delete(
        &self,
        resource: &ExternalResource,
        entity: Entity,
        options: &PullOptions,
        base: ProvisioningResult,
    ) -> Result<ProvisioningResult> {
        let base = base.with_entity(&entity);
        if !options.perform_delete {
            return Ok(base.ignored("delete not allowed"));
        }
        if options.dry_run {
            return Ok(base.with_message(DRY_RUN));
        }

        let mut by_resource = PropagationByResource::new();
        by_resource.add_all(ResourceOperation::Delete, entity.resources.iter().cloned());
        let statuses = self
            .propagate(&entity, &by_resource, &OutboundOptions::new(), &[resource.key.clone()])
            .await;
        self.workflow.delete(entity.kind, entity.key).await?;
        Ok(base.with_propagation(statuses))
    }

    /// Pull the changes recorded since the stored sync token.
    ///
    /// The latest token is stored after each processed batch, unless dry
    /// running. A provision without connector key aborts before any delta
    /// is read.
    #[instrument(skip(self, options, tokens), fields(resource = %resource))]
    pub async fn pull_incremental(
        &self,
        resource: &ResourceKey,
        any_type: &str,
        options: &PullOptions,
        tokens: &dyn SyncTokenStore,
    ) -> Result<ReconciliationReport> {
        let (gateway, provision) = self.target(resource, any_type).await?;
        Self::require_connector_key(gateway.resource(), &provision)?;

        let mut report = ReconciliationReport::new(resource.clone(), any_type, options.dry_run);
        let mut token = tokens.get(resource, any_type).await;
        loop {
            let batch = gateway
                .sync(&provision.object_class, token.as_ref(), self.config.pull_page_size)
                .await?;
            for delta in &batch.deltas {
                report.add(
                    self.reconcile_delta(gateway.resource(), &provision, delta, options)
                        .await,
                );
            }

            let latest = batch
                .latest_token
                .or_else(|| batch.deltas.last().and_then(|d| d.token.clone()));
            if let Some(latest) = latest {
                if !options.dry_run {
                    tokens.put(resource, any_type, latest.clone()).await;
                }
                token = Some(latest);
            }
            if !batch.has_more || batch.deltas.is_empty() {
                break;
            }
        }

        report.finish();
        info!(summary = %report.summary(), "Incremental pull finished");
        Ok(report)
    }

    /// Pull every remote object, page by page.
    #[instrument(skip(self, options), fields(resource = %resource))]
    pub async fn pull_full(
        &self,
        resource: &ResourceKey,
        any_type: &str,
        options: &PullOptions,
    ) -> Result<ReconciliationReport> {
        let (gateway, provision) = self.target(resource, any_type).await?;
        Self::require_connector_key(gateway.resource(), &provision)?;

        let mut report = ReconciliationReport::new(resource.clone(), any_type, options.dry_run);
        let mut page = PageRequest::new(self.config.pull_page_size);
        loop {
            let result = gateway
                .search_page(&provision.object_class, None, &page, None)
                .await?;
            for object in result.objects {
                let delta = SyncDelta::create_or_update(object);
                report.add(
                    self.reconcile_delta(gateway.resource(), &provision, &delta, options)
                        .await,
                );
            }
            match result.cookie {
                Some(cookie) if page.cookie.as_deref() != Some(cookie.as_str()) => {
                    page = PageRequest::new(self.config.pull_page_size).with_cookie(cookie);
                }
                Some(_) => {
                    warn!(resource = %resource, "Connector repeated page cookie, stopping pull");
                    break;
                }
                None => break,
            }
        }

        report.finish();
        info!(summary = %report.summary(), "Full pull finished");
        Ok(report)
    }
}
