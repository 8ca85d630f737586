//! Push: internal entities out to a resource.

use tracing::{error, info, instrument};

use idsync_connector::{ConnectorGateway, Provision};
use idsync_core::{AnyTypeKind, Entity, EntityStore, ResourceKey};

use super::engine::{PushOptions, ReconciliationEngine, DRY_RUN};
use super::report::ReconciliationReport;
use super::result::ProvisioningResult;
use super::rules::{MatchingRule, UnmatchingRule};
use crate::error::Result;
use crate::mapping::outbound::OutboundOptions;
use crate::propagation::{PropagationByResource, ResourceOperation};
use crate::remote::{key_attribute, read_remote};

impl ReconciliationEngine {
    /// Push one entity to `resource`.
    ///
    /// Never fails: errors are reported as a FAILURE result.
    pub async fn push_entity(
        &self,
        resource: &ResourceKey,
        entity: &Entity,
        options: &PushOptions,
    ) -> ProvisioningResult {
        match self.target(resource, &entity.any_type).await {
            Ok((gateway, provision)) => self.push_one(&gateway, &provision, entity, options).await,
            Err(e) => ProvisioningResult::new(&entity.any_type, ResourceOperation::None)
                .with_entity(entity)
                .failed(e.to_string()),
        }
    }

    #[instrument(skip_all, fields(resource = %gateway.key(), entity = %entity.key))]
    async fn push_one(
        &self,
        gateway: &ConnectorGateway,
        provision: &Provision,
        entity: &Entity,
        options: &PushOptions,
    ) -> ProvisioningResult {
        let base = ProvisioningResult::new(&entity.any_type, ResourceOperation::None).with_entity(entity);
        match self
            .try_push(gateway, provision, entity, options, base.clone())
            .await
        {
            Ok(result) => {
                info!(operation = %result.operation, status = %result.status, "Entity pushed");
                result
            }
            Err(e) => {
                error!(error = %e, "Push failed");
                base.failed(e.to_string())
            }
        }
    }

    async fn try_push(
        &self,
        gateway: &ConnectorGateway,
        provision: &Provision,
        entity: &Entity,
        options: &PushOptions,
        base: ProvisioningResult,
    ) -> Result<ProvisioningResult> {
        let resource = gateway.resource();
        let key_value = self
            .mapping
            .connector_key_value(entity, resource, provision)?;
        let remote = match (&key_value, key_attribute(provision)) {
            (Some(value), Some(attr)) => read_remote(gateway, provision, attr, value, None).await?,
            _ => None,
        };
        let base = match key_value {
            Some(value) => base.with_uid(value),
            None => base,
        };

        if remote.is_some() {
            self.push_matched(&resource.key, entity.clone(), options, base)
                .await
        } else {
            self.push_unmatched(&resource.key, entity.clone(), options, base)
                .await
        }
    }

    async fn push_unmatched(
        &self,
        resource: &ResourceKey,
        entity: Entity,
        options: &PushOptions,
        base: ProvisioningResult,
    ) -> Result<ProvisioningResult> {
        let rule = options.unmatching_rule;
        let base = base.with_rule(rule);

        match rule {
            UnmatchingRule::Ignore => Ok(base.ignored("remote object not found")),
            UnmatchingRule::Unlink => {
                if !options.perform_update {
                    return Ok(base.ignored("update not allowed"));
                }
                if !entity.has_resource(resource) {
                    return Ok(base.ignored("not linked"));
                }
                if options.dry_run {
                    return Ok(base.with_message(DRY_RUN));
                }
                self.workflow.unlink(entity, resource).await?;
                Ok(base)
            }
            UnmatchingRule::Assign | UnmatchingRule::Provision => {
                let base = base.with_operation(ResourceOperation::Create);
                if !options.perform_create {
                    return Ok(base.ignored("create not allowed"));
                }
                if options.dry_run {
                    return Ok(base.with_message(DRY_RUN));
                }

                let entity = if rule == UnmatchingRule::Assign {
                    self.workflow.link(entity, resource).await?
                } else {
                    entity
                };
                let by_resource =
                    PropagationByResource::new().with(ResourceOperation::Create, resource.clone());
                let statuses = self
                    .propagate(&entity, &by_resource, &OutboundOptions::new().with_password(None), &[])
                    .await;
                Ok(base.with_propagation(statuses))
            }
        }
    }

    async fn push_matched(
        &self,
        resource: &ResourceKey,
        entity: Entity,
        options: &PushOptions,
        base: ProvisioningResult,
    ) -> Result<ProvisioningResult> {
        let rule = options.matching_rule;
        let base = base.with_rule(rule);

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
                let by_resource =
                    PropagationByResource::new().with(ResourceOperation::Update, resource.clone());
                let statuses = self
                    .propagate(&entity, &by_resource, &OutboundOptions::new(), &[])
                    .await;
                Ok(base.with_propagation(statuses))
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
                    PropagationByResource::new().with(ResourceOperation::Delete, resource.clone());
                let statuses = self
                    .propagate(&entity, &by_resource, &OutboundOptions::new(), &[])
                    .await;
                if rule == MatchingRule::Unassign {
                    self.workflow.unlink(entity, resource).await?;
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
                if rule == MatchingRule::Link {
                    self.workflow.link(entity, resource).await?;
                } else {
                    self.workflow.unlink(entity, resource).await?;
                }
                Ok(base)
            }
        }
    }

    /// Push every entity of `any_type` passing the options' filter.
    ///
    /// A provision without connector key aborts before any entity is read.
    #[instrument(skip(self, options), fields(resource = %resource))]
    pub async fn push_all(
        &self,
        resource: &ResourceKey,
        any_type: &str,
        options: &PushOptions,
    ) -> Result<ReconciliationReport> {
        let (gateway, provision) = self.target(resource, any_type).await?;
        Self::require_connector_key(gateway.resource(), &provision)?;

        let kind = AnyTypeKind::for_any_type(any_type);
        let page_size = self.config.push_page_size as usize;
        let mut report = ReconciliationReport::new(resource.clone(), any_type, options.dry_run);
        let mut offset = 0;
        loop {
            let page = self.store.list(kind, any_type, offset, page_size).await?;
            for entity in &page {
                if !options.filter.matches(entity, resource) {
                    continue;
                }
                report.add(self.push_one(&gateway, &provision, entity, options).await);
            }
            if page.len() < page_size {
                break;
            }
            offset += page.len();
        }

        report.finish();
        info!(summary = %report.summary(), "Push finished");
        Ok(report)
    }
}
