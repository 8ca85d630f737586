//! Propagation task builder.

use std::sync::Arc;

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use idsync_connector::operation::NAME;
use idsync_connector::{AttributeSet, AttributeValue, ConnectorRegistry, ExternalResource, Provision};
use idsync_core::{Entity, EntityKey, LinkedAccount, ResourceKey};

use super::task::{
    LinkedAccountPropagation, PropagationByResource, PropagationPlan, PropagationStatus,
    PropagationTask, ResourceOperation,
};
use crate::error::{ProvisioningError, Result};
use crate::mapping::outbound::OutboundOptions;
use crate::mapping::{MappingEngine, PreparedAttributes};
use crate::remote::key_attribute;

/// Turns intended per-resource operations into propagation tasks.
#[derive(Debug, Clone)]
pub struct PropagationTaskBuilder {
    mapping: Arc<MappingEngine>,
    registry: Arc<ConnectorRegistry>,
}

impl PropagationTaskBuilder {
    pub fn new(mapping: Arc<MappingEngine>, registry: Arc<ConnectorRegistry>) -> Self {
        Self { mapping, registry }
    }

    /// One task per resource in `by_resource` and per linked account in
    /// `by_linked_account`, skipping `excluded` resources.
    ///
    /// Targets that are not registered, have no provision for the entity's
    /// type or cannot be mapped get a failed status in the plan instead of
    /// a task; they never prevent tasks for the other targets.
    #[instrument(skip_all, fields(entity = %entity.key, any_type = %entity.any_type))]
    pub async fn build(
        &self,
        entity: &Entity,
        by_resource: &PropagationByResource,
        by_linked_account: Option<&LinkedAccountPropagation>,
        options: &OutboundOptions,
        excluded: &[ResourceKey],
    ) -> PropagationPlan {
        let mut plan = PropagationPlan::default();

        for (resource_key, operation) in by_resource.iter() {
            if operation == ResourceOperation::None || excluded.contains(resource_key) {
                continue;
            }
            match self.resource_task(entity, resource_key, operation, options).await {
                Ok(built) => plan.tasks.push(built),
                Err(e) => {
                    warn!(resource = %resource_key, error = %e, "No task built");
                    plan.failures.push(PropagationStatus::unbuilt(
                        resource_key,
                        operation,
                        entity.key,
                        None,
                        e.to_string(),
                    ));
                }
            }
        }

        if let Some(by_linked_account) = by_linked_account {
            for ((resource_key, conn_object_key), operation) in by_linked_account.iter() {
                if operation == ResourceOperation::None || excluded.contains(resource_key) {
                    continue;
                }
                let Some(account) = find_account(entity, resource_key, conn_object_key) else {
                    warn!(resource = %resource_key, account = %conn_object_key, "No such linked account");
                    plan.failures.push(PropagationStatus::unbuilt(
                        resource_key,
                        operation,
                        entity.key,
                        Some(conn_object_key.clone()),
                        format!("No linked account {conn_object_key} on resource {resource_key}"),
                    ));
                    continue;
                };
                match self
                    .linked_account_task(entity, account, operation, options)
                    .await
                {
                    Ok(built) => plan.tasks.push(built),
                    Err(e) => {
                        warn!(resource = %resource_key, account = %account.key, error = %e, "No linked account task built");
                        plan.failures.push(PropagationStatus::unbuilt(
                            resource_key,
                            operation,
                            account.key,
                            Some(conn_object_key.clone()),
                            e.to_string(),
                        ));
                    }
                }
            }
        }

        debug!(tasks = plan.tasks.len(), unbuilt = plan.failures.len(), "Propagation tasks built");
        plan
    }

    async fn resource_task(
        &self,
        entity: &Entity,
        resource_key: &ResourceKey,
        operation: ResourceOperation,
        options: &OutboundOptions,
    ) -> Result<PropagationTask> {
        let gateway = self.registry.find(resource_key).await.ok_or_else(|| {
            ProvisioningError::ResourceNotFound {
                resource: resource_key.clone(),
            }
        })?;
        let resource = gateway.resource();
        let provision = provision_for(resource, &entity.any_type)?;

        let prepared = if operation == ResourceOperation::Delete {
            self.delete_attributes(entity, resource, provision)?
        } else {
            self.mapping
                .prepare_outbound(entity, resource, provision, options)
                .await?
        };
        Ok(task(entity.key, false, entity, resource, provision, operation, prepared))
    }

    async fn linked_account_task(
        &self,
        owner: &Entity,
        account: &LinkedAccount,
        operation: ResourceOperation,
        options: &OutboundOptions,
    ) -> Result<PropagationTask> {
        let gateway = self.registry.find(&account.resource).await.ok_or_else(|| {
            ProvisioningError::ResourceNotFound {
                resource: account.resource.clone(),
            }
        })?;
        let resource = gateway.resource();
        let provision = provision_for(resource, &owner.any_type)?;

        let prepared = if operation == ResourceOperation::Delete {
            key_only(provision, &account.conn_object_key_value)
        } else {
            self.mapping
                .prepare_linked_account(owner, account, resource, provision, options)
                .await?
        };
        Ok(task(account.key, true, owner, resource, provision, operation, prepared))
    }

    /// Deletes only carry the connector key.
    fn delete_attributes(
        &self,
        entity: &Entity,
        resource: &ExternalResource,
        provision: &Provision,
    ) -> Result<PreparedAttributes> {
        let key_value = self.mapping.connector_key_value(entity, resource, provision)?;
        Ok(key_value
            .map(|value| key_only(provision, &value))
            .unwrap_or_default())
    }
}

fn provision_for<'a>(resource: &'a ExternalResource, any_type: &str) -> Result<&'a Provision> {
    resource
        .provision(any_type)
        .ok_or_else(|| ProvisioningError::ProvisionNotFound {
            resource: resource.key.clone(),
            any_type: any_type.to_string(),
        })
}

fn key_only(provision: &Provision, key_value: &str) -> PreparedAttributes {
    let mut attributes = AttributeSet::new();
    if let Some(attr) = key_attribute(provision) {
        attributes.set(attr, vec![AttributeValue::String(key_value.to_string())]);
    }
    attributes.set(NAME, vec![AttributeValue::String(key_value.to_string())]);
    PreparedAttributes {
        conn_object_key: Some(key_value.to_string()),
        attributes,
        missing_mandatory: Vec::new(),
    }
}

fn find_account<'a>(
    entity: &'a Entity,
    resource: &ResourceKey,
    conn_object_key: &str,
) -> Option<&'a LinkedAccount> {
    entity
        .linked_accounts
        .iter()
        .find(|a| &a.resource == resource && a.conn_object_key_value == conn_object_key)
}

fn task(
    entity_key: EntityKey,
    linked_account: bool,
    entity: &Entity,
    resource: &ExternalResource,
    provision: &Provision,
    operation: ResourceOperation,
    prepared: PreparedAttributes,
) -> PropagationTask {
    if !prepared.missing_mandatory.is_empty() {
        warn!(
            resource = %resource.key,
            missing = ?prepared.missing_mandatory,
            "Mandatory attributes without value"
        );
    }
    PropagationTask {
        key: Uuid::new_v4(),
        resource: resource.key.clone(),
        operation,
        entity_kind: entity.kind,
        any_type: entity.any_type.clone(),
        entity_key,
        linked_account,
        object_class: provision.object_class.clone(),
        conn_object_key: prepared.conn_object_key,
        attributes: prepared.attributes,
        priority: resource.propagation_priority,
    }
}
