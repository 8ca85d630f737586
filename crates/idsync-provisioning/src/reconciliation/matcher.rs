//! Matching remote objects to entities.

use tracing::{debug, instrument};

use idsync_connector::{
    ConnectorObject, CorrelationRule, ExternalResource, ItemTransformer, MappingDirection,
    Provision, Uid,
};
use idsync_core::{AnyTypeKind, Entity, EntityKey, EntityStore, SchemaType};

use super::engine::ReconciliationEngine;
use crate::accessor::{self, KEY, NAME, USERNAME};
use crate::error::{ProvisioningError, Result};
use crate::resolver::AttrTarget;

impl ReconciliationEngine {
    /// Entities a remote object corresponds to, in store order.
    ///
    /// With a correlation rule every listed attribute must match. Otherwise
    /// the connector key is read from `object` (or taken from `uid` when
    /// there is no object, as for deletes), passed through the key item's
    /// inbound transformers and looked up on the internal attribute it is
    /// mapped from.
    #[instrument(skip(self, resource, provision, object), fields(resource = %resource.key, uid = %uid.value()))]
    pub async fn match_entities(
        &self,
        resource: &ExternalResource,
        provision: &Provision,
        uid: &Uid,
        object: Option<&ConnectorObject>,
    ) -> Result<Vec<Entity>> {
        let kind = AnyTypeKind::for_any_type(&provision.any_type);

        if let (Some(rule), Some(object)) = (&provision.correlation_rule, object) {
            return self.correlate(kind, provision, rule, object).await;
        }

        let item = provision.mapping.conn_object_key_item().ok_or_else(|| {
            ProvisioningError::MissingConnectorKey {
                resource: resource.key.clone(),
                any_type: provision.any_type.clone(),
            }
        })?;
        let raw = object
            .and_then(|o| o.values_of(&item.ext_attr_name).into_iter().next())
            .map_or_else(|| uid.value().to_string(), |v| v.to_value_string());

        let Some(value) = self.inbound_value(&item.transformers, raw) else {
            debug!("Connector key transformed to nothing");
            return Ok(Vec::new());
        };
        self.find_by_attribute(kind, &provision.any_type, &item.int_attr_name, &value)
            .await
    }

    fn inbound_value(
        &self,
        transformers: &[ItemTransformer],
        raw: String,
    ) -> Option<String> {
        self.mapping
            .transforms()
            .apply_chain(transformers, MappingDirection::Inbound, vec![raw])
            .into_iter()
            .next()
    }

    async fn correlate(
        &self,
        kind: AnyTypeKind,
        provision: &Provision,
        rule: &CorrelationRule,
        object: &ConnectorObject,
    ) -> Result<Vec<Entity>> {
        let mut criteria = Vec::with_capacity(rule.int_attr_names.len());
        for name in &rule.int_attr_names {
            let item = provision.mapping.items_for(name).next().ok_or_else(|| {
                ProvisioningError::configuration(format!(
                    "correlation attribute {name} is not mapped"
                ))
            })?;
            let Some(raw) = object
                .values_of(&item.ext_attr_name)
                .into_iter()
                .next()
                .map(|v| v.to_value_string())
            else {
                debug!(attribute = %name, "Remote object lacks a correlation attribute");
                return Ok(Vec::new());
            };
            let Some(value) = self.inbound_value(&item.transformers, raw) else {
                return Ok(Vec::new());
            };
            criteria.push((name.as_str(), value));
        }

        let Some(((first_name, first_value), rest)) = criteria.split_first() else {
            return Ok(Vec::new());
        };
        let mut candidates = self
            .find_by_attribute(kind, &provision.any_type, first_name, first_value)
            .await?;
        candidates.retain(|entity| {
            rest.iter()
                .all(|(name, value)| self.has_value(entity, name, value))
        });
        Ok(candidates)
    }

    /// Entities whose internal attribute `int_attr_name` holds `value`.
    pub(super) async fn find_by_attribute(
        &self,
        kind: AnyTypeKind,
        any_type: &str,
        int_attr_name: &str,
        value: &str,
    ) -> Result<Vec<Entity>> {
        let reference = self.mapping.resolver().resolve(int_attr_name, kind)?;
        if reference.qualifier.is_some() {
            return Err(ProvisioningError::reconciliation(format!(
                "cannot match on qualified attribute {int_attr_name}"
            )));
        }

        match &reference.target {
            AttrTarget::Field(name) if name == KEY => match value.parse::<EntityKey>() {
                Ok(key) => Ok(self.store.find(kind, key).await?.into_iter().collect()),
                Err(_) => {
                    debug!(value, "Connector key is not an entity key");
                    Ok(Vec::new())
                }
            },
            AttrTarget::Field(name) if name == USERNAME || name == NAME => Ok(self
                .store
                .find_by_name(kind, value)
                .await?
                .into_iter()
                .filter(|e| e.any_type == any_type)
                .collect()),
            AttrTarget::Schema {
                schema_type: Some(SchemaType::Plain),
                name,
            } => Ok(self
                .store
                .find_by_plain_attr(kind, any_type, name, value)
                .await?),
            _ => Err(ProvisioningError::reconciliation(format!(
                "cannot match on {int_attr_name}"
            ))),
        }
    }

    fn has_value(&self, entity: &Entity, int_attr_name: &str, value: &str) -> bool {
        let Ok(reference) = self.mapping.resolver().resolve(int_attr_name, entity.kind) else {
            return false;
        };
        match &reference.target {
            AttrTarget::Field(name) => accessor::accessor(entity.kind, name)
                .and_then(|field| (field.get)(entity))
                .is_some_and(|v| v.to_value_string() == value),
            AttrTarget::Schema {
                schema_type: Some(SchemaType::Plain),
                name,
            } => entity
                .plain_attr(name)
                .is_some_and(|attr| attr.values_as_strings().iter().any(|v| v == value)),
            _ => false,
        }
    }
}
