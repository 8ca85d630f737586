//! Inbound mapping: remote values onto an entity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use idsync_connector::{AttributeValue, ConnectorObject, Item, MappingDirection, Provision};
use idsync_core::{AnyTypeKind, AttrSchemaType, Entity, PlainAttr, PlainSchema, PlainValue, SchemaType};

use super::MappingEngine;
use crate::accessor::{self, GROUP_OWNER, PASSWORD, USER_OWNER};
use crate::error::{ProvisioningError, Result};
use crate::resolver::{AttrTarget, Qualifier};

/// Plain attribute holding the remote name of a group owner until the
/// owner can be resolved to an entity.
pub const OWNER_MARKER: &str = "__OWNER__";

/// Entity representation being built or updated from remote values.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundTarget {
    pub entity: Entity,
    /// Cleartext password read from the resource.
    pub password: Option<String>,
    /// Virtual schema values read from the resource, to be cached once the
    /// entity is stored.
    pub virtual_values: BTreeMap<String, Vec<String>>,
}

impl InboundTarget {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            password: None,
            virtual_values: BTreeMap::new(),
        }
    }
}

impl MappingEngine {
    /// Write one remote attribute onto `target` following `item`.
    ///
    /// `values` is `None` when the remote object does not carry the
    /// attribute. Inbound transformers run first (except for virtual
    /// schemas); the result is routed by what the item references.
    pub async fn apply_inbound(
        &self,
        values: Option<&[AttributeValue]>,
        item: &Item,
        target: &mut InboundTarget,
    ) -> Result<()> {
        let reference = self
            .resolver
            .resolve(&item.int_attr_name, target.entity.kind)?;

        let raw: Vec<AttributeValue> = values.map(<[_]>::to_vec).unwrap_or_default();
        let transforms_apply = item
            .transformers
            .iter()
            .any(|t| t.direction.applies_to(MappingDirection::Inbound));
        let values = if transforms_apply && reference.schema_type() != Some(SchemaType::Virtual) {
            let strings = raw.iter().map(AttributeValue::to_value_string).collect();
            self.transforms
                .apply_chain(&item.transformers, MappingDirection::Inbound, strings)
                .into_iter()
                .map(AttributeValue::String)
                .collect()
        } else {
            raw
        };

        if values.is_empty() {
            debug!(item = %item.int_attr_name, "No inbound value");
            return Ok(());
        }

        match (&reference.qualifier, &reference.target) {
            (None, AttrTarget::Field(name)) => {
                let first = values[0].to_value_string();
                Self::set_field(target, name, first, &values);
            }
            (
                None,
                AttrTarget::Schema {
                    schema_type: Some(SchemaType::Plain),
                    name,
                },
            ) => {
                if let Some(attr) = self.plain_attr(name, &values, target.entity.plain_attr(name)) {
                    target.entity.set_plain_attr(attr);
                }
            }
            (
                Some(Qualifier::Membership(group_name)),
                AttrTarget::Schema {
                    schema_type: Some(SchemaType::Plain),
                    name,
                },
            ) => {
                let group = match target.entity.membership(group_name) {
                    Some(membership) => membership.group,
                    None => self
                        .store
                        .find_by_name(AnyTypeKind::Group, group_name)
                        .await?
                        .map(|group| group.key)
                        .ok_or_else(|| ProvisioningError::no_reference(format!("memberships[{group_name}]")))?,
                };
                let existing = target
                    .entity
                    .membership(group_name)
                    .and_then(|m| m.plain_attrs.get(name))
                    .cloned();
                if let Some(attr) = self.plain_attr(name, &values, existing.as_ref()) {
                    target
                        .entity
                        .membership_mut_or_insert(group, group_name)
                        .set_plain_attr(attr);
                }
            }
            (
                None,
                AttrTarget::Schema {
                    schema_type: Some(SchemaType::Virtual),
                    name,
                },
            ) => {
                let entry = target.virtual_values.entry(name.clone()).or_default();
                for value in values.iter().map(AttributeValue::to_value_string) {
                    if !entry.contains(&value) {
                        entry.push(value);
                    }
                }
            }
            (qualifier, target_attr) => {
                debug!(?qualifier, ?target_attr, "Item is not writable inbound");
            }
        }
        Ok(())
    }

    /// Apply every item of `provision` from a remote object.
    ///
    /// With `replace`, plain attributes the mapping writes are cleared
    /// first so remote values replace rather than extend them. Items that
    /// fail are logged and skipped.
    #[instrument(skip_all, fields(uid = %object.uid))]
    pub async fn apply_inbound_object(
        &self,
        object: &ConnectorObject,
        provision: &Provision,
        target: &mut InboundTarget,
        replace: bool,
    ) {
        if replace {
            for item in &provision.mapping.items {
                if let Ok(reference) = self.resolver.resolve(&item.int_attr_name, target.entity.kind) {
                    if let (None, AttrTarget::Schema { name, .. }) = (&reference.qualifier, &reference.target) {
                        target.entity.plain_attrs.remove(name);
                    }
                }
            }
        }

        for item in &provision.mapping.items {
            let values = object.values_of(&item.ext_attr_name);
            let values = (!values.is_empty()).then_some(values);
            if let Err(e) = self.apply_inbound(values.as_deref(), item, target).await {
                warn!(item = %item.int_attr_name, error = %e, "Skipping inbound mapping item");
            }
        }
    }

    fn set_field(target: &mut InboundTarget, name: &str, first: String, values: &[AttributeValue]) {
        match name {
            PASSWORD => target.password = Some(first),
            USER_OWNER | GROUP_OWNER => {
                let marker = values
                    .iter()
                    .map(|v| PlainValue::String(v.to_value_string()))
                    .collect();
                target.entity.set_plain_attr(PlainAttr::new(OWNER_MARKER, marker));
            }
            _ => match accessor::accessor(target.entity.kind, name).and_then(|a| a.set) {
                Some(set) => set(&mut target.entity, &first),
                None => debug!(field = name, "Field is read-only"),
            },
        }
    }

    /// Build the plain attribute for `name` from inbound values, merged
    /// with `existing` when the schema is multi-valued. `None` when no
    /// value is of the schema's type.
    fn plain_attr(
        &self,
        name: &str,
        values: &[AttributeValue],
        existing: Option<&PlainAttr>,
    ) -> Option<PlainAttr> {
        let schema = self.schemas.find_plain(name);
        let mut typed: Vec<PlainValue> = values
            .iter()
            .filter_map(|v| to_plain_value(schema.as_ref(), v))
            .collect();
        if typed.is_empty() {
            debug!(schema = name, "No inbound value of the schema type");
            return None;
        }

        let Some(schema) = schema else {
            return Some(PlainAttr::new(name, typed));
        };

        if schema.unique_constraint {
            // unique schemas are single-valued
            return Some(PlainAttr::unique(name, typed.swap_remove(0)));
        }
        if !schema.multivalue {
            typed.truncate(1);
            return Some(PlainAttr::new(name, typed));
        }

        let mut merged: Vec<PlainValue> = existing.map(|a| a.values.clone()).unwrap_or_default();
        for value in typed {
            if !merged.contains(&value) {
                merged.push(value);
            }
        }
        Some(PlainAttr::new(name, merged))
    }
}

/// Convert a remote value to the schema's value type. Values that do not
/// parse are skipped.
fn to_plain_value(schema: Option<&PlainSchema>, value: &AttributeValue) -> Option<PlainValue> {
    let value_type = schema.map(|s| s.value_type).unwrap_or_default();
    let text = value.to_value_string();

    let parsed = match (value_type, value) {
        (AttrSchemaType::Long, AttributeValue::Long(l)) => Some(PlainValue::Long(*l)),
        (AttrSchemaType::Long, _) => text.trim().parse().ok().map(PlainValue::Long),
        (AttrSchemaType::Double, AttributeValue::Double(d)) => Some(PlainValue::Double(*d)),
        (AttrSchemaType::Double, _) => text.trim().parse().ok().map(PlainValue::Double),
        (AttrSchemaType::Boolean, _) => value
            .as_bool()
            .or_else(|| text.trim().to_ascii_lowercase().parse().ok())
            .map(PlainValue::Boolean),
        (AttrSchemaType::Date, _) => DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|d| PlainValue::Date(d.with_timezone(&Utc))),
        (AttrSchemaType::Binary, AttributeValue::Binary(b)) => Some(PlainValue::Binary(b.clone())),
        (AttrSchemaType::Binary, _) => None,
        (AttrSchemaType::String, _) => Some(PlainValue::String(text.clone())),
    };

    if parsed.is_none() {
        warn!(
            schema = schema.map(|s| s.key.as_str()).unwrap_or_default(),
            value = %text,
            "Inbound value does not match schema type, skipped"
        );
    }
    parsed
}
