//! Outbound mapping: entity to remote attribute set.

use tracing::{debug, instrument, warn};

use idsync_connector::operation::{ENABLE, NAME};
use idsync_connector::{
    AttributeSet, AttributeValue, ExternalResource, Item, MappingDirection, Provision,
};
use idsync_core::{AnyTypeKind, Entity, EntityKey, LinkedAccount, SchemaType};

use super::{plain_values, MappingEngine};
use crate::accessor::{self, USERNAME};
use crate::error::{ProvisioningError, Result};
use crate::resolver::{AttrTarget, InternalAttrReference};

/// Password and status handling for one outbound preparation.
#[derive(Debug, Clone, Default)]
pub struct OutboundOptions {
    /// Cleartext password supplied with the change, if any.
    pub password: Option<String>,
    /// Whether the password is propagated at all.
    pub change_pwd: bool,
    /// Remote enabled status to set, if any.
    pub enabled: Option<bool>,
}

impl OutboundOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: propagate the password, with a cleartext value if known.
    #[must_use]
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.change_pwd = true;
        self.password = password;
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }
}

/// Result of outbound mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedAttributes {
    /// Connector key value, when the entity has one.
    pub conn_object_key: Option<String>,
    pub attributes: AttributeSet,
    /// External names of mandatory items that produced no value.
    pub missing_mandatory: Vec<String>,
}

impl MappingEngine {
    /// Compute the remote attribute set for `entity` under `provision`.
    ///
    /// Items are applied in mapping order and values for the same external
    /// attribute are unioned. Items that fail to resolve are logged and
    /// skipped. The password is only included when `options.change_pwd`
    /// holds.
    #[instrument(skip(self, entity, resource, provision, options), fields(resource = %resource.key, entity = %entity.key))]
    pub async fn prepare_outbound(
        &self,
        entity: &Entity,
        resource: &ExternalResource,
        provision: &Provision,
        options: &OutboundOptions,
    ) -> Result<PreparedAttributes> {
        if provision.mapping.conn_object_key_item().is_none() {
            return Err(ProvisioningError::MissingConnectorKey {
                resource: resource.key.clone(),
                any_type: provision.any_type.clone(),
            });
        }

        let context = accessor::expression_context(entity);
        let mut prepared = PreparedAttributes::default();
        let mut password_item: Option<&Item> = None;

        for item in &provision.mapping.items {
            if item.password {
                password_item = Some(item);
                continue;
            }

            let reference = match self.resolver.resolve(&item.int_attr_name, entity.kind) {
                Ok(reference) => reference,
                Err(e) => {
                    warn!(item = %item.int_attr_name, error = %e, "Skipping unresolvable mapping item");
                    continue;
                }
            };

            let values = match self.item_values(entity, item, &reference, resource).await {
                Ok(values) => values,
                Err(e) => {
                    warn!(item = %item.int_attr_name, error = %e, "Skipping mapping item");
                    continue;
                }
            };

            if values.is_empty() {
                if let Some(condition) = &item.mandatory_condition {
                    if self.evaluator.is_true(condition, &context) {
                        warn!(attribute = %item.ext_attr_name, "Mandatory attribute has no value");
                        prepared.missing_mandatory.push(item.ext_attr_name.clone());
                    }
                }
            }

            if item.conn_object_key {
                prepared.conn_object_key = values.first().map(AttributeValue::to_value_string);
            }
            prepared.attributes.merge(item.ext_attr_name.clone(), values);
        }

        if prepared.conn_object_key.is_none() {
            warn!("Entity has no connector key value");
        }
        if let Some(name) = self.object_name(entity, provision, prepared.conn_object_key.as_deref()) {
            prepared.attributes.set(NAME, vec![AttributeValue::String(name)]);
        }

        if let Some(enabled) = options.enabled {
            prepared.attributes.set(ENABLE, vec![AttributeValue::Boolean(enabled)]);
        }

        if options.change_pwd && entity.kind == AnyTypeKind::User {
            if let Some(item) = password_item {
                if let Some(password) = self.outbound_password(
                    entity.key,
                    entity.password.as_deref(),
                    options.password.as_deref(),
                    resource,
                ) {
                    prepared
                        .attributes
                        .set(item.ext_attr_name.clone(), vec![AttributeValue::String(password)]);
                }
            }
        }

        debug!(attributes = prepared.attributes.len(), "Prepared outbound attributes");
        Ok(prepared)
    }

    /// Compute the remote attribute set for a linked account.
    ///
    /// Starts from the owner's attributes, then overrides the connector key,
    /// username, plain attributes, status and password the account carries
    /// itself.
    #[instrument(skip_all, fields(resource = %resource.key, account = %account.key))]
    pub async fn prepare_linked_account(
        &self,
        owner: &Entity,
        account: &LinkedAccount,
        resource: &ExternalResource,
        provision: &Provision,
        options: &OutboundOptions,
    ) -> Result<PreparedAttributes> {
        let owner_options = OutboundOptions {
            password: None,
            change_pwd: false,
            enabled: options.enabled,
        };
        let mut prepared = self
            .prepare_outbound(owner, resource, provision, &owner_options)
            .await?;

        let key_value = account.conn_object_key_value.clone();
        for item in &provision.mapping.items {
            if item.conn_object_key {
                prepared
                    .attributes
                    .set(item.ext_attr_name.clone(), vec![AttributeValue::String(key_value.clone())]);
                continue;
            }
            if item.password {
                if options.change_pwd {
                    if let Some(password) = self.outbound_password(
                        account.key,
                        account.password.as_deref(),
                        options.password.as_deref(),
                        resource,
                    ) {
                        prepared
                            .attributes
                            .set(item.ext_attr_name.clone(), vec![AttributeValue::String(password)]);
                    }
                }
                continue;
            }

            let Ok(reference) = self.resolver.resolve(&item.int_attr_name, owner.kind) else {
                continue;
            };
            if reference.qualifier.is_some() {
                continue;
            }
            match &reference.target {
                AttrTarget::Field(name) if name == USERNAME => {
                    if let Some(username) = &account.username {
                        prepared.attributes.set(
                            item.ext_attr_name.clone(),
                            vec![AttributeValue::String(username.clone())],
                        );
                    }
                }
                AttrTarget::Schema {
                    schema_type: Some(SchemaType::Plain),
                    name,
                } => {
                    if let Some(attr) = account.plain_attrs.get(name) {
                        prepared
                            .attributes
                            .set(item.ext_attr_name.clone(), plain_values(Some(attr)));
                    }
                }
                _ => {}
            }
        }

        prepared.conn_object_key = Some(key_value.clone());
        prepared
            .attributes
            .set(NAME, vec![AttributeValue::String(key_value)]);
        if let Some(suspended) = account.suspended {
            prepared
                .attributes
                .set(ENABLE, vec![AttributeValue::Boolean(!suspended)]);
        }

        Ok(prepared)
    }

    /// Values of one item, transformed unless virtual.
    async fn item_values(
        &self,
        entity: &Entity,
        item: &Item,
        reference: &InternalAttrReference,
        resource: &ExternalResource,
    ) -> Result<Vec<AttributeValue>> {
        let values = self.reference_values(entity, reference, resource).await?;

        let transforms_apply = item
            .transformers
            .iter()
            .any(|t| t.direction.applies_to(MappingDirection::Outbound));
        if !transforms_apply || reference.schema_type() == Some(SchemaType::Virtual) {
            return Ok(values);
        }

        let strings = values.iter().map(AttributeValue::to_value_string).collect();
        Ok(self
            .transforms
            .apply_chain(&item.transformers, MappingDirection::Outbound, strings)
            .into_iter()
            .map(AttributeValue::String)
            .collect())
    }

    /// Password to send: the supplied cleartext, else the decoded stored
    /// secret, else a generated one when the resource asks for it.
    fn outbound_password(
        &self,
        owner: EntityKey,
        stored: Option<&str>,
        cleartext: Option<&str>,
        resource: &ExternalResource,
    ) -> Option<String> {
        if let Some(cleartext) = cleartext {
            return Some(cleartext.to_string());
        }

        if let (Some(stored), Some(cipher)) = (stored, &self.cipher) {
            match cipher.decode(owner, stored) {
                Ok(password) => return Some(password),
                Err(e) => warn!(entity = %owner, error = %e, "Could not decode stored password"),
            }
        }

        if resource.random_pwd_if_not_provided {
            match self.passwords.generate() {
                Ok(password) => return Some(password),
                Err(e) => warn!(resource = %resource.key, error = %e, "Password generation failed"),
            }
        }
        None
    }
}
