//! Attribute mapping engine.
//!
//! Translates entities to remote attribute sets ([`outbound`]), remote
//! values back onto entities ([`inbound`]) and reads virtual attributes
//! through the connector gateways ([`virtual_attrs`]).

pub mod inbound;
pub mod outbound;
pub mod password;
pub mod virtual_attrs;

use std::sync::Arc;

use tracing::{debug, warn};

use idsync_connector::{
    AttributeValue, ConnectorRegistry, ExternalResource, MappingDirection, Provision,
    SecretCipher, TransformEngine,
};
use idsync_core::{
    AnyTypeKind, Entity, EntityStore, Membership, PlainAttr, PlainValue, SchemaStore, SchemaType,
};

use crate::accessor::{self, GROUP_OWNER, USER_OWNER};
use crate::cache::VirAttrCache;
use crate::error::{ProvisioningError, Result};
use crate::expression::ExpressionEvaluator;
use crate::resolver::{AttrTarget, IntAttrNameResolver, InternalAttrReference, Qualifier};

pub use inbound::{InboundTarget, OWNER_MARKER};
pub use outbound::PreparedAttributes;
pub use password::{PasswordGenerator, RandomPasswordGenerator};

/// One element of a reference set.
#[derive(Debug, Clone)]
enum Referenced {
    Entity(Entity),
    Membership(Membership),
}

/// Maps attributes between entities and resources.
pub struct MappingEngine {
    resolver: IntAttrNameResolver,
    schemas: Arc<dyn SchemaStore>,
    store: Arc<dyn EntityStore>,
    registry: Arc<ConnectorRegistry>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    cache: VirAttrCache,
    transforms: TransformEngine,
    cipher: Option<SecretCipher>,
    passwords: Arc<dyn PasswordGenerator>,
}

impl std::fmt::Debug for MappingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingEngine")
            .field("cache", &self.cache)
            .field("cipher", &self.cipher)
            .finish_non_exhaustive()
    }
}

impl MappingEngine {
    pub fn new(
        schemas: Arc<dyn SchemaStore>,
        store: Arc<dyn EntityStore>,
        registry: Arc<ConnectorRegistry>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        cache: VirAttrCache,
    ) -> Self {
        Self {
            resolver: IntAttrNameResolver::new(Arc::clone(&schemas)),
            schemas,
            store,
            registry,
            evaluator,
            cache,
            transforms: TransformEngine::new(),
            cipher: None,
            passwords: Arc::new(RandomPasswordGenerator::default()),
        }
    }

    /// Builder: decode stored secrets with `cipher`.
    #[must_use]
    pub fn with_cipher(mut self, cipher: SecretCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Builder: replace the password generator.
    #[must_use]
    pub fn with_password_generator(mut self, generator: Arc<dyn PasswordGenerator>) -> Self {
        self.passwords = generator;
        self
    }

    #[must_use]
    pub fn resolver(&self) -> &IntAttrNameResolver {
        &self.resolver
    }

    #[must_use]
    pub fn cache(&self) -> &VirAttrCache {
        &self.cache
    }

    pub(crate) fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub(crate) fn evaluator(&self) -> &Arc<dyn ExpressionEvaluator> {
        &self.evaluator
    }

    pub(crate) fn transforms(&self) -> &TransformEngine {
        &self.transforms
    }

    /// Connector key value of `entity` under `provision`.
    ///
    /// Only fields, plain and derived schemas are followed; a key item
    /// pointing elsewhere yields `None`.
    pub fn connector_key_value(
        &self,
        entity: &Entity,
        resource: &ExternalResource,
        provision: &Provision,
    ) -> Result<Option<String>> {
        let item = provision.mapping.conn_object_key_item().ok_or_else(|| {
            ProvisioningError::MissingConnectorKey {
                resource: resource.key.clone(),
                any_type: provision.any_type.clone(),
            }
        })?;
        let reference = self.resolver.resolve(&item.int_attr_name, entity.kind)?;
        if reference.qualifier.is_some() {
            return Ok(None);
        }

        let values = self
            .local_values(entity, &reference.target)
            .into_iter()
            .map(|v| v.to_value_string())
            .collect();
        let values =
            self.transforms
                .apply_chain(&item.transformers, MappingDirection::Outbound, values);
        Ok(values.into_iter().next())
    }

    /// Remote name of `entity`: the object link if one is configured and
    /// evaluates to something, otherwise the connector key value.
    pub(crate) fn object_name(
        &self,
        entity: &Entity,
        provision: &Provision,
        key_value: Option<&str>,
    ) -> Option<String> {
        if let Some(link) = &provision.object_link {
            let context = accessor::expression_context(entity);
            match self.evaluator.evaluate(link, &context) {
                Ok(name) if !name.is_empty() => return Some(name),
                Ok(_) => debug!(link = %link, "Object link evaluated to nothing"),
                Err(e) => warn!(link = %link, error = %e, "Object link evaluation failed"),
            }
        }
        key_value.map(str::to_string)
    }

    /// Values read from the entity itself, without any remote or store access.
    fn local_values(&self, entity: &Entity, target: &AttrTarget) -> Vec<AttributeValue> {
        match target {
            AttrTarget::Field(name) if name == USER_OWNER || name == GROUP_OWNER => Vec::new(),
            AttrTarget::Field(name) => accessor::accessor(entity.kind, name)
                .and_then(|field| (field.get)(entity))
                .map(|value| vec![value.to_attribute_value()])
                .unwrap_or_default(),
            AttrTarget::Schema {
                schema_type: Some(SchemaType::Plain),
                name,
            } => plain_values(entity.plain_attr(name)),
            AttrTarget::Schema {
                schema_type: Some(SchemaType::Derived),
                name,
            } => self.derived_value(entity, name).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn derived_value(&self, entity: &Entity, schema: &str) -> Option<AttributeValue> {
        let derived = self.schemas.find_derived(schema)?;
        let context = accessor::expression_context(entity);
        match self.evaluator.evaluate(&derived.expression, &context) {
            Ok(value) if !value.is_empty() => Some(AttributeValue::String(value)),
            Ok(_) => None,
            Err(e) => {
                warn!(schema, entity = %entity.key, error = %e, "Derived attribute evaluation failed");
                None
            }
        }
    }

    /// Entities (or memberships) a reference reads from.
    async fn referenced(&self, entity: &Entity, qualifier: Option<&Qualifier>) -> Result<Vec<Referenced>> {
        let Some(qualifier) = qualifier else {
            return Ok(vec![Referenced::Entity(entity.clone())]);
        };

        match qualifier {
            Qualifier::Group(name) => {
                let membership = entity
                    .memberships
                    .iter()
                    .find(|m| &m.group_name == name)
                    .ok_or_else(|| ProvisioningError::no_reference(qualifier.to_string()))?;
                let group = self
                    .store
                    .find(AnyTypeKind::Group, membership.group)
                    .await?
                    .ok_or_else(|| ProvisioningError::no_reference(qualifier.to_string()))?;
                Ok(vec![Referenced::Entity(group)])
            }
            Qualifier::User(name) | Qualifier::AnyObject(name) => {
                let kind = if matches!(qualifier, Qualifier::User(_)) {
                    AnyTypeKind::User
                } else {
                    AnyTypeKind::AnyObject
                };
                let relationship = entity
                    .relationships
                    .iter()
                    .find(|r| r.other_end_kind == kind && &r.other_end_name == name)
                    .ok_or_else(|| ProvisioningError::no_reference(qualifier.to_string()))?;
                let related = self
                    .store
                    .find(kind, relationship.other_end)
                    .await?
                    .ok_or_else(|| ProvisioningError::no_reference(qualifier.to_string()))?;
                Ok(vec![Referenced::Entity(related)])
            }
            Qualifier::Relationship { rel_type, any_type } => {
                let mut related = Vec::new();
                for relationship in entity
                    .relationships
                    .iter()
                    .filter(|r| &r.rel_type == rel_type && &r.other_end_type == any_type)
                {
                    match self
                        .store
                        .find(relationship.other_end_kind, relationship.other_end)
                        .await?
                    {
                        Some(other) => related.push(Referenced::Entity(other)),
                        None => debug!(
                            entity = %entity.key,
                            other_end = %relationship.other_end,
                            "Related entity vanished"
                        ),
                    }
                }
                Ok(related)
            }
            Qualifier::Membership(name) => entity
                .membership(name)
                .cloned()
                .map(|m| vec![Referenced::Membership(m)])
                .ok_or_else(|| ProvisioningError::no_reference(qualifier.to_string())),
            Qualifier::Privileges(_) => Ok(Vec::new()),
        }
    }

    /// Every value an item reference yields for `entity`, before transforms.
    async fn reference_values(
        &self,
        entity: &Entity,
        reference: &InternalAttrReference,
        resource: &ExternalResource,
    ) -> Result<Vec<AttributeValue>> {
        if let Some(Qualifier::Privileges(application)) = &reference.qualifier {
            let privileges = self.store.privileges(&entity.roles, application).await?;
            return Ok(privileges.into_iter().map(AttributeValue::String).collect());
        }

        let mut values = Vec::new();
        for referenced in self.referenced(entity, reference.qualifier.as_ref()).await? {
            match (&referenced, &reference.target) {
                (Referenced::Entity(e), AttrTarget::Field(name))
                    if name == USER_OWNER || name == GROUP_OWNER =>
                {
                    values.extend(self.owner_name(e, name, resource).await?);
                }
                (
                    Referenced::Entity(e),
                    AttrTarget::Schema {
                        schema_type: Some(SchemaType::Virtual),
                        name,
                    },
                ) => {
                    values.extend(
                        self.fresh_virtual_values(e, name)
                            .await
                            .into_iter()
                            .map(AttributeValue::String),
                    );
                }
                (Referenced::Entity(e), target) => values.extend(self.local_values(e, target)),
                (
                    Referenced::Membership(m),
                    AttrTarget::Schema {
                        schema_type: Some(SchemaType::Plain),
                        name,
                    },
                ) => values.extend(plain_values(m.plain_attrs.get(name))),
                (Referenced::Membership(m), target) => {
                    debug!(group = %m.group_name, ?target, "Only plain schemas are read from memberships");
                }
            }
        }
        Ok(values)
    }

    /// Remote name of a group's owner on the same resource.
    async fn owner_name(
        &self,
        group: &Entity,
        field: &str,
        resource: &ExternalResource,
    ) -> Result<Option<AttributeValue>> {
        let owner = match field {
            USER_OWNER => match group.user_owner {
                Some(key) => self.store.find(AnyTypeKind::User, key).await?,
                None => None,
            },
            _ => match group.group_owner {
                Some(key) => self.store.find(AnyTypeKind::Group, key).await?,
                None => None,
            },
        };
        let Some(owner) = owner else {
            return Ok(None);
        };
        let Some(provision) = resource.provision(&owner.any_type) else {
            debug!(resource = %resource.key, owner = %owner.key, "Owner type not provisioned on resource");
            return Ok(None);
        };

        let key_value = self.connector_key_value(&owner, resource, provision)?;
        Ok(self
            .object_name(&owner, provision, key_value.as_deref())
            .map(AttributeValue::String))
    }
}

fn plain_values(attr: Option<&PlainAttr>) -> Vec<AttributeValue> {
    attr.map(|attr| {
        attr.effective_values()
            .into_iter()
            .map(plain_to_attribute)
            .collect()
    })
    .unwrap_or_default()
}

/// Coerce a plain value to a connector value, keeping native types where
/// the connector model has them.
#[must_use]
pub fn plain_to_attribute(value: &PlainValue) -> AttributeValue {
    match value {
        PlainValue::String(s) => AttributeValue::String(s.clone()),
        PlainValue::Long(l) => AttributeValue::Long(*l),
        PlainValue::Double(d) => AttributeValue::Double(*d),
        PlainValue::Boolean(b) => AttributeValue::Boolean(*b),
        PlainValue::Binary(b) => AttributeValue::Binary(b.clone()),
        PlainValue::Date(_) => AttributeValue::String(value.to_value_string()),
    }
}
