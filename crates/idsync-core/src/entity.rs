//! Identity records: users, groups and any objects.
//!
//! A single [`Entity`] struct carries all three kinds; fields that only make
//! sense for one kind (ownership for groups, password for users) are
//! optional and simply left empty elsewhere.

use std::collections::{BTreeMap, BTreeSet};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EntityKey, ResourceKey};
use crate::kind::AnyTypeKind;

/// Any type name of users.
pub const USER_TYPE: &str = "USER";

/// Any type name of groups.
pub const GROUP_TYPE: &str = "GROUP";

/// A typed plain attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PlainValue {
    String(String),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Binary(Vec<u8>),
}

impl PlainValue {
    /// Render the value the way it is sent to resources and expressions.
    ///
    /// Dates use RFC 3339, binaries are base64 encoded.
    #[must_use]
    pub fn to_value_string(&self) -> String {
        match self {
            PlainValue::String(s) => s.clone(),
            PlainValue::Long(l) => l.to_string(),
            PlainValue::Double(d) => d.to_string(),
            PlainValue::Boolean(b) => b.to_string(),
            PlainValue::Date(d) => d.to_rfc3339(),
            PlainValue::Binary(b) => STANDARD.encode(b),
        }
    }

    /// Convert into a JSON value, keeping native booleans and numbers.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PlainValue::Long(l) => serde_json::Value::from(*l),
            PlainValue::Double(d) => serde_json::Value::from(*d),
            PlainValue::Boolean(b) => serde_json::Value::Bool(*b),
            other => serde_json::Value::String(other.to_value_string()),
        }
    }
}

impl From<&str> for PlainValue {
    fn from(s: &str) -> Self {
        PlainValue::String(s.to_string())
    }
}

impl From<String> for PlainValue {
    fn from(s: String) -> Self {
        PlainValue::String(s)
    }
}

impl From<i64> for PlainValue {
    fn from(l: i64) -> Self {
        PlainValue::Long(l)
    }
}

impl From<bool> for PlainValue {
    fn from(b: bool) -> Self {
        PlainValue::Boolean(b)
    }
}

/// Values of one plain schema on one entity (or membership).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainAttr {
    /// Schema key.
    pub schema: String,
    /// Multi-valued content (empty when the schema is unique).
    #[serde(default)]
    pub values: Vec<PlainValue>,
    /// Value held under a unique constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_value: Option<PlainValue>,
}

impl PlainAttr {
    /// Create a (possibly multi-valued) attribute.
    pub fn new(schema: impl Into<String>, values: Vec<PlainValue>) -> Self {
        Self {
            schema: schema.into(),
            values,
            unique_value: None,
        }
    }

    /// Create an attribute bound by a unique constraint.
    pub fn unique(schema: impl Into<String>, value: PlainValue) -> Self {
        Self {
            schema: schema.into(),
            values: Vec::new(),
            unique_value: Some(value),
        }
    }

    /// The unique value if present, otherwise the full value list.
    #[must_use]
    pub fn effective_values(&self) -> Vec<&PlainValue> {
        match &self.unique_value {
            Some(v) => vec![v],
            None => self.values.iter().collect(),
        }
    }

    /// Effective values rendered as strings.
    #[must_use]
    pub fn values_as_strings(&self) -> Vec<String> {
        self.effective_values()
            .into_iter()
            .map(PlainValue::to_value_string)
            .collect()
    }
}

/// Membership of an entity in a group, with membership-scoped attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    /// Group key.
    pub group: EntityKey,
    /// Group name.
    pub group_name: String,
    /// Attributes scoped to this membership.
    #[serde(default)]
    pub plain_attrs: BTreeMap<String, PlainAttr>,
}

impl Membership {
    pub fn new(group: EntityKey, group_name: impl Into<String>) -> Self {
        Self {
            group,
            group_name: group_name.into(),
            plain_attrs: BTreeMap::new(),
        }
    }

    /// Add or replace a membership attribute.
    pub fn set_plain_attr(&mut self, attr: PlainAttr) {
        self.plain_attrs.insert(attr.schema.clone(), attr);
    }
}

/// Typed relationship to another user or any object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Relationship type (e.g. `neighborhood`).
    pub rel_type: String,
    /// Key of the other end.
    pub other_end: EntityKey,
    /// Kind of the other end.
    pub other_end_kind: AnyTypeKind,
    /// Any type name of the other end (`USER`, `PRINTER`...).
    pub other_end_type: String,
    /// Name of the other end (username for users).
    pub other_end_name: String,
}

/// An account on one resource owned by a user but mapped independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedAccount {
    pub key: EntityKey,
    pub resource: ResourceKey,
    /// Connector key value identifying the remote account.
    pub conn_object_key_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Encoded stored secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended: Option<bool>,
    #[serde(default)]
    pub plain_attrs: BTreeMap<String, PlainAttr>,
}

/// A user, group or any object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: EntityKey,
    pub kind: AnyTypeKind,
    /// Any type name: `USER`, `GROUP` or an any object type such as `PRINTER`.
    pub any_type: String,
    /// Username for users, name for groups and any objects.
    pub name: String,
    pub realm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended: Option<bool>,
    #[serde(default)]
    pub must_change_password: bool,
    /// Encoded stored secret (users only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_change_date: Option<DateTime<Utc>>,
    /// Owning user (groups only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_owner: Option<EntityKey>,
    /// Owning group (groups only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_owner: Option<EntityKey>,
    #[serde(default)]
    pub plain_attrs: BTreeMap<String, PlainAttr>,
    /// Derived and virtual schemas this entity is allowed to expose.
    #[serde(default)]
    pub allowed_schemas: BTreeSet<String>,
    #[serde(default)]
    pub memberships: Vec<Membership>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub resources: BTreeSet<ResourceKey>,
    #[serde(default)]
    pub linked_accounts: Vec<LinkedAccount>,
    /// Role keys (users only).
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Entity {
    /// Create an empty entity of the given kind and any type.
    pub fn new(kind: AnyTypeKind, any_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: EntityKey::new(),
            kind,
            any_type: any_type.into(),
            name: name.into(),
            realm: "/".to_string(),
            status: None,
            suspended: None,
            must_change_password: false,
            password: None,
            creation_date: Some(Utc::now()),
            last_change_date: None,
            user_owner: None,
            group_owner: None,
            plain_attrs: BTreeMap::new(),
            allowed_schemas: BTreeSet::new(),
            memberships: Vec::new(),
            relationships: Vec::new(),
            resources: BTreeSet::new(),
            linked_accounts: Vec::new(),
            roles: Vec::new(),
        }
    }

    /// Create a user.
    pub fn user(username: impl Into<String>) -> Self {
        Self::new(AnyTypeKind::User, USER_TYPE, username)
    }

    /// Create a group.
    pub fn group(name: impl Into<String>) -> Self {
        Self::new(AnyTypeKind::Group, GROUP_TYPE, name)
    }

    /// Create an any object of the given type.
    pub fn any_object(any_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(AnyTypeKind::AnyObject, any_type, name)
    }

    /// Builder: add a multi-valued plain attribute.
    #[must_use]
    pub fn with_plain<V: Into<PlainValue>>(mut self, schema: &str, values: Vec<V>) -> Self {
        self.set_plain_attr(PlainAttr::new(
            schema,
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Builder: add a unique plain attribute.
    #[must_use]
    pub fn with_unique<V: Into<PlainValue>>(mut self, schema: &str, value: V) -> Self {
        self.set_plain_attr(PlainAttr::unique(schema, value.into()));
        self
    }

    /// Builder: link a resource.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<ResourceKey>) -> Self {
        self.resources.insert(resource.into());
        self
    }

    /// Builder: allow a derived or virtual schema.
    #[must_use]
    pub fn with_allowed_schema(mut self, schema: &str) -> Self {
        self.allowed_schemas.insert(schema.to_string());
        self
    }

    /// Builder: add a group membership.
    #[must_use]
    pub fn with_membership(mut self, membership: Membership) -> Self {
        self.memberships.push(membership);
        self
    }

    /// Builder: add a relationship.
    #[must_use]
    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Add or replace a plain attribute.
    pub fn set_plain_attr(&mut self, attr: PlainAttr) {
        self.plain_attrs.insert(attr.schema.clone(), attr);
    }

    /// Get a plain attribute.
    #[must_use]
    pub fn plain_attr(&self, schema: &str) -> Option<&PlainAttr> {
        self.plain_attrs.get(schema)
    }

    /// Find the membership of the named group.
    #[must_use]
    pub fn membership(&self, group_name: &str) -> Option<&Membership> {
        self.memberships.iter().find(|m| m.group_name == group_name)
    }

    /// Find the membership of the named group, creating it on demand.
    pub fn membership_mut_or_insert(&mut self, group: EntityKey, group_name: &str) -> &mut Membership {
        let idx = match self
            .memberships
            .iter()
            .position(|m| m.group_name == group_name)
        {
            Some(idx) => idx,
            None => {
                self.memberships.push(Membership::new(group, group_name));
                self.memberships.len() - 1
            }
        };
        &mut self.memberships[idx]
    }

    /// Whether this entity is linked to the resource.
    #[must_use]
    pub fn has_resource(&self, resource: &ResourceKey) -> bool {
        self.resources.contains(resource)
    }
}
