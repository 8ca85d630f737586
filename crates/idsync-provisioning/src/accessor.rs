//! Field accessor tables.
//!
//! Each entity kind exposes a fixed set of named fields (`username`,
//! `realm`, `userOwner`...). Mapping items reference them by name; these
//! tables give the typed getter and, for writable fields, the setter used by
//! inbound mapping.

use chrono::{DateTime, Utc};
use serde_json::Value;

use idsync_connector::AttributeValue;
use idsync_core::{AnyTypeKind, Entity, EntityKey};

use crate::expression::ExpressionContext;

/// Typed value read from an entity field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
    Timestamp(DateTime<Utc>),
    Key(EntityKey),
}

impl FieldValue {
    /// Coerce to a connector value: booleans stay native, timestamps are
    /// formatted as RFC 3339, everything else becomes a string.
    #[must_use]
    pub fn to_attribute_value(&self) -> AttributeValue {
        match self {
            FieldValue::Flag(b) => AttributeValue::Boolean(*b),
            other => AttributeValue::String(other.to_value_string()),
        }
    }

    #[must_use]
    pub fn to_value_string(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Flag(b) => b.to_string(),
            FieldValue::Timestamp(t) => t.to_rfc3339(),
            FieldValue::Key(k) => k.to_string(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            FieldValue::Flag(b) => Value::Bool(*b),
            other => Value::String(other.to_value_string()),
        }
    }
}

type Getter = fn(&Entity) -> Option<FieldValue>;
type Setter = fn(&mut Entity, &str);

/// Named field of an entity kind.
#[derive(Debug, Clone, Copy)]
pub struct FieldAccessor {
    pub name: &'static str,
    pub get: Getter,
    /// `None` for fields inbound mapping cannot write.
    pub set: Option<Setter>,
}

pub const KEY: &str = "key";
pub const USERNAME: &str = "username";
pub const NAME: &str = "name";
pub const PASSWORD: &str = "password";
pub const USER_OWNER: &str = "userOwner";
pub const GROUP_OWNER: &str = "groupOwner";

fn get_key(e: &Entity) -> Option<FieldValue> {
    Some(FieldValue::Key(e.key))
}

fn get_name(e: &Entity) -> Option<FieldValue> {
    Some(FieldValue::Text(e.name.clone()))
}

fn set_name(e: &mut Entity, value: &str) {
    e.name = value.to_string();
}

fn get_realm(e: &Entity) -> Option<FieldValue> {
    Some(FieldValue::Text(e.realm.clone()))
}

fn set_realm(e: &mut Entity, value: &str) {
    e.realm = value.to_string();
}

fn get_status(e: &Entity) -> Option<FieldValue> {
    e.status.clone().map(FieldValue::Text)
}

fn set_status(e: &mut Entity, value: &str) {
    e.status = Some(value.to_string());
}

fn get_any_type(e: &Entity) -> Option<FieldValue> {
    Some(FieldValue::Text(e.any_type.clone()))
}

fn get_password(_: &Entity) -> Option<FieldValue> {
    None
}

fn get_suspended(e: &Entity) -> Option<FieldValue> {
    e.suspended.map(FieldValue::Flag)
}

fn get_must_change_password(e: &Entity) -> Option<FieldValue> {
    Some(FieldValue::Flag(e.must_change_password))
}

fn set_must_change_password(e: &mut Entity, value: &str) {
    e.must_change_password = value.trim().eq_ignore_ascii_case("true");
}

fn get_creation_date(e: &Entity) -> Option<FieldValue> {
    e.creation_date.map(FieldValue::Timestamp)
}

fn get_last_change_date(e: &Entity) -> Option<FieldValue> {
    e.last_change_date.map(FieldValue::Timestamp)
}

fn get_user_owner(e: &Entity) -> Option<FieldValue> {
    e.user_owner.map(FieldValue::Key)
}

fn get_group_owner(e: &Entity) -> Option<FieldValue> {
    e.group_owner.map(FieldValue::Key)
}

static USER_FIELDS: &[FieldAccessor] = &[
    FieldAccessor { name: KEY, get: get_key, set: None },
    FieldAccessor { name: USERNAME, get: get_name, set: Some(set_name) },
    FieldAccessor { name: PASSWORD, get: get_password, set: None },
    FieldAccessor { name: "realm", get: get_realm, set: Some(set_realm) },
    FieldAccessor { name: "status", get: get_status, set: Some(set_status) },
    FieldAccessor { name: "type", get: get_any_type, set: None },
    FieldAccessor { name: "suspended", get: get_suspended, set: None },
    FieldAccessor {
        name: "mustChangePassword",
        get: get_must_change_password,
        set: Some(set_must_change_password),
    },
    FieldAccessor { name: "creationDate", get: get_creation_date, set: None },
    FieldAccessor { name: "lastChangeDate", get: get_last_change_date, set: None },
];

static GROUP_FIELDS: &[FieldAccessor] = &[
    FieldAccessor { name: KEY, get: get_key, set: None },
    FieldAccessor { name: NAME, get: get_name, set: Some(set_name) },
    FieldAccessor { name: "realm", get: get_realm, set: Some(set_realm) },
    FieldAccessor { name: "type", get: get_any_type, set: None },
    FieldAccessor { name: USER_OWNER, get: get_user_owner, set: None },
    FieldAccessor { name: GROUP_OWNER, get: get_group_owner, set: None },
    FieldAccessor { name: "creationDate", get: get_creation_date, set: None },
    FieldAccessor { name: "lastChangeDate", get: get_last_change_date, set: None },
];

static ANY_OBJECT_FIELDS: &[FieldAccessor] = &[
    FieldAccessor { name: KEY, get: get_key, set: None },
    FieldAccessor { name: NAME, get: get_name, set: Some(set_name) },
    FieldAccessor { name: "realm", get: get_realm, set: Some(set_realm) },
    FieldAccessor { name: "status", get: get_status, set: Some(set_status) },
    FieldAccessor { name: "type", get: get_any_type, set: None },
    FieldAccessor { name: "creationDate", get: get_creation_date, set: None },
    FieldAccessor { name: "lastChangeDate", get: get_last_change_date, set: None },
];

/// Every field of a kind.
#[must_use]
pub fn accessors(kind: AnyTypeKind) -> &'static [FieldAccessor] {
    match kind {
        AnyTypeKind::User => USER_FIELDS,
        AnyTypeKind::Group => GROUP_FIELDS,
        AnyTypeKind::AnyObject => ANY_OBJECT_FIELDS,
    }
}

/// The accessor for a field name, if the kind has that field.
#[must_use]
pub fn accessor(kind: AnyTypeKind, name: &str) -> Option<&'static FieldAccessor> {
    accessors(kind).iter().find(|a| a.name == name)
}

#[must_use]
pub fn is_field(kind: AnyTypeKind, name: &str) -> bool {
    accessor(kind, name).is_some()
}

/// Expression variables for an entity: its fields followed by its plain
/// attributes. Single values are exposed as scalars, multiple as arrays.
#[must_use]
pub fn expression_context(entity: &Entity) -> ExpressionContext {
    let mut context = ExpressionContext::new();

    for field in accessors(entity.kind) {
        if let Some(value) = (field.get)(entity) {
            context.set(field.name, value.to_json());
        }
    }

    for (schema, attr) in &entity.plain_attrs {
        let mut values: Vec<Value> = attr.effective_values().into_iter().map(|v| v.to_json()).collect();
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Array(values)
        };
        context.set(schema.clone(), value);
    }

    context
}
