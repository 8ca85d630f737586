//! Attribute schemas.
//!
//! Plain schemas hold stored values, derived schemas compute a value from an
//! expression, virtual schemas are read from (and written to) an external
//! resource and never persisted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::ResourceKey;
use crate::traits::SchemaStore;

/// The three schema families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaType {
    Plain,
    Derived,
    Virtual,
}

impl SchemaType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Plain => "PLAIN",
            SchemaType::Derived => "DERIVED",
            SchemaType::Virtual => "VIRTUAL",
        }
    }
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Value type of a plain schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrSchemaType {
    #[default]
    String,
    Long,
    Double,
    Boolean,
    Date,
    Binary,
}

/// A stored-value schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainSchema {
    pub key: String,
    #[serde(default)]
    pub value_type: AttrSchemaType,
    #[serde(default)]
    pub multivalue: bool,
    #[serde(default)]
    pub unique_constraint: bool,
}

impl PlainSchema {
    pub fn new(key: impl Into<String>, value_type: AttrSchemaType) -> Self {
        Self {
            key: key.into(),
            value_type,
            multivalue: false,
            unique_constraint: false,
        }
    }

    #[must_use]
    pub fn multivalue(mut self) -> Self {
        self.multivalue = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique_constraint = true;
        self
    }
}

/// A schema whose value is an expression over plain attributes and fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerSchema {
    pub key: String,
    pub expression: String,
}

impl DerSchema {
    pub fn new(key: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            expression: expression.into(),
        }
    }
}

/// A schema whose values live on an external resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirSchema {
    pub key: String,
    /// Resource the values are read from.
    pub resource: ResourceKey,
    /// Any type whose provision on `resource` is used for the lookup.
    pub any_type: String,
    /// Name of the attribute on the remote object.
    pub ext_attr_name: String,
    #[serde(default)]
    pub readonly: bool,
}

impl VirSchema {
    pub fn new(
        key: impl Into<String>,
        resource: impl Into<ResourceKey>,
        any_type: impl Into<String>,
        ext_attr_name: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            resource: resource.into(),
            any_type: any_type.into(),
            ext_attr_name: ext_attr_name.into(),
            readonly: false,
        }
    }
}

/// In-memory snapshot of every schema known to the platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaCatalog {
    #[serde(default)]
    plain: HashMap<String, PlainSchema>,
    #[serde(default)]
    derived: HashMap<String, DerSchema>,
    #[serde(default)]
    virtuals: HashMap<String, VirSchema>,
}

impl SchemaCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_plain(&mut self, schema: PlainSchema) -> &mut Self {
        self.plain.insert(schema.key.clone(), schema);
        self
    }

    pub fn add_derived(&mut self, schema: DerSchema) -> &mut Self {
        self.derived.insert(schema.key.clone(), schema);
        self
    }

    pub fn add_virtual(&mut self, schema: VirSchema) -> &mut Self {
        self.virtuals.insert(schema.key.clone(), schema);
        self
    }

    /// Builder variant of [`SchemaCatalog::add_plain`].
    #[must_use]
    pub fn with_plain(mut self, schema: PlainSchema) -> Self {
        self.add_plain(schema);
        self
    }

    /// Builder variant of [`SchemaCatalog::add_derived`].
    #[must_use]
    pub fn with_derived(mut self, schema: DerSchema) -> Self {
        self.add_derived(schema);
        self
    }

    /// Builder variant of [`SchemaCatalog::add_virtual`].
    #[must_use]
    pub fn with_virtual(mut self, schema: VirSchema) -> Self {
        self.add_virtual(schema);
        self
    }
}

impl SchemaStore for SchemaCatalog {
    fn find_plain(&self, key: &str) -> Option<PlainSchema> {
        self.plain.get(key).cloned()
    }

    fn find_derived(&self, key: &str) -> Option<DerSchema> {
        self.derived.get(key).cloned()
    }

    fn find_virtual(&self, key: &str) -> Option<VirSchema> {
        self.virtuals.get(key).cloned()
    }
}
