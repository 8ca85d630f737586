//! Provisioning configuration.
//!
//! An [`ExternalResource`] carries one [`Provision`] per any type it
//! handles; each provision owns a [`Mapping`], the ordered list of
//! [`Item`]s translating internal attribute references into external
//! attribute names.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use idsync_core::ResourceKey;

use crate::capability::{Capabilities, ConnectorCapability};
use crate::operation::ObjectClass;

/// Direction a transformer applies in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingDirection {
    /// Internal to external (propagation, push).
    Outbound,
    /// External to internal (pull).
    Inbound,
    /// Both directions.
    #[default]
    Both,
}

impl MappingDirection {
    /// Whether a transformer configured for `self` runs when mapping in `direction`.
    #[must_use]
    pub fn applies_to(&self, direction: MappingDirection) -> bool {
        matches!(self, MappingDirection::Both) || *self == direction
    }
}

/// Value transformation primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    Lowercase,
    Uppercase,
    Trim,
    /// Replace every occurrence of `from` with `to`.
    Replace { from: String, to: String },
    /// Character range `[start, end)`.
    Substring {
        start: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end: Option<usize>,
    },
    /// Keep the given capture group (0 = whole match) or empty on no match.
    Regex {
        pattern: String,
        #[serde(default)]
        group: usize,
    },
    /// Value used when the input is empty or has no values at all.
    Default { value: String },
    /// Append `domain` unless the value already holds an `@`.
    EmailFormat { domain: String },
    /// Substitute `{value}` in a DN template.
    DnFormat { template: String },
    Chain { transforms: Vec<Transform> },
}

/// A transform bound to a direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTransformer {
    #[serde(default)]
    pub direction: MappingDirection,
    pub transform: Transform,
}

impl ItemTransformer {
    #[must_use]
    pub fn new(direction: MappingDirection, transform: Transform) -> Self {
        Self {
            direction,
            transform,
        }
    }

    /// A transformer applied in both directions.
    #[must_use]
    pub fn both(transform: Transform) -> Self {
        Self::new(MappingDirection::Both, transform)
    }
}

/// One mapping rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Internal attribute expression (`email`, `groups[admins].name`...).
    pub int_attr_name: String,
    /// External attribute name.
    pub ext_attr_name: String,
    /// Whether this item carries the connector key.
    #[serde(default)]
    pub conn_object_key: bool,
    /// Whether this item carries the password.
    #[serde(default)]
    pub password: bool,
    /// Expression evaluated against the entity; `"true"` makes the item mandatory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mandatory_condition: Option<String>,
    #[serde(default)]
    pub transformers: Vec<ItemTransformer>,
}

impl Item {
    pub fn new(int_attr_name: impl Into<String>, ext_attr_name: impl Into<String>) -> Self {
        Self {
            int_attr_name: int_attr_name.into(),
            ext_attr_name: ext_attr_name.into(),
            conn_object_key: false,
            password: false,
            mandatory_condition: None,
            transformers: Vec::new(),
        }
    }

    /// Builder: mark as connector key.
    #[must_use]
    pub fn connector_key(mut self) -> Self {
        self.conn_object_key = true;
        self
    }

    /// Builder: mark as password.
    #[must_use]
    pub fn password(mut self) -> Self {
        self.password = true;
        self
    }

    /// Builder: set the mandatory condition.
    #[must_use]
    pub fn mandatory_when(mut self, condition: impl Into<String>) -> Self {
        self.mandatory_condition = Some(condition.into());
        self
    }

    /// Builder: append a transformer.
    #[must_use]
    pub fn with_transformer(mut self, transformer: ItemTransformer) -> Self {
        self.transformers.push(transformer);
        self
    }
}

/// Ordered list of items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Mapping {
    #[must_use]
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    /// The connector key item, if any.
    #[must_use]
    pub fn conn_object_key_item(&self) -> Option<&Item> {
        self.items.iter().find(|i| i.conn_object_key)
    }

    /// Items whose internal name is exactly `int_attr_name`.
    pub fn items_for(&self, int_attr_name: &str) -> impl Iterator<Item = &Item> {
        let int_attr_name = int_attr_name.to_string();
        self.items
            .iter()
            .filter(move |i| i.int_attr_name == int_attr_name)
    }

    /// External names of every non-password item.
    #[must_use]
    pub fn ext_attr_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for item in self.items.iter().filter(|i| !i.password) {
            if !names.contains(&item.ext_attr_name) {
                names.push(item.ext_attr_name.clone());
            }
        }
        names
    }
}

/// Correlation rule used instead of connector key matching on pull.
///
/// Every listed internal attribute must equal the value the corresponding
/// mapping item reads from the remote object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationRule {
    pub int_attr_names: Vec<String>,
}

/// One resource's handling of one any type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provision {
    /// Any type name (`USER`, `GROUP`, `PRINTER`...).
    pub any_type: String,
    pub object_class: ObjectClass,
    #[serde(default)]
    pub mapping: Mapping,
    /// Expression producing the remote naming attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_rule: Option<CorrelationRule>,
}

impl Provision {
    pub fn new(any_type: impl Into<String>, object_class: ObjectClass, mapping: Mapping) -> Self {
        Self {
            any_type: any_type.into(),
            object_class,
            mapping,
            object_link: None,
            correlation_rule: None,
        }
    }

    #[must_use]
    pub fn with_object_link(mut self, expression: impl Into<String>) -> Self {
        self.object_link = Some(expression.into());
        self
    }

    #[must_use]
    pub fn with_correlation_rule(mut self, rule: CorrelationRule) -> Self {
        self.correlation_rule = Some(rule);
        self
    }
}

/// A target system and its provisioning configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalResource {
    pub key: ResourceKey,
    #[serde(default)]
    pub capabilities: Capabilities,
    /// Connector call timeout; the gateway default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Lower runs first; `None` means no ordering requirement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagation_priority: Option<i32>,
    /// Generate a password when none is supplied or stored.
    #[serde(default)]
    pub random_pwd_if_not_provided: bool,
    #[serde(default)]
    pub provisions: Vec<Provision>,
}

impl ExternalResource {
    pub fn new(key: impl Into<ResourceKey>, capabilities: Capabilities) -> Self {
        Self {
            key: key.into(),
            capabilities,
            timeout_secs: None,
            propagation_priority: None,
            random_pwd_if_not_provided: false,
            provisions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_provision(mut self, provision: Provision) -> Self {
        self.provisions.push(provision);
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.propagation_priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Provision for an any type.
    #[must_use]
    pub fn provision(&self, any_type: &str) -> Option<&Provision> {
        self.provisions.iter().find(|p| p.any_type == any_type)
    }

    /// Whether the resource declares a capability.
    #[must_use]
    pub fn has_capability(&self, capability: ConnectorCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Effective call timeout.
    #[must_use]
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_secs.map_or(default, Duration::from_secs)
    }
}
