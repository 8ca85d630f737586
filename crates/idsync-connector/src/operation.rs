//! Connector operation types
//!
//! Wire-neutral types exchanged with connectors: object classes, UIDs,
//! multi-valued attribute sets, filters, cookie pagination and sync deltas.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of the attribute carrying the remote unique identifier.
pub const UID: &str = "__UID__";

/// Name of the attribute carrying the remote naming attribute.
pub const NAME: &str = "__NAME__";

/// Name of the enable/disable marker attribute.
pub const ENABLE: &str = "__ENABLE__";

/// Name of the password attribute.
pub const PASSWORD: &str = "__PASSWORD__";

/// Whether an attribute name is one of the operational names above.
#[must_use]
pub fn is_special(name: &str) -> bool {
    name.starts_with("__") && name.ends_with("__")
}

/// Kind of remote object a connector operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectClass(String);

impl ObjectClass {
    /// Accounts (users).
    pub const ACCOUNT: &'static str = "__ACCOUNT__";
    /// Groups.
    pub const GROUP: &'static str = "__GROUP__";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn account() -> Self {
        Self::new(Self::ACCOUNT)
    }

    #[must_use]
    pub fn group() -> Self {
        Self::new(Self::GROUP)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectClass {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier of an object in a target system.
///
/// Different systems use different identifier schemes (DN, primary key,
/// REST resource id); the value is always carried as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uid {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Uid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Boolean(bool),
    Long(i64),
    Double(f64),
    String(String),
    /// Binary data.
    Binary(Vec<u8>),
}

impl AttributeValue {
    /// Get as a string if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as a boolean, accepting `"true"`/`"false"` strings.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            AttributeValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Render the value as a string.
    #[must_use]
    pub fn to_value_string(&self) -> String {
        match self {
            AttributeValue::Boolean(b) => b.to_string(),
            AttributeValue::Long(l) => l.to_string(),
            AttributeValue::Double(d) => d.to_string(),
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Binary(b) => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD.encode(b)
            }
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Long(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Double(f)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue::Binary(bytes)
    }
}

/// Multi-valued attributes keyed by external name.
///
/// Every attribute holds a value list; single-valued attributes simply hold
/// one element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet {
    attributes: BTreeMap<String, Vec<AttributeValue>>,
}

impl AttributeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the values of an attribute.
    pub fn set(&mut self, name: impl Into<String>, values: Vec<AttributeValue>) {
        self.attributes.insert(name.into(), values);
    }

    /// Set a single-valued attribute.
    pub fn set_single(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), vec![value.into()]);
    }

    /// Builder variant of [`AttributeSet::set_single`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set_single(name, value);
        self
    }

    /// Builder variant of [`AttributeSet::set`].
    #[must_use]
    pub fn with_values(mut self, name: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        self.set(name, values);
        self
    }

    /// Union `values` into an attribute, skipping values already present.
    ///
    /// Creates the attribute if missing, even when `values` is empty.
    pub fn merge(&mut self, name: impl Into<String>, values: Vec<AttributeValue>) {
        let existing = self.attributes.entry(name.into()).or_default();
        for value in values {
            if !existing.contains(&value) {
                existing.push(value);
            }
        }
    }

    /// Get the values of an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[AttributeValue]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// Get the first value of an attribute.
    #[must_use]
    pub fn get_single(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name).and_then(|values| values.first())
    }

    /// Get the first value of an attribute rendered as a string.
    #[must_use]
    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get_single(name).map(AttributeValue::to_value_string)
    }

    /// Get all values of an attribute rendered as strings.
    #[must_use]
    pub fn get_strings(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|values| values.iter().map(AttributeValue::to_value_string).collect())
            .unwrap_or_default()
    }

    /// Check if an attribute exists.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<Vec<AttributeValue>> {
        self.attributes.remove(name)
    }

    /// Get all attribute names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over all attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<AttributeValue>)> {
        self.attributes.iter()
    }

    /// Keep only the named attributes.
    #[must_use]
    pub fn project(&self, names: &[String]) -> Self {
        self.attributes
            .iter()
            .filter(|(name, _)| names.iter().any(|n| n == *name))
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect()
    }
}

impl FromIterator<(String, Vec<AttributeValue>)> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = (String, Vec<AttributeValue>)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for AttributeSet {
    type Item = (String, Vec<AttributeValue>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Vec<AttributeValue>>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.into_iter()
    }
}

/// An object read from a target system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorObject {
    pub object_class: ObjectClass,
    pub uid: Uid,
    /// Value of the naming attribute.
    pub name: String,
    #[serde(default)]
    pub attributes: AttributeSet,
}

impl ConnectorObject {
    pub fn new(
        object_class: ObjectClass,
        uid: impl Into<Uid>,
        name: impl Into<String>,
        attributes: AttributeSet,
    ) -> Self {
        Self {
            object_class,
            uid: uid.into(),
            name: name.into(),
            attributes,
        }
    }

    /// Look up an attribute, resolving the operational `__UID__` and
    /// `__NAME__` names to the object's identity.
    #[must_use]
    pub fn values_of(&self, name: &str) -> Vec<AttributeValue> {
        match name {
            UID => vec![AttributeValue::String(self.uid.value().to_string())],
            NAME => vec![AttributeValue::String(self.name.clone())],
            other => self.attributes.get(other).map(<[_]>::to_vec).unwrap_or_default(),
        }
    }
}

/// Filter for search operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Match objects where attribute equals value.
    Equals { attribute: String, value: String },

    /// Match objects where attribute contains value (substring).
    Contains { attribute: String, value: String },

    /// Match objects where attribute starts with value.
    StartsWith { attribute: String, value: String },

    /// Match objects where attribute exists (has any value).
    Present { attribute: String },

    /// Logical AND of multiple filters.
    And { filters: Vec<Filter> },

    /// Logical OR of multiple filters.
    Or { filters: Vec<Filter> },

    /// Logical NOT of a filter.
    Not { filter: Box<Filter> },
}

impl Filter {
    /// Create an equals filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a contains filter.
    pub fn contains(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Contains {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a present (attribute exists) filter.
    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    /// Create a NOT filter (negation).
    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// Combine this filter with another using AND.
    #[must_use]
    pub fn and_with(self, other: Filter) -> Self {
        match self {
            Filter::And { mut filters } => {
                filters.push(other);
                Filter::And { filters }
            }
            _ => Filter::And {
                filters: vec![self, other],
            },
        }
    }

    /// Combine this filter with another using OR.
    #[must_use]
    pub fn or_with(self, other: Filter) -> Self {
        match self {
            Filter::Or { mut filters } => {
                filters.push(other);
                Filter::Or { filters }
            }
            _ => Filter::Or {
                filters: vec![self, other],
            },
        }
    }

    /// Evaluate the filter against an object.
    ///
    /// Connectors backed by in-memory or non-queryable stores use this to
    /// filter client side.
    #[must_use]
    pub fn matches(&self, object: &ConnectorObject) -> bool {
        let strings = |attribute: &str| -> Vec<String> {
            object
                .values_of(attribute)
                .iter()
                .map(AttributeValue::to_value_string)
                .collect()
        };

        match self {
            Filter::Equals { attribute, value } => strings(attribute).iter().any(|v| v == value),
            Filter::Contains { attribute, value } => {
                strings(attribute).iter().any(|v| v.contains(value.as_str()))
            }
            Filter::StartsWith { attribute, value } => {
                strings(attribute).iter().any(|v| v.starts_with(value.as_str()))
            }
            Filter::Present { attribute } => !object.values_of(attribute).is_empty(),
            Filter::And { filters } => filters.iter().all(|f| f.matches(object)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(object)),
            Filter::Not { filter } => !filter.matches(object),
        }
    }
}

/// Cookie-based pagination request for search operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Maximum number of results to return.
    pub page_size: u32,

    /// Cookie returned with the previous page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
}

impl PageRequest {
    /// Create a first-page request with the given page size.
    #[must_use]
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            cookie: None,
        }
    }

    /// Set the cookie of the next page.
    #[must_use]
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(100)
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matching objects.
    pub objects: Vec<ConnectorObject>,

    /// Cookie for the next page; `None` on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
}

impl SearchResult {
    /// Create a last-page result.
    #[must_use]
    pub fn new(objects: Vec<ConnectorObject>) -> Self {
        Self {
            objects,
            cookie: None,
        }
    }

    /// Create an empty search result.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set the next-page cookie.
    #[must_use]
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }
}

/// Opaque resource-defined synchronization position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncToken(pub serde_json::Value);

impl SyncToken {
    pub fn new(value: impl Into<serde_json::Value>) -> Self {
        Self(value.into())
    }
}

/// Kind of change carried by a [`SyncDelta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncDeltaType {
    Create,
    Update,
    CreateOrUpdate,
    Delete,
}

impl SyncDeltaType {
    /// Whether the delta removes the remote object.
    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(self, SyncDeltaType::Delete)
    }
}

/// One inbound change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncDelta {
    pub delta_type: SyncDeltaType,
    /// Remote key of the changed object.
    pub uid: Uid,
    /// Snapshot of the remote object; absent for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ConnectorObject>,
    /// Position after this change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SyncToken>,
}

impl SyncDelta {
    /// A create-or-update delta carrying the remote object.
    #[must_use]
    pub fn create_or_update(object: ConnectorObject) -> Self {
        Self {
            delta_type: SyncDeltaType::CreateOrUpdate,
            uid: object.uid.clone(),
            object: Some(object),
            token: None,
        }
    }

    /// A delete delta.
    pub fn delete(uid: impl Into<Uid>) -> Self {
        Self {
            delta_type: SyncDeltaType::Delete,
            uid: uid.into(),
            object: None,
            token: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: SyncToken) -> Self {
        self.token = Some(token);
        self
    }
}

/// One batch of sync deltas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub deltas: Vec<SyncDelta>,
    /// Position after the last delta of the batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_token: Option<SyncToken>,
    /// Whether more deltas are waiting.
    #[serde(default)]
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object() -> ConnectorObject {
        ConnectorObject::new(
            ObjectClass::account(),
            "uid-1",
            "rossini",
            AttributeSet::new()
                .with("mail", "rossini@example.com")
                .with_values("memberOf", vec!["admins".into(), "staff".into()]),
        )
    }

    #[test]
    fn test_merge_skips_present_values() {
        let mut attrs = AttributeSet::new().with("mail", "a@x.com");
        attrs.merge("mail", vec!["a@x.com".into(), "b@x.com".into()]);
        assert_eq!(attrs.get_strings("mail"), vec!["a@x.com", "b@x.com"]);

        attrs.merge("phone", Vec::new());
        assert!(attrs.has("phone"));
    }

    #[test]
    fn test_values_of_special_names() {
        let object = object();
        assert_eq!(object.values_of(UID), vec![AttributeValue::from("uid-1")]);
        assert_eq!(object.values_of(NAME), vec![AttributeValue::from("rossini")]);
        assert!(object.values_of("missing").is_empty());
    }

    #[test]
    fn test_filter_matches() {
        let object = object();
        assert!(Filter::eq("memberOf", "staff").matches(&object));
        assert!(Filter::eq(NAME, "rossini")
            .and_with(Filter::present("mail"))
            .matches(&object));
        assert!(Filter::negate(Filter::contains("mail", "nowhere")).matches(&object));
        assert!(!Filter::eq("mail", "other@example.com")
            .or_with(Filter::present("phone"))
            .matches(&object));
    }

    #[test]
    fn test_project_keeps_requested() {
        let projected = object().attributes.project(&["mail".to_string()]);
        assert_eq!(projected.len(), 1);
        assert!(projected.has("mail"));
    }

    #[test]
    fn test_attribute_set_serialization() {
        let attrs = AttributeSet::new()
            .with("email", "john@example.com")
            .with("age", 30i64)
            .with("active", true);

        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(json["active"], serde_json::json!([true]));

        let parsed: AttributeSet = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.get_string("email").as_deref(), Some("john@example.com"));
        assert_eq!(parsed.get_single("age"), Some(&AttributeValue::Long(30)));
    }

    #[test]
    fn test_delete_delta_has_no_object() {
        let delta = SyncDelta::delete("uid-9").with_token(SyncToken::new(42));
        assert!(delta.delta_type.is_delete());
        assert!(delta.object.is_none());
        assert_eq!(delta.token, Some(SyncToken(serde_json::json!(42))));
    }
}
