//! Remote schema description returned by a connector's `schema` operation.

use serde::{Deserialize, Serialize};

/// Schema of a target system: the object classes it exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub object_classes: Vec<ObjectClassInfo>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add an object class.
    #[must_use]
    pub fn with_object_class(mut self, object_class: ObjectClassInfo) -> Self {
        self.object_classes.push(object_class);
        self
    }

    /// Get an object class by name.
    #[must_use]
    pub fn get_object_class(&self, name: &str) -> Option<&ObjectClassInfo> {
        self.object_classes.iter().find(|oc| oc.name == name)
    }
}

/// One object class and its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectClassInfo {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeInfo>,
}

impl ObjectClassInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeInfo) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Get an attribute by name.
    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// Attribute metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub name: String,
    #[serde(default)]
    pub multi_valued: bool,
    #[serde(default)]
    pub required: bool,
}

impl AttributeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            multi_valued: false,
            required: false,
        }
    }

    #[must_use]
    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}
