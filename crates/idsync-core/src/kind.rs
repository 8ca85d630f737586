//! Entity kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three kinds of identity records the platform manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnyTypeKind {
    /// A person or service account.
    User,
    /// A group users and any objects can be members of.
    Group,
    /// Any other typed object (printer, device, application...).
    AnyObject,
}

impl AnyTypeKind {
    /// Get all kinds.
    #[must_use]
    pub fn all() -> &'static [AnyTypeKind] {
        &[AnyTypeKind::User, AnyTypeKind::Group, AnyTypeKind::AnyObject]
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AnyTypeKind::User => "USER",
            AnyTypeKind::Group => "GROUP",
            AnyTypeKind::AnyObject => "ANY_OBJECT",
        }
    }

    /// Kind of an any type name: `USER` and `GROUP` are themselves, every
    /// other type is an any object.
    #[must_use]
    pub fn for_any_type(any_type: &str) -> Self {
        match any_type {
            "USER" => AnyTypeKind::User,
            "GROUP" => AnyTypeKind::Group,
            _ => AnyTypeKind::AnyObject,
        }
    }
}

impl fmt::Display for AnyTypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAnyTypeKindError(String);

impl fmt::Display for ParseAnyTypeKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown any type kind: {}", self.0)
    }
}

impl std::error::Error for ParseAnyTypeKindError {}

impl FromStr for AnyTypeKind {
    type Err = ParseAnyTypeKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USER" => Ok(AnyTypeKind::User),
            "GROUP" => Ok(AnyTypeKind::Group),
            "ANY_OBJECT" | "ANYOBJECT" => Ok(AnyTypeKind::AnyObject),
            _ => Err(ParseAnyTypeKindError(s.to_string())),
        }
    }
}
