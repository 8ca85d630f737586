//! Connector capabilities.
//!
//! A resource declares which operations its connector may perform; the
//! gateway turns calls to undeclared operations into silent no-ops.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An operation a resource may allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorCapability {
    Authenticate,
    Create,
    Update,
    Delete,
    Search,
    Sync,
    Schema,
    Validate,
    Test,
}

impl ConnectorCapability {
    /// Get all capabilities.
    #[must_use]
    pub fn all() -> &'static [ConnectorCapability] {
        &[
            ConnectorCapability::Authenticate,
            ConnectorCapability::Create,
            ConnectorCapability::Update,
            ConnectorCapability::Delete,
            ConnectorCapability::Search,
            ConnectorCapability::Sync,
            ConnectorCapability::Schema,
            ConnectorCapability::Validate,
            ConnectorCapability::Test,
        ]
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorCapability::Authenticate => "AUTHENTICATE",
            ConnectorCapability::Create => "CREATE",
            ConnectorCapability::Update => "UPDATE",
            ConnectorCapability::Delete => "DELETE",
            ConnectorCapability::Search => "SEARCH",
            ConnectorCapability::Sync => "SYNC",
            ConnectorCapability::Schema => "SCHEMA",
            ConnectorCapability::Validate => "VALIDATE",
            ConnectorCapability::Test => "TEST",
        }
    }
}

impl fmt::Display for ConnectorCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectorCapability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown connector capability: {s}"))
    }
}

/// Set of capabilities declared by a resource.
pub type Capabilities = BTreeSet<ConnectorCapability>;

/// Every capability, for fully capable resources.
#[must_use]
pub fn full_capabilities() -> Capabilities {
    ConnectorCapability::all().iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(
            "search".parse::<ConnectorCapability>().unwrap(),
            ConnectorCapability::Search
        );
        assert!("live_sync".parse::<ConnectorCapability>().is_err());
    }

    #[test]
    fn test_full_capabilities() {
        let caps = full_capabilities();
        assert_eq!(caps.len(), ConnectorCapability::all().len());
        assert!(caps.contains(&ConnectorCapability::Authenticate));
    }

    #[test]
    fn test_serde_screaming_case() {
        let json = serde_json::to_string(&ConnectorCapability::Sync).unwrap();
        assert_eq!(json, "\"SYNC\"");
    }
}
