//! Matching, unmatching and ambiguity rules.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What to do when a remote object matches no entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UnmatchingRule {
    /// Create the entity and assign the resource to it.
    Assign,
    /// Create the entity and provision it without assigning the resource.
    #[default]
    Provision,
    Ignore,
    Unlink,
}

/// What to do when a remote object matches exactly one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchingRule {
    #[default]
    Update,
    /// Remove from the resource, keep the link.
    Deprovision,
    /// Remove from the resource and drop the link.
    Unassign,
    Link,
    Unlink,
    Ignore,
}

/// How to pick among several matching entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AmbiguityPolicy {
    #[default]
    Ignore,
    FirstMatch,
    LastMatch,
}

impl UnmatchingRule {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            UnmatchingRule::Assign => "ASSIGN",
            UnmatchingRule::Provision => "PROVISION",
            UnmatchingRule::Ignore => "IGNORE",
            UnmatchingRule::Unlink => "UNLINK",
        }
    }
}

impl MatchingRule {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchingRule::Update => "UPDATE",
            MatchingRule::Deprovision => "DEPROVISION",
            MatchingRule::Unassign => "UNASSIGN",
            MatchingRule::Link => "LINK",
            MatchingRule::Unlink => "UNLINK",
            MatchingRule::Ignore => "IGNORE",
        }
    }
}

impl AmbiguityPolicy {
    /// Index of the chosen match among `count` matches, if any.
    #[must_use]
    pub fn choose(&self, count: usize) -> Option<usize> {
        match (self, count) {
            (_, 0) => None,
            (_, 1) => Some(0),
            (AmbiguityPolicy::Ignore, _) => None,
            (AmbiguityPolicy::FirstMatch, _) => Some(0),
            (AmbiguityPolicy::LastMatch, n) => Some(n - 1),
        }
    }
}

impl fmt::Display for UnmatchingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for MatchingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose() {
        assert_eq!(AmbiguityPolicy::Ignore.choose(0), None);
        assert_eq!(AmbiguityPolicy::Ignore.choose(1), Some(0));
        assert_eq!(AmbiguityPolicy::Ignore.choose(2), None);
        assert_eq!(AmbiguityPolicy::FirstMatch.choose(3), Some(0));
        assert_eq!(AmbiguityPolicy::LastMatch.choose(3), Some(2));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&AmbiguityPolicy::FirstMatch).unwrap(),
            r#""FIRSTMATCH""#
        );
        let rule: MatchingRule = serde_json::from_str(r#""DEPROVISION""#).unwrap();
        assert_eq!(rule, MatchingRule::Deprovision);
        assert_eq!(UnmatchingRule::default().to_string(), "PROVISION");
    }
}
