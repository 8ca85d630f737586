//! Reconciliation outcome of one remote object or entity.

use std::fmt;

use serde::{Deserialize, Serialize};

use idsync_core::{Entity, EntityKey};

use crate::propagation::{PropagationStatus, ResourceOperation};

/// Whether the state transition was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    Success,
    Failure,
    Ignore,
}

impl fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReconciliationStatus::Success => "SUCCESS",
            ReconciliationStatus::Failure => "FAILURE",
            ReconciliationStatus::Ignore => "IGNORE",
        })
    }
}

/// Outcome of reconciling one delta (pull) or one entity (push).
///
/// `status` only reflects the state transition; propagation outcomes are
/// carried separately in `propagation` and never turn a success into a
/// failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningResult {
    pub any_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<EntityKey>,
    /// Display name of the entity, or the remote name when none matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Remote identifier of the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub operation: ResourceOperation,
    pub status: ReconciliationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Rule that decided the transition (`ASSIGN`, `UPDATE`...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(default)]
    pub propagation: Vec<PropagationStatus>,
}

impl ProvisioningResult {
    pub fn new(any_type: impl Into<String>, operation: ResourceOperation) -> Self {
        Self {
            any_type: any_type.into(),
            key: None,
            name: None,
            uid: None,
            operation,
            status: ReconciliationStatus::Success,
            message: None,
            rule: None,
            propagation: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_entity(mut self, entity: &Entity) -> Self {
        self.key = Some(entity.key);
        self.name = Some(entity.name.clone());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    #[must_use]
    pub fn with_rule(mut self, rule: impl fmt::Display) -> Self {
        self.rule = Some(rule.to_string());
        self
    }

    #[must_use]
    pub fn with_operation(mut self, operation: ResourceOperation) -> Self {
        self.operation = operation;
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_propagation(mut self, statuses: Vec<PropagationStatus>) -> Self {
        self.propagation = statuses;
        self
    }

    #[must_use]
    pub fn ignored(mut self, message: impl Into<String>) -> Self {
        self.status = ReconciliationStatus::Ignore;
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = ReconciliationStatus::Failure;
        self.message = Some(message.into());
        self
    }

    /// Whether any propagation task of this result failed.
    #[must_use]
    pub fn has_propagation_failures(&self) -> bool {
        self.propagation.iter().any(|s| !s.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let user = Entity::user("rossini");
        let result = ProvisioningResult::new("USER", ResourceOperation::Create)
            .with_entity(&user)
            .with_rule("ASSIGN");

        assert_eq!(result.status, ReconciliationStatus::Success);
        assert_eq!(result.name.as_deref(), Some("rossini"));
        assert_eq!(result.rule.as_deref(), Some("ASSIGN"));
        assert!(!result.has_propagation_failures());

        let ignored = ProvisioningResult::new("USER", ResourceOperation::None).ignored("no match");
        assert_eq!(ignored.status, ReconciliationStatus::Ignore);
        assert_eq!(ignored.status.to_string(), "IGNORE");
    }
}
