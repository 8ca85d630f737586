//! Propagation tasks and statuses.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use idsync_connector::{AttributeSet, ObjectClass, Uid};
use idsync_core::{AnyTypeKind, EntityKey, ResourceKey};

/// Operation applied to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceOperation {
    Create,
    Update,
    Delete,
    /// Nothing is sent to the resource.
    None,
}

impl ResourceOperation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceOperation::Create => "CREATE",
            ResourceOperation::Update => "UPDATE",
            ResourceOperation::Delete => "DELETE",
            ResourceOperation::None => "NONE",
        }
    }
}

impl fmt::Display for ResourceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intended operation per target.
///
/// Adding a target again replaces its operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationByResource<K: Ord = ResourceKey> {
    operations: BTreeMap<K, ResourceOperation>,
}

/// Per linked account: (resource, connector key value).
pub type LinkedAccountPropagation = PropagationByResource<(ResourceKey, String)>;

impl<K: Ord> Default for PropagationByResource<K> {
    fn default() -> Self {
        Self {
            operations: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> PropagationByResource<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the operation for `target`. `None` operations are ignored.
    pub fn add(&mut self, operation: ResourceOperation, target: K) -> bool {
        if operation == ResourceOperation::None {
            return false;
        }
        self.operations.insert(target, operation);
        true
    }

    pub fn add_all(&mut self, operation: ResourceOperation, targets: impl IntoIterator<Item = K>) {
        for target in targets {
            self.add(operation, target);
        }
    }

    /// Builder form of [`add`](Self::add).
    #[must_use]
    pub fn with(mut self, operation: ResourceOperation, target: K) -> Self {
        self.add(operation, target);
        self
    }

    pub fn remove(&mut self, target: &K) -> Option<ResourceOperation> {
        self.operations.remove(target)
    }

    #[must_use]
    pub fn get(&self, target: &K) -> Option<ResourceOperation> {
        self.operations.get(target).copied()
    }

    /// Targets with the given operation.
    pub fn targets(&self, operation: ResourceOperation) -> impl Iterator<Item = &K> {
        self.operations
            .iter()
            .filter(move |(_, op)| **op == operation)
            .map(|(target, _)| target)
    }

    /// Merge `other` in; its operations win.
    pub fn merge(&mut self, other: PropagationByResource<K>) {
        self.operations.extend(other.operations);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, ResourceOperation)> {
        self.operations.iter().map(|(target, op)| (target, *op))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// One unit of work against one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationTask {
    pub key: Uuid,
    pub resource: ResourceKey,
    pub operation: ResourceOperation,
    pub entity_kind: AnyTypeKind,
    pub any_type: String,
    /// Entity key, or linked account key when `linked_account` is set.
    pub entity_key: EntityKey,
    pub linked_account: bool,
    pub object_class: ObjectClass,
    pub conn_object_key: Option<String>,
    pub attributes: AttributeSet,
    /// Resource propagation priority; `None` means unordered.
    pub priority: Option<i32>,
}

/// Tasks built for an entity, plus a failed status for every requested
/// target no task could be built for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropagationPlan {
    pub tasks: Vec<PropagationTask>,
    pub failures: Vec<PropagationStatus>,
}

impl PropagationPlan {
    /// Requested targets, built or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len() + self.failures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.failures.is_empty()
    }
}

impl From<Vec<PropagationTask>> for PropagationPlan {
    fn from(tasks: Vec<PropagationTask>) -> Self {
        Self {
            tasks,
            failures: Vec::new(),
        }
    }
}

/// Outcome of a propagation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecStatus {
    Success,
    Failure,
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecStatus::Success => f.write_str("SUCCESS"),
            ExecStatus::Failure => f.write_str("FAILURE"),
        }
    }
}

/// Result of executing one task. Produced for every task, failed or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationStatus {
    pub resource: ResourceKey,
    /// Operation actually performed (a CREATE of an existing object runs as
    /// an UPDATE).
    pub operation: ResourceOperation,
    pub status: ExecStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub entity_key: EntityKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conn_object_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uid>,
}

impl PropagationStatus {
    pub(crate) fn success(task: &PropagationTask, operation: ResourceOperation, uid: Option<Uid>) -> Self {
        Self {
            resource: task.resource.clone(),
            operation,
            status: ExecStatus::Success,
            message: None,
            entity_key: task.entity_key,
            conn_object_key: task.conn_object_key.clone(),
            uid,
        }
    }

    pub(crate) fn failure(task: &PropagationTask, message: impl Into<String>) -> Self {
        Self {
            resource: task.resource.clone(),
            operation: task.operation,
            status: ExecStatus::Failure,
            message: Some(message.into()),
            entity_key: task.entity_key,
            conn_object_key: task.conn_object_key.clone(),
            uid: None,
        }
    }

    /// Failure for a target no task was built for.
    pub(crate) fn unbuilt(
        resource: &ResourceKey,
        operation: ResourceOperation,
        entity_key: EntityKey,
        conn_object_key: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.clone(),
            operation,
            status: ExecStatus::Failure,
            message: Some(message.into()),
            entity_key,
            conn_object_key,
            uid: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ExecStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_replaces_operation() {
        let mut by_resource = PropagationByResource::new();
        by_resource.add(ResourceOperation::Create, ResourceKey::from("resource-ldap"));
        by_resource.add(ResourceOperation::Update, ResourceKey::from("resource-ldap"));
        assert!(!by_resource.add(ResourceOperation::None, ResourceKey::from("ws-target")));

        assert_eq!(by_resource.len(), 1);
        assert_eq!(
            by_resource.get(&ResourceKey::from("resource-ldap")),
            Some(ResourceOperation::Update)
        );
    }

    #[test]
    fn test_targets_and_merge() {
        let mut by_resource = PropagationByResource::new()
            .with(ResourceOperation::Create, ResourceKey::from("a"))
            .with(ResourceOperation::Delete, ResourceKey::from("b"));
        by_resource.merge(PropagationByResource::new().with(ResourceOperation::Delete, ResourceKey::from("a")));

        let deleted: Vec<_> = by_resource.targets(ResourceOperation::Delete).cloned().collect();
        assert_eq!(deleted, vec![ResourceKey::from("a"), ResourceKey::from("b")]);
        assert_eq!(by_resource.targets(ResourceOperation::Create).count(), 0);
    }

    #[test]
    fn test_linked_account_keys() {
        let linked = LinkedAccountPropagation::new().with(
            ResourceOperation::Update,
            (ResourceKey::from("resource-ldap"), "rossini-admin".to_string()),
        );
        assert_eq!(linked.len(), 1);
    }

    #[test]
    fn test_operation_serde() {
        assert_eq!(
            serde_json::to_string(&ResourceOperation::Delete).unwrap(),
            r#""DELETE""#
        );
        assert_eq!(ExecStatus::Failure.to_string(), "FAILURE");
    }
}
