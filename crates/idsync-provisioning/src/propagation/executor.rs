//! Priority propagation executor
//!
//! Tasks for resources with a propagation priority run one at a time in
//! ascending priority order, each awaiting its connector call before the
//! next starts. Tasks without priority run afterwards, either in sequence
//! or, in async mode, spawned onto the runtime with their handles handed
//! back to the caller. A failing task never stops the others.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use idsync_connector::capability::ConnectorCapability;
use idsync_connector::{
    AttributeSet, AttributeValue, ConnectorGateway, ConnectorObject, ConnectorRegistry,
    ConnectorResult, Uid,
};

use super::task::{PropagationPlan, PropagationStatus, PropagationTask, ResourceOperation};
use crate::remote::{key_attribute, read_remote};

/// Statuses of executed tasks plus handles of tasks still running.
#[derive(Debug, Default)]
pub struct ExecutionOutcome {
    pub statuses: Vec<PropagationStatus>,
    pub pending: Vec<JoinHandle<PropagationStatus>>,
}

impl ExecutionOutcome {
    /// Whether every task has completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait for the spawned tasks and return every status.
    pub async fn wait_all(self) -> Vec<PropagationStatus> {
        let mut statuses = self.statuses;
        for joined in join_all(self.pending).await {
            match joined {
                Ok(status) => statuses.push(status),
                Err(e) => error!(error = %e, "Propagation task aborted"),
            }
        }
        statuses
    }
}

/// What a task actually did on the resource.
struct Applied {
    operation: ResourceOperation,
    uid: Option<Uid>,
    message: Option<String>,
}

impl Applied {
    fn new(operation: ResourceOperation, uid: Option<Uid>) -> Self {
        Self {
            operation,
            uid,
            message: None,
        }
    }

    fn skipped(operation: ResourceOperation, message: impl Into<String>) -> Self {
        Self {
            operation,
            uid: None,
            message: Some(message.into()),
        }
    }
}

/// Runs propagation tasks against the registered gateways.
#[derive(Debug, Clone)]
pub struct PriorityPropagationExecutor {
    registry: Arc<ConnectorRegistry>,
}

impl PriorityPropagationExecutor {
    pub fn new(registry: Arc<ConnectorRegistry>) -> Self {
        Self { registry }
    }

    /// Execute the tasks of `plan`.
    ///
    /// With `async_mode` the tasks without priority are spawned and their
    /// statuses are only available through [`ExecutionOutcome::pending`].
    /// Targets the plan could not build a task for are reported as failed
    /// statuses after the executed ones.
    #[instrument(skip_all, fields(async_mode = async_mode))]
    pub async fn execute(&self, plan: impl Into<PropagationPlan>, async_mode: bool) -> ExecutionOutcome {
        let PropagationPlan { tasks, failures } = plan.into();
        debug!(tasks = tasks.len(), unbuilt = failures.len(), "Executing propagation");
        let (mut prioritized, unordered): (Vec<_>, Vec<_>) =
            tasks.into_iter().partition(|t| t.priority.is_some());
        prioritized.sort_by_key(|t| t.priority);

        let mut outcome = ExecutionOutcome::default();
        for task in prioritized {
            outcome.statuses.push(self.execute_task(task).await);
        }

        if async_mode {
            for task in unordered {
                let executor = self.clone();
                outcome
                    .pending
                    .push(tokio::spawn(async move { executor.execute_task(task).await }));
            }
        } else {
            for task in unordered {
                outcome.statuses.push(self.execute_task(task).await);
            }
        }
        outcome.statuses.extend(failures);
        outcome
    }

    /// Execute every task and wait for all of them.
    pub async fn execute_and_wait(&self, plan: impl Into<PropagationPlan>) -> Vec<PropagationStatus> {
        self.execute(plan, false).await.wait_all().await
    }

    /// Execute one task. Never fails: errors become a FAILURE status.
    #[instrument(skip(self, task), fields(resource = %task.resource, operation = %task.operation, entity = %task.entity_key))]
    pub async fn execute_task(&self, task: PropagationTask) -> PropagationStatus {
        match self.apply(&task).await {
            Ok(applied) => {
                info!(performed = %applied.operation, "Propagation succeeded");
                let status = PropagationStatus::success(&task, applied.operation, applied.uid);
                match applied.message {
                    Some(message) => status.with_message(message),
                    None => status,
                }
            }
            Err(e) => {
                error!(error = %e, "Propagation failed");
                PropagationStatus::failure(&task, e.to_string())
            }
        }
    }

    async fn apply(&self, task: &PropagationTask) -> ConnectorResult<Applied> {
        let gateway = self.registry.get(&task.resource).await?;
        let can_read = gateway.resource().has_capability(ConnectorCapability::Search);
        let before = self.read_before(&gateway, task).await?;

        match task.operation {
            ResourceOperation::None => Ok(Applied::skipped(ResourceOperation::None, "nothing to propagate")),
            ResourceOperation::Create | ResourceOperation::Update => {
                if let Some(before) = before {
                    return update(&gateway, task, &before).await;
                }
                if task.operation == ResourceOperation::Update && !can_read {
                    let Some(key) = &task.conn_object_key else {
                        return Ok(Applied::skipped(ResourceOperation::Update, "no connector key"));
                    };
                    let uid = gateway
                        .update(&task.object_class, &Uid::new(key.clone()), distinct(&task.attributes))
                        .await?;
                    return Ok(performed(ResourceOperation::Update, uid, ConnectorCapability::Update));
                }
                let uid = gateway
                    .create(&task.object_class, distinct(&task.attributes))
                    .await?;
                Ok(performed(ResourceOperation::Create, uid, ConnectorCapability::Create))
            }
            ResourceOperation::Delete => {
                let uid = match (before, &task.conn_object_key) {
                    (Some(before), _) => before.uid,
                    (None, Some(key)) if !can_read => Uid::new(key.clone()),
                    _ => {
                        debug!("Remote object not found, nothing to delete");
                        return Ok(Applied::skipped(ResourceOperation::Delete, "remote object not found"));
                    }
                };
                let deleted = gateway.delete(&task.object_class, &uid).await?;
                Ok(performed(
                    ResourceOperation::Delete,
                    deleted.map(|()| uid),
                    ConnectorCapability::Delete,
                ))
            }
        }
    }

    /// Current remote object for the task's connector key, if readable.
    async fn read_before(
        &self,
        gateway: &ConnectorGateway,
        task: &PropagationTask,
    ) -> ConnectorResult<Option<ConnectorObject>> {
        let Some(key_value) = &task.conn_object_key else {
            return Ok(None);
        };
        let Some(provision) = gateway.resource().provision(&task.any_type) else {
            return Ok(None);
        };
        let Some(key_attr) = key_attribute(provision) else {
            return Ok(None);
        };
        read_remote(gateway, provision, key_attr, key_value, None).await
    }
}

async fn update(
    gateway: &ConnectorGateway,
    task: &PropagationTask,
    before: &ConnectorObject,
) -> ConnectorResult<Applied> {
    let changes = changed_attributes(&task.attributes, before);
    if changes.is_empty() {
        debug!("Remote object already up to date");
        return Ok(Applied::skipped(ResourceOperation::Update, "no changes"));
    }
    let uid = gateway.update(&task.object_class, &before.uid, changes).await?;
    Ok(performed(ResourceOperation::Update, uid, ConnectorCapability::Update))
}

/// A gateway call returning `None` was not attempted: the resource lacks
/// the capability.
fn performed(operation: ResourceOperation, uid: Option<Uid>, capability: ConnectorCapability) -> Applied {
    match uid {
        Some(uid) => Applied::new(operation, Some(uid)),
        None => Applied::skipped(operation, format!("not attempted: capability {capability} absent")),
    }
}

/// Attribute set with duplicate values removed, keeping first occurrence
/// order.
fn distinct(attributes: &AttributeSet) -> AttributeSet {
    let mut result = AttributeSet::new();
    for (name, values) in attributes.iter() {
        result.set(name.clone(), dedup(values));
    }
    result
}

fn dedup(values: &[AttributeValue]) -> Vec<AttributeValue> {
    let mut seen = BTreeSet::new();
    values
        .iter()
        .filter(|v| seen.insert(v.to_value_string()))
        .cloned()
        .collect()
}

/// Attributes whose outgoing values differ from the remote ones.
fn changed_attributes(attributes: &AttributeSet, before: &ConnectorObject) -> AttributeSet {
    let mut changes = AttributeSet::new();
    for (name, values) in attributes.iter() {
        let outgoing = dedup(values);
        let current: BTreeSet<String> = before
            .values_of(name)
            .iter()
            .map(AttributeValue::to_value_string)
            .collect();
        let wanted: BTreeSet<String> = outgoing.iter().map(AttributeValue::to_value_string).collect();
        if current != wanted {
            changes.set(name.clone(), outgoing);
        }
    }
    changes
}
