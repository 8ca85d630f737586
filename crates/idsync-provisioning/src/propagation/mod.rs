//! Propagation of entity changes to external resources.
//!
//! - [`PropagationTaskBuilder`] - one task per (resource, entity) pair and
//!   per linked account
//! - [`PriorityPropagationExecutor`] - ordered execution with one status per
//!   task

pub mod builder;
pub mod executor;
pub mod task;

pub use builder::PropagationTaskBuilder;
pub use executor::{ExecutionOutcome, PriorityPropagationExecutor};
pub use task::{
    ExecStatus, LinkedAccountPropagation, PropagationByResource, PropagationPlan, PropagationStatus,
    PropagationTask, ResourceOperation,
};
