//! # Reconciliation Engine
//!
//! Brings internal entities and remote objects into agreement.
//!
//! ## Overview
//!
//! - **Pull** reads remote changes (sync deltas, or every object through
//!   paginated search) and matches each to zero, one or several entities,
//!   either on the connector key or through a correlation rule.
//! - **Push** reads the remote counterpart of each internal entity.
//! - The outcome of matching selects a [`MatchingRule`] or
//!   [`UnmatchingRule`], which drives workflow changes (create, update,
//!   delete, link, unlink) and propagation to the resources.
//! - Dry runs decide and report without changing anything.
//!
//! Every delta or entity yields one [`ProvisioningResult`]. Its status tells
//! whether the state transition was applied; the propagation statuses it
//! carries are tracked separately and never turn a result into a failure.
//!
//! ```text
//!   SyncDelta ──► match_entities ──► rules ──► WorkflowAdapter
//!                      │                  └──► PropagationTaskBuilder ──► PriorityPropagationExecutor
//!                      ▼
//!             ReconciliationReport (one ProvisioningResult per delta/entity)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use idsync_provisioning::reconciliation::{PullOptions, MatchingRule, UnmatchingRule};
//!
//! let options = PullOptions::default().with_rules(MatchingRule::Update, UnmatchingRule::Assign);
//! let report = engine
//!     .pull_incremental(&resource_key, "USER", &options, &tokens)
//!     .await?;
//! for failed in report.failures() {
//!     tracing::warn!(uid = ?failed.uid, "retry later");
//! }
//! ```

pub mod engine;
pub mod matcher;
pub mod pull;
pub mod push;
pub mod report;
pub mod result;
pub mod rules;
pub mod token;

pub use engine::{PullOptions, PushFilter, PushOptions, ReconciliationEngine, DRY_RUN};
pub use report::ReconciliationReport;
pub use result::{ProvisioningResult, ReconciliationStatus};
pub use rules::{AmbiguityPolicy, MatchingRule, UnmatchingRule};
pub use token::{InMemorySyncTokenStore, SyncTokenStore};
