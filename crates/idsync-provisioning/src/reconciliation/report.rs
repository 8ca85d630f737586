//! Reconciliation reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idsync_core::ResourceKey;

use super::result::{ProvisioningResult, ReconciliationStatus};
use crate::propagation::ResourceOperation;

/// Outcome of one pull or push run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub resource: ResourceKey,
    pub any_type: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results: Vec<ProvisioningResult>,
}

impl ReconciliationReport {
    pub fn new(resource: ResourceKey, any_type: impl Into<String>, dry_run: bool) -> Self {
        Self {
            resource,
            any_type: any_type.into(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            results: Vec::new(),
        }
    }

    pub fn add(&mut self, result: ProvisioningResult) {
        self.results.push(result);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of results with the given operation and status.
    #[must_use]
    pub fn count(&self, operation: ResourceOperation, status: ReconciliationStatus) -> usize {
        self.results
            .iter()
            .filter(|r| r.operation == operation && r.status == status)
            .count()
    }

    /// Results per status.
    #[must_use]
    pub fn by_status(&self) -> BTreeMap<ReconciliationStatus, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.status).or_insert(0) += 1;
        }
        counts
    }

    /// Results per operation.
    #[must_use]
    pub fn by_operation(&self) -> BTreeMap<ResourceOperation, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.operation).or_insert(0) += 1;
        }
        counts
    }

    /// Results whose state transition failed, for individual retry.
    pub fn failures(&self) -> impl Iterator<Item = &ProvisioningResult> {
        self.results
            .iter()
            .filter(|r| r.status == ReconciliationStatus::Failure)
    }

    /// Results with at least one failed propagation task.
    pub fn propagation_failures(&self) -> impl Iterator<Item = &ProvisioningResult> {
        self.results.iter().filter(|r| r.has_propagation_failures())
    }

    /// One-line summary for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        let by_status = self.by_status();
        let get = |status| by_status.get(&status).copied().unwrap_or(0);
        format!(
            "{} results: {} success, {} failure, {} ignore, {} with propagation failures",
            self.results.len(),
            get(ReconciliationStatus::Success),
            get(ReconciliationStatus::Failure),
            get(ReconciliationStatus::Ignore),
            self.propagation_failures().count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut report = ReconciliationReport::new(ResourceKey::from("resource-ldap"), "USER", false);
        report.add(ProvisioningResult::new("USER", ResourceOperation::Create));
        report.add(ProvisioningResult::new("USER", ResourceOperation::Update));
        report.add(ProvisioningResult::new("USER", ResourceOperation::Update).failed("store down"));
        report.add(ProvisioningResult::new("USER", ResourceOperation::None).ignored("no match"));
        report.finish();

        assert_eq!(report.len(), 4);
        assert_eq!(report.count(ResourceOperation::Update, ReconciliationStatus::Success), 1);
        assert_eq!(report.by_status()[&ReconciliationStatus::Failure], 1);
        assert_eq!(report.by_operation()[&ResourceOperation::Update], 2);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(
            report.summary(),
            "4 results: 2 success, 1 failure, 1 ignore, 0 with propagation failures"
        );
        assert!(report.finished_at.is_some());
    }
}
