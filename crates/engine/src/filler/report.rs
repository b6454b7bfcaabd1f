//! Outcome of an enrichment pass.

use std::{fmt, time::Duration};

use thiserror::Error;

/// Why a group produced no results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupFailureReason {
    /// The bulk fetch returned an error.
    Fetch(String),
    TimedOut(Duration),
    Cancelled,
    /// The fetch panicked or its task was torn down.
    Aborted(String),
}

impl fmt::Display for GroupFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupFailureReason::Fetch(message) => write!(f, "fetch failed: {message}"),
            GroupFailureReason::TimedOut(limit) => write!(f, "timed out after {}ms", limit.as_millis()),
            GroupFailureReason::Cancelled => f.write_str("cancelled"),
            GroupFailureReason::Aborted(message) => write!(f, "aborted: {message}"),
        }
    }
}

/// A group whose fields were left unfilled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Enrichment group '{function}' failed ({reason}); {unfilled} field(s) left unfilled")]
pub struct EnrichmentGroupFailure {
    pub function: String,
    pub reason: GroupFailureReason,
    pub unfilled: usize,
}

/// Per-function statistics for one fill call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupOutcome {
    pub function: String,
    /// Pending records handled by the group.
    pub records: usize,
    /// Keys sent to the bulk fetch after deduplication.
    pub keys_requested: usize,
    pub results: usize,
    /// Fields written.
    pub filled: usize,
    /// Fields left absent because no result matched.
    pub missing: usize,
    pub failure: Option<EnrichmentGroupFailure>,
}

/// Outcome of [`FillerResolver::fill`](super::FillerResolver::fill), one
/// entry per function in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillReport {
    pub groups: Vec<GroupOutcome>,
}

impl FillReport {
    pub fn group(&self, function: &str) -> Option<&GroupOutcome> {
        self.groups.iter().find(|group| group.function == function)
    }

    pub fn failed_groups(&self) -> impl Iterator<Item = &EnrichmentGroupFailure> {
        self.groups.iter().filter_map(|group| group.failure.as_ref())
    }

    /// True when no group failed. Missing results do not count as failures.
    pub fn is_complete(&self) -> bool {
        self.failed_groups().next().is_none()
    }

    pub fn filled(&self) -> usize {
        self.groups.iter().map(|group| group.filled).sum()
    }
}
