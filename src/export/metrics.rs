//! Outcome counters for one reconcile run.
//!
//! Output only; nothing in the reconciler reads these back.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use super::node::AllocationId;

/// Allocation ids per outcome bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportMetrics {
    created: BTreeSet<AllocationId>,
    updated: BTreeSet<AllocationId>,
    deleted: BTreeSet<AllocationId>,
    unchanged: BTreeSet<AllocationId>,
    uncreated: BTreeSet<AllocationId>,
    not_found: BTreeSet<AllocationId>,
    /// Failure reason per id.
    failed: BTreeMap<AllocationId, String>,
}

/// Bucket sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub uncreated: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl MetricsSummary {
    /// Number of remote mutations that took effect.
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={} updated={} deleted={} unchanged={} uncreated={} not_found={} failed={}",
            self.created,
            self.updated,
            self.deleted,
            self.unchanged,
            self.uncreated,
            self.not_found,
            self.failed
        )
    }
}

impl ExportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_created(&mut self, id: &str) {
        self.created.insert(id.to_string());
    }

    pub fn record_updated(&mut self, id: &str) {
        self.updated.insert(id.to_string());
    }

    pub fn record_deleted(&mut self, id: &str) {
        self.deleted.insert(id.to_string());
    }

    pub fn record_unchanged(&mut self, id: &str) {
        self.unchanged.insert(id.to_string());
    }

    pub fn record_uncreated(&mut self, id: &str) {
        self.uncreated.insert(id.to_string());
    }

    pub fn record_not_found(&mut self, id: &str) {
        self.not_found.insert(id.to_string());
    }

    pub fn record_failed(&mut self, id: &str, reason: impl fmt::Display) {
        self.failed.insert(id.to_string(), reason.to_string());
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            created: self.created.len(),
            updated: self.updated.len(),
            deleted: self.deleted.len(),
            unchanged: self.unchanged.len(),
            uncreated: self.uncreated.len(),
            not_found: self.not_found.len(),
            failed: self.failed.len(),
        }
    }

    /// Ids per bucket, keyed by bucket name. Empty buckets are included.
    pub fn detail(&self) -> BTreeMap<&'static str, Vec<&str>> {
        BTreeMap::from([
            ("created", ids(&self.created)),
            ("updated", ids(&self.updated)),
            ("deleted", ids(&self.deleted)),
            ("unchanged", ids(&self.unchanged)),
            ("uncreated", ids(&self.uncreated)),
            ("not_found", ids(&self.not_found)),
            ("failed", self.failed.keys().map(String::as_str).collect()),
        ])
    }

    pub fn failure_reason(&self, id: &str) -> Option<&str> {
        self.failed.get(id).map(String::as_str)
    }

    pub fn failures(&self) -> &BTreeMap<AllocationId, String> {
        &self.failed
    }
}

impl fmt::Display for ExportMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.summary(), f)
    }
}

fn ids(set: &BTreeSet<AllocationId>) -> Vec<&str> {
    set.iter().map(String::as_str).collect()
}
