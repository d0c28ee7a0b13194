//! The result of one reconcile run.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use uuid::Uuid;

use super::error::NodeFailure;
use super::metrics::ExportMetrics;
use super::node::AllocationId;
use crate::remote::RemoteId;

/// What a reconcile run did. Returned to the caller and logged; never stored.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub run_id: Uuid,
    pub created_campaigns: BTreeMap<AllocationId, RemoteId>,
    /// Profiles created during this run.
    pub created_profiles: BTreeMap<AllocationId, RemoteId>,
    /// Replaced campaigns, with the id of the replacement.
    pub updated_campaigns: BTreeMap<AllocationId, RemoteId>,
    pub deleted_campaigns: BTreeSet<AllocationId>,
    /// Requested for export but never attempted.
    pub uncreated_campaigns: BTreeSet<AllocationId>,
    /// Already matching the desired state; no remote change.
    pub unchanged_campaigns: BTreeSet<AllocationId>,
    pub failed_allocation_ids: BTreeSet<AllocationId>,
    pub metrics: ExportMetrics,
}

impl ExportReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            created_campaigns: BTreeMap::new(),
            created_profiles: BTreeMap::new(),
            updated_campaigns: BTreeMap::new(),
            deleted_campaigns: BTreeSet::new(),
            uncreated_campaigns: BTreeSet::new(),
            unchanged_campaigns: BTreeSet::new(),
            failed_allocation_ids: BTreeSet::new(),
            metrics: ExportMetrics::new(),
        }
    }

    pub(crate) fn created(&mut self, id: &str, campaign_id: RemoteId) {
        self.created_campaigns.insert(id.to_string(), campaign_id);
        self.metrics.record_created(id);
    }

    pub(crate) fn profile_created(&mut self, id: &str, profile_id: RemoteId) {
        self.created_profiles.insert(id.to_string(), profile_id);
    }

    pub(crate) fn updated(&mut self, id: &str, campaign_id: RemoteId) {
        self.updated_campaigns.insert(id.to_string(), campaign_id);
        self.metrics.record_updated(id);
    }

    pub(crate) fn deleted(&mut self, id: &str) {
        self.deleted_campaigns.insert(id.to_string());
        self.metrics.record_deleted(id);
    }

    pub(crate) fn uncreated(&mut self, id: &str) {
        self.uncreated_campaigns.insert(id.to_string());
        self.metrics.record_uncreated(id);
    }

    pub(crate) fn unchanged(&mut self, id: &str) {
        self.unchanged_campaigns.insert(id.to_string());
        self.metrics.record_unchanged(id);
    }

    /// Nothing to delete; counted, but not a failure.
    pub(crate) fn not_found(&mut self, id: &str) {
        self.metrics.record_not_found(id);
    }

    pub(crate) fn failed(&mut self, id: &str, failure: &NodeFailure) {
        self.failed_allocation_ids.insert(id.to_string());
        self.metrics.record_failed(id, failure);
    }

    /// Nodes now believed live on the network.
    pub fn exported_allocation_ids(&self) -> BTreeSet<AllocationId> {
        self.created_campaigns
            .keys()
            .chain(self.updated_campaigns.keys())
            .chain(self.unchanged_campaigns.iter())
            .cloned()
            .collect()
    }

    /// The existing-campaign map a caller should pass to the next run.
    ///
    /// Deleted campaigns drop out, exported ones become active, and failed
    /// ones keep their previous state.
    pub fn next_existing(
        &self,
        previous: &BTreeMap<AllocationId, bool>,
    ) -> BTreeMap<AllocationId, bool> {
        let mut next = previous.clone();
        for id in &self.deleted_campaigns {
            next.remove(id);
        }
        for id in self.exported_allocation_ids() {
            next.insert(id, true);
        }
        next
    }

    /// True when the run made no remote change.
    pub fn is_noop(&self) -> bool {
        self.created_campaigns.is_empty()
            && self.updated_campaigns.is_empty()
            && self.deleted_campaigns.is_empty()
    }
}
