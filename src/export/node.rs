//! Allocation nodes produced by the budget optimizer.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::{ExportError, ExportResult};
use crate::measure::MeasureSet;

/// Stable correlation key between a node and its remote campaign code.
pub type AllocationId = String;

/// One unit of optimizer output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerNodeBudgetAllocationResult {
    pub allocation_id: AllocationId,
    pub measure_set: MeasureSet,
    pub period_media_budget: f64,
    /// Budget pushed to the campaign; zero or less means "do not export".
    pub export_budget: f64,
    #[serde(default)]
    pub period_impression_cap: Option<i64>,
    #[serde(default)]
    pub max_bid: Option<f64>,
    #[serde(default)]
    pub lifetime_media_budget: Option<f64>,
    #[serde(default)]
    pub lifetime_impression_cap: Option<i64>,
}

impl PerNodeBudgetAllocationResult {
    pub fn new(
        allocation_id: impl Into<AllocationId>,
        measure_set: MeasureSet,
        budget: f64,
    ) -> Self {
        Self {
            allocation_id: allocation_id.into(),
            measure_set,
            period_media_budget: budget,
            export_budget: budget,
            period_impression_cap: None,
            max_bid: None,
            lifetime_media_budget: None,
            lifetime_impression_cap: None,
        }
    }

    pub fn with_impression_cap(mut self, cap: i64) -> Self {
        self.period_impression_cap = Some(cap);
        self
    }

    pub fn with_max_bid(mut self, bid: f64) -> Self {
        self.max_bid = Some(bid);
        self
    }

    pub fn is_exportable(&self) -> bool {
        self.export_budget > 0.0
    }
}

/// Desired nodes keyed by their targeting.
pub type DesiredNodes = BTreeMap<MeasureSet, PerNodeBudgetAllocationResult>;

/// Key a list of nodes by measure set.
///
/// Two nodes with the same measure set would target the same audience
/// twice, so that is a configuration error naming both allocation ids.
pub fn desired_nodes(
    nodes: impl IntoIterator<Item = PerNodeBudgetAllocationResult>,
) -> ExportResult<DesiredNodes> {
    let mut desired = DesiredNodes::new();
    for node in nodes {
        match desired.entry(node.measure_set.clone()) {
            Entry::Occupied(kept) => {
                return Err(ExportError::configuration(format!(
                    "allocations {} and {} have the same measure set",
                    kept.get().allocation_id,
                    node.allocation_id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(node);
            }
        }
    }
    Ok(desired)
}
