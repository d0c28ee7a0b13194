//! Diff-based campaign synchronization.
//!
//! Three passes, in order:
//!
//! ```text
//!   create      export ids without a remote campaign  -> profile + campaign
//!   update      export ids with a remote campaign     -> unchanged | delete + recreate
//!                 ... whose node has no budget left   -> delete
//!   deactivate  active remote ids not exported        -> delete
//! ```
//!
//! Each node's remote calls return a `Result<_, NodeFailure>`; a failure is
//! recorded in the report and the pass moves on to the next node.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::error::{ExportError, ExportResult, NodeFailure, NodeResult};
use super::node::{AllocationId, DesiredNodes, PerNodeBudgetAllocationResult};
use super::report::ExportReport;
use super::targeting::TargetingTranslator;
use crate::config::ExportSettings;
use crate::measure::{DeliveryNetwork, MeasureCatalog, MeasureSet};
use crate::remote::{
    AdvertiserId, CampaignSpec, RemoteCampaignClient, RemoteCampaignClientExt, RemoteId,
};

/// Inputs of one reconcile run.
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub advertiser_id: AdvertiserId,
    pub line_item_id: RemoteId,
    pub creative_ids: Vec<RemoteId>,
    pub desired_nodes: DesiredNodes,
    /// Campaigns the caller believes exist remotely, with their active flag.
    pub existing_campaigns: BTreeMap<AllocationId, bool>,
    pub export_allocation_ids: BTreeSet<AllocationId>,
    /// Campaign flight dates.
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Node lookup by allocation id.
type NodeIndex<'r> = HashMap<&'r str, (&'r MeasureSet, &'r PerNodeBudgetAllocationResult)>;

#[derive(Debug)]
struct Created {
    campaign_id: RemoteId,
    /// Set when the profile did not exist before.
    new_profile: Option<RemoteId>,
}

#[derive(Debug)]
enum UpdateOutcome {
    Unchanged,
    Replaced(RemoteId),
    /// The remote campaign had vanished, so the node was created afresh.
    Recreated(Created),
}

/// Projects allocation nodes onto one delivery network.
pub struct CampaignExportReconciler {
    client: Arc<dyn RemoteCampaignClient>,
    catalog: Arc<MeasureCatalog>,
    settings: ExportSettings,
}

impl CampaignExportReconciler {
    pub fn new(
        client: Arc<dyn RemoteCampaignClient>,
        catalog: Arc<MeasureCatalog>,
        settings: ExportSettings,
    ) -> Self {
        Self {
            client,
            catalog,
            settings,
        }
    }

    pub fn network(&self) -> DeliveryNetwork {
        self.client.network()
    }

    pub(crate) fn client(&self) -> &dyn RemoteCampaignClient {
        self.client.as_ref()
    }

    pub(crate) fn translator(&self) -> TargetingTranslator<'_> {
        TargetingTranslator::new(&self.catalog, self.network())
    }

    /// Converge the network towards `request`.
    ///
    /// Only configuration problems fail the call; remote and targeting
    /// failures of single nodes are reported in
    /// [`ExportReport::failed_allocation_ids`].
    pub async fn reconcile(&self, request: &ExportRequest) -> ExportResult<ExportReport> {
        let nodes = self.validate(request)?;

        let run_id = Uuid::new_v4();
        let span = info_span!(
            "reconcile",
            %run_id,
            network = %self.network(),
            advertiser_id = request.advertiser_id,
            line_item_id = request.line_item_id,
        );

        async move {
            let mut report = ExportReport::new(run_id);
            self.create_pass(request, &nodes, &mut report).await;
            self.update_pass(request, &nodes, &mut report).await;
            self.deactivation_pass(request, &mut report).await;

            info!(metrics = %report.metrics, "reconcile finished");
            Ok(report)
        }
        .instrument(span)
        .await
    }

    fn validate<'r>(&self, request: &'r ExportRequest) -> ExportResult<NodeIndex<'r>> {
        if request.advertiser_id <= 0 {
            return Err(ExportError::configuration("advertiser id is required"));
        }
        if request.line_item_id <= 0 {
            return Err(ExportError::configuration("line item id is required"));
        }
        if let Some(other) = self
            .catalog
            .networks()
            .into_iter()
            .find(|n| *n != self.network())
        {
            return Err(ExportError::configuration(format!(
                "catalog holds {} measures but the client targets {}",
                other,
                self.network()
            )));
        }

        let mut index = NodeIndex::new();
        for (set, node) in &request.desired_nodes {
            if index.insert(node.allocation_id.as_str(), (set, node)).is_some() {
                return Err(ExportError::configuration(format!(
                    "allocation id {} is used by more than one node",
                    node.allocation_id
                )));
            }
        }
        Ok(index)
    }

    // =========================================================================
    // Passes
    // =========================================================================

    async fn create_pass(
        &self,
        request: &ExportRequest,
        nodes: &NodeIndex<'_>,
        report: &mut ExportReport,
    ) {
        let existing = &request.existing_campaigns;
        for id in &request.export_allocation_ids {
            if existing.contains_key(id) {
                continue;
            }
            let Some((set, node)) = exportable(id, nodes, report, existing) else {
                continue;
            };

            match self.create_node(request, id, set, node).await {
                Ok(created) => record_created(report, id, created),
                Err(failure) => node_failed(report, id, "create", &failure),
            }
        }
    }

    async fn update_pass(
        &self,
        request: &ExportRequest,
        nodes: &NodeIndex<'_>,
        report: &mut ExportReport,
    ) {
        let existing = &request.existing_campaigns;
        for (id, active) in existing {
            if !request.export_allocation_ids.contains(id) {
                continue;
            }
            let Some((set, node)) = exportable(id, nodes, report, existing) else {
                // A live campaign must not keep spending a budget that is gone
                if *active {
                    self.retire(request.advertiser_id, id, report).await;
                }
                continue;
            };

            match self.update_node(request, id, set, node).await {
                Ok(UpdateOutcome::Unchanged) => {
                    debug!(allocation_id = %id, "campaign already up to date");
                    report.unchanged(id);
                }
                Ok(UpdateOutcome::Replaced(campaign_id)) => report.updated(id, campaign_id),
                Ok(UpdateOutcome::Recreated(created)) => record_created(report, id, created),
                Err(failure) => node_failed(report, id, "update", &failure),
            }
        }
    }

    async fn deactivation_pass(&self, request: &ExportRequest, report: &mut ExportReport) {
        let retired = request
            .existing_campaigns
            .iter()
            .filter(|(id, active)| **active && !request.export_allocation_ids.contains(*id));

        for (id, _) in retired {
            self.retire(request.advertiser_id, id, report).await;
        }
    }

    /// Delete the campaign of `id` and record the outcome.
    async fn retire(&self, advertiser_id: AdvertiserId, id: &str, report: &mut ExportReport) {
        match self.deactivate_node(advertiser_id, id).await {
            Ok(true) => report.deleted(id),
            Ok(false) => {
                warn!(allocation_id = %id, "no remote campaign to deactivate");
                report.not_found(id);
            }
            Err(failure) => node_failed(report, id, "deactivate", &failure),
        }
    }

    // =========================================================================
    // Per-node operations
    // =========================================================================

    async fn create_node(
        &self,
        request: &ExportRequest,
        id: &str,
        set: &MeasureSet,
        node: &PerNodeBudgetAllocationResult,
    ) -> NodeResult<Created> {
        let targeting = self.translator().translate(id, set)?;
        let (profile_id, profile_created) = self
            .client
            .find_or_create_profile(request.advertiser_id, &targeting.profile)
            .await?;

        let spec = self.campaign_spec(request, id, node, profile_id);
        let campaign_id = self.client.create_campaign(request.advertiser_id, &spec).await?;
        debug!(allocation_id = %id, campaign_id, profile_id, "campaign created");

        Ok(Created {
            campaign_id,
            new_profile: profile_created.then_some(profile_id),
        })
    }

    async fn update_node(
        &self,
        request: &ExportRequest,
        id: &str,
        set: &MeasureSet,
        node: &PerNodeBudgetAllocationResult,
    ) -> NodeResult<UpdateOutcome> {
        let current = self
            .client
            .find_campaign_by_code(request.advertiser_id, id)
            .await?;
        let Some(current) = current else {
            warn!(allocation_id = %id, "existing campaign not found remotely, creating it");
            return self
                .create_node(request, id, set, node)
                .await
                .map(UpdateOutcome::Recreated);
        };

        let spec = self.campaign_spec(request, id, node, current.profile_id);
        if spec.matches(&current) {
            return Ok(UpdateOutcome::Unchanged);
        }

        self.client
            .delete_campaign(request.advertiser_id, current.id)
            .await?;
        // The node has no remote campaign until this create succeeds
        let campaign_id = self
            .client
            .create_campaign(request.advertiser_id, &spec)
            .await
            .map_err(|e| {
                warn!(
                    allocation_id = %id,
                    old_campaign_id = current.id,
                    error = %e,
                    "campaign deleted but not recreated"
                );
                e
            })?;
        debug!(
            allocation_id = %id,
            old_campaign_id = current.id,
            campaign_id,
            "campaign replaced"
        );

        Ok(UpdateOutcome::Replaced(campaign_id))
    }

    /// Delete the campaign of `id`. Returns false when there was none.
    async fn deactivate_node(&self, advertiser_id: AdvertiserId, id: &str) -> NodeResult<bool> {
        let Some(current) = self.client.find_campaign_by_code(advertiser_id, id).await? else {
            return Ok(false);
        };
        self.client.delete_campaign(advertiser_id, current.id).await?;
        debug!(allocation_id = %id, campaign_id = current.id, "campaign deleted");
        Ok(true)
    }

    fn campaign_spec(
        &self,
        request: &ExportRequest,
        id: &str,
        node: &PerNodeBudgetAllocationResult,
        profile_id: RemoteId,
    ) -> CampaignSpec {
        CampaignSpec {
            name: self.settings.campaign_name(id),
            code: id.to_string(),
            line_item_id: request.line_item_id,
            profile_id,
            creative_ids: request.creative_ids.clone(),
            active: self.settings.activate_campaigns,
            start: request.start,
            end: request.end,
            budget: Some(node.export_budget),
            impression_cap: node.period_impression_cap,
            max_bid: node.max_bid,
        }
    }
}

/// The node to export for `id`.
///
/// `None` when there is no node or no budget. The id is then recorded as
/// uncreated unless an active campaign for it already exists.
fn exportable<'r>(
    id: &str,
    nodes: &NodeIndex<'r>,
    report: &mut ExportReport,
    existing: &BTreeMap<AllocationId, bool>,
) -> Option<(&'r MeasureSet, &'r PerNodeBudgetAllocationResult)> {
    match nodes.get(id) {
        Some(&(set, node)) if node.is_exportable() => return Some((set, node)),
        Some((_, node)) => {
            debug!(allocation_id = %id, budget = node.export_budget, "allocation has no budget")
        }
        None => debug!(allocation_id = %id, "no desired node for allocation"),
    }
    if existing.get(id) != Some(&true) {
        report.uncreated(id);
    }
    None
}

fn record_created(report: &mut ExportReport, id: &str, created: Created) {
    report.created(id, created.campaign_id);
    if let Some(profile_id) = created.new_profile {
        report.profile_created(id, profile_id);
    }
}

fn node_failed(report: &mut ExportReport, id: &str, pass: &str, failure: &NodeFailure) {
    warn!(allocation_id = %id, pass, error = %failure, "allocation export failed");
    report.failed(id, failure);
}
