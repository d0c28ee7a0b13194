//! Offline reconcile runs against an in-memory network.
//!
//! A plan describes the optimizer output and what already exists remotely.
//! The run builds the builtin catalog, seeds an [`InMemoryCampaignClient`]
//! and reconciles once.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ExportResult;
use super::node::{desired_nodes, AllocationId, PerNodeBudgetAllocationResult};
use super::reconciler::{CampaignExportReconciler, ExportRequest};
use super::report::ExportReport;
use crate::cache::{CacheStore, SystemClock};
use crate::config::Settings;
use crate::measure::{
    CampaignContext, Company, DeliveryNetwork, MeasureCatalog, MeasureSourceProvider, RefreshGates,
    SourceContext, SourceEnv, StandardSourceProvider,
};
use crate::remote::{AdvertiserId, InMemoryCampaignClient, ProfileSpec, RemoteCampaign, RemoteId};

/// A campaign that already exists on the simulated network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingCampaign {
    pub allocation_id: AllocationId,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub impression_cap: Option<i64>,
    #[serde(default)]
    pub max_bid: Option<f64>,
}

fn default_active() -> bool {
    true
}

/// Input of `budgetsync simulate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationPlan {
    pub network: DeliveryNetwork,
    pub advertiser_id: AdvertiserId,
    pub line_item_id: RemoteId,
    #[serde(default)]
    pub creative_ids: Vec<RemoteId>,
    /// Supplies the campaign's domain list to the catalog.
    #[serde(default)]
    pub campaign: Option<CampaignContext>,
    pub nodes: Vec<PerNodeBudgetAllocationResult>,
    #[serde(default)]
    pub existing_campaigns: Vec<ExistingCampaign>,
    pub export_allocation_ids: BTreeSet<AllocationId>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

/// Output of a simulated run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationOutcome {
    pub report: ExportReport,
    pub catalog_size: usize,
    pub remote_calls: usize,
    /// Campaigns on the simulated network after the run.
    pub campaigns: Vec<RemoteCampaign>,
}

impl SimulationPlan {
    fn seed(&self, client: &InMemoryCampaignClient) -> BTreeMap<AllocationId, bool> {
        let mut existing = BTreeMap::new();
        for campaign in &self.existing_campaigns {
            let profile_id = client.seed_profile(
                self.advertiser_id,
                ProfileSpec {
                    code: campaign.allocation_id.clone(),
                    ..Default::default()
                },
            );
            client.seed_campaign(
                self.advertiser_id,
                RemoteCampaign {
                    id: 0,
                    name: campaign.allocation_id.clone(),
                    code: campaign.allocation_id.clone(),
                    line_item_id: self.line_item_id,
                    profile_id,
                    creative_ids: self.creative_ids.clone(),
                    active: campaign.active,
                    start: self.start,
                    end: self.end,
                    budget: campaign.budget,
                    impression_cap: campaign.impression_cap,
                    max_bid: campaign.max_bid,
                },
            );
            existing.insert(campaign.allocation_id.clone(), campaign.active);
        }
        existing
    }
}

/// Run `plan` once against a fresh in-memory network.
pub async fn simulate(
    plan: SimulationPlan,
    settings: &Settings,
    cache: Arc<dyn CacheStore>,
) -> ExportResult<SimulationOutcome> {
    let client = Arc::new(InMemoryCampaignClient::new(plan.network));
    let existing_campaigns = plan.seed(&client);

    let env = SourceEnv::new(cache, Arc::new(SystemClock))
        .with_gates(Arc::new(RefreshGates::new(settings.sources.single_flight)))
        .with_remote(client.clone());
    let provider = StandardSourceProvider::new(plan.network, env);
    let ctx = SourceContext {
        company: Some(Company {
            id: 0,
            name: "simulation".to_string(),
            advertiser_id: Some(plan.advertiser_id),
        }),
        campaign: plan.campaign.clone(),
        owner: None,
    };
    let catalog = Arc::new(MeasureCatalog::build(&provider.measure_sources(&ctx)?).await?);

    let request = ExportRequest {
        advertiser_id: plan.advertiser_id,
        line_item_id: plan.line_item_id,
        creative_ids: plan.creative_ids,
        desired_nodes: desired_nodes(plan.nodes)?,
        existing_campaigns,
        export_allocation_ids: plan.export_allocation_ids,
        start: plan.start,
        end: plan.end,
    };

    let reconciler = CampaignExportReconciler::new(
        client.clone(),
        catalog.clone(),
        settings.export.clone(),
    );
    let report = reconciler.reconcile(&request).await?;

    Ok(SimulationOutcome {
        report,
        catalog_size: catalog.len(),
        remote_calls: client.calls().len(),
        campaigns: client.campaigns(plan.advertiser_id),
    })
}
