//! Line-item level objects shared by every campaign of an export.
//!
//! The line item, its targeting profile and the include-domain list are
//! created once and remembered in a [`LineItemState`]. Later exports reuse
//! the stored ids and never recreate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ExportResult;
use super::node::DesiredNodes;
use super::reconciler::CampaignExportReconciler;
use crate::remote::{
    AdvertiserId, DomainListSpec, FrequencyCaps, LineItemProfileSpec, LineItemSpec, RemoteId,
};

/// Remote ids held by the campaign-level entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemState {
    pub line_item_id: Option<RemoteId>,
    pub profile_id: Option<RemoteId>,
    pub include_domain_list_id: Option<RemoteId>,
}

/// What the line item should look like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemRequest {
    pub advertiser_id: AdvertiserId,
    /// External code of the line item; also prefixes its profile and list.
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub frequency: FrequencyCaps,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

/// Which objects a line-item export created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LineItemOutcome {
    pub line_item_id: RemoteId,
    pub created_domain_list: bool,
    pub created_profile: bool,
    pub created_line_item: bool,
}

impl CampaignExportReconciler {
    /// Make sure the shared line item exists, creating what is missing.
    ///
    /// The profile carries the frequency caps and the union of the domain
    /// measures of all `nodes`. Each id is written into `state` as soon as
    /// its object exists, so a failure part-way keeps what was created.
    pub async fn export_line_item(
        &self,
        state: &mut LineItemState,
        request: &LineItemRequest,
        nodes: &DesiredNodes,
    ) -> ExportResult<LineItemOutcome> {
        let client = self.client();
        let domains = self.translator().domains(nodes.keys());
        let mut outcome = LineItemOutcome::default();

        if !domains.is_empty() && state.include_domain_list_id.is_none() {
            let spec = DomainListSpec {
                name: format!("{}-include", request.code),
                description: Some(format!("Included domains of {}", request.name)),
                domains: domains.clone(),
            };
            state.include_domain_list_id = Some(client.create_domain_list(&spec).await?);
            outcome.created_domain_list = true;
        }

        let profile_id = match state.profile_id {
            Some(id) => id,
            None => {
                let spec = LineItemProfileSpec {
                    code: format!("{}-li", request.code),
                    frequency: request.frequency,
                    domains,
                    include_domain_list_ids: state.include_domain_list_id.into_iter().collect(),
                };
                let id = client
                    .create_line_item_profile(request.advertiser_id, &spec)
                    .await?;
                state.profile_id = Some(id);
                outcome.created_profile = true;
                id
            }
        };

        outcome.line_item_id = match state.line_item_id {
            Some(id) => id,
            None => {
                let spec = LineItemSpec {
                    name: request.name.clone(),
                    code: request.code.clone(),
                    profile_id,
                    budget: request.budget,
                    start: request.start,
                    end: request.end,
                };
                let id = client.create_line_item(request.advertiser_id, &spec).await?;
                state.line_item_id = Some(id);
                outcome.created_line_item = true;
                id
            }
        };

        info!(
            line_item_id = outcome.line_item_id,
            profile_id,
            created_line_item = outcome.created_line_item,
            created_profile = outcome.created_profile,
            created_domain_list = outcome.created_domain_list,
            "line item exported"
        );
        Ok(outcome)
    }
}
