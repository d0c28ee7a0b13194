//! Online sources enumerating live delivery-network inventory.

use async_trait::async_trait;

use crate::measure::error::MeasureResult;
use crate::measure::source::{FetchContext, MeasureFetcher};
use crate::measure::{attrs, kinds, Measure};
use crate::remote::{AdvertiserId, RemoteTargetingValue, TargetingKind};

/// Lists one inventory dimension through
/// [`RemoteCampaignClient::list_targeting_values`](crate::remote::RemoteCampaignClient::list_targeting_values).
///
/// The local id of each measure is the id the network issued for the value.
#[derive(Debug, Clone, Copy)]
pub struct RemoteInventoryFetcher {
    advertiser_id: AdvertiserId,
    kind: TargetingKind,
}

impl RemoteInventoryFetcher {
    pub fn new(advertiser_id: AdvertiserId, kind: TargetingKind) -> Self {
        Self {
            advertiser_id,
            kind,
        }
    }

    pub fn kind(&self) -> TargetingKind {
        self.kind
    }

    fn classify(&self) -> (&'static str, Option<&'static str>) {
        match self.kind {
            TargetingKind::Segment => (kinds::SEGMENT, None),
            TargetingKind::ContentCategory => (kinds::INVENTORY, Some(kinds::CONTENT_CATEGORY)),
            TargetingKind::AdUnit => (kinds::INVENTORY, Some(kinds::AD_UNIT)),
        }
    }

    fn to_measure(
        &self,
        ctx: &FetchContext<'_>,
        value: RemoteTargetingValue,
    ) -> MeasureResult<Measure> {
        let (measure_type, sub_type) = self.classify();
        let id = ctx.measure_id(value.id)?;
        let mut measure = Measure::new(id, ctx.network(), measure_type, value.name)
            .with_data_provider(ctx.network().as_str())
            .with_attribute(attrs::REMOTE_ID, value.id);

        if let Some(sub_type) = sub_type {
            measure = measure.with_sub_type(sub_type);
        }
        if let Some(code) = value.code {
            measure = measure.with_attribute(attrs::CODE, code);
        }
        if let Some(parent) = value.parent_id {
            measure = measure.with_attribute(attrs::PARENT_ID, parent);
        }
        if let Some(cpm) = value.cost_cpm {
            measure = measure.with_attribute(attrs::COST_CPM, cpm);
        }
        Ok(measure)
    }
}

#[async_trait]
impl MeasureFetcher for RemoteInventoryFetcher {
    async fn fetch(&self, ctx: &FetchContext<'_>) -> MeasureResult<Vec<Measure>> {
        let client = ctx.remote()?;
        let values = client
            .list_targeting_values(self.advertiser_id, self.kind)
            .await?;

        values
            .into_iter()
            .map(|value| self.to_measure(ctx, value))
            .collect()
    }
}
