//! RemoteCampaignClient trait definition.
//!
//! The concrete SOAP/REST bindings for each network live outside this crate;
//! the reconciler and online measure sources only see this trait.

use async_trait::async_trait;

use super::error::RemoteResult;
use super::types::*;
use crate::measure::DeliveryNetwork;

/// Capability interface to one delivery network.
///
/// Implementations are expected to enforce their own request timeouts and
/// to report them as [`RemoteClientError::Timeout`](super::RemoteClientError::Timeout).
#[async_trait]
pub trait RemoteCampaignClient: Send + Sync {
    /// The network this client talks to.
    fn network(&self) -> DeliveryNetwork;

    // =========================================================================
    // Campaigns
    // =========================================================================

    /// Find a campaign by its external code.
    async fn find_campaign_by_code(
        &self,
        advertiser_id: AdvertiserId,
        code: &str,
    ) -> RemoteResult<Option<RemoteCampaign>>;

    /// Create a campaign and return its id.
    async fn create_campaign(
        &self,
        advertiser_id: AdvertiserId,
        spec: &CampaignSpec,
    ) -> RemoteResult<RemoteId>;

    /// Delete a campaign.
    async fn delete_campaign(
        &self,
        advertiser_id: AdvertiserId,
        campaign_id: RemoteId,
    ) -> RemoteResult<()>;

    // =========================================================================
    // Profiles, line items and lists
    // =========================================================================

    /// Find a targeting profile by its external code.
    async fn find_profile_by_code(
        &self,
        advertiser_id: AdvertiserId,
        code: &str,
    ) -> RemoteResult<Option<RemoteProfile>>;

    /// Create a campaign-level targeting profile.
    async fn create_campaign_profile(
        &self,
        advertiser_id: AdvertiserId,
        spec: &ProfileSpec,
    ) -> RemoteResult<RemoteId>;

    /// Create a line-item-level targeting profile.
    async fn create_line_item_profile(
        &self,
        advertiser_id: AdvertiserId,
        spec: &LineItemProfileSpec,
    ) -> RemoteResult<RemoteId>;

    /// Create a line item.
    async fn create_line_item(
        &self,
        advertiser_id: AdvertiserId,
        spec: &LineItemSpec,
    ) -> RemoteResult<RemoteId>;

    /// Create a shared domain list.
    async fn create_domain_list(&self, spec: &DomainListSpec) -> RemoteResult<RemoteId>;

    // =========================================================================
    // Inventory enumeration (online measure sources)
    // =========================================================================

    /// Enumerate every value of one inventory dimension.
    async fn list_targeting_values(
        &self,
        advertiser_id: AdvertiserId,
        kind: TargetingKind,
    ) -> RemoteResult<Vec<RemoteTargetingValue>>;
}

/// Composite operations built from [`RemoteCampaignClient`] primitives.
#[async_trait]
pub trait RemoteCampaignClientExt: RemoteCampaignClient {
    /// Find the profile with `spec.code`, creating it when absent.
    ///
    /// Returns the profile id and whether it was created by this call.
    async fn find_or_create_profile(
        &self,
        advertiser_id: AdvertiserId,
        spec: &ProfileSpec,
    ) -> RemoteResult<(RemoteId, bool)> {
        if let Some(existing) = self.find_profile_by_code(advertiser_id, &spec.code).await? {
            return Ok((existing.id, false));
        }
        let id = self.create_campaign_profile(advertiser_id, spec).await?;
        Ok((id, true))
    }
}

// Blanket implementation for all RemoteCampaignClient implementations
impl<T: RemoteCampaignClient + ?Sized> RemoteCampaignClientExt for T {}
