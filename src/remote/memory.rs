//! An in-process delivery network.
//!
//! Backs the `simulate` command and the test suites. Failures can be
//! injected per operation and code, and every call is recorded so callers
//! can assert on ordering.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::client::RemoteCampaignClient;
use super::error::{RemoteClientError, RemoteResult};
use super::types::*;
use crate::measure::DeliveryNetwork;

/// First id handed out by a fresh client.
const FIRST_ID: RemoteId = 1000;

/// Operations that can be observed or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOperation {
    FindCampaign,
    CreateCampaign,
    DeleteCampaign,
    FindProfile,
    CreateProfile,
    CreateLineItemProfile,
    CreateLineItem,
    CreateDomainList,
    ListTargeting,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub operation: RemoteOperation,
    /// Campaign/profile code, list name, or targeting kind.
    pub subject: String,
}

#[derive(Debug, Default)]
struct NetworkState {
    campaigns: BTreeMap<(AdvertiserId, RemoteId), RemoteCampaign>,
    profiles: BTreeMap<(AdvertiserId, RemoteId), ProfileSpec>,
    line_item_profiles: BTreeMap<(AdvertiserId, RemoteId), LineItemProfileSpec>,
    line_items: BTreeMap<(AdvertiserId, RemoteId), LineItemSpec>,
    domain_lists: BTreeMap<RemoteId, DomainListSpec>,
    targeting: HashMap<TargetingKind, Vec<RemoteTargetingValue>>,
    failures: HashSet<(RemoteOperation, String)>,
    calls: Vec<RemoteCall>,
}

/// A [`RemoteCampaignClient`] that keeps all objects in memory.
#[derive(Debug)]
pub struct InMemoryCampaignClient {
    network: DeliveryNetwork,
    next_id: AtomicI64,
    state: Mutex<NetworkState>,
}

impl InMemoryCampaignClient {
    pub fn new(network: DeliveryNetwork) -> Self {
        Self {
            network,
            next_id: AtomicI64::new(FIRST_ID),
            state: Mutex::new(NetworkState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn allocate_id(&self) -> RemoteId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Record the call and fail it if a failure was injected for it.
    fn enter(&self, operation: RemoteOperation, subject: &str) -> RemoteResult<()> {
        let mut state = self.state();
        state.calls.push(RemoteCall {
            operation,
            subject: subject.to_string(),
        });
        if state
            .failures
            .contains(&(operation, subject.to_string()))
        {
            return Err(RemoteClientError::rejected(
                "INJECTED",
                format!("{:?} failed for {}", operation, subject),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Seeding and inspection
    // =========================================================================

    /// Make every `operation` on `subject` fail.
    pub fn fail_on(&self, operation: RemoteOperation, subject: impl Into<String>) {
        self.state().failures.insert((operation, subject.into()));
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Place a campaign on the network, assigning it an id. Returns the id.
    pub fn seed_campaign(
        &self,
        advertiser_id: AdvertiserId,
        mut campaign: RemoteCampaign,
    ) -> RemoteId {
        let id = self.allocate_id();
        campaign.id = id;
        self.state().campaigns.insert((advertiser_id, id), campaign);
        id
    }

    /// Place a profile on the network. Returns its id.
    pub fn seed_profile(&self, advertiser_id: AdvertiserId, spec: ProfileSpec) -> RemoteId {
        let id = self.allocate_id();
        self.state().profiles.insert((advertiser_id, id), spec);
        id
    }

    /// Replace the values returned for one inventory dimension.
    pub fn set_targeting_values(&self, kind: TargetingKind, values: Vec<RemoteTargetingValue>) {
        self.state().targeting.insert(kind, values);
    }

    /// All campaigns of an advertiser, ordered by id.
    pub fn campaigns(&self, advertiser_id: AdvertiserId) -> Vec<RemoteCampaign> {
        self.state()
            .campaigns
            .iter()
            .filter(|((adv, _), _)| *adv == advertiser_id)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// The campaign carrying `code`, if any.
    pub fn campaign_by_code(
        &self,
        advertiser_id: AdvertiserId,
        code: &str,
    ) -> Option<RemoteCampaign> {
        self.campaigns(advertiser_id)
            .into_iter()
            .find(|c| c.code == code)
    }

    pub fn profile(&self, advertiser_id: AdvertiserId, id: RemoteId) -> Option<ProfileSpec> {
        self.state().profiles.get(&(advertiser_id, id)).cloned()
    }

    pub fn line_item_profile(
        &self,
        advertiser_id: AdvertiserId,
        id: RemoteId,
    ) -> Option<LineItemProfileSpec> {
        self.state()
            .line_item_profiles
            .get(&(advertiser_id, id))
            .cloned()
    }

    pub fn line_item(&self, advertiser_id: AdvertiserId, id: RemoteId) -> Option<LineItemSpec> {
        self.state().line_items.get(&(advertiser_id, id)).cloned()
    }

    pub fn domain_list(&self, id: RemoteId) -> Option<DomainListSpec> {
        self.state().domain_lists.get(&id).cloned()
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state().calls.clone()
    }

    /// Number of recorded calls of one kind.
    pub fn call_count(&self, operation: RemoteOperation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

#[async_trait]
impl RemoteCampaignClient for InMemoryCampaignClient {
    fn network(&self) -> DeliveryNetwork {
        self.network
    }

    async fn find_campaign_by_code(
        &self,
        advertiser_id: AdvertiserId,
        code: &str,
    ) -> RemoteResult<Option<RemoteCampaign>> {
        self.enter(RemoteOperation::FindCampaign, code)?;
        Ok(self.campaign_by_code(advertiser_id, code))
    }

    async fn create_campaign(
        &self,
        advertiser_id: AdvertiserId,
        spec: &CampaignSpec,
    ) -> RemoteResult<RemoteId> {
        self.enter(RemoteOperation::CreateCampaign, &spec.code)?;

        let mut state = self.state();
        if !state.profiles.contains_key(&(advertiser_id, spec.profile_id)) {
            return Err(RemoteClientError::InvalidRequest(format!(
                "unknown profile {}",
                spec.profile_id
            )));
        }
        if state
            .campaigns
            .iter()
            .any(|((adv, _), c)| *adv == advertiser_id && c.code == spec.code)
        {
            return Err(RemoteClientError::rejected(
                "DUPLICATE_CODE",
                format!("campaign code {} already in use", spec.code),
            ));
        }

        let id = self.allocate_id();
        let campaign = RemoteCampaign {
            id,
            name: spec.name.clone(),
            code: spec.code.clone(),
            line_item_id: spec.line_item_id,
            profile_id: spec.profile_id,
            creative_ids: spec.creative_ids.clone(),
            active: spec.active,
            start: spec.start,
            end: spec.end,
            budget: spec.budget,
            impression_cap: spec.impression_cap,
            max_bid: spec.max_bid,
        };
        state.campaigns.insert((advertiser_id, id), campaign);
        Ok(id)
    }

    async fn delete_campaign(
        &self,
        advertiser_id: AdvertiserId,
        campaign_id: RemoteId,
    ) -> RemoteResult<()> {
        let code = self
            .state()
            .campaigns
            .get(&(advertiser_id, campaign_id))
            .map(|c| c.code.clone())
            .unwrap_or_default();
        self.enter(RemoteOperation::DeleteCampaign, &code)?;

        match self.state().campaigns.remove(&(advertiser_id, campaign_id)) {
            Some(_) => Ok(()),
            None => Err(RemoteClientError::rejected(
                "NOT_FOUND",
                format!("campaign {} does not exist", campaign_id),
            )),
        }
    }

    async fn find_profile_by_code(
        &self,
        advertiser_id: AdvertiserId,
        code: &str,
    ) -> RemoteResult<Option<RemoteProfile>> {
        self.enter(RemoteOperation::FindProfile, code)?;
        Ok(self
            .state()
            .profiles
            .iter()
            .find(|((adv, _), p)| *adv == advertiser_id && p.code == code)
            .map(|((_, id), p)| RemoteProfile {
                id: *id,
                code: Some(p.code.clone()),
            }))
    }

    async fn create_campaign_profile(
        &self,
        advertiser_id: AdvertiserId,
        spec: &ProfileSpec,
    ) -> RemoteResult<RemoteId> {
        self.enter(RemoteOperation::CreateProfile, &spec.code)?;
        let id = self.allocate_id();
        self.state().profiles.insert((advertiser_id, id), spec.clone());
        Ok(id)
    }

    async fn create_line_item_profile(
        &self,
        advertiser_id: AdvertiserId,
        spec: &LineItemProfileSpec,
    ) -> RemoteResult<RemoteId> {
        self.enter(RemoteOperation::CreateLineItemProfile, &spec.code)?;
        let id = self.allocate_id();
        self.state()
            .line_item_profiles
            .insert((advertiser_id, id), spec.clone());
        Ok(id)
    }

    async fn create_line_item(
        &self,
        advertiser_id: AdvertiserId,
        spec: &LineItemSpec,
    ) -> RemoteResult<RemoteId> {
        self.enter(RemoteOperation::CreateLineItem, &spec.code)?;
        let id = self.allocate_id();
        self.state().line_items.insert((advertiser_id, id), spec.clone());
        Ok(id)
    }

    async fn create_domain_list(&self, spec: &DomainListSpec) -> RemoteResult<RemoteId> {
        self.enter(RemoteOperation::CreateDomainList, &spec.name)?;
        let id = self.allocate_id();
        self.state().domain_lists.insert(id, spec.clone());
        Ok(id)
    }

    async fn list_targeting_values(
        &self,
        _advertiser_id: AdvertiserId,
        kind: TargetingKind,
    ) -> RemoteResult<Vec<RemoteTargetingValue>> {
        self.enter(RemoteOperation::ListTargeting, kind.as_str())?;
        Ok(self.state().targeting.get(&kind).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteCampaignClientExt;

    fn profile(code: &str) -> ProfileSpec {
        ProfileSpec {
            code: code.to_string(),
            ..Default::default()
        }
    }

    fn campaign_spec(code: &str, profile_id: RemoteId) -> CampaignSpec {
        CampaignSpec {
            name: format!("bs-{}", code),
            code: code.to_string(),
            line_item_id: 1,
            profile_id,
            creative_ids: vec![],
            active: true,
            start: None,
            end: None,
            budget: Some(10.0),
            impression_cap: None,
            max_bid: None,
        }
    }

    #[tokio::test]
    async fn test_find_or_create_profile_is_idempotent() {
        let client = InMemoryCampaignClient::new(DeliveryNetwork::AppNexus);

        let (first, created) = client.find_or_create_profile(7, &profile("A")).await.unwrap();
        assert!(created);
        let (second, created) = client.find_or_create_profile(7, &profile("A")).await.unwrap();
        assert!(!created);
        assert_eq!(first, second);

        // Profiles are per advertiser
        let (other, created) = client.find_or_create_profile(8, &profile("A")).await.unwrap();
        assert!(created);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_campaign_lifecycle() {
        let client = InMemoryCampaignClient::new(DeliveryNetwork::AppNexus);
        let profile_id = client.seed_profile(7, profile("A"));

        let id = client.create_campaign(7, &campaign_spec("A", profile_id)).await.unwrap();
        let found = client.find_campaign_by_code(7, "A").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.profile_id, profile_id);

        client.delete_campaign(7, id).await.unwrap();
        assert!(client.find_campaign_by_code(7, "A").await.unwrap().is_none());
        assert!(client.delete_campaign(7, id).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let client = InMemoryCampaignClient::new(DeliveryNetwork::AppNexus);
        let profile_id = client.seed_profile(7, profile("A"));

        client.create_campaign(7, &campaign_spec("A", profile_id)).await.unwrap();
        let err = client
            .create_campaign(7, &campaign_spec("A", profile_id))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RemoteClientError::Rejected { ref code, .. } if code == "DUPLICATE_CODE"
        ));
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let client = InMemoryCampaignClient::new(DeliveryNetwork::GoogleDfp);
        client.fail_on(RemoteOperation::CreateProfile, "B");

        assert!(client.create_campaign_profile(1, &profile("A")).await.is_ok());
        assert!(client.create_campaign_profile(1, &profile("B")).await.is_err());
        assert_eq!(client.call_count(RemoteOperation::CreateProfile), 2);

        client.clear_failures();
        assert!(client.create_campaign_profile(1, &profile("B")).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_targeting_values() {
        let client = InMemoryCampaignClient::new(DeliveryNetwork::AppNexus);
        client.set_targeting_values(
            TargetingKind::Segment,
            vec![RemoteTargetingValue {
                id: 55,
                name: "Auto intenders".into(),
                code: None,
                parent_id: None,
                cost_cpm: Some(0.5),
            }],
        );

        let values = client.list_targeting_values(1, TargetingKind::Segment).await.unwrap();
        assert_eq!(values.len(), 1);
        assert!(client
            .list_targeting_values(1, TargetingKind::AdUnit)
            .await
            .unwrap()
            .is_empty());
    }
}
