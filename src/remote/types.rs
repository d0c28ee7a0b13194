//! Value types exchanged with a delivery network.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier issued by the delivery network.
pub type RemoteId = i64;

/// Advertiser account on the delivery network.
pub type AdvertiserId = i64;

/// A campaign as it exists on the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCampaign {
    pub id: RemoteId,
    pub name: String,
    /// External code; carries the allocation id.
    pub code: String,
    pub line_item_id: RemoteId,
    pub profile_id: RemoteId,
    #[serde(default)]
    pub creative_ids: Vec<RemoteId>,
    pub active: bool,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub impression_cap: Option<i64>,
    #[serde(default)]
    pub max_bid: Option<f64>,
}

/// A targeting profile as it exists on the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteProfile {
    pub id: RemoteId,
    pub code: Option<String>,
}

/// Everything needed to create a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSpec {
    pub name: String,
    pub code: String,
    pub line_item_id: RemoteId,
    pub profile_id: RemoteId,
    pub creative_ids: Vec<RemoteId>,
    pub active: bool,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub budget: Option<f64>,
    pub impression_cap: Option<i64>,
    pub max_bid: Option<f64>,
}

impl CampaignSpec {
    /// Whether `campaign` already carries exactly this state.
    ///
    /// Name, code and profile are not compared: the code is the lookup key
    /// and the profile is reused on replacement.
    pub fn matches(&self, campaign: &RemoteCampaign) -> bool {
        let mut wanted = self.creative_ids.clone();
        let mut current = campaign.creative_ids.clone();
        wanted.sort_unstable();
        current.sort_unstable();

        self.line_item_id == campaign.line_item_id
            && self.active == campaign.active
            && self.start == campaign.start
            && self.end == campaign.end
            && money_eq(self.budget, campaign.budget)
            && self.impression_cap == campaign.impression_cap
            && money_eq(self.max_bid, campaign.max_bid)
            && wanted == current
    }
}

fn money_eq(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        // Networks round to the cent
        (Some(a), Some(b)) => (a - b).abs() < 0.005,
        _ => false,
    }
}

/// An inclusive age band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgeBand {
    pub low: u16,
    pub high: u16,
}

/// Campaign-level targeting profile contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSpec {
    pub code: String,
    #[serde(default)]
    pub age_bands: Vec<AgeBand>,
    #[serde(default)]
    pub genders: Vec<String>,
    #[serde(default)]
    pub metro_codes: Vec<i64>,
    #[serde(default)]
    pub device_types: Vec<String>,
    #[serde(default)]
    pub segment_ids: Vec<RemoteId>,
    #[serde(default)]
    pub content_category_ids: Vec<RemoteId>,
    #[serde(default)]
    pub ad_unit_ids: Vec<RemoteId>,
}

/// Frequency caps shared by every campaign under a line item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyCaps {
    pub per_day: Option<u32>,
    pub per_week: Option<u32>,
    pub lifetime: Option<u32>,
    /// Minimum minutes between impressions to one user.
    pub min_minutes_between: Option<u32>,
}

impl FrequencyCaps {
    pub fn is_empty(&self) -> bool {
        self.per_day.is_none()
            && self.per_week.is_none()
            && self.lifetime.is_none()
            && self.min_minutes_between.is_none()
    }
}

/// Line-item-level targeting profile contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItemProfileSpec {
    pub code: String,
    pub frequency: FrequencyCaps,
    /// Domains targeted inline.
    #[serde(default)]
    pub domains: Vec<String>,
    /// Shared include lists referenced by id.
    #[serde(default)]
    pub include_domain_list_ids: Vec<RemoteId>,
}

/// Everything needed to create a line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemSpec {
    pub name: String,
    pub code: String,
    pub profile_id: RemoteId,
    pub budget: Option<f64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// A named, reusable list of domains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainListSpec {
    pub name: String,
    pub description: Option<String>,
    pub domains: Vec<String>,
}

/// Inventory dimensions that can be enumerated live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetingKind {
    Segment,
    ContentCategory,
    AdUnit,
}

impl TargetingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetingKind::Segment => "segments",
            TargetingKind::ContentCategory => "content_categories",
            TargetingKind::AdUnit => "ad_units",
        }
    }
}

/// One enumerable inventory value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTargetingValue {
    pub id: RemoteId,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub parent_id: Option<RemoteId>,
    /// Data cost in CPM, when the network charges for the value.
    #[serde(default)]
    pub cost_cpm: Option<f64>,
}
