//! Measure catalog: targeting-dimension metadata from many sources.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        MeasureCatalog                           │
//! │        by_id / filter / value  (one export run)                 │
//! └─────────────────────────────────────────────────────────────────┘
//!                           │ built from
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 dyn MeasureSource  (per dimension)              │
//! │  CachedMeasureSource<F> = memo → CacheStore → MeasureFetcher    │
//! │  - StaticTableFetcher     (offline, never expires)              │
//! │  - RemoteInventoryFetcher (online, TTL, background refresh)     │
//! └─────────────────────────────────────────────────────────────────┘
//!                           │ ids from
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │      MeasureIdAllocator (network, source, local) -> i64         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod catalog;
mod error;
pub mod id;
mod provider;
mod source;
pub mod sources;

pub use catalog::{MeasureCatalog, Resolved, SourceSummary};
pub use error::{MeasureError, MeasureResult};
pub use id::{IdRange, MeasureIdAllocator};
pub use provider::{
    CampaignContext, Company, MeasureSourceProvider, Owner, ProviderRegistry, SourceContext,
    StandardSourceProvider,
};
pub use source::{
    CachedMeasureSource, FetchContext, Freshness, MeasureFetcher, MeasureSource, RefreshGates,
    RefreshMode, SourceDescriptor, SourceEnv,
};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Well-known measure type and subtype names.
pub mod kinds {
    pub const DEMOGRAPHIC: &str = "demographic";
    pub const AGE_RANGE: &str = "agerange";
    pub const GENDER: &str = "gender";
    pub const GEOGRAPHY: &str = "geography";
    pub const METRO: &str = "metro";
    pub const DEVICE: &str = "device";
    pub const DEVICE_TYPE: &str = "devicetype";
    pub const SEGMENT: &str = "segment";
    pub const INVENTORY: &str = "inventory";
    pub const CONTENT_CATEGORY: &str = "contentcategory";
    pub const AD_UNIT: &str = "adunit";
    pub const DOMAIN: &str = "domain";
}

/// Well-known attribute names.
pub mod attrs {
    /// Id of the value on the delivery network.
    pub const REMOTE_ID: &str = "remote_id";
    /// Network-specific code (gender letter, metro code, device name).
    pub const CODE: &str = "code";
    pub const AGE_LOW: &str = "low";
    pub const AGE_HIGH: &str = "high";
    pub const COST_CPM: &str = "cost_cpm";
    pub const PARENT_ID: &str = "parent_id";
    pub const DOMAIN: &str = "domain";
}

/// Globally unique measure identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasureId(i64);

impl MeasureId {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MeasureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MeasureId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// An external advertising platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryNetwork {
    AppNexus,
    GoogleDfp,
}

impl DeliveryNetwork {
    pub const ALL: [DeliveryNetwork; 2] = [DeliveryNetwork::AppNexus, DeliveryNetwork::GoogleDfp];

    /// High-order prefix of every measure id on this network.
    pub fn prefix(&self) -> u8 {
        match self {
            DeliveryNetwork::AppNexus => 1,
            DeliveryNetwork::GoogleDfp => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryNetwork::AppNexus => "appnexus",
            DeliveryNetwork::GoogleDfp => "dfp",
        }
    }
}

impl fmt::Display for DeliveryNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryNetwork {
    type Err = MeasureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "appnexus" | "app_nexus" | "apn" => Ok(DeliveryNetwork::AppNexus),
            "dfp" | "google_dfp" | "googledfp" => Ok(DeliveryNetwork::GoogleDfp),
            other => Err(MeasureError::configuration(format!(
                "unknown delivery network: {}",
                other
            ))),
        }
    }
}

/// A value in a measure's attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Flag(bool),
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integers, and text that parses as one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(n) => Some(*n),
            AttributeValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(n) => Some(*n as f64),
            AttributeValue::Decimal(d) => Some(*d),
            AttributeValue::Text(s) => s.trim().parse().ok(),
            AttributeValue::Flag(_) => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Flag(b) => write!(f, "{}", b),
            AttributeValue::Integer(n) => write!(f, "{}", n),
            AttributeValue::Decimal(d) => write!(f, "{}", d),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Integer(n)
    }
}

impl From<f64> for AttributeValue {
    fn from(d: f64) -> Self {
        AttributeValue::Decimal(d)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Flag(b)
    }
}

/// A single targeting-dimension value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub id: MeasureId,
    pub display_name: String,
    #[serde(default)]
    pub data_provider: Option<String>,
    pub delivery_network: DeliveryNetwork,
    #[serde(rename = "type")]
    pub measure_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Measure {
    pub fn new(
        id: MeasureId,
        delivery_network: DeliveryNetwork,
        measure_type: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            data_provider: None,
            delivery_network,
            measure_type: measure_type.into(),
            sub_type: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.sub_type = Some(sub_type.into());
        self
    }

    pub fn with_data_provider(mut self, provider: impl Into<String>) -> Self {
        self.data_provider = Some(provider.into());
        self
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Case-insensitive match on type and, when given, subtype.
    pub fn is_kind(&self, measure_type: &str, sub_type: Option<&str>) -> bool {
        if !self.measure_type.eq_ignore_ascii_case(measure_type) {
            return false;
        }
        match sub_type {
            None => true,
            Some(wanted) => self
                .sub_type
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(wanted)),
        }
    }
}

/// Measure snapshot of one source, keyed by id.
pub type MeasureMap = BTreeMap<MeasureId, Measure>;

/// The combined targeting criteria of one allocation node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasureSet(BTreeSet<MeasureId>);

impl MeasureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: MeasureId) -> bool {
        self.0.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = MeasureId> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<MeasureId> for MeasureSet {
    fn from_iter<T: IntoIterator<Item = MeasureId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for MeasureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.0.iter().map(|id| id.to_string()).collect();
        write!(f, "{{{}}}", ids.join(","))
    }
}
