//! Source providers: which measure sources exist for a given context.
//!
//! A [`ProviderRegistry`] is built once at startup and handed to whatever
//! builds catalogs. There is no global provider state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::error::{MeasureError, MeasureResult};
use super::source::{MeasureSource, SourceEnv};
use super::sources::{builtin, inventory_source, static_source};
use super::DeliveryNetwork;
use crate::config::SourceSettings;
use crate::remote::{AdvertiserId, TargetingKind};

/// The company (advertiser) a catalog is built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    /// Advertiser id on the delivery network.
    pub advertiser_id: Option<AdvertiserId>,
}

/// The internal campaign being exported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignContext {
    pub id: i64,
    pub name: String,
    /// Domains the campaign may target.
    #[serde(default)]
    pub domains: Vec<String>,
}

/// The user on whose behalf the network is queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: i64,
    pub name: String,
}

/// Entities a provider may need to decide on its sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceContext {
    pub company: Option<Company>,
    pub campaign: Option<CampaignContext>,
    pub owner: Option<Owner>,
}

impl SourceContext {
    fn advertiser_id(&self) -> MeasureResult<AdvertiserId> {
        let company = self
            .company
            .as_ref()
            .ok_or_else(|| MeasureError::configuration("measure sources need a company"))?;
        company.advertiser_id.ok_or_else(|| {
            MeasureError::configuration(format!(
                "company {} has no advertiser id on the delivery network",
                company.name
            ))
        })
    }
}

/// Supplies the measure sources of one delivery network.
pub trait MeasureSourceProvider: Send + Sync {
    fn network(&self) -> DeliveryNetwork;

    /// Build the sources for `ctx`. Missing context fails here, not later.
    fn measure_sources(&self, ctx: &SourceContext) -> MeasureResult<Vec<Arc<dyn MeasureSource>>>;
}

/// Builtin reference tables plus, optionally, live inventory.
pub struct StandardSourceProvider {
    network: DeliveryNetwork,
    env: SourceEnv,
    include_online: bool,
    default_ttl: Duration,
    ttl_overrides: HashMap<String, Duration>,
}

impl StandardSourceProvider {
    /// Offline provider: reference tables only.
    pub fn new(network: DeliveryNetwork, env: SourceEnv) -> Self {
        Self {
            network,
            env,
            include_online: false,
            default_ttl: Duration::hours(1),
            ttl_overrides: HashMap::new(),
        }
    }

    /// Provider configured from the `[sources]` settings.
    pub fn from_settings(
        network: DeliveryNetwork,
        env: SourceEnv,
        settings: &SourceSettings,
    ) -> Self {
        let mut provider = Self::new(network, env);
        provider.default_ttl = settings.default_ttl();
        provider.include_online = settings.online;
        for source_id in settings.ttl_overrides.keys() {
            provider
                .ttl_overrides
                .insert(source_id.clone(), settings.ttl_for(source_id));
        }
        provider
    }

    /// Also provide the live inventory sources.
    pub fn with_online_sources(mut self, default_ttl: Duration) -> Self {
        self.include_online = true;
        self.default_ttl = default_ttl;
        self
    }

    /// TTL for one source id, overriding the default.
    pub fn with_ttl_override(mut self, source_id: impl Into<String>, ttl: Duration) -> Self {
        self.ttl_overrides.insert(source_id.into(), ttl);
        self
    }

    fn ttl_for(&self, source_id: &str) -> Duration {
        self.ttl_overrides
            .get(source_id)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    fn check_remote(&self) -> MeasureResult<()> {
        let remote = self.env.remote.as_ref().ok_or_else(|| {
            MeasureError::configuration(format!(
                "online {} sources need a delivery network client",
                self.network
            ))
        })?;
        if remote.network() != self.network {
            return Err(MeasureError::configuration(format!(
                "{} provider was given a {} client",
                self.network,
                remote.network()
            )));
        }
        Ok(())
    }
}

impl MeasureSourceProvider for StandardSourceProvider {
    fn network(&self) -> DeliveryNetwork {
        self.network
    }

    fn measure_sources(&self, ctx: &SourceContext) -> MeasureResult<Vec<Arc<dyn MeasureSource>>> {
        let advertiser_id = ctx.advertiser_id()?;
        let network = self.network;
        let env = &self.env;

        let tables = [
            (builtin::AGE_RANGE_PREFIX, builtin::age_ranges()),
            (builtin::GENDER_PREFIX, builtin::genders(network)),
            (builtin::METRO_PREFIX, builtin::metros()),
            (builtin::DEVICE_TYPE_PREFIX, builtin::device_types()),
        ];
        let mut sources: Vec<Arc<dyn MeasureSource>> = tables
            .into_iter()
            .map(|(prefix, table)| {
                Arc::new(static_source(network, prefix, table, env)) as Arc<dyn MeasureSource>
            })
            .collect();

        if let Some(campaign) = &ctx.campaign {
            let mut table = builtin::domains(&campaign.domains);
            // Each campaign has its own list; keep their snapshots apart
            table.name = format!("domains-{}", campaign.id);
            sources.push(Arc::new(static_source(network, builtin::DOMAIN_PREFIX, table, env)));
        }

        if self.include_online {
            if ctx.owner.is_none() {
                return Err(MeasureError::configuration(
                    "online measure sources need an owner",
                ));
            }
            self.check_remote()?;

            for (prefix, kind) in [
                (builtin::SEGMENT_PREFIX, TargetingKind::Segment),
                (builtin::CONTENT_CATEGORY_PREFIX, TargetingKind::ContentCategory),
                (builtin::AD_UNIT_PREFIX, TargetingKind::AdUnit),
            ] {
                let ttl = self.ttl_for(kind.as_str());
                sources.push(Arc::new(inventory_source(
                    network,
                    prefix,
                    advertiser_id,
                    kind,
                    ttl,
                    env,
                )));
            }
        }

        Ok(sources)
    }
}

/// Providers keyed by delivery network.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<DeliveryNetwork, Arc<dyn MeasureSourceProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one for its network.
    pub fn register(&mut self, provider: Arc<dyn MeasureSourceProvider>) -> &mut Self {
        self.providers.insert(provider.network(), provider);
        self
    }

    pub fn get(&self, network: DeliveryNetwork) -> Option<&Arc<dyn MeasureSourceProvider>> {
        self.providers.get(&network)
    }

    pub fn networks(&self) -> Vec<DeliveryNetwork> {
        self.providers.keys().copied().collect()
    }

    /// Sources of one network for `ctx`.
    pub fn measure_sources(
        &self,
        network: DeliveryNetwork,
        ctx: &SourceContext,
    ) -> MeasureResult<Vec<Arc<dyn MeasureSource>>> {
        let provider = self.get(network).ok_or_else(|| {
            MeasureError::configuration(format!("no measure source provider for {}", network))
        })?;
        provider.measure_sources(ctx)
    }
}
