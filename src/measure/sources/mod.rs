//! Concrete measure sources.
//!
//! - [`StaticTableSource`]: offline, synchronous, never expires
//! - [`RemoteInventorySource`]: online, background refresh, TTL'd

pub mod builtin;
mod inventory;
mod static_table;

pub use inventory::RemoteInventoryFetcher;
pub use static_table::{LocalKey, StaticRow, StaticTable, StaticTableFetcher};

use chrono::Duration;

use super::source::{CachedMeasureSource, SourceDescriptor, SourceEnv};
use super::DeliveryNetwork;
use crate::cache::CacheKey;
use crate::remote::{AdvertiserId, TargetingKind};

pub type StaticTableSource = CachedMeasureSource<StaticTableFetcher>;
pub type RemoteInventorySource = CachedMeasureSource<RemoteInventoryFetcher>;

/// An offline source over `table`, identified by the table's name.
///
/// The snapshot is keyed by the table's fingerprint, so editing the rows
/// never serves a snapshot of the old ones.
pub fn static_source(
    network: DeliveryNetwork,
    source_prefix: u8,
    table: StaticTable,
    env: &SourceEnv,
) -> StaticTableSource {
    let descriptor = SourceDescriptor::new(table.name.clone(), network, source_prefix)
        .revision(table.fingerprint());
    CachedMeasureSource::new(descriptor, StaticTableFetcher::new(table), env)
}

/// An online source listing one inventory dimension of an advertiser.
pub fn inventory_source(
    network: DeliveryNetwork,
    source_prefix: u8,
    advertiser_id: AdvertiserId,
    kind: TargetingKind,
    ttl: Duration,
    env: &SourceEnv,
) -> RemoteInventorySource {
    let descriptor = SourceDescriptor::new(kind.as_str(), network, source_prefix)
        .online()
        .background_refresh()
        .ttl(ttl)
        .store(CacheKey::store(
            network.as_str(),
            &format!("inventory-{}", advertiser_id),
        ));
    CachedMeasureSource::new(
        descriptor,
        RemoteInventoryFetcher::new(advertiser_id, kind),
        env,
    )
}
