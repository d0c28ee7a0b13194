//! MeasureSource trait and the caching wrapper shared by every source.
//!
//! A source is a [`MeasureFetcher`] (how to produce one dimension's
//! measures) wrapped in a [`CachedMeasureSource`] (where to keep them and
//! when to fetch again). The wrapper looks in three places, in order:
//!
//! 1. the in-process memo
//! 2. the [`CacheStore`] entry under `{source_id}:snapshot` (or
//!    `{source_id}@{revision}:snapshot` for revised sources)
//! 3. the fetcher itself
//!
//! Synchronous sources block the caller on step 3. Background sources spawn
//! the fetch on the tokio runtime and answer `None` until it lands.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::{MeasureError, MeasureResult};
use super::id::{IdRange, MeasureIdAllocator};
use super::{DeliveryNetwork, Measure, MeasureId, MeasureMap};
use crate::cache::{CacheEntry, CacheError, CacheKey, CacheStore, Clock, Expiry, ScopedCache};
use crate::remote::RemoteCampaignClient;

/// How long a snapshot stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Computed once, cached forever.
    Static,
    /// Refetched once this much time has passed.
    Ttl(Duration),
}

impl Freshness {
    pub fn expiry_from(&self, now: DateTime<Utc>) -> Expiry {
        match self {
            Freshness::Static => Expiry::Never,
            Freshness::Ttl(ttl) => Expiry::after(now, *ttl),
        }
    }
}

/// Whether a cache miss blocks the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Fetch inline and return the result.
    Sync,
    /// Return `None` and fetch on a background task.
    Background,
}

/// Static facts about a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub source_id: String,
    pub network: DeliveryNetwork,
    /// Unique among the sources of one network.
    pub source_prefix: u8,
    /// May use the delivery network.
    pub online: bool,
    pub refresh: RefreshMode,
    pub freshness: Freshness,
    /// CacheStore name shared by the source's family.
    pub store: String,
    /// Content revision of inputs the source is built from. Snapshots of
    /// other revisions are never read.
    pub revision: Option<String>,
}

impl SourceDescriptor {
    /// An offline, synchronous, never-expiring source.
    pub fn new(source_id: impl Into<String>, network: DeliveryNetwork, source_prefix: u8) -> Self {
        Self {
            source_id: source_id.into(),
            network,
            source_prefix,
            online: false,
            refresh: RefreshMode::Sync,
            freshness: Freshness::Static,
            store: CacheKey::store(network.as_str(), "static"),
            revision: None,
        }
    }

    pub fn online(mut self) -> Self {
        self.online = true;
        self
    }

    pub fn background_refresh(mut self) -> Self {
        self.refresh = RefreshMode::Background;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.freshness = Freshness::Ttl(ttl);
        self
    }

    pub fn store(mut self, store: impl Into<String>) -> Self {
        self.store = store.into();
        self
    }

    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn allocator(&self) -> MeasureIdAllocator {
        MeasureIdAllocator::for_source(self.network, self.source_prefix)
    }

    pub fn id_range(&self) -> IdRange {
        self.allocator().range()
    }
}

/// One targeting dimension's measures.
#[async_trait]
pub trait MeasureSource: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    fn source_id(&self) -> &str {
        &self.descriptor().source_id
    }

    fn network(&self) -> DeliveryNetwork {
        self.descriptor().network
    }

    fn base_measure_id(&self) -> MeasureId {
        self.descriptor().id_range().min
    }

    fn max_measure_id(&self) -> MeasureId {
        self.descriptor().id_range().max
    }

    fn is_online(&self) -> bool {
        self.descriptor().online
    }

    fn is_async_refresh(&self) -> bool {
        self.descriptor().refresh == RefreshMode::Background
    }

    /// Current measures, or `None` while a background source has nothing
    /// fresh to offer yet.
    async fn measures(&self) -> MeasureResult<Option<Arc<MeasureMap>>>;
}

/// Produces the measures of one dimension.
#[async_trait]
pub trait MeasureFetcher: Send + Sync + 'static {
    async fn fetch(&self, ctx: &FetchContext<'_>) -> MeasureResult<Vec<Measure>>;
}

/// What a fetcher may use while fetching.
pub struct FetchContext<'a> {
    descriptor: &'a SourceDescriptor,
    remote: Option<&'a Arc<dyn RemoteCampaignClient>>,
    now: DateTime<Utc>,
}

impl<'a> FetchContext<'a> {
    pub fn new(
        descriptor: &'a SourceDescriptor,
        remote: Option<&'a Arc<dyn RemoteCampaignClient>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            descriptor,
            remote,
            now,
        }
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        self.descriptor
    }

    pub fn network(&self) -> DeliveryNetwork {
        self.descriptor.network
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Global id for a source-local id.
    pub fn measure_id(&self, local_id: i64) -> MeasureResult<MeasureId> {
        self.descriptor.allocator().allocate(local_id)
    }

    /// The delivery network client. Offline sources never get one.
    pub fn remote(&self) -> MeasureResult<&'a dyn RemoteCampaignClient> {
        if !self.descriptor.online {
            return Err(MeasureError::Capability {
                source_id: self.descriptor.source_id.clone(),
            });
        }
        self.remote.map(|c| c.as_ref()).ok_or_else(|| {
            MeasureError::configuration(format!(
                "online source {} has no delivery network client",
                self.descriptor.source_id
            ))
        })
    }
}

/// Per-source-name refresh locks.
///
/// With single-flight on, at most one fetch per source name runs at a
/// time across every source instance sharing this registry.
#[derive(Debug)]
pub struct RefreshGates {
    single_flight: bool,
    gates: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl RefreshGates {
    pub fn new(single_flight: bool) -> Self {
        Self {
            single_flight,
            gates: DashMap::new(),
        }
    }

    pub fn single_flight(&self) -> bool {
        self.single_flight
    }

    /// The lock for `name`, or `None` when refreshes are not serialized.
    pub fn gate(&self, name: &str) -> Option<Arc<tokio::sync::Mutex<()>>> {
        if !self.single_flight {
            return None;
        }
        Some(self.gates.entry(name.to_string()).or_default().clone())
    }
}

impl Default for RefreshGates {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Process-wide collaborators handed to every source.
#[derive(Clone)]
pub struct SourceEnv {
    pub cache: Arc<dyn CacheStore>,
    pub clock: Arc<dyn Clock>,
    pub gates: Arc<RefreshGates>,
    pub remote: Option<Arc<dyn RemoteCampaignClient>>,
}

impl SourceEnv {
    pub fn new(cache: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            clock,
            gates: Arc::new(RefreshGates::default()),
            remote: None,
        }
    }

    pub fn with_gates(mut self, gates: Arc<RefreshGates>) -> Self {
        self.gates = gates;
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteCampaignClient>) -> Self {
        self.remote = Some(remote);
        self
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    expiry: Expiry,
    measures: Arc<MeasureMap>,
}

struct Inner<F> {
    descriptor: SourceDescriptor,
    fetcher: F,
    cache: ScopedCache,
    clock: Arc<dyn Clock>,
    gates: Arc<RefreshGates>,
    remote: Option<Arc<dyn RemoteCampaignClient>>,
    memo: RwLock<Option<Snapshot>>,
    last_error: Mutex<Option<MeasureError>>,
    background: Mutex<Option<JoinHandle<()>>>,
}

/// A [`MeasureSource`] that caches what its fetcher produces.
pub struct CachedMeasureSource<F: MeasureFetcher> {
    inner: Arc<Inner<F>>,
}

impl<F: MeasureFetcher> CachedMeasureSource<F> {
    pub fn new(descriptor: SourceDescriptor, fetcher: F, env: &SourceEnv) -> Self {
        let cache = ScopedCache::new(env.cache.clone(), descriptor.store.clone());
        Self {
            inner: Arc::new(Inner {
                descriptor,
                fetcher,
                cache,
                clock: env.clock.clone(),
                gates: env.gates.clone(),
                remote: env.remote.clone(),
                memo: RwLock::new(None),
                last_error: Mutex::new(None),
                background: Mutex::new(None),
            }),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.inner.fetcher
    }

    /// Fetch now, regardless of freshness, and replace the snapshot.
    pub async fn refresh(&self) -> MeasureResult<Arc<MeasureMap>> {
        self.inner.refresh_gated(true).await
    }

    /// Wait for a running background refresh, if any.
    pub async fn settle(&self) {
        let handle = lock(&self.inner.background).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(
                    source = %self.inner.descriptor.source_id,
                    error = %e,
                    "background refresh task aborted"
                );
            }
        }
    }

    /// Drop the memo and the stored snapshot.
    pub fn invalidate(&self) -> MeasureResult<()> {
        *self.inner.memo.write().unwrap_or_else(|e| e.into_inner()) = None;
        self.inner.cache.delete(&self.inner.snapshot_key())?;
        Ok(())
    }

    fn schedule_refresh(&self) {
        let mut slot = lock(&self.inner.background);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let inner = Arc::clone(&self.inner);
        *slot = Some(tokio::spawn(async move {
            let gate = inner.gates.gate(&inner.gate_key());
            let _guard = match &gate {
                Some(gate) => match gate.try_lock() {
                    Ok(guard) => Some(guard),
                    Err(_) => {
                        debug!(source = %inner.descriptor.source_id, "refresh already in flight");
                        return;
                    }
                },
                None => None,
            };

            // Another instance may have stored a fresh snapshot meanwhile
            if let Ok(Some(_)) = inner.load_stored(inner.clock.now()) {
                return;
            }

            if let Err(e) = inner.fetch_and_store().await {
                warn!(
                    source = %inner.descriptor.source_id,
                    error = %e,
                    "background refresh failed"
                );
                *lock(&inner.last_error) = Some(e);
            }
        }));
    }
}

#[async_trait]
impl<F: MeasureFetcher> MeasureSource for CachedMeasureSource<F> {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.inner.descriptor
    }

    async fn measures(&self) -> MeasureResult<Option<Arc<MeasureMap>>> {
        let failed = lock(&self.inner.last_error).take();
        if let Some(err) = failed {
            return Err(err);
        }

        let now = self.inner.clock.now();
        if let Some(measures) = self.inner.fresh_memo(now) {
            return Ok(Some(measures));
        }
        if let Some(measures) = self.inner.load_stored(now)? {
            return Ok(Some(measures));
        }

        match self.inner.descriptor.refresh {
            RefreshMode::Sync => self.inner.refresh_gated(false).await.map(Some),
            RefreshMode::Background => {
                self.schedule_refresh();
                Ok(None)
            }
        }
    }
}

impl<F: MeasureFetcher> Inner<F> {
    fn snapshot_key(&self) -> String {
        match &self.descriptor.revision {
            Some(revision) => CacheKey::revised_snapshot(&self.descriptor.source_id, revision),
            None => CacheKey::snapshot(&self.descriptor.source_id),
        }
    }

    fn gate_key(&self) -> String {
        format!("{}/{}", self.descriptor.store, self.descriptor.source_id)
    }

    fn fresh_memo(&self, now: DateTime<Utc>) -> Option<Arc<MeasureMap>> {
        let memo = self.memo.read().unwrap_or_else(|e| e.into_inner());
        memo.as_ref()
            .filter(|s| !s.expiry.is_expired_at(now))
            .map(|s| s.measures.clone())
    }

    fn remember(&self, expiry: Expiry, measures: Arc<MeasureMap>) {
        *self.memo.write().unwrap_or_else(|e| e.into_inner()) = Some(Snapshot { expiry, measures });
    }

    /// Read the stored snapshot; `None` when absent, stale or unreadable.
    fn load_stored(&self, now: DateTime<Utc>) -> MeasureResult<Option<Arc<MeasureMap>>> {
        let stored = self.cache.get_json(&self.snapshot_key());
        let entry: Option<CacheEntry<Vec<Measure>>> = match stored {
            Ok(entry) => entry,
            Err(CacheError::Json(e)) => {
                warn!(
                    source = %self.descriptor.source_id,
                    error = %e,
                    "discarding unreadable snapshot"
                );
                None
            }
            Err(e) => return Err(e.into()),
        };

        let Some(entry) = entry else {
            return Ok(None);
        };
        if !entry.is_fresh_at(now) {
            return Ok(None);
        }

        let measures = Arc::new(self.index(entry.payload)?);
        self.remember(entry.expiry, measures.clone());
        Ok(Some(measures))
    }

    async fn refresh_gated(&self, force: bool) -> MeasureResult<Arc<MeasureMap>> {
        let gate = self.gates.gate(&self.gate_key());
        let _guard = match &gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        if !force {
            // Whoever held the gate before us may have just refreshed
            let now = self.clock.now();
            if let Some(measures) = self.fresh_memo(now) {
                return Ok(measures);
            }
            if let Some(measures) = self.load_stored(now)? {
                return Ok(measures);
            }
        }

        self.fetch_and_store().await
    }

    async fn fetch_and_store(&self) -> MeasureResult<Arc<MeasureMap>> {
        let now = self.clock.now();
        let ctx = FetchContext::new(&self.descriptor, self.remote.as_ref(), now);

        let fetched = self.fetcher.fetch(&ctx).await.map_err(|e| match e {
            MeasureError::Capability { .. }
            | MeasureError::Configuration(_)
            | MeasureError::Fetch { .. } => e,
            other => MeasureError::fetch(&self.descriptor.source_id, other),
        })?;
        let measures = self.index(fetched)?;

        let expiry = self.descriptor.freshness.expiry_from(now);
        let entry = CacheEntry::new(expiry, measures.values().cloned().collect::<Vec<_>>());
        // Stored only after a successful fetch, so a failure keeps the old entry
        if let Err(e) = self.cache.set_json(&self.snapshot_key(), &entry) {
            warn!(source = %self.descriptor.source_id, error = %e, "failed to store snapshot");
        }

        let measures = Arc::new(measures);
        self.remember(expiry, measures.clone());
        debug!(
            source = %self.descriptor.source_id,
            count = measures.len(),
            "measure snapshot refreshed"
        );
        Ok(measures)
    }

    /// Key measures by id, rejecting ids outside the source's range.
    fn index(&self, measures: Vec<Measure>) -> MeasureResult<MeasureMap> {
        let range = self.descriptor.id_range();
        let mut map = MeasureMap::new();

        for measure in measures {
            if !range.contains(measure.id) {
                return Err(MeasureError::configuration(format!(
                    "source {} produced measure {} outside its range [{}, {}]",
                    self.descriptor.source_id, measure.id, range.min, range.max
                )));
            }
            if measure.delivery_network != self.descriptor.network {
                return Err(MeasureError::configuration(format!(
                    "source {} produced measure {} for network {}",
                    self.descriptor.source_id, measure.id, measure.delivery_network
                )));
            }
            let id = measure.id;
            if map.insert(id, measure).is_some() {
                return Err(MeasureError::configuration(format!(
                    "source {} produced measure id {} twice",
                    self.descriptor.source_id, id
                )));
            }
        }

        Ok(map)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
