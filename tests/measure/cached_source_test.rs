use budgetsync::cache::{CacheStore, ManualClock, SqliteCacheStore};
use budgetsync::measure::sources::{
    builtin, inventory_source, static_source, RemoteInventoryFetcher, RemoteInventorySource,
};
use budgetsync::measure::{
    attrs, kinds, CachedMeasureSource, DeliveryNetwork, MeasureCatalog, MeasureError,
    MeasureSource, SourceDescriptor, SourceEnv,
};
use budgetsync::remote::{
    InMemoryCampaignClient, RemoteOperation, RemoteTargetingValue, TargetingKind,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

const ADVERTISER: i64 = 42;

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn segment(id: i64, name: &str) -> RemoteTargetingValue {
    RemoteTargetingValue {
        id,
        name: name.to_string(),
        code: Some(format!("seg-{}", id)),
        parent_id: None,
        cost_cpm: Some(0.75),
    }
}

fn temp_db() -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("budgetsync-source-{}", uuid::Uuid::new_v4()))
        .join("cache.db")
}

struct Fixture {
    client: Arc<InMemoryCampaignClient>,
    clock: Arc<ManualClock>,
    env: SourceEnv,
}

impl Fixture {
    fn new(cache: Arc<dyn CacheStore>) -> Self {
        let client = Arc::new(InMemoryCampaignClient::new(DeliveryNetwork::AppNexus));
        client.set_targeting_values(
            TargetingKind::Segment,
            vec![segment(501, "Sports fans"), segment(502, "Auto intenders")],
        );
        let clock = Arc::new(ManualClock::new(t0()));
        let env = SourceEnv::new(cache, clock.clone()).with_remote(client.clone());
        Self { client, clock, env }
    }

    fn in_memory() -> Self {
        Self::new(Arc::new(SqliteCacheStore::open_in_memory().unwrap()))
    }

    fn segments(&self) -> RemoteInventorySource {
        inventory_source(
            DeliveryNetwork::AppNexus,
            10,
            ADVERTISER,
            TargetingKind::Segment,
            Duration::minutes(30),
            &self.env,
        )
    }
}

#[tokio::test]
async fn test_background_source_is_pending_until_refreshed() {
    let fx = Fixture::in_memory();
    let source = fx.segments();

    assert!(source.measures().await.unwrap().is_none());
    source.settle().await;

    let measures = source.measures().await.unwrap().unwrap();
    assert_eq!(measures.len(), 2);
    let sports = measures
        .values()
        .find(|m| m.display_name == "Sports fans")
        .unwrap();
    assert!(sports.is_kind(kinds::SEGMENT, None));
    assert_eq!(sports.attribute(attrs::REMOTE_ID).and_then(|v| v.as_i64()), Some(501));
    assert_eq!(sports.attribute(attrs::COST_CPM).and_then(|v| v.as_f64()), Some(0.75));
    assert_eq!(fx.client.call_count(RemoteOperation::ListTargeting), 1);
}

#[tokio::test]
async fn test_expired_snapshot_triggers_refetch() {
    let fx = Fixture::in_memory();
    let source = fx.segments();
    source.measures().await.unwrap();
    source.settle().await;

    fx.clock.advance(Duration::minutes(29));
    assert_eq!(source.measures().await.unwrap().unwrap().len(), 2);
    assert_eq!(fx.client.call_count(RemoteOperation::ListTargeting), 1);

    fx.client.set_targeting_values(TargetingKind::Segment, vec![segment(503, "Travelers")]);
    fx.clock.advance(Duration::minutes(1));
    assert!(source.measures().await.unwrap().is_none());
    source.settle().await;

    let measures = source.measures().await.unwrap().unwrap();
    assert_eq!(measures.len(), 1);
    assert_eq!(fx.client.call_count(RemoteOperation::ListTargeting), 2);
}

#[tokio::test]
async fn test_background_failure_is_reported_once() {
    let fx = Fixture::in_memory();
    fx.client.fail_on(RemoteOperation::ListTargeting, "segments");
    let source = fx.segments();

    assert!(source.measures().await.unwrap().is_none());
    source.settle().await;

    let err = source.measures().await.unwrap_err();
    assert!(matches!(err, MeasureError::Fetch { ref source_id, .. } if source_id == "segments"));

    // The error was consumed; the next call schedules another attempt
    fx.client.clear_failures();
    assert!(source.measures().await.unwrap().is_none());
    source.settle().await;
    assert_eq!(source.measures().await.unwrap().unwrap().len(), 2);
}

#[tokio::test]
async fn test_offline_source_cannot_reach_network() {
    let fx = Fixture::in_memory();
    let descriptor = SourceDescriptor::new("segments", DeliveryNetwork::AppNexus, 10);
    let source = CachedMeasureSource::new(
        descriptor,
        RemoteInventoryFetcher::new(ADVERTISER, TargetingKind::Segment),
        &fx.env,
    );

    let err = source.measures().await.unwrap_err();
    assert!(matches!(err, MeasureError::Capability { .. }));
    assert_eq!(fx.client.call_count(RemoteOperation::ListTargeting), 0);
}

#[tokio::test]
async fn test_sqlite_snapshot_survives_new_instance() {
    let path = temp_db();
    {
        let fx = Fixture::new(Arc::new(SqliteCacheStore::open_at(&path).unwrap()));
        let source = fx.segments();
        source.measures().await.unwrap();
        source.settle().await;
    }

    // Reopened store, and a client with nothing to list
    let fx = Fixture::new(Arc::new(SqliteCacheStore::open_at(&path).unwrap()));
    fx.client.set_targeting_values(TargetingKind::Segment, vec![]);
    let source = fx.segments();

    let measures = source.measures().await.unwrap().unwrap();
    assert_eq!(measures.len(), 2);
    assert_eq!(fx.client.call_count(RemoteOperation::ListTargeting), 0);

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

async fn domain_names(fx: &Fixture, domains: &[&str]) -> Vec<String> {
    let list: Vec<String> = domains.iter().map(|d| d.to_string()).collect();
    let mut table = builtin::domains(&list);
    table.name = "domains-9".to_string();
    let source = static_source(DeliveryNetwork::AppNexus, builtin::DOMAIN_PREFIX, table, &fx.env);

    let measures = source.measures().await.unwrap().unwrap();
    let mut names: Vec<String> = measures.values().map(|m| m.display_name.clone()).collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_persisted_domain_list_follows_campaign_edits() {
    let path = temp_db();
    {
        let fx = Fixture::new(Arc::new(SqliteCacheStore::open_at(&path).unwrap()));
        assert_eq!(domain_names(&fx, &["a.com"]).await, vec!["a.com"]);
    }

    let fx = Fixture::new(Arc::new(SqliteCacheStore::open_at(&path).unwrap()));
    assert_eq!(domain_names(&fx, &["a.com", "b.com"]).await, vec!["a.com", "b.com"]);
    // The earlier list is still cached under its own revision
    assert_eq!(domain_names(&fx, &["a.com"]).await, vec!["a.com"]);

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[tokio::test]
async fn test_catalog_lists_pending_sources() {
    let fx = Fixture::in_memory();
    let segments = Arc::new(fx.segments());
    let sources = vec![segments.clone() as Arc<dyn MeasureSource>];

    let first = MeasureCatalog::build(&sources).await.unwrap();
    assert_eq!(first.pending_sources(), ["segments".to_string()]);
    assert!(first.is_empty());
    assert_eq!(first.sources()[0].measure_count, None);

    segments.settle().await;
    let second = MeasureCatalog::build(&sources).await.unwrap();
    assert!(second.pending_sources().is_empty());
    assert_eq!(second.len(), 2);
    assert_eq!(second.sources()[0].measure_count, Some(2));
}
