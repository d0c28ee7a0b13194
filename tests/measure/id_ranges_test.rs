use budgetsync::cache::{MemoryCacheStore, SystemClock};
use budgetsync::measure::id::{allocate, decompose, verify_disjoint, LOCAL_SPAN};
use budgetsync::measure::{
    CampaignContext, Company, DeliveryNetwork, MeasureCatalog, MeasureError, MeasureIdAllocator,
    MeasureSourceProvider, Owner, SourceContext, SourceEnv, StandardSourceProvider,
};
use budgetsync::remote::InMemoryCampaignClient;
use chrono::Duration;
use proptest::prelude::*;
use std::sync::Arc;

fn context() -> SourceContext {
    SourceContext {
        company: Some(Company {
            id: 7,
            name: "Acme".to_string(),
            advertiser_id: Some(42),
        }),
        campaign: Some(CampaignContext {
            id: 3,
            name: "Spring".to_string(),
            domains: vec!["news.example.com".to_string(), "Sports.Example.com".to_string()],
        }),
        owner: Some(Owner {
            id: 1,
            name: "planner".to_string(),
        }),
    }
}

fn provider(network: DeliveryNetwork) -> StandardSourceProvider {
    let env = SourceEnv::new(Arc::new(MemoryCacheStore::new()), Arc::new(SystemClock))
        .with_remote(Arc::new(InMemoryCampaignClient::new(network)));
    StandardSourceProvider::new(network, env).with_online_sources(Duration::hours(1))
}

proptest! {
    #[test]
    fn allocated_ids_decompose_to_their_parts(
        network in any::<u8>(),
        source in any::<u8>(),
        local in 0..LOCAL_SPAN,
    ) {
        let id = allocate(network, source, local).unwrap();
        prop_assert_eq!(decompose(id), Some((network, source, local)));
        prop_assert!(MeasureIdAllocator::new(network, source).range().contains(id));
    }

    #[test]
    fn distinct_sources_never_share_ids(
        a in (any::<u8>(), any::<u8>()),
        b in (any::<u8>(), any::<u8>()),
        local_a in 0..LOCAL_SPAN,
        local_b in 0..LOCAL_SPAN,
    ) {
        prop_assume!(a != b);
        let range_a = MeasureIdAllocator::new(a.0, a.1).range();
        let range_b = MeasureIdAllocator::new(b.0, b.1).range();
        prop_assert!(!range_a.intersects(&range_b));

        let id_a = allocate(a.0, a.1, local_a).unwrap();
        let id_b = allocate(b.0, b.1, local_b).unwrap();
        prop_assert_ne!(id_a, id_b);
    }

    #[test]
    fn out_of_span_local_ids_are_rejected(local in prop_oneof![i64::MIN..0, LOCAL_SPAN..i64::MAX]) {
        let is_out_of_range = matches!(
            allocate(1, 1, local),
            Err(MeasureError::IdOutOfRange { .. })
        );
        prop_assert!(is_out_of_range);
    }
}

#[test]
fn test_builtin_sources_are_disjoint_across_networks() {
    let ctx = context();
    let mut sources = provider(DeliveryNetwork::AppNexus).measure_sources(&ctx).unwrap();
    sources.extend(provider(DeliveryNetwork::GoogleDfp).measure_sources(&ctx).unwrap());

    // 4 reference tables, the campaign's domains and 3 inventory dimensions
    assert_eq!(sources.len(), 16);

    let ranges: Vec<_> = sources
        .iter()
        .map(|s| (s.source_id(), s.descriptor().id_range()))
        .collect();
    verify_disjoint(ranges).unwrap();
}

#[test]
fn test_overlapping_ranges_are_reported() {
    let range = MeasureIdAllocator::new(1, 10).range();
    let err = verify_disjoint([("segments", range), ("audiences", range)]).unwrap_err();
    assert!(matches!(err, MeasureError::Configuration(_)));
    assert!(err.to_string().contains("segments"));
}

#[tokio::test]
async fn test_builtin_measures_stay_inside_their_source_range() {
    let ctx = SourceContext {
        owner: None,
        ..context()
    };
    let network = DeliveryNetwork::GoogleDfp;
    let env = SourceEnv::new(Arc::new(MemoryCacheStore::new()), Arc::new(SystemClock));
    let sources = StandardSourceProvider::new(network, env)
        .measure_sources(&ctx)
        .unwrap();

    let catalog = MeasureCatalog::build(&sources).await.unwrap();
    assert!(catalog.pending_sources().is_empty());
    assert!(!catalog.is_empty());

    for measure in catalog.iter() {
        let owner: Vec<_> = catalog
            .sources()
            .iter()
            .filter(|s| s.range.contains(measure.id))
            .collect();
        assert_eq!(owner.len(), 1, "measure {} has no single owner", measure.id);
        let (network_prefix, _, _) = decompose(measure.id).unwrap();
        assert_eq!(network_prefix, network.prefix());
    }
}
