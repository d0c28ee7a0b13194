use budgetsync::cache::{CacheStore, MemoryCacheStore};
use budgetsync::config::Settings;
use budgetsync::export::ExportError;
use budgetsync::export::simulate::{simulate, SimulationPlan};
use budgetsync::measure::MeasureIdAllocator;
use budgetsync::measure::{sources::builtin, DeliveryNetwork};
use serde_json::json;
use std::sync::Arc;

fn id(prefix: u8, local: i64) -> i64 {
    MeasureIdAllocator::for_source(DeliveryNetwork::AppNexus, prefix)
        .allocate(local)
        .unwrap()
        .get()
}

fn plan() -> SimulationPlan {
    serde_json::from_value(json!({
        "network": "app_nexus",
        "advertiser_id": 42,
        "line_item_id": 7,
        "creative_ids": [11],
        "campaign": {
            "id": 3,
            "name": "Spring",
            "domains": ["news.example.com"]
        },
        "nodes": [
            {
                "allocation_id": "A",
                "measure_set": [
                    id(builtin::METRO_PREFIX, 501),
                    id(builtin::AGE_RANGE_PREFIX, 1824)
                ],
                "period_media_budget": 100.0,
                "export_budget": 100.0
            },
            {
                "allocation_id": "B",
                "measure_set": [id(builtin::METRO_PREFIX, 803), id(builtin::GENDER_PREFIX, 2)],
                "period_media_budget": 80.0,
                "export_budget": 80.0
            },
            {
                "allocation_id": "C",
                "measure_set": [id(builtin::METRO_PREFIX, 602)],
                "period_media_budget": 0.0,
                "export_budget": 0.0
            }
        ],
        "existing_campaigns": [
            { "allocation_id": "B", "budget": 80.0 },
            { "allocation_id": "Z", "budget": 15.0 }
        ],
        "export_allocation_ids": ["A", "B", "C"]
    }))
    .unwrap()
}

fn cache() -> Arc<dyn CacheStore> {
    Arc::new(MemoryCacheStore::new())
}

#[tokio::test]
async fn test_simulated_run_reports_every_bucket() {
    let outcome = simulate(plan(), &Settings::default(), cache()).await.unwrap();
    let report = &outcome.report;

    insta::assert_snapshot!(
        report.metrics.summary().to_string(),
        @"created=1 updated=0 deleted=1 unchanged=1 uncreated=1 not_found=0 failed=0"
    );

    // 6 age bands, 2 genders, 12 metros, 4 device types, 1 domain
    assert_eq!(outcome.catalog_size, 25);
    assert!(outcome.remote_calls > 0);

    let codes: Vec<&str> = outcome.campaigns.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(codes, vec!["B", "A"]);
    let a = outcome.campaigns.iter().find(|c| c.code == "A").unwrap();
    assert_eq!(a.name, "bs-A");
    assert_eq!(a.budget, Some(100.0));
}

#[tokio::test]
async fn test_campaign_name_prefix_comes_from_settings() {
    let settings = Settings::from_toml(
        r#"
        [export]
        campaign_name_prefix = "spring"
        "#,
    )
    .unwrap();

    let outcome = simulate(plan(), &settings, cache()).await.unwrap();
    let a = outcome.campaigns.iter().find(|c| c.code == "A").unwrap();
    assert_eq!(a.name, "spring-A");
}

#[tokio::test]
async fn test_unknown_measure_fails_only_its_node() {
    let mut plan = plan();
    let unknown = budgetsync::measure::MeasureId::new(id(builtin::METRO_PREFIX, 999));
    plan.nodes[0].measure_set = [unknown].into_iter().collect();

    let outcome = simulate(plan, &Settings::default(), cache()).await.unwrap();

    assert!(outcome
        .report
        .failed_allocation_ids
        .contains("A"));
    assert!(outcome.report.unchanged_campaigns.contains("B"));
    assert!(outcome
        .report
        .metrics
        .failure_reason("A")
        .unwrap()
        .contains("not in the catalog"));
}

#[tokio::test]
async fn test_plan_with_repeated_measure_set_is_rejected() {
    let mut plan = plan();
    plan.nodes[2].measure_set = plan.nodes[0].measure_set.clone();

    let err = simulate(plan, &Settings::default(), cache()).await.unwrap_err();

    assert!(matches!(err, ExportError::Configuration(_)));
    assert!(err.to_string().contains("allocations A and C"));
}

#[tokio::test]
async fn test_outcome_serializes_to_json() {
    let outcome = simulate(plan(), &Settings::default(), cache()).await.unwrap();
    let value = serde_json::to_value(&outcome).unwrap();

    assert_eq!(value["catalog_size"], json!(25));
    assert_eq!(value["report"]["uncreated_campaigns"], json!(["C"]));
    assert!(value["report"]["run_id"].is_string());
}
