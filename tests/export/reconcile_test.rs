use budgetsync::config::ExportSettings;
use budgetsync::export::{
    desired_nodes, CampaignExportReconciler, ExportReport, ExportRequest,
    PerNodeBudgetAllocationResult,
};
use budgetsync::measure::{
    attrs, kinds, DeliveryNetwork, Measure, MeasureCatalog, MeasureId, MeasureIdAllocator,
    MeasureSet,
};
use budgetsync::remote::{InMemoryCampaignClient, RemoteCampaign, RemoteOperation};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const ADVERTISER: i64 = 42;
const LINE_ITEM: i64 = 7;
const NETWORK: DeliveryNetwork = DeliveryNetwork::AppNexus;

fn metro(code: i64) -> MeasureId {
    MeasureIdAllocator::for_source(NETWORK, 3).allocate(code).unwrap()
}

fn gender(local: i64) -> MeasureId {
    MeasureIdAllocator::for_source(NETWORK, 2).allocate(local).unwrap()
}

fn catalog() -> Arc<MeasureCatalog> {
    let metros = [(501, "New York"), (803, "Los Angeles"), (602, "Chicago")]
        .into_iter()
        .map(|(code, name)| {
            Measure::new(metro(code), NETWORK, kinds::GEOGRAPHY, name)
                .with_sub_type(kinds::METRO)
                .with_attribute(attrs::CODE, code)
        });
    let genders = [(1, "m"), (2, "f")].into_iter().map(|(local, code)| {
        Measure::new(gender(local), NETWORK, kinds::DEMOGRAPHIC, code)
            .with_sub_type(kinds::GENDER)
            .with_attribute(attrs::CODE, code)
    });
    Arc::new(MeasureCatalog::from_measures(metros.chain(genders)).unwrap())
}

fn set(ids: &[MeasureId]) -> MeasureSet {
    ids.iter().copied().collect()
}

/// Allocations A, B and C with distinct targeting.
fn nodes(budgets: [f64; 3]) -> Vec<PerNodeBudgetAllocationResult> {
    vec![
        PerNodeBudgetAllocationResult::new("A", set(&[metro(501)]), budgets[0]),
        PerNodeBudgetAllocationResult::new("B", set(&[metro(803), gender(2)]), budgets[1]),
        PerNodeBudgetAllocationResult::new("C", set(&[metro(602)]), budgets[2]),
    ]
}

fn request(
    nodes: Vec<PerNodeBudgetAllocationResult>,
    existing: &BTreeMap<String, bool>,
    export: &[&str],
) -> ExportRequest {
    ExportRequest {
        advertiser_id: ADVERTISER,
        line_item_id: LINE_ITEM,
        creative_ids: vec![11, 12],
        desired_nodes: desired_nodes(nodes).unwrap(),
        existing_campaigns: existing.clone(),
        export_allocation_ids: export.iter().map(|s| s.to_string()).collect(),
        start: None,
        end: None,
    }
}

fn ids(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

struct Harness {
    client: Arc<InMemoryCampaignClient>,
    reconciler: CampaignExportReconciler,
}

impl Harness {
    fn new() -> Self {
        let client = Arc::new(InMemoryCampaignClient::new(NETWORK));
        let reconciler =
            CampaignExportReconciler::new(client.clone(), catalog(), ExportSettings::default());
        Self { client, reconciler }
    }

    async fn run(&self, request: &ExportRequest) -> ExportReport {
        self.reconciler.reconcile(request).await.unwrap()
    }

    fn campaign(&self, code: &str) -> Option<RemoteCampaign> {
        self.client.campaign_by_code(ADVERTISER, code)
    }
}

#[tokio::test]
async fn test_create_only_skips_nodes_without_budget() {
    let h = Harness::new();
    let report = h
        .run(&request(nodes([100.0, 0.0, 50.0]), &BTreeMap::new(), &["A", "B"]))
        .await;

    assert_eq!(report.created_campaigns.keys().cloned().collect::<BTreeSet<_>>(), ids(&["A"]));
    assert_eq!(report.uncreated_campaigns, ids(&["B"]));
    assert!(report.failed_allocation_ids.is_empty());
    assert_eq!(report.created_profiles.len(), 1);

    let a = h.campaign("A").unwrap();
    assert_eq!(a.id, report.created_campaigns["A"]);
    assert_eq!(a.name, "bs-A");
    assert_eq!(a.budget, Some(100.0));
    assert_eq!(a.line_item_id, LINE_ITEM);
    assert!(a.active);
    assert_eq!(h.client.profile(ADVERTISER, a.profile_id).unwrap().metro_codes, vec![501]);

    // C has budget but was not requested
    assert!(h.campaign("C").is_none());
    assert!(h.campaign("B").is_none());
}

#[tokio::test]
async fn test_second_identical_run_changes_nothing() {
    let h = Harness::new();
    let first = h
        .run(&request(nodes([100.0, 80.0, 50.0]), &BTreeMap::new(), &["A", "B", "C"]))
        .await;
    assert_eq!(first.metrics.summary().created, 3);

    let existing = first.next_existing(&BTreeMap::new());
    h.client.clear_calls();
    let second = h
        .run(&request(nodes([100.0, 80.0, 50.0]), &existing, &["A", "B", "C"]))
        .await;

    assert!(second.is_noop());
    assert_eq!(second.unchanged_campaigns, ids(&["A", "B", "C"]));
    assert_eq!(second.exported_allocation_ids(), ids(&["A", "B", "C"]));
    assert_eq!(h.client.call_count(RemoteOperation::CreateCampaign), 0);
    assert_eq!(h.client.call_count(RemoteOperation::DeleteCampaign), 0);
    assert_eq!(h.client.call_count(RemoteOperation::CreateProfile), 0);
}

#[tokio::test]
async fn test_update_replaces_campaign_and_keeps_profile() {
    let h = Harness::new();
    let first = h
        .run(&request(nodes([100.0, 80.0, 50.0]), &BTreeMap::new(), &["A", "B"]))
        .await;
    let old = h.campaign("A").unwrap();
    let existing = first.next_existing(&BTreeMap::new());

    let second = h
        .run(&request(nodes([150.0, 80.0, 50.0]), &existing, &["A", "B"]))
        .await;

    assert_eq!(second.updated_campaigns.keys().cloned().collect::<BTreeSet<_>>(), ids(&["A"]));
    assert_eq!(second.unchanged_campaigns, ids(&["B"]));
    assert!(second.created_profiles.is_empty());

    let new = h.campaign("A").unwrap();
    assert_ne!(new.id, old.id);
    assert_eq!(second.updated_campaigns["A"], new.id);
    assert_eq!(new.profile_id, old.profile_id);
    assert_eq!(new.budget, Some(150.0));
    assert_eq!(h.client.campaigns(ADVERTISER).len(), 2);
}

#[tokio::test]
async fn test_removed_allocations_are_deleted() {
    let h = Harness::new();
    let first = h
        .run(&request(nodes([100.0, 80.0, 50.0]), &BTreeMap::new(), &["A", "B", "C"]))
        .await;
    let mut existing = first.next_existing(&BTreeMap::new());
    // Inactive campaigns are left alone
    existing.insert("C".to_string(), false);

    let second = h.run(&request(nodes([100.0, 80.0, 50.0]), &existing, &["A"])).await;

    assert_eq!(second.deleted_campaigns, ids(&["B"]));
    assert_eq!(second.unchanged_campaigns, ids(&["A"]));
    assert!(h.campaign("B").is_none());
    assert!(h.campaign("C").is_some());

    let next = second.next_existing(&existing);
    assert_eq!(next.keys().cloned().collect::<BTreeSet<_>>(), ids(&["A", "C"]));
}

#[tokio::test]
async fn test_missing_campaign_on_deactivation_is_not_a_failure() {
    let h = Harness::new();
    let existing = BTreeMap::from([("Z".to_string(), true)]);

    let report = h.run(&request(nodes([100.0, 80.0, 50.0]), &existing, &[])).await;

    let summary = report.metrics.summary();
    assert_eq!(summary.not_found, 1);
    assert_eq!(summary.failed, 0);
    assert!(report.deleted_campaigns.is_empty());
    assert_eq!(h.client.call_count(RemoteOperation::DeleteCampaign), 0);
}

#[tokio::test]
async fn test_one_failing_node_does_not_stop_the_others() {
    let h = Harness::new();
    h.client.fail_on(RemoteOperation::CreateCampaign, "B");

    let first = h
        .run(&request(nodes([100.0, 80.0, 50.0]), &BTreeMap::new(), &["A", "B", "C"]))
        .await;

    assert_eq!(first.created_campaigns.keys().cloned().collect::<BTreeSet<_>>(), ids(&["A", "C"]));
    assert_eq!(first.failed_allocation_ids, ids(&["B"]));
    assert!(first.metrics.failure_reason("B").unwrap().contains("INJECTED"));

    // B's profile exists remotely but is only reported with its campaign
    assert_eq!(first.created_profiles.keys().cloned().collect::<BTreeSet<_>>(), ids(&["A", "C"]));

    let existing = first.next_existing(&BTreeMap::new());
    assert!(!existing.contains_key("B"));

    h.client.clear_failures();
    h.client.clear_calls();
    let second = h
        .run(&request(nodes([100.0, 80.0, 50.0]), &existing, &["A", "B", "C"]))
        .await;

    assert_eq!(second.created_campaigns.keys().cloned().collect::<BTreeSet<_>>(), ids(&["B"]));
    assert_eq!(second.unchanged_campaigns, ids(&["A", "C"]));
    // The profile is found again, not recreated
    assert!(second.created_profiles.is_empty());
    assert_eq!(h.client.call_count(RemoteOperation::CreateProfile), 0);
}

#[tokio::test]
async fn test_failed_recreate_leaves_node_without_campaign() {
    let h = Harness::new();
    let first = h
        .run(&request(nodes([100.0, 80.0, 50.0]), &BTreeMap::new(), &["A"]))
        .await;
    let existing = first.next_existing(&BTreeMap::new());

    // Delete succeeds, the replacement create does not
    h.client.fail_on(RemoteOperation::CreateCampaign, "A");
    let second = h.run(&request(nodes([120.0, 80.0, 50.0]), &existing, &["A"])).await;

    assert_eq!(second.failed_allocation_ids, ids(&["A"]));
    assert!(second.updated_campaigns.is_empty());
    assert!(h.campaign("A").is_none());

    // A later run notices the campaign is gone and creates it
    h.client.clear_failures();
    let existing = second.next_existing(&existing);
    assert_eq!(existing.get("A"), Some(&true));
    let third = h.run(&request(nodes([120.0, 80.0, 50.0]), &existing, &["A"])).await;

    assert_eq!(third.created_campaigns.keys().cloned().collect::<BTreeSet<_>>(), ids(&["A"]));
    assert_eq!(h.campaign("A").unwrap().budget, Some(120.0));
}

#[tokio::test]
async fn test_budget_dropping_to_zero_takes_campaign_down() {
    let h = Harness::new();
    let first = h
        .run(&request(nodes([100.0, 80.0, 50.0]), &BTreeMap::new(), &["A", "B"]))
        .await;
    let existing = first.next_existing(&BTreeMap::new());

    let second = h.run(&request(nodes([0.0, 80.0, 50.0]), &existing, &["A", "B"])).await;

    assert_eq!(second.deleted_campaigns, ids(&["A"]));
    assert!(second.uncreated_campaigns.is_empty());
    assert_eq!(second.unchanged_campaigns, ids(&["B"]));
    assert_eq!(second.exported_allocation_ids(), ids(&["B"]));
    assert_eq!(second.metrics.summary().deleted, 1);
    assert!(h.campaign("A").is_none());

    let next = second.next_existing(&existing);
    assert_eq!(next.keys().cloned().collect::<BTreeSet<_>>(), ids(&["B"]));

    // Nothing left to take down; A is now simply not created
    let third = h.run(&request(nodes([0.0, 80.0, 50.0]), &next, &["A", "B"])).await;
    assert!(third.is_noop());
    assert_eq!(third.uncreated_campaigns, ids(&["A"]));
}

#[tokio::test]
async fn test_requested_id_without_node() {
    let h = Harness::new();
    let existing = BTreeMap::from([("X".to_string(), true), ("W".to_string(), false)]);
    for code in ["X", "W"] {
        h.client.seed_campaign(
            ADVERTISER,
            RemoteCampaign {
                id: 0,
                name: format!("bs-{}", code),
                code: code.to_string(),
                line_item_id: LINE_ITEM,
                profile_id: 1,
                creative_ids: vec![],
                active: code == "X",
                start: None,
                end: None,
                budget: Some(10.0),
                impression_cap: None,
                max_bid: None,
            },
        );
    }

    let report = h
        .run(&request(nodes([100.0, 80.0, 50.0]), &existing, &["W", "X", "Y"]))
        .await;

    // X was live with no node behind it, so it is deleted
    assert_eq!(report.deleted_campaigns, ids(&["X"]));
    assert!(h.campaign("X").is_none());
    // W is already inactive and Y never existed
    assert_eq!(report.uncreated_campaigns, ids(&["W", "Y"]));
    assert!(h.campaign("W").is_some());
    assert!(report.failed_allocation_ids.is_empty());
}
