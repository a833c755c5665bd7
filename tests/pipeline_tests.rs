//! End-to-end pipeline tests against an in-memory provider
//!
//! Every test uses its own temporary NAV store and a fixed "today".


use chrono::NaiveDate;
use navrank::pipeline::{run_pipeline, PipelineEvent, PipelineOptions};
use navrank::provider::NavProvider;
use navrank::reports::{RankingConfig, RunSummary};
use navrank::returns::ReturnConfig;
use navrank::store::{Category, NavStore};
use navrank::sync::SyncStatus;
use provider_helpers::*;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tempfile::TempDir;

fn today() -> NaiveDate {
    d(2024, 6, 3)
}

fn options(today: NaiveDate) -> PipelineOptions {
    PipelineOptions {
        today,
        as_of: None,
        scheme_limit: None,
        staleness_days: 5,
        concurrency: 4,
        returns: ReturnConfig::default(),
        ranking: RankingConfig::default(),
    }
}

fn open_store(dir: &TempDir) -> Arc<NavStore> {
    Arc::new(NavStore::open(dir.path(), 8).unwrap())
}

async fn run(store: &Arc<NavStore>, provider: &Arc<FakeProvider>, options: &PipelineOptions) -> RunSummary {
    let provider: Arc<dyn NavProvider> = provider.clone();
    run_pipeline(store.clone(), provider, options, |_| {})
        .await
        .unwrap()
}

fn full_history(step: rust_decimal::Decimal) -> Vec<navrank::store::NavPoint> {
    linear_history(d(2023, 1, 1), today(), dec!(100), step)
}

fn overall_ids(summary: &RunSummary) -> Vec<String> {
    summary
        .report
        .overall
        .iter()
        .map(|e| e.scheme_id().to_string())
        .collect()
}

#[tokio::test]
async fn test_failed_fetch_does_not_block_other_schemes() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let provider = Arc::new(
        FakeProvider::new()
            .with_scheme("1", "Alpha Fund - Direct Plan - Growth", SMALL_CAP, full_history(dec!(0.09)))
            .with_scheme("2", "Beta Fund - Direct Plan - Growth", SMALL_CAP, full_history(dec!(0.05)))
            .with_scheme("3", "Gamma Fund - Direct Plan - Growth", DEBT, full_history(dec!(0.01)))
            .failing_for("1"),
    );

    let summary = run(&store, &provider, &options(today())).await;

    assert_eq!(overall_ids(&summary), vec!["2", "3"]);
    assert_eq!(summary.sync_count(SyncStatus::FetchFailed), 1);
    assert_eq!(summary.sync_count(SyncStatus::Updated), 2);
    assert_eq!(summary.report.excluded.len(), 1);
    assert_eq!(summary.report.excluded[0].scheme_id.as_str(), "1");
    assert!(summary.report.excluded[0].reason.contains("fetch failed"));
    assert!(store.load(&"1".into()).is_empty());
}

#[tokio::test]
async fn test_regular_plan_never_ranked_even_with_best_return() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let provider = Arc::new(
        FakeProvider::new()
            .with_scheme("10", "Rocket Fund - Regular Plan - Growth", SMALL_CAP, full_history(dec!(1)))
            .with_scheme("11", "Rocket Fund - Direct Plan - IDCW", SMALL_CAP, full_history(dec!(0.9)))
            .with_scheme("12", "Steady Fund - Direct Plan - Growth", SMALL_CAP, full_history(dec!(0.02))),
    );

    let summary = run(&store, &provider, &options(today())).await;

    assert_eq!(overall_ids(&summary), vec!["12"]);
    assert_eq!(summary.report.filtered, 2);
    for entries in summary.report.by_category.values() {
        assert!(entries.iter().all(|e| e.scheme_id().as_str() == "12"));
    }
    // Filtered schemes are still synced
    assert_eq!(store.load(&"10".into()).len(), full_history(dec!(1)).len());
}

#[tokio::test]
async fn test_equal_returns_order_by_scheme_id() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let provider = Arc::new(
        FakeProvider::new()
            .with_scheme("205", "Twin B - Direct Plan - Growth", LARGE_CAP, full_history(dec!(0.03)))
            .with_scheme("31", "Twin A - Direct Plan - Growth", LARGE_CAP, full_history(dec!(0.03)))
            .with_scheme("1000", "Leader - Direct Plan - Growth", LARGE_CAP, full_history(dec!(0.04))),
    );

    let summary = run(&store, &provider, &options(today())).await;

    assert_eq!(overall_ids(&summary), vec!["1000", "31", "205"]);
    let large_cap: Vec<&str> = summary.report.by_category[&Category::EquityLargeCap]
        .iter()
        .map(|e| e.scheme_id().as_str())
        .collect();
    assert_eq!(large_cap, vec!["1000", "31", "205"]);
    assert_eq!(summary.report.overall[1].rate(), summary.report.overall[2].rate());
}

#[tokio::test]
async fn test_categories_come_from_stored_metadata() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let provider = Arc::new(
        FakeProvider::new()
            .with_scheme("1", "Small - Direct Plan - Growth", SMALL_CAP, full_history(dec!(0.05)))
            .with_scheme("2", "Liquid - Direct Plan - Growth", DEBT, full_history(dec!(0.01))),
    );

    let summary = run(&store, &provider, &options(today())).await;

    let by_category = &summary.report.by_category;
    assert_eq!(by_category.len(), 2);
    assert_eq!(by_category[&Category::EquitySmallCap][0].scheme_id().as_str(), "1");
    assert_eq!(by_category[&Category::Debt][0].scheme_id().as_str(), "2");
    assert_eq!(
        store.load_meta(&"2".into()).unwrap().scheme_category.as_deref(),
        Some(DEBT)
    );
}

#[tokio::test]
async fn test_second_run_is_served_from_the_store() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let provider = Arc::new(
        FakeProvider::new()
            .with_scheme("1", "A - Direct Plan - Growth", SMALL_CAP, full_history(dec!(0.05)))
            .with_scheme("2", "B - Direct Plan - Growth", DEBT, full_history(dec!(0.01))),
    );

    let first = run(&store, &provider, &options(today())).await;
    assert_eq!(provider.history_calls(), 2);

    let second = run(&store, &provider, &options(today())).await;
    assert_eq!(provider.history_calls(), 2);
    assert_eq!(second.sync_count(SyncStatus::UpToDate), 2);
    assert_eq!(first.report.overall, second.report.overall);
}

#[tokio::test]
async fn test_stale_history_fetches_only_the_delta() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let early = d(2024, 5, 1);
    let first_provider = Arc::new(FakeProvider::new().with_scheme(
        "7",
        "A - Direct Plan - Growth",
        SMALL_CAP,
        linear_history(d(2023, 1, 1), early, dec!(100), dec!(0.05)),
    ));
    run(&store, &first_provider, &options(early)).await;

    let provider = Arc::new(FakeProvider::new().with_scheme(
        "7",
        "A - Direct Plan - Growth",
        SMALL_CAP,
        full_history(dec!(0.05)),
    ));
    let summary = run(&store, &provider, &options(today())).await;

    assert_eq!(provider.fetched(), vec![("7".into(), Some(early))]);
    assert_eq!(summary.sync_count(SyncStatus::Updated), 1);

    let series = store.load(&"7".into());
    assert_eq!(series.len(), full_history(dec!(0.05)).len());
    assert_eq!(series.latest_date(), Some(today()));
    assert!(series.points().windows(2).all(|w| w[0].date < w[1].date));
}

#[tokio::test]
async fn test_short_and_stale_histories_are_excluded() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let provider = Arc::new(
        FakeProvider::new()
            .with_scheme(
                "1",
                "New - Direct Plan - Growth",
                SMALL_CAP,
                linear_history(d(2024, 3, 1), today(), dec!(10), dec!(0.01)),
            )
            .with_scheme(
                "2",
                "Closed - Direct Plan - Growth",
                SMALL_CAP,
                linear_history(d(2022, 1, 1), d(2024, 4, 1), dec!(10), dec!(0.01)),
            )
            .with_scheme("3", "Old - Direct Plan - Growth", SMALL_CAP, full_history(dec!(0.01))),
    );

    let summary = run(&store, &provider, &options(today())).await;

    assert_eq!(overall_ids(&summary), vec!["3"]);
    assert_eq!(summary.sync_count(SyncStatus::Stale), 1);
    let reasons: Vec<(&str, &str)> = summary
        .report
        .excluded
        .iter()
        .map(|e| (e.scheme_id.as_str(), e.reason.as_str()))
        .collect();
    assert!(reasons[0].0 == "1" && reasons[0].1.contains("insufficient history"));
    assert!(reasons[1].0 == "2" && reasons[1].1.starts_with("stale"));
}

#[tokio::test]
async fn test_scheme_limit_caps_work() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let mut provider = FakeProvider::new();
    for id in 1..=5 {
        provider = provider.with_scheme(
            &id.to_string(),
            "Fund - Direct Plan - Growth",
            DEBT,
            full_history(dec!(0.01)),
        );
    }
    let provider = Arc::new(provider);

    let summary = run(
        &store,
        &provider,
        &PipelineOptions {
            scheme_limit: Some(2),
            ..options(today())
        },
    )
    .await;

    assert_eq!(summary.schemes_considered, 2);
    assert_eq!(provider.history_calls(), 2);
    assert_eq!(overall_ids(&summary), vec!["1", "2"]);
}

#[tokio::test]
async fn test_scheme_list_outage_falls_back_to_stored_schemes() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let provider = Arc::new(FakeProvider::new().with_scheme(
        "1",
        "A - Direct Plan - Growth",
        SMALL_CAP,
        full_history(dec!(0.05)),
    ));
    run(&store, &provider, &options(today())).await;

    let mut offline = FakeProvider::new();
    offline.list_fails = true;
    let offline = Arc::new(offline);

    let mut listed_from_cache = false;
    let provider: Arc<dyn NavProvider> = offline.clone();
    let summary = run_pipeline(store.clone(), provider, &options(today()), |event| {
        if let PipelineEvent::SchemesListed { from_cache, .. } = event {
            listed_from_cache = *from_cache;
        }
    })
    .await
    .unwrap();

    assert!(listed_from_cache);
    assert_eq!(overall_ids(&summary), vec!["1"]);
    assert_eq!(offline.history_calls(), 0);
}

#[tokio::test]
async fn test_scheme_list_outage_with_empty_store_is_fatal() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let mut offline = FakeProvider::new();
    offline.list_fails = true;
    let provider: Arc<dyn NavProvider> = Arc::new(offline);

    let result = run_pipeline(store, provider, &options(today()), |_| {}).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_as_of_pins_the_return_window() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let provider = Arc::new(FakeProvider::new().with_scheme(
        "1",
        "A - Direct Plan - Growth",
        SMALL_CAP,
        full_history(dec!(0.05)),
    ));

    let summary = run(
        &store,
        &provider,
        &PipelineOptions {
            as_of: Some(d(2024, 1, 1)),
            ..options(today())
        },
    )
    .await;

    let entry = &summary.report.overall[0];
    assert_eq!(entry.xirr.as_of, d(2024, 1, 1));
    assert_eq!(entry.xirr.start.date, d(2023, 1, 1));
    assert_eq!(summary.as_of, Some(d(2024, 1, 1)));
}

#[tokio::test]
async fn test_progress_reports_every_scheme() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let provider = Arc::new(
        FakeProvider::new()
            .with_scheme("1", "A - Direct Plan - Growth", DEBT, full_history(dec!(0.01)))
            .with_scheme("2", "B - Direct Plan - Growth", DEBT, full_history(dec!(0.01)))
            .failing_for("2"),
    );

    let mut done = Vec::new();
    let dyn_provider: Arc<dyn NavProvider> = provider.clone();
    run_pipeline(store, dyn_provider, &options(today()), |event| {
        if let PipelineEvent::SchemeDone {
            scheme_id, status, total, ..
        } = event
        {
            assert_eq!(*total, 2);
            done.push((scheme_id.to_string(), *status));
        }
    })
    .await
    .unwrap();

    done.sort();
    assert_eq!(
        done,
        vec![
            ("1".to_string(), SyncStatus::Updated),
            ("2".to_string(), SyncStatus::FetchFailed)
        ]
    );
}
