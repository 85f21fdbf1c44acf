//! Result cache behaviour as seen through the service.

use analytics_service::QueryParams;
use chrono::Utc;
use engine_core::limits::DEFAULT_QUERY_LIMIT;
use engine_core::QueryFilter;
use integration_tests::fixtures;
use integration_tests::mocks::MockStore;
use integration_tests::setup::{TestContext, TestOptions};
use std::collections::HashMap;
use std::time::Duration;
use worker::warmer::presets;

fn unfiltered() -> QueryParams {
    QueryParams::from_map(&HashMap::new(), DEFAULT_QUERY_LIMIT, Utc::now()).expect("valid params")
}

fn for_project(project: &str) -> QueryParams {
    let map = HashMap::from([("project".to_string(), project.to_string())]);
    QueryParams::from_map(&map, DEFAULT_QUERY_LIMIT, Utc::now()).expect("valid params")
}

async fn seeded(options: TestOptions) -> TestContext {
    let mut rows = fixtures::project_events("shop", 1, 3);
    rows.extend(fixtures::project_events("blog", 10, 2));
    TestContext::with_store(MockStore::with_rows(rows), options).await
}

#[tokio::test]
async fn test_repeat_read_is_served_from_cache() {
    let ctx = seeded(TestOptions::default()).await;
    let params = unfiltered();

    let first = ctx.service.get_top_stats(&params).await.unwrap();
    let scans = ctx.store.scan_count();
    assert!(scans > 0);

    let second = ctx.service.get_top_stats(&params).await.unwrap();
    assert_eq!(ctx.store.scan_count(), scans);
    assert_eq!(first, second);

    let stats = ctx.cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.items, 1);
}

#[tokio::test]
async fn test_cached_result_outlives_store_outage() {
    let ctx = seeded(TestOptions::default()).await;
    let params = unfiltered();

    let pages = ctx.service.get_top_pages(&params).await.unwrap();
    ctx.store.set_should_fail(true);

    assert_eq!(ctx.service.get_top_pages(&params).await.unwrap(), pages);
    assert!(ctx.service.get_top_countries(&params).await.is_err());
}

#[tokio::test]
async fn test_filters_and_endpoints_get_separate_entries() {
    let ctx = seeded(TestOptions::default()).await;

    let shop = ctx.service.get_top_stats(&for_project("shop")).await.unwrap();
    let blog = ctx.service.get_top_stats(&for_project("blog")).await.unwrap();
    ctx.service.get_timeline(&for_project("shop")).await.unwrap();

    assert_eq!(shop.total_events, 3);
    assert_eq!(blog.total_events, 2);
    assert_eq!(ctx.cache.len(), 3);
    assert_eq!(ctx.cache.stats().hits, 0);
}

#[tokio::test]
async fn test_entries_expire_after_ttl() {
    let ctx = seeded(TestOptions {
        cache_ttl: Duration::from_millis(50),
        ..Default::default()
    })
    .await;
    let params = unfiltered();

    assert_eq!(ctx.service.get_top_stats(&params).await.unwrap().total_events, 5);

    ctx.service
        .track_event(fixtures::page_view("/new"), &fixtures::client("8.8.8.8"))
        .await
        .unwrap();
    ctx.flush().await;

    // Still the cached figure until the entry expires.
    assert_eq!(ctx.service.get_top_stats(&params).await.unwrap().total_events, 5);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ctx.service.get_top_stats(&params).await.unwrap().total_events, 6);
}

#[tokio::test]
async fn test_cache_stays_within_budget() {
    let budget = 4 * 1024;
    let ctx = seeded(TestOptions {
        cache_bytes: budget,
        ..Default::default()
    })
    .await;

    for i in 0..50 {
        let params = for_project(&format!("project-{}", i));
        ctx.service.get_top_stats(&params).await.unwrap();
        assert!(ctx.cache.size_bytes() <= budget);
    }
    assert!(ctx.cache.len() < 50);
}

#[tokio::test]
async fn test_online_users_bypass_cache() {
    let ctx = seeded(TestOptions::default()).await;

    ctx.service.get_online_users(None).await.unwrap();
    let scans = ctx.store.scan_count();
    ctx.service.get_online_users(None).await.unwrap();

    assert_eq!(ctx.store.scan_count(), scans + 1);
    assert!(ctx.cache.is_empty());
}

#[tokio::test]
async fn test_warmer_populates_presets_per_project() {
    let ctx = seeded(TestOptions::default()).await;

    // Five presets, unfiltered plus two projects.
    assert_eq!(ctx.warmer().warm().await, 15);
    assert!(!ctx.cache.is_empty());

    let (name, yesterday) = presets(Utc::now())[1];
    assert_eq!(name, "yesterday");

    let scans = ctx.store.scan_count();
    ctx.queries
        .top_stats(&yesterday, &QueryFilter::for_project("shop"))
        .await
        .unwrap();
    assert_eq!(ctx.store.scan_count(), scans);
}

#[tokio::test]
async fn test_warmer_aborts_when_projects_fail() {
    let ctx = seeded(TestOptions::default()).await;
    ctx.store.set_should_fail(true);

    assert_eq!(ctx.warmer().warm().await, 0);
    assert!(ctx.cache.is_empty());
}
