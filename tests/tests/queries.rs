//! Read-side tests: aggregates, funnels and paging through the service.

use analytics_service::{EventsParams, QueryParams};
use chrono::{Duration, Utc};
use engine_core::limits::DEFAULT_QUERY_LIMIT;
use engine_core::{Channel, Event, FunnelRequest, FunnelStep, RawEvent};
use integration_tests::fixtures;
use integration_tests::mocks::MockStore;
use integration_tests::setup::{TestContext, TestOptions};
use std::collections::HashMap;

fn params(pairs: &[(&str, &str)]) -> QueryParams {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    QueryParams::from_map(&map, DEFAULT_QUERY_LIMIT, Utc::now()).expect("valid params")
}

async fn seeded() -> TestContext {
    let mut rows = fixtures::project_events("shop", 1, 3);
    rows.extend(fixtures::project_events("blog", 10, 2));
    TestContext::with_store(MockStore::with_rows(rows), TestOptions::default()).await
}

#[tokio::test]
async fn test_top_stats_respects_project_filter() {
    let ctx = seeded().await;

    let all = ctx.service.get_top_stats(&params(&[])).await.unwrap();
    assert_eq!(all.total_events, 5);
    assert_eq!(all.unique_users, 5);
    assert_eq!(all.page_views, 5);

    let shop = ctx
        .service
        .get_top_stats(&params(&[("project", "shop")]))
        .await
        .unwrap();
    assert_eq!(shop.total_events, 3);
    assert_eq!(shop.unique_users, 3);
}

#[tokio::test]
async fn test_projects_are_sorted_and_distinct() {
    let ctx = seeded().await;
    assert_eq!(ctx.service.get_projects().await.unwrap(), ["blog", "shop"]);
}

#[tokio::test]
async fn test_dashboard_combines_sections() {
    let ctx = seeded().await;

    let stats = ctx.service.get_stats(&params(&[])).await.unwrap();
    assert_eq!(stats.overview.total_events, 5);
    assert_eq!(stats.browsers[0].name, "Chrome");
    assert_eq!(stats.browsers[0].count, 5);
    assert!(!stats.timeline.is_empty());
}

#[tokio::test]
async fn test_channels_after_ingest() {
    let ctx = TestContext::new().await;
    let client = fixtures::client("8.8.8.8");
    let search = |path: &str| RawEvent {
        referrer: "https://duckduckgo.com/".into(),
        ..fixtures::page_view(path)
    };

    ctx.service
        .track_event_batch(
            vec![search("/a"), search("/b"), fixtures::page_view("/c")],
            &client,
        )
        .await
        .unwrap();
    ctx.flush().await;

    let channels = ctx.service.get_channels(&params(&[])).await.unwrap();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0].channel, Channel::Organic);
    assert_eq!(channels[0].total_events, 2);
    assert_eq!(channels[1].channel, Channel::Direct);
}

#[tokio::test]
async fn test_funnel_after_ingest() {
    let ctx = TestContext::new().await;
    let client = fixtures::client("8.8.8.8");
    let at = |raw: RawEvent, mins_ago: i64| RawEvent {
        timestamp: Some(fixtures::minutes_ago(mins_ago)),
        ..raw
    };

    let batch = vec![
        at(fixtures::page_view_for("/", "u1", "s1"), 30),
        at(fixtures::custom_event("signup", "u1", "s1"), 25),
        at(fixtures::custom_event("purchase", "u1", "s1"), 20),
        at(fixtures::page_view_for("/", "u2", "s2"), 30),
        at(fixtures::custom_event("signup", "u2", "s2"), 28),
        at(fixtures::page_view_for("/", "u3", "s3"), 15),
        // Purchase before landing never counts.
        at(fixtures::custom_event("purchase", "u3", "s3"), 40),
    ];
    ctx.service.track_event_batch(batch, &client).await.unwrap();
    ctx.flush().await;

    let today = Utc::now().date_naive();
    let request = FunnelRequest {
        steps: vec![
            FunnelStep::event("Landing", "page_view"),
            FunnelStep::event("Signup", "signup"),
            FunnelStep::event("Purchase", "purchase"),
        ],
        start_date: (today - Duration::days(1)).format("%Y-%m-%d").to_string(),
        end_date: today.format("%Y-%m-%d").to_string(),
        filters: Default::default(),
    };

    let result = ctx.service.get_funnel_analysis(&request).await.unwrap();
    let users: Vec<u64> = result.steps.iter().map(|s| s.user_count).collect();
    assert_eq!(users, [3, 2, 1]);
    assert_eq!(result.total_users, 3);
    assert_eq!(result.completed_users, 1);
    assert!((result.steps[1].conversion_rate - 200.0 / 3.0).abs() < 1e-9);
    assert!((result.steps[2].conversion_rate - 50.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_funnel_requires_steps_and_dates() {
    let ctx = TestContext::new().await;

    let mut request = FunnelRequest {
        steps: Vec::new(),
        start_date: "2024-01-01".into(),
        end_date: "2024-01-31".into(),
        filters: Default::default(),
    };
    let err = ctx.service.get_funnel_analysis(&request).await.unwrap_err();
    assert_eq!(err.error_code(), Some("VALID_001"));

    request.steps.push(FunnelStep::event("Landing", "page_view"));
    request.end_date.clear();
    let err = ctx.service.get_funnel_analysis(&request).await.unwrap_err();
    assert_eq!(err.error_code(), Some("VALID_004"));
}

#[tokio::test]
async fn test_online_users_window() {
    let recent = |id: u64, mins: i64| Event {
        user_id: format!("u{}", id % 2),
        ..fixtures::event_at(id, fixtures::minutes_ago(mins))
    };
    let store = MockStore::with_rows(vec![recent(1, 1), recent(2, 2), recent(3, 3), recent(4, 30)]);
    let ctx = TestContext::with_store(store, TestOptions::default()).await;

    let online = ctx.service.get_online_users(None).await.unwrap();
    assert_eq!(online.time_window_mins, 5);
    assert_eq!(online.online_users, 2);
    assert_eq!(online.active_sessions, 3);

    let hour = ctx.service.get_online_users(Some(500)).await.unwrap();
    assert_eq!(hour.time_window_mins, 60);
    assert_eq!(hour.active_sessions, 4);
}

#[tokio::test]
async fn test_events_are_paged_newest_first() {
    let ctx = seeded().await;
    let map: HashMap<String, String> = [("limit", "2"), ("offset", "1")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let params = EventsParams::from_map(&map, Utc::now()).unwrap();

    let page = ctx.service.get_events(&params).await.unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.events.len(), 2);
    assert!(page.events[0].timestamp >= page.events[1].timestamp);
}

#[tokio::test]
async fn test_inverted_range_is_rejected() {
    let map: HashMap<String, String> = [("start", "2024-03-01"), ("end", "2024-02-01")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let err = QueryParams::from_map(&map, DEFAULT_QUERY_LIMIT, Utc::now()).unwrap_err();
    assert_eq!(err.error_code(), Some("VALID_004"));
}

#[tokio::test]
async fn test_store_failure_surfaces_as_query_error() {
    let ctx = seeded().await;
    ctx.store.set_should_fail(true);

    let err = ctx.service.get_top_pages(&params(&[])).await.unwrap_err();
    assert_eq!(err.error_code(), Some("DB_002"));
}
