//! End-to-end tests for the ingest path: validate, enrich, buffer, flush.

use engine_core::{Channel, ClientContext, RawEvent};
use ingest_buffer::{BufferConfig, FlushOutcome};
use integration_tests::fixtures::{self, GOOGLEBOT_UA, IPHONE_UA};
use integration_tests::mocks::MockStore;
use integration_tests::setup::{TestContext, TestOptions};

#[tokio::test]
async fn test_tracked_event_is_enriched_and_flushed() {
    let ctx = TestContext::new().await;

    let id = ctx
        .service
        .track_event(fixtures::page_view("/pricing"), &fixtures::client("8.8.8.8"))
        .await
        .expect("track failed");
    assert_eq!(id, 1);
    assert_eq!(ctx.buffer.len(), 1);
    assert_eq!(ctx.store.row_count(), 0);

    ctx.flush().await;
    assert_eq!(ctx.buffer.len(), 0);

    let rows = ctx.store.rows();
    assert_eq!(rows.len(), 1);
    let event = &rows[0];
    assert_eq!(event.id, 1);
    assert_eq!(event.ip, "8.8.8.8");
    assert_eq!(event.country, "United States");
    assert_eq!(event.browser, "Chrome");
    assert_eq!(event.device, "desktop");
    assert_eq!(event.project_id, "default");
    assert_eq!(event.channel, Channel::Direct);
    assert!(!event.is_bot);
}

#[tokio::test]
async fn test_forwarded_for_takes_precedence() {
    let ctx = TestContext::new().await;
    let client = ClientContext {
        forwarded_for: Some("81.2.69.142, 10.0.0.1".into()),
        real_ip: Some("5.9.0.1".into()),
        remote_addr: Some("127.0.0.1:40000".into()),
    };

    ctx.service
        .track_event(fixtures::page_view("/"), &client)
        .await
        .unwrap();
    ctx.flush().await;

    let event = &ctx.store.rows()[0];
    assert_eq!(event.ip, "81.2.69.142");
    assert_eq!(event.country, "United Kingdom");
}

#[tokio::test]
async fn test_submitted_fields_win_over_enrichment() {
    let ctx = TestContext::new().await;
    let raw = RawEvent {
        country: Some("France".into()),
        browser: Some("CustomBrowser".into()),
        project_id: Some("shop".into()),
        user_agent: IPHONE_UA.into(),
        ..fixtures::page_view("/")
    };

    ctx.service
        .track_event(raw, &fixtures::client("8.8.8.8"))
        .await
        .unwrap();
    ctx.flush().await;

    let event = &ctx.store.rows()[0];
    assert_eq!(event.country, "France");
    assert_eq!(event.browser, "CustomBrowser");
    assert_eq!(event.device, "mobile");
    assert_eq!(event.project_id, "shop");
    // The submitted country skips the lookup entirely.
    assert_eq!(ctx.geo.lookup_count(), 0);
}

#[tokio::test]
async fn test_unknown_ip_gets_unknown_country() {
    let ctx = TestContext::new().await;

    ctx.service
        .track_event(fixtures::page_view("/"), &fixtures::client("192.0.2.10"))
        .await
        .unwrap();
    ctx.flush().await;

    assert_eq!(ctx.store.rows()[0].country, "Unknown");
}

#[tokio::test]
async fn test_channel_attribution() {
    let ctx = TestContext::new().await;
    let client = fixtures::client("8.8.8.8");

    let organic = RawEvent {
        referrer: "https://www.google.com/search?q=shoes".into(),
        ..fixtures::page_view("/")
    };
    let social = RawEvent {
        referrer: "https://t.co/abc".into(),
        ..fixtures::page_view("/")
    };
    let paid = RawEvent {
        referrer: "https://www.google.com/".into(),
        url: format!("{}/?utm_medium=cpc", fixtures::SITE_URL),
        ..fixtures::page_view("/")
    };
    let internal = RawEvent {
        referrer: format!("{}/cart", fixtures::SITE_URL),
        ..fixtures::page_view("/checkout")
    };
    let referral = RawEvent {
        referrer: "https://blog.example.org/post".into(),
        ..fixtures::page_view("/")
    };

    ctx.service
        .track_event_batch(vec![organic, social, paid, internal, referral], &client)
        .await
        .unwrap();
    ctx.flush().await;

    let channels: Vec<Channel> = ctx.store.rows().iter().map(|e| e.channel).collect();
    assert_eq!(
        channels,
        [
            Channel::Organic,
            Channel::Social,
            Channel::Paid,
            Channel::Direct,
            Channel::Referral
        ]
    );
}

#[tokio::test]
async fn test_bots_are_flagged_and_counted() {
    let ctx = TestContext::new().await;
    let bot = RawEvent {
        user_agent: GOOGLEBOT_UA.into(),
        ..fixtures::page_view("/")
    };

    let receipt = ctx
        .service
        .track_event_batch(vec![fixtures::page_view("/"), bot], &fixtures::client("8.8.8.8"))
        .await
        .unwrap();
    assert_eq!(receipt.total, 2);
    assert_eq!(receipt.bots, 1);

    ctx.flush().await;
    let flags: Vec<bool> = ctx.store.rows().iter().map(|e| e.is_bot).collect();
    assert_eq!(flags, [false, true]);
}

#[tokio::test]
async fn test_batch_at_limit_is_accepted() {
    let ctx = TestContext::new().await;

    let receipt = ctx
        .service
        .track_event_batch(fixtures::page_views(100), &fixtures::client("8.8.8.8"))
        .await
        .unwrap();

    assert_eq!(receipt.total, 100);
    assert_eq!(receipt.ids, (1..=100).collect::<Vec<u64>>());
    assert_eq!(ctx.buffer.len(), 100);
}

#[tokio::test]
async fn test_oversized_batch_is_rejected_whole() {
    let ctx = TestContext::new().await;

    let err = ctx
        .service
        .track_event_batch(fixtures::page_views(101), &fixtures::client("8.8.8.8"))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), Some("VALID_002"));
    assert!(ctx.buffer.is_empty());
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let ctx = TestContext::new().await;

    let err = ctx
        .service
        .track_event_batch(Vec::new(), &fixtures::client("8.8.8.8"))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), Some("VALID_003"));
}

#[tokio::test]
async fn test_one_invalid_event_rejects_the_batch() {
    let ctx = TestContext::new().await;
    let mut batch = fixtures::page_views(3);
    batch.push(fixtures::invalid_event());

    let err = ctx
        .service
        .track_event_batch(batch, &fixtures::client("8.8.8.8"))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), Some("VALID_001"));
    assert!(err.to_string().contains("event 3"));
    assert!(ctx.buffer.is_empty());
}

#[tokio::test]
async fn test_invalid_single_event_is_rejected() {
    let ctx = TestContext::new().await;

    let err = ctx
        .service
        .track_event(fixtures::invalid_event(), &fixtures::client("8.8.8.8"))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert!(ctx.buffer.is_empty());
}

#[tokio::test]
async fn test_failed_flush_keeps_events_for_retry() {
    let ctx = TestContext::new().await;
    ctx.service
        .track_event_batch(fixtures::page_views(3), &fixtures::client("8.8.8.8"))
        .await
        .unwrap();

    ctx.store.set_should_fail(true);
    let err = ctx.flusher.flush().await.unwrap_err();
    assert_eq!(err.error_code(), Some("DB_001"));
    assert_eq!(ctx.buffer.len(), 3);
    assert_eq!(ctx.store.row_count(), 0);

    // Events written while the store was down queue behind the restored ones.
    ctx.service
        .track_event(fixtures::page_view("/late"), &fixtures::client("8.8.8.8"))
        .await
        .unwrap();

    ctx.store.set_should_fail(false);
    let outcome = ctx.flusher.flush().await.unwrap();
    assert_eq!(outcome, FlushOutcome::Flushed(4));

    let ids: Vec<u64> = ctx.store.rows().iter().map(|e| e.id).collect();
    assert_eq!(ids, [1, 2, 3, 4]);
}

#[tokio::test]
async fn test_buffer_ceiling_applies_backpressure() {
    let ctx = TestContext::with_options(TestOptions {
        buffer: BufferConfig {
            flush_threshold: 5,
            max_buffered_events: 5,
            flush_interval_secs: 3600,
        },
        ..Default::default()
    })
    .await;
    let client = fixtures::client("8.8.8.8");

    ctx.service
        .track_event_batch(fixtures::page_views(4), &client)
        .await
        .unwrap();

    // Two more would cross the ceiling; neither is buffered.
    let err = ctx
        .service
        .track_event_batch(fixtures::page_views(2), &client)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), Some("INGEST_001"));
    assert_eq!(ctx.buffer.len(), 4);

    ctx.service
        .track_event(fixtures::page_view("/"), &client)
        .await
        .unwrap();
    assert_eq!(ctx.buffer.len(), 5);

    ctx.flush().await;
    assert!(ctx
        .service
        .track_event(fixtures::page_view("/"), &client)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_ids_continue_after_stored_rows() {
    let store = MockStore::with_rows(vec![
        fixtures::event_at(41, fixtures::minutes_ago(30)),
        fixtures::event_at(42, fixtures::minutes_ago(20)),
    ]);
    let ctx = TestContext::with_store(store, TestOptions::default()).await;

    let id = ctx
        .service
        .track_event(fixtures::page_view("/"), &fixtures::client("8.8.8.8"))
        .await
        .unwrap();
    assert_eq!(id, 43);
}

#[tokio::test]
async fn test_closed_buffer_refuses_writes() {
    let ctx = TestContext::new().await;
    ctx.service
        .track_event(fixtures::page_view("/"), &fixtures::client("8.8.8.8"))
        .await
        .unwrap();

    ctx.flusher.close().await.unwrap();
    assert_eq!(ctx.store.row_count(), 1);

    let err = ctx
        .service
        .track_event(fixtures::page_view("/"), &fixtures::client("8.8.8.8"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), Some("INGEST_001"));
}
