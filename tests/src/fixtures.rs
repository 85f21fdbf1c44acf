//! Test fixtures and event generators.

use chrono::{DateTime, Duration, Utc};
use engine_core::limits::PAGE_VIEW_EVENT;
use engine_core::{Channel, ClientContext, Event, RawEvent};
use uuid::Uuid;

pub const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
pub const GOOGLEBOT_UA: &str =
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

pub const SITE_URL: &str = "https://shop.example.com";

pub fn minutes_ago(mins: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(mins)
}

/// A page view as a browser would submit it.
pub fn page_view(path: &str) -> RawEvent {
    RawEvent {
        event_name: PAGE_VIEW_EVENT.to_string(),
        user_id: Uuid::new_v4().to_string(),
        session_id: Uuid::new_v4().to_string(),
        url: format!("{}{}", SITE_URL, path),
        user_agent: CHROME_UA.to_string(),
        ..Default::default()
    }
}

/// A page view from a specific user and session.
pub fn page_view_for(path: &str, user_id: &str, session_id: &str) -> RawEvent {
    RawEvent {
        user_id: user_id.to_string(),
        session_id: session_id.to_string(),
        ..page_view(path)
    }
}

/// A custom event from a specific user and session.
pub fn custom_event(name: &str, user_id: &str, session_id: &str) -> RawEvent {
    RawEvent {
        event_name: name.to_string(),
        ..page_view_for("/", user_id, session_id)
    }
}

/// Generate N valid page views.
pub fn page_views(n: usize) -> Vec<RawEvent> {
    (0..n).map(|i| page_view(&format!("/page/{}", i))).collect()
}

/// An event that fails validation: the name is required.
pub fn invalid_event() -> RawEvent {
    RawEvent {
        event_name: String::new(),
        ..page_view("/")
    }
}

pub fn client(ip: &str) -> ClientContext {
    ClientContext::from_remote(format!("{}:51234", ip))
}

/// A stored page view with an assigned ID.
pub fn event_at(id: u64, timestamp: DateTime<Utc>) -> Event {
    Event {
        id,
        timestamp,
        event_name: PAGE_VIEW_EVENT.to_string(),
        user_id: format!("user-{}", id),
        session_id: format!("sess-{}", id),
        url: format!("{}/", SITE_URL),
        country: "Germany".to_string(),
        browser: "Chrome".to_string(),
        os: "Windows 10".to_string(),
        device: "desktop".to_string(),
        project_id: "default".to_string(),
        channel: Channel::Direct,
        ..Default::default()
    }
}

/// Stored page views for a project, one user each, spread over the last hour.
pub fn project_events(project: &str, first_id: u64, n: u64) -> Vec<Event> {
    (0..n)
        .map(|i| Event {
            project_id: project.to_string(),
            ..event_at(first_id + i, minutes_ago(10 + i as i64))
        })
        .collect()
}
