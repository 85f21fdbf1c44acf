//! Aggregation outputs. Recomputed per query, never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{Channel, Event};

/// Overview totals with deltas against the preceding period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsResult {
    pub total_events: u64,
    pub unique_users: u64,
    pub total_visits: u64,
    pub page_views: u64,
    pub bounce_rate: f64,
    pub avg_session_duration: f64,
    pub bot_events: u64,
    pub human_events: u64,
    pub bot_users: u64,
    pub human_users: u64,
    pub bot_percentage: f64,

    pub prev_total_events: u64,
    pub prev_unique_users: u64,
    pub prev_total_visits: u64,
    pub prev_page_views: u64,

    /// Percentage change; `None` when the previous value is zero.
    pub events_change: Option<f64>,
    pub users_change: Option<f64>,
    pub visits_change: Option<f64>,
    pub page_views_change: Option<f64>,
}

/// Timeline bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Month,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineStat {
    pub date: String,
    pub count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineResult {
    pub timeline: Vec<TimelineStat>,
    pub timeline_format: Granularity,
}

/// One row of a top-N list keyed by a name (country, browser, source...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
}

/// One row of a top-N list keyed by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCount {
    pub url: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopPages {
    pub top_pages: Vec<PageCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryExitPages {
    pub entry_pages: Vec<PageCount>,
    pub exit_pages: Vec<PageCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowsersDevicesOs {
    pub browsers: Vec<NamedCount>,
    pub devices: Vec<NamedCount>,
    pub os: Vec<NamedCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStat {
    pub channel: Channel,
    pub total_events: u64,
    pub unique_users: u64,
    pub total_visits: u64,
    pub page_views: u64,
    /// Page views per visit.
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineUsers {
    pub online_users: u64,
    pub active_sessions: u64,
    pub time_window_mins: i64,
    pub cutoff_time: DateTime<Utc>,
}

/// Raw events, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsPage {
    pub events: Vec<Event>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

/// Everything the dashboard overview renders in one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(flatten)]
    pub overview: StatsResult,
    pub timeline: Vec<TimelineStat>,
    pub timeline_format: Granularity,
    pub top_events: Vec<NamedCount>,
    pub top_pages: Vec<PageCount>,
    pub entry_pages: Vec<PageCount>,
    pub exit_pages: Vec<PageCount>,
    pub browsers: Vec<NamedCount>,
    pub devices: Vec<NamedCount>,
    pub os: Vec<NamedCount>,
    pub top_countries: Vec<NamedCount>,
    pub top_sources: Vec<NamedCount>,
}
