//! Size limits and query defaults for the analytics engine.
//!
//! The `#[validate]` derive macro requires literal values in attributes,
//! so field limits are duplicated on `RawEvent`. Keep both in sync.

// === Batch Limits ===

/// Maximum events per `TrackEventBatch` call. Larger batches are rejected whole.
pub const MAX_BATCH_EVENTS: usize = 100;

// === String Field Limits (chars) ===

/// Event name max length.
pub const MAX_EVENT_NAME_LEN: usize = 100;

/// URL and referrer max length.
/// Matches HTTP Referer header limit.
pub const MAX_URL_LEN: usize = 2048;

/// User agent string max length.
pub const MAX_USER_AGENT_LEN: usize = 512;

/// User and session ID max length.
pub const MAX_ID_LEN: usize = 128;

// === Query Defaults ===

/// Default top-N size when the caller does not pass one.
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// Default top-N size for the dashboard stats query.
pub const DEFAULT_STATS_LIMIT: usize = 10;

/// Default page size for raw event listing.
pub const DEFAULT_EVENTS_LIMIT: usize = 100;

/// Upper bound on any top-N size.
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Default date range in days when no dates are given.
pub const DEFAULT_RANGE_DAYS: i64 = 7;

/// Default online-users window (minutes).
pub const DEFAULT_ONLINE_WINDOW_MINS: i64 = 5;

/// Maximum online-users window (minutes).
pub const MAX_ONLINE_WINDOW_MINS: i64 = 60;

/// Project assigned to events submitted without one.
pub const DEFAULT_PROJECT_ID: &str = "default";

/// Event name counted as a page view.
pub const PAGE_VIEW_EVENT: &str = "page_view";
