//! Request parameter normalisation.
//!
//! Dates are `YYYY-MM-DD` and cover whole days. Unparsable values fall back
//! to defaults rather than failing the request.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use engine_core::limits::{
    DEFAULT_EVENTS_LIMIT, DEFAULT_ONLINE_WINDOW_MINS, DEFAULT_RANGE_DAYS, MAX_ONLINE_WINDOW_MINS,
    MAX_QUERY_LIMIT,
};
use engine_core::{DateRange, QueryFilter, Result};
use std::collections::HashMap;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

fn day_end(date: NaiveDate) -> DateTime<Utc> {
    day_start(date) + Duration::days(1) - Duration::milliseconds(1)
}

/// From the start of the day seven days ago through the end of today.
pub fn default_range(now: DateTime<Utc>) -> DateRange {
    let today = now.date_naive();
    DateRange {
        start: day_start(today - Duration::days(DEFAULT_RANGE_DAYS)),
        end: day_end(today),
    }
}

/// Whole-day range from optional `YYYY-MM-DD` bounds.
///
/// A missing or unparsable bound keeps its default. A start after the end
/// is rejected with `VALID_004`.
pub fn parse_date_range(
    start: Option<&str>,
    end: Option<&str>,
    now: DateTime<Utc>,
) -> Result<DateRange> {
    let defaults = default_range(now);
    let parse = |raw: Option<&str>| {
        raw.map(str::trim)
            .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
    };

    let start = parse(start).map(day_start).unwrap_or(defaults.start);
    let end = parse(end).map(day_end).unwrap_or(defaults.end);
    DateRange::new(start, end)
}

/// Positive integer limit, `default` otherwise, capped at the query maximum.
pub fn parse_limit(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(default)
        .min(MAX_QUERY_LIMIT)
}

/// Online-users window in minutes: defaults to 5, capped at 60.
pub fn clamp_online_window(window_mins: Option<i64>) -> i64 {
    match window_mins {
        Some(w) if w > 0 => w.min(MAX_ONLINE_WINDOW_MINS),
        _ => DEFAULT_ONLINE_WINDOW_MINS,
    }
}

/// Normalised parameters for every aggregate query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    pub range: DateRange,
    pub limit: usize,
    pub filter: QueryFilter,
}

impl QueryParams {
    pub fn new(range: DateRange, limit: usize, filter: QueryFilter) -> Self {
        Self {
            range,
            limit: limit.min(MAX_QUERY_LIMIT),
            filter,
        }
    }

    /// Read `start`, `end`, `limit` and the filter keys.
    pub fn from_map(
        params: &HashMap<String, String>,
        default_limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let get = |key: &str| params.get(key).map(String::as_str);
        Ok(Self {
            range: parse_date_range(get("start"), get("end"), now)?,
            limit: parse_limit(get("limit"), default_limit),
            filter: QueryFilter::from_params(params),
        })
    }
}

/// Paging parameters for raw event listing.
#[derive(Debug, Clone, PartialEq)]
pub struct EventsParams {
    pub range: DateRange,
    pub limit: usize,
    pub offset: usize,
}

impl EventsParams {
    pub fn from_map(params: &HashMap<String, String>, now: DateTime<Utc>) -> Result<Self> {
        let get = |key: &str| params.get(key).map(String::as_str);
        Ok(Self {
            range: parse_date_range(get("start"), get("end"), now)?,
            limit: parse_limit(get("limit"), DEFAULT_EVENTS_LIMIT),
            offset: get("offset")
                .and_then(|s| s.trim().parse::<usize>().ok())
                .unwrap_or(0),
        })
    }
}
