//! Ordered multi-step funnel analysis.
//!
//! A user enters step 0 with their earliest matching event. They reach step
//! `i` with the earliest event matching step `i` at or after the event that
//! qualified them for step `i - 1`. Each step's population is therefore a
//! subset of the one before it.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use engine_core::error::ValidationErrorCode;
use engine_core::{
    DateRange, Error, Event, FunnelRequest, FunnelResult, FunnelStepResult, Result,
};
use std::collections::{HashMap, HashSet};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_day(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| {
        Error::validation_code(
            ValidationErrorCode::InvalidFormat,
            format!("invalid {} {:?}: {}", field, value, e),
        )
    })
}

/// Whole days from the start of `start_date` to the end of `end_date`.
pub fn request_range(request: &FunnelRequest) -> Result<DateRange> {
    let start = parse_day(&request.start_date, "start_date")?;
    let end = parse_day(&request.end_date, "end_date")?;

    let (Some(start_of_day), Some(end_of_day)) = (
        NaiveTime::from_hms_opt(0, 0, 0),
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999),
    ) else {
        return Err(Error::internal("invalid day bounds"));
    };

    DateRange::new(
        Utc.from_utc_datetime(&start.and_time(start_of_day)),
        Utc.from_utc_datetime(&end.and_time(end_of_day)),
    )
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Run the funnel over `events`, which must already be limited to the range.
///
/// Global filters are applied here so callers may pass an unfiltered scan.
pub fn analyze(request: &FunnelRequest, events: &[Event]) -> FunnelResult {
    // Per-user timelines in timestamp order.
    let mut by_user: HashMap<&str, Vec<&Event>> = HashMap::new();
    for e in events.iter().filter(|e| request.filters.matches(e)) {
        by_user.entry(e.user_id.as_str()).or_default().push(e);
    }
    for timeline in by_user.values_mut() {
        timeline.sort_by_key(|e| e.timestamp);
    }

    // Qualifying timestamp per user, per step.
    let mut qualified: Vec<HashMap<&str, DateTime<Utc>>> = Vec::with_capacity(request.steps.len());
    let mut counts: Vec<(u64, u64, u64)> = Vec::with_capacity(request.steps.len());

    for (i, step) in request.steps.iter().enumerate() {
        let mut reached = HashMap::new();
        let mut sessions = HashSet::new();
        let mut event_count = 0u64;

        let candidates: Box<dyn Iterator<Item = (&str, Option<DateTime<Utc>>)> + '_> = if i == 0 {
            Box::new(by_user.keys().map(|u| (*u, None)))
        } else {
            Box::new(qualified[i - 1].iter().map(|(u, ts)| (*u, Some(*ts))))
        };

        for (user, after) in candidates {
            let Some(timeline) = by_user.get(user) else {
                continue;
            };
            let eligible = timeline
                .iter()
                .filter(|e| after.map_or(true, |t| e.timestamp >= t) && step.matches(e));

            let mut first = None;
            for e in eligible {
                first.get_or_insert(e.timestamp);
                sessions.insert(e.session_id.as_str());
                event_count += 1;
            }
            if let Some(ts) = first {
                reached.insert(user, ts);
            }
        }

        counts.push((reached.len() as u64, sessions.len() as u64, event_count));
        qualified.push(reached);
    }

    let total_users = counts.first().map_or(0, |c| c.0);
    let mut steps = Vec::with_capacity(request.steps.len());

    for (i, step) in request.steps.iter().enumerate() {
        let (user_count, session_count, event_count) = counts[i];
        let (conversion_rate, overall_rate) = if i == 0 {
            (100.0, 100.0)
        } else {
            (
                percent(user_count, counts[i - 1].0),
                percent(user_count, total_users),
            )
        };

        let (avg_time_to_next, median_time_to_next) = match qualified.get(i + 1) {
            Some(next) => {
                let mut deltas: Vec<f64> = next
                    .iter()
                    .filter_map(|(user, to)| {
                        qualified[i].get(user).map(|from| seconds_between(*from, *to))
                    })
                    .collect();
                (mean(&deltas), median(&mut deltas))
            }
            None => (0.0, 0.0),
        };

        steps.push(FunnelStepResult {
            step: step.clone(),
            user_count,
            session_count,
            event_count,
            conversion_rate,
            overall_rate,
            dropoff_rate: if i == 0 { 0.0 } else { 100.0 - conversion_rate },
            avg_time_to_next,
            median_time_to_next,
        });
    }

    let completed_users = counts.last().map_or(0, |c| c.0);
    let avg_completion = match (qualified.first(), qualified.last()) {
        (Some(first), Some(last)) if qualified.len() > 1 => {
            let durations: Vec<f64> = last
                .iter()
                .filter_map(|(user, end)| first.get(user).map(|start| seconds_between(*start, *end)))
                .collect();
            mean(&durations)
        }
        _ => 0.0,
    };

    FunnelResult {
        steps,
        total_users,
        completed_users,
        completion_rate: percent(completed_users, total_users),
        avg_completion,
        time_range: format!("{} to {}", request.start_date, request.end_date),
    }
}
