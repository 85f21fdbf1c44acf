//! Time-bucketed series.

use chrono::{DateTime, Duration, Utc};
use engine_core::{DateRange, Event, Granularity, TimelineMetric, TimelineResult, TimelineStat};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::aggregate::mean_positive_duration;

/// Hourly up to a day, daily up to 90 days, monthly beyond.
pub fn granularity_for(range: &DateRange) -> Granularity {
    let span = range.duration();
    if span <= Duration::hours(24) {
        Granularity::Hour
    } else if span <= Duration::days(90) {
        Granularity::Day
    } else {
        Granularity::Month
    }
}

/// Bucket label. Labels sort in chronological order.
pub fn bucket_label(ts: DateTime<Utc>, granularity: Granularity) -> String {
    let format = match granularity {
        Granularity::Hour => "%Y-%m-%d %H:00",
        Granularity::Day => "%Y-%m-%d",
        Granularity::Month => "%Y-%m",
    };
    ts.format(format).to_string()
}

fn metric_value(events: &[&Event], metric: TimelineMetric) -> f64 {
    let sessions = || {
        events
            .iter()
            .map(|e| e.session_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    };
    let page_views = || events.iter().filter(|e| e.is_page_view()).count();

    match metric {
        TimelineMetric::Users => events
            .iter()
            .map(|e| e.user_id.as_str())
            .collect::<HashSet<_>>()
            .len() as f64,
        TimelineMetric::Visits => sessions() as f64,
        TimelineMetric::PageViews => page_views() as f64,
        TimelineMetric::Events => events.len() as f64,
        TimelineMetric::ViewsPerVisit => match sessions() {
            0 => 0.0,
            n => page_views() as f64 / n as f64,
        },
        TimelineMetric::BounceRate => {
            // Share of the bucket's sessions with exactly one page view.
            let mut views: HashMap<&str, usize> = HashMap::new();
            for e in events {
                let n = views.entry(e.session_id.as_str()).or_default();
                if e.is_page_view() {
                    *n += 1;
                }
            }
            if views.is_empty() {
                0.0
            } else {
                let single = views.values().filter(|&&n| n == 1).count();
                single as f64 * 100.0 / views.len() as f64
            }
        }
        TimelineMetric::VisitDuration => mean_positive_duration(events.iter().copied()),
    }
}

/// Only buckets containing events are emitted.
pub fn timeline(events: &[Event], range: &DateRange, metric: TimelineMetric) -> TimelineResult {
    let granularity = granularity_for(range);

    let mut buckets: BTreeMap<String, Vec<&Event>> = BTreeMap::new();
    for e in events {
        buckets
            .entry(bucket_label(e.timestamp, granularity))
            .or_default()
            .push(e);
    }

    TimelineResult {
        timeline: buckets
            .into_iter()
            .map(|(date, bucket)| TimelineStat {
                count: metric_value(&bucket, metric),
                date,
            })
            .collect(),
        timeline_format: granularity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, d, h, 15, 0).unwrap()
    }

    fn ev(ts: DateTime<Utc>, user: &str, session: &str, name: &str) -> Event {
        Event {
            timestamp: ts,
            event_name: name.into(),
            user_id: user.into(),
            session_id: session.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_granularity_thresholds() {
        let start = at(1, 0);
        let range = |d| DateRange::new(start, start + d).unwrap();
        assert_eq!(granularity_for(&range(Duration::hours(24))), Granularity::Hour);
        assert_eq!(granularity_for(&range(Duration::hours(25))), Granularity::Day);
        assert_eq!(granularity_for(&range(Duration::days(90))), Granularity::Day);
        assert_eq!(granularity_for(&range(Duration::days(91))), Granularity::Month);
    }

    #[test]
    fn test_hourly_users_skip_empty_buckets() {
        let events = vec![
            ev(at(1, 9), "a", "s1", "page_view"),
            ev(at(1, 9), "a", "s1", "click"),
            ev(at(1, 9), "b", "s2", "page_view"),
            ev(at(1, 12), "c", "s3", "page_view"),
        ];
        let range = DateRange::new(at(1, 0), at(1, 23)).unwrap();
        let result = timeline(&events, &range, TimelineMetric::Users);

        assert_eq!(result.timeline_format, Granularity::Hour);
        assert_eq!(
            result.timeline,
            vec![
                TimelineStat { date: "2024-02-01 09:00".into(), count: 2.0 },
                TimelineStat { date: "2024-02-01 12:00".into(), count: 1.0 },
            ]
        );
    }

    #[test]
    fn test_daily_views_per_visit_and_bounce() {
        let events = vec![
            ev(at(1, 9), "a", "s1", "page_view"),
            ev(at(1, 10), "a", "s1", "page_view"),
            ev(at(1, 11), "b", "s2", "page_view"),
            ev(at(1, 11), "b", "s2", "signup"),
        ];
        let range = DateRange::new(at(1, 0), at(5, 0)).unwrap();

        let vpv = timeline(&events, &range, TimelineMetric::ViewsPerVisit);
        assert_eq!(vpv.timeline_format, Granularity::Day);
        assert_eq!(vpv.timeline[0].date, "2024-02-01");
        assert_eq!(vpv.timeline[0].count, 1.5);

        let bounce = timeline(&events, &range, TimelineMetric::BounceRate);
        assert_eq!(bounce.timeline[0].count, 50.0);
    }
}
