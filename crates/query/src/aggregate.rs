//! Aggregations over scanned event rows.
//!
//! Every function here is pure: the engine scans the store once per query and
//! hands the rows in. Top-N results sort by count descending, then by name.

use chrono::{DateTime, Utc};
use engine_core::{
    BrowsersDevicesOs, Channel, ChannelStat, EntryExitPages, Event, NamedCount, OnlineUsers,
    PageCount, StatsResult, TopPages,
};
use std::collections::{HashMap, HashSet};

/// Label used for events without a referrer.
pub const DIRECT_SOURCE: &str = "Direct";

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Relative change, absent when there is nothing to compare against.
pub fn percent_change(current: u64, previous: u64) -> Option<f64> {
    if previous == 0 {
        None
    } else {
        Some((current as f64 - previous as f64) / previous as f64 * 100.0)
    }
}

fn distinct<'a>(events: impl Iterator<Item = &'a str>) -> u64 {
    events.collect::<HashSet<_>>().len() as u64
}

/// Mean over strictly positive session durations, 0 when there are none.
pub fn mean_positive_duration<'a>(events: impl Iterator<Item = &'a Event>) -> f64 {
    let (sum, n) = events
        .filter(|e| e.session_duration > 0)
        .fold((0i64, 0u64), |(sum, n), e| (sum + e.session_duration, n + 1));
    if n == 0 {
        0.0
    } else {
        sum as f64 / n as f64
    }
}

/// Percentage of sessions with page views that have exactly one.
pub fn bounce_rate<'a>(events: impl Iterator<Item = &'a Event>) -> f64 {
    let mut views: HashMap<&str, u64> = HashMap::new();
    for e in events.filter(|e| e.is_page_view()) {
        *views.entry(e.session_id.as_str()).or_default() += 1;
    }
    let single = views.values().filter(|&&n| n == 1).count() as u64;
    percent(single, views.len() as u64)
}

/// Overview totals for `current`, compared against `previous`.
pub fn overview(current: &[Event], previous: &[Event]) -> StatsResult {
    let total_events = current.len() as u64;
    let unique_users = distinct(current.iter().map(|e| e.user_id.as_str()));
    let total_visits = distinct(current.iter().map(|e| e.session_id.as_str()));
    let page_views = current.iter().filter(|e| e.is_page_view()).count() as u64;

    let bot_events = current.iter().filter(|e| e.is_bot).count() as u64;
    let bot_users = distinct(current.iter().filter(|e| e.is_bot).map(|e| e.user_id.as_str()));
    let human_users = distinct(current.iter().filter(|e| !e.is_bot).map(|e| e.user_id.as_str()));

    let prev_total_events = previous.len() as u64;
    let prev_unique_users = distinct(previous.iter().map(|e| e.user_id.as_str()));
    let prev_total_visits = distinct(previous.iter().map(|e| e.session_id.as_str()));
    let prev_page_views = previous.iter().filter(|e| e.is_page_view()).count() as u64;

    StatsResult {
        total_events,
        unique_users,
        total_visits,
        page_views,
        bounce_rate: bounce_rate(current.iter()),
        avg_session_duration: mean_positive_duration(current.iter()),
        bot_events,
        human_events: total_events - bot_events,
        bot_users,
        human_users,
        bot_percentage: percent(bot_events, total_events),
        prev_total_events,
        prev_unique_users,
        prev_total_visits,
        prev_page_views,
        events_change: percent_change(total_events, prev_total_events),
        users_change: percent_change(unique_users, prev_unique_users),
        visits_change: percent_change(total_visits, prev_total_visits),
        page_views_change: percent_change(page_views, prev_page_views),
    }
}

/// Count occurrences and keep the `limit` largest.
fn rank<'a>(values: impl Iterator<Item = &'a str>, limit: usize) -> Vec<(String, u64)> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for v in values {
        *counts.entry(v).or_default() += 1;
    }
    let mut ranked: Vec<(&str, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(limit);
    ranked
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect()
}

fn named<'a>(values: impl Iterator<Item = &'a str>, limit: usize) -> Vec<NamedCount> {
    rank(values, limit)
        .into_iter()
        .map(|(name, count)| NamedCount { name, count })
        .collect()
}

fn pages<'a>(values: impl Iterator<Item = &'a str>, limit: usize) -> Vec<PageCount> {
    rank(values, limit)
        .into_iter()
        .map(|(url, count)| PageCount { url, count })
        .collect()
}

fn non_empty(s: &&str) -> bool {
    !s.is_empty()
}

pub fn top_pages(events: &[Event], limit: usize) -> TopPages {
    TopPages {
        top_pages: pages(events.iter().map(|e| e.url.as_str()).filter(non_empty), limit),
    }
}

/// First and last page view of each session.
pub fn entry_exit_pages(events: &[Event], limit: usize) -> EntryExitPages {
    let mut entries: HashMap<&str, (DateTime<Utc>, &str)> = HashMap::new();
    let mut exits: HashMap<&str, (DateTime<Utc>, &str)> = HashMap::new();

    for e in events.iter().filter(|e| e.is_page_view() && !e.url.is_empty()) {
        let session = e.session_id.as_str();
        entries
            .entry(session)
            .and_modify(|cur| {
                if e.timestamp < cur.0 {
                    *cur = (e.timestamp, e.url.as_str());
                }
            })
            .or_insert((e.timestamp, e.url.as_str()));
        exits
            .entry(session)
            .and_modify(|cur| {
                if e.timestamp >= cur.0 {
                    *cur = (e.timestamp, e.url.as_str());
                }
            })
            .or_insert((e.timestamp, e.url.as_str()));
    }

    EntryExitPages {
        entry_pages: pages(entries.values().map(|(_, url)| *url), limit),
        exit_pages: pages(exits.values().map(|(_, url)| *url), limit),
    }
}

pub fn top_countries(events: &[Event], limit: usize) -> Vec<NamedCount> {
    named(events.iter().map(|e| e.country.as_str()).filter(non_empty), limit)
}

pub fn top_sources(events: &[Event], limit: usize) -> Vec<NamedCount> {
    let sources = events.iter().map(|e| {
        if e.referrer.is_empty() {
            DIRECT_SOURCE
        } else {
            e.referrer.as_str()
        }
    });
    named(sources, limit)
}

pub fn top_events(events: &[Event], limit: usize) -> Vec<NamedCount> {
    named(events.iter().map(|e| e.event_name.as_str()), limit)
}

pub fn browsers_devices_os(events: &[Event], limit: usize) -> BrowsersDevicesOs {
    BrowsersDevicesOs {
        browsers: named(events.iter().map(|e| e.browser.as_str()).filter(non_empty), limit),
        devices: named(events.iter().map(|e| e.device.as_str()).filter(non_empty), limit),
        os: named(events.iter().map(|e| e.os.as_str()).filter(non_empty), limit),
    }
}

#[derive(Default)]
struct ChannelAcc<'a> {
    events: u64,
    page_views: u64,
    users: HashSet<&'a str>,
    sessions: HashSet<&'a str>,
}

/// Per-channel traffic, largest first.
pub fn channels(events: &[Event]) -> Vec<ChannelStat> {
    let mut acc: HashMap<Channel, ChannelAcc> = HashMap::new();
    for e in events {
        let a = acc.entry(e.channel).or_default();
        a.events += 1;
        if e.is_page_view() {
            a.page_views += 1;
        }
        a.users.insert(&e.user_id);
        a.sessions.insert(&e.session_id);
    }

    let mut stats: Vec<ChannelStat> = acc
        .into_iter()
        .map(|(channel, a)| {
            let total_visits = a.sessions.len() as u64;
            ChannelStat {
                channel,
                total_events: a.events,
                unique_users: a.users.len() as u64,
                total_visits,
                page_views: a.page_views,
                conversion_rate: if total_visits == 0 {
                    0.0
                } else {
                    a.page_views as f64 / total_visits as f64
                },
            }
        })
        .collect();

    stats.sort_by(|a, b| {
        b.total_events
            .cmp(&a.total_events)
            .then_with(|| a.channel.as_str().cmp(b.channel.as_str()))
    });
    stats
}

/// Distinct users and sessions seen at or after `cutoff`.
pub fn online_users(events: &[Event], cutoff: DateTime<Utc>, window_mins: i64) -> OnlineUsers {
    let recent = || events.iter().filter(|e| e.timestamp >= cutoff);
    OnlineUsers {
        online_users: distinct(recent().map(|e| e.user_id.as_str())),
        active_sessions: distinct(recent().map(|e| e.session_id.as_str())),
        time_window_mins: window_mins,
        cutoff_time: cutoff,
    }
}
