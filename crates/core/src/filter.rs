//! Query filters shared by every read operation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result, ValidationErrorCode};
use crate::events::Event;

/// Bot inclusion mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotFilter {
    #[default]
    All,
    Bot,
    Human,
}

impl BotFilter {
    /// `"bot"` and `"human"` select a side; anything else includes both.
    pub fn parse(value: &str) -> Self {
        match value {
            "bot" => Self::Bot,
            "human" => Self::Human,
            _ => Self::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Bot => "bot",
            Self::Human => "human",
        }
    }

    pub fn matches(&self, is_bot: bool) -> bool {
        match self {
            Self::All => true,
            Self::Bot => is_bot,
            Self::Human => !is_bot,
        }
    }
}

/// Value plotted on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineMetric {
    #[default]
    Users,
    Visits,
    PageViews,
    Events,
    ViewsPerVisit,
    BounceRate,
    VisitDuration,
}

impl TimelineMetric {
    pub fn parse(value: &str) -> Self {
        match value {
            "visits" => Self::Visits,
            "page_views" => Self::PageViews,
            "events" => Self::Events,
            "views_per_visit" => Self::ViewsPerVisit,
            "bounce_rate" => Self::BounceRate,
            "visit_duration" => Self::VisitDuration,
            _ => Self::Users,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Visits => "visits",
            Self::PageViews => "page_views",
            Self::Events => "events",
            Self::ViewsPerVisit => "views_per_visit",
            Self::BounceRate => "bounce_rate",
            Self::VisitDuration => "visit_duration",
        }
    }
}

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(Error::validation_code(
                ValidationErrorCode::InvalidDateRange,
                format!("end {} is before start {}", end, start),
            ));
        }
        Ok(Self { start, end })
    }

    /// The last `days` days up to `now`.
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Self {
        Self {
            start: now - Duration::days(days),
            end: now,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The window of equal length ending where this one starts.
    pub fn previous(&self) -> Self {
        Self {
            start: self.start - self.duration(),
            end: self.start,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Optional equality filters applied to every query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryFilter {
    pub project: Option<String>,
    /// Matches the raw referrer.
    pub source: Option<String>,
    pub country: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub event: Option<String>,
    pub page: Option<String>,
    pub bot: BotFilter,
    pub metric: TimelineMetric,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_project(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            ..Default::default()
        }
    }

    /// Build from request parameters. Empty values are ignored.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            project: get("project"),
            source: get("source"),
            country: get("country"),
            browser: get("browser"),
            os: get("os"),
            device: get("device"),
            event: get("event"),
            page: get("page"),
            bot: get("botFilter")
                .map(|v| BotFilter::parse(&v))
                .unwrap_or_default(),
            metric: get("metric")
                .map(|v| TimelineMetric::parse(&v))
                .unwrap_or_default(),
        }
    }

    pub fn with_bot(mut self, bot: BotFilter) -> Self {
        self.bot = bot;
        self
    }

    pub fn with_metric(mut self, metric: TimelineMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Whether an event passes every set predicate. The metric is not a predicate.
    pub fn matches(&self, event: &Event) -> bool {
        fn eq(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().map_or(true, |f| f == value)
        }

        eq(&self.project, &event.project_id)
            && eq(&self.source, &event.referrer)
            && eq(&self.country, &event.country)
            && eq(&self.browser, &event.browser)
            && eq(&self.os, &event.os)
            && eq(&self.device, &event.device)
            && eq(&self.event, &event.event_name)
            && eq(&self.page, &event.url)
            && self.bot.matches(event.is_bot)
    }

    /// Stable textual form, used for cache keys.
    pub fn canonical(&self) -> String {
        let fields = [
            ("browser", &self.browser),
            ("country", &self.country),
            ("device", &self.device),
            ("event", &self.event),
            ("os", &self.os),
            ("page", &self.page),
            ("project", &self.project),
            ("source", &self.source),
        ];

        let mut out = String::new();
        for (key, value) in fields {
            if let Some(v) = value {
                out.push_str(key);
                out.push('=');
                out.push_str(v);
                out.push(';');
            }
        }
        out.push_str("bot=");
        out.push_str(self.bot.as_str());
        out.push_str(";metric=");
        out.push_str(self.metric.as_str());
        out
    }
}
