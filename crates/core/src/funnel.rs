//! Funnel definitions and results.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::events::Event;
use crate::filter::BotFilter;

/// One ordered step of a funnel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunnelStep {
    pub name: String,
    /// Empty matches any event name.
    pub event_name: String,
    /// Prefix match on the event URL; empty matches any URL.
    pub url: String,
    /// Per-step overrides. Recognised keys: country, browser, device, os.
    pub filters: HashMap<String, String>,
}

impl FunnelStep {
    pub fn event(name: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            event_name: event_name.into(),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        if !self.event_name.is_empty() && event.event_name != self.event_name {
            return false;
        }
        if !self.url.is_empty() && !event.url.starts_with(&self.url) {
            return false;
        }
        self.filters.iter().all(|(key, value)| match key.as_str() {
            "country" => &event.country == value,
            "browser" => &event.browser == value,
            "device" => &event.device == value,
            "os" => &event.os == value,
            _ => true,
        })
    }
}

/// Filters applied to every funnel step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunnelFilters {
    pub project: Option<String>,
    pub country: Option<String>,
    pub browser: Option<String>,
    pub device: Option<String>,
    pub os: Option<String>,
    pub bot: BotFilter,
}

impl FunnelFilters {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let get = |key: &str| params.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            project: get("project"),
            country: get("country"),
            browser: get("browser"),
            device: get("device"),
            os: get("os"),
            bot: get("botFilter")
                .map(|v| BotFilter::parse(&v))
                .unwrap_or_default(),
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        fn eq(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().map_or(true, |f| f == value)
        }

        eq(&self.project, &event.project_id)
            && eq(&self.country, &event.country)
            && eq(&self.browser, &event.browser)
            && eq(&self.device, &event.device)
            && eq(&self.os, &event.os)
            && self.bot.matches(event.is_bot)
    }
}

/// A funnel query. Dates are `YYYY-MM-DD` and cover whole days.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunnelRequest {
    pub steps: Vec<FunnelStep>,
    pub start_date: String,
    pub end_date: String,
    pub filters: FunnelFilters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStepResult {
    pub step: FunnelStep,
    pub user_count: u64,
    pub session_count: u64,
    pub event_count: u64,
    pub conversion_rate: f64,
    pub overall_rate: f64,
    pub dropoff_rate: f64,
    /// Seconds; zero for the last step.
    pub avg_time_to_next: f64,
    pub median_time_to_next: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelResult {
    pub steps: Vec<FunnelStepResult>,
    pub total_users: u64,
    pub completed_users: u64,
    pub completion_rate: f64,
    /// Mean seconds from step 0 to the last step over completers.
    pub avg_completion: f64,
    pub time_range: String,
}
