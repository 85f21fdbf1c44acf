//! Event type definitions for the analytics engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// How a visit arrived at the site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Channel {
    Direct,
    Organic,
    Social,
    Referral,
    Paid,
    #[default]
    Unknown,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::Direct,
        Channel::Organic,
        Channel::Social,
        Channel::Referral,
        Channel::Paid,
        Channel::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "Direct",
            Self::Organic => "Organic",
            Self::Social => "Social",
            Self::Referral => "Referral",
            Self::Paid => "Paid",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = std::convert::Infallible;

    /// Unrecognised names map to `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Channel::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .unwrap_or(Channel::Unknown))
    }
}

/// A fully enriched, immutable analytics event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Informational, monotonic within a running store.
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub event_name: String,
    pub user_id: String,
    pub session_id: String,
    /// Seconds.
    pub session_duration: i64,
    pub url: String,
    pub referrer: String,
    pub user_agent: String,
    pub ip: String,
    pub country: String,
    pub browser: String,
    pub os: String,
    pub device: String,
    pub is_bot: bool,
    pub project_id: String,
    pub channel: Channel,
}

impl Event {
    pub fn is_page_view(&self) -> bool {
        self.event_name == crate::limits::PAGE_VIEW_EVENT
    }
}

/// Event as submitted by a tracking client, before enrichment.
///
/// `is_bot` and `channel` are deliberately absent: both are always computed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RawEvent {
    pub timestamp: Option<DateTime<Utc>>,
    #[validate(length(min = 1, max = 100))]
    pub event_name: String,
    #[validate(length(max = 128))]
    pub user_id: String,
    #[validate(length(max = 128))]
    pub session_id: String,
    #[validate(range(min = 0))]
    pub session_duration: i64,
    #[validate(length(max = 2048))]
    pub url: String,
    #[validate(length(max = 2048))]
    pub referrer: String,
    #[validate(length(max = 512))]
    pub user_agent: String,
    pub ip: Option<String>,
    pub country: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub project_id: Option<String>,
}

/// Connection details the request layer observed for a tracked event.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    /// Raw `X-Forwarded-For` value, possibly a comma-separated chain.
    pub forwarded_for: Option<String>,
    /// Raw `X-Real-IP` value.
    pub real_ip: Option<String>,
    /// Peer address, `host:port` or a bare host.
    pub remote_addr: Option<String>,
}

impl ClientContext {
    pub fn from_remote(addr: impl Into<String>) -> Self {
        Self {
            remote_addr: Some(addr.into()),
            ..Default::default()
        }
    }
}
