//! Column-oriented encoding of an event table.
//!
//! Each field is stored as its own array so a reader touching one column does
//! not pay for the others. Every column must have exactly `rows` entries.

use chrono::{DateTime, Utc};
use engine_core::error::DbErrorCode;
use engine_core::{Channel, Error, Event, Result};
use serde::{Deserialize, Serialize};

/// On-disk format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ColumnBatch {
    pub version: u32,
    pub rows: usize,
    pub id: Vec<u64>,
    /// Microseconds since the epoch.
    pub timestamp: Vec<i64>,
    pub event_name: Vec<String>,
    pub user_id: Vec<String>,
    pub session_id: Vec<String>,
    pub session_duration: Vec<i64>,
    pub url: Vec<String>,
    pub referrer: Vec<String>,
    pub user_agent: Vec<String>,
    pub ip: Vec<String>,
    pub country: Vec<String>,
    pub browser: Vec<String>,
    pub os: Vec<String>,
    pub device: Vec<String>,
    pub is_bot: Vec<bool>,
    pub project_id: Vec<String>,
    pub channel: Vec<Channel>,
}

impl ColumnBatch {
    pub fn from_events(events: &[Event]) -> Self {
        let n = events.len();
        let mut batch = ColumnBatch {
            version: FORMAT_VERSION,
            rows: n,
            id: Vec::with_capacity(n),
            timestamp: Vec::with_capacity(n),
            event_name: Vec::with_capacity(n),
            user_id: Vec::with_capacity(n),
            session_id: Vec::with_capacity(n),
            session_duration: Vec::with_capacity(n),
            url: Vec::with_capacity(n),
            referrer: Vec::with_capacity(n),
            user_agent: Vec::with_capacity(n),
            ip: Vec::with_capacity(n),
            country: Vec::with_capacity(n),
            browser: Vec::with_capacity(n),
            os: Vec::with_capacity(n),
            device: Vec::with_capacity(n),
            is_bot: Vec::with_capacity(n),
            project_id: Vec::with_capacity(n),
            channel: Vec::with_capacity(n),
        };

        for e in events {
            batch.id.push(e.id);
            batch.timestamp.push(e.timestamp.timestamp_micros());
            batch.event_name.push(e.event_name.clone());
            batch.user_id.push(e.user_id.clone());
            batch.session_id.push(e.session_id.clone());
            batch.session_duration.push(e.session_duration);
            batch.url.push(e.url.clone());
            batch.referrer.push(e.referrer.clone());
            batch.user_agent.push(e.user_agent.clone());
            batch.ip.push(e.ip.clone());
            batch.country.push(e.country.clone());
            batch.browser.push(e.browser.clone());
            batch.os.push(e.os.clone());
            batch.device.push(e.device.clone());
            batch.is_bot.push(e.is_bot);
            batch.project_id.push(e.project_id.clone());
            batch.channel.push(e.channel);
        }

        batch
    }

    fn check_lengths(&self) -> Result<()> {
        let lens = [
            self.id.len(),
            self.timestamp.len(),
            self.event_name.len(),
            self.user_id.len(),
            self.session_id.len(),
            self.session_duration.len(),
            self.url.len(),
            self.referrer.len(),
            self.user_agent.len(),
            self.ip.len(),
            self.country.len(),
            self.browser.len(),
            self.os.len(),
            self.device.len(),
            self.is_bot.len(),
            self.project_id.len(),
            self.channel.len(),
        ];
        if lens.iter().any(|&l| l != self.rows) {
            return Err(Error::database(
                DbErrorCode::QueryFailed,
                format!("column length mismatch, expected {} rows", self.rows),
            ));
        }
        Ok(())
    }

    pub fn into_events(self) -> Result<Vec<Event>> {
        if self.version != FORMAT_VERSION {
            return Err(Error::database(
                DbErrorCode::QueryFailed,
                format!("unsupported column format version {}", self.version),
            ));
        }
        self.check_lengths()?;

        let mut events = Vec::with_capacity(self.rows);
        let mut event_name = self.event_name.into_iter();
        let mut user_id = self.user_id.into_iter();
        let mut session_id = self.session_id.into_iter();
        let mut url = self.url.into_iter();
        let mut referrer = self.referrer.into_iter();
        let mut user_agent = self.user_agent.into_iter();
        let mut ip = self.ip.into_iter();
        let mut country = self.country.into_iter();
        let mut browser = self.browser.into_iter();
        let mut os = self.os.into_iter();
        let mut device = self.device.into_iter();
        let mut project_id = self.project_id.into_iter();

        for i in 0..self.rows {
            let timestamp = DateTime::<Utc>::from_timestamp_micros(self.timestamp[i])
                .ok_or_else(|| {
                    Error::database(
                        DbErrorCode::QueryFailed,
                        format!("invalid timestamp {} at row {}", self.timestamp[i], i),
                    )
                })?;

            // Lengths were checked above, so every iterator yields `rows` items.
            events.push(Event {
                id: self.id[i],
                timestamp,
                event_name: event_name.next().unwrap_or_default(),
                user_id: user_id.next().unwrap_or_default(),
                session_id: session_id.next().unwrap_or_default(),
                session_duration: self.session_duration[i],
                url: url.next().unwrap_or_default(),
                referrer: referrer.next().unwrap_or_default(),
                user_agent: user_agent.next().unwrap_or_default(),
                ip: ip.next().unwrap_or_default(),
                country: country.next().unwrap_or_default(),
                browser: browser.next().unwrap_or_default(),
                os: os.next().unwrap_or_default(),
                device: device.next().unwrap_or_default(),
                is_bot: self.is_bot[i],
                project_id: project_id.next().unwrap_or_default(),
                channel: self.channel[i],
            });
        }

        Ok(events)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
