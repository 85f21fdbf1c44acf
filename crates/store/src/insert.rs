//! Batch insert helpers for ClickHouse.

use crate::client::ClickHouseClient;
use chrono::DateTime;
use clickhouse::Row;
use engine_core::error::DbErrorCode;
use engine_core::{Channel, Error, Event, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Flattened event row. `timestamp` maps to a `DateTime64(3)` column.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct EventRow {
    pub id: u64,
    /// Milliseconds since epoch
    pub timestamp: i64,
    pub event_name: String,
    pub user_id: String,
    pub session_id: String,
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
    pub channel: String,
}

impl From<&Event> for EventRow {
    fn from(e: &Event) -> Self {
        Self {
            id: e.id,
            timestamp: e.timestamp.timestamp_millis(),
            event_name: e.event_name.clone(),
            user_id: e.user_id.clone(),
            session_id: e.session_id.clone(),
            session_duration: e.session_duration,
            url: e.url.clone(),
            referrer: e.referrer.clone(),
            user_agent: e.user_agent.clone(),
            ip: e.ip.clone(),
            country: e.country.clone(),
            browser: e.browser.clone(),
            os: e.os.clone(),
            device: e.device.clone(),
            is_bot: e.is_bot,
            project_id: e.project_id.clone(),
            channel: e.channel.as_str().to_string(),
        }
    }
}

impl TryFrom<EventRow> for Event {
    type Error = Error;

    fn try_from(row: EventRow) -> Result<Self> {
        let timestamp = DateTime::from_timestamp_millis(row.timestamp).ok_or_else(|| {
            Error::database(
                DbErrorCode::QueryFailed,
                format!("invalid timestamp {} for event {}", row.timestamp, row.id),
            )
        })?;
        let channel = row.channel.parse::<Channel>().unwrap_or_default();

        Ok(Event {
            id: row.id,
            timestamp,
            event_name: row.event_name,
            user_id: row.user_id,
            session_id: row.session_id,
            session_duration: row.session_duration,
            url: row.url,
            referrer: row.referrer,
            user_agent: row.user_agent,
            ip: row.ip,
            country: row.country,
            browser: row.browser,
            os: row.os,
            device: row.device,
            is_bot: row.is_bot,
            project_id: row.project_id,
            channel,
        })
    }
}

/// Insert a batch in a single INSERT. ClickHouse applies the block atomically.
pub async fn insert_events(client: &ClickHouseClient, events: &[Event]) -> Result<usize> {
    if events.is_empty() {
        return Ok(0);
    }

    let count = events.len();
    let start = std::time::Instant::now();
    let table = client.table();

    let store_err = |stage: &str, e: clickhouse::error::Error| {
        Error::database(DbErrorCode::StoreFailed, format!("{} error: {}", stage, e))
    };

    let mut insert = client
        .inner()
        .insert(table)
        .map_err(|e| store_err("Insert", e))?;

    for event in events {
        insert
            .write(&EventRow::from(event))
            .await
            .map_err(|e| store_err("Write", e))?;
    }

    insert.end().await.map_err(|e| store_err("End", e))?;

    debug!(
        table = %table,
        count = count,
        latency_ms = %start.elapsed().as_millis(),
        "Inserted events into ClickHouse"
    );

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_row_keeps_millisecond_precision_and_channel() {
        let event = Event {
            id: 42,
            timestamp: Utc.timestamp_millis_opt(1_717_200_000_123).unwrap(),
            event_name: "signup".into(),
            user_id: "u".into(),
            session_id: "s".into(),
            session_duration: 30,
            url: "https://example.com/pricing".into(),
            referrer: "https://t.co/x".into(),
            user_agent: "Mozilla/5.0".into(),
            ip: "203.0.113.9".into(),
            country: "Japan".into(),
            browser: "Safari".into(),
            os: "iOS".into(),
            device: "mobile".into(),
            is_bot: false,
            project_id: "p".into(),
            channel: Channel::Social,
        };

        let row = EventRow::from(&event);
        assert_eq!(row.timestamp, 1_717_200_000_123);
        assert_eq!(row.channel, "Social");
        assert_eq!(Event::try_from(row).unwrap(), event);
    }
}
