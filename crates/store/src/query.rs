//! Read-side queries against the ClickHouse events table.

use crate::client::ClickHouseClient;
use crate::insert::EventRow;
use clickhouse::query::Query;
use engine_core::error::DbErrorCode;
use engine_core::{BotFilter, Error, Event, Result, ScanRequest};

const EVENT_COLUMNS: &str = "id, toUnixTimestamp64Milli(timestamp) AS timestamp, event_name, \
     user_id, session_id, session_duration, url, referrer, user_agent, ip, country, \
     browser, os, device, is_bot, project_id, channel";

/// A positional bind value for a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
enum BindValue {
    Millis(i64),
    Text(String),
}

/// A WHERE clause with its bind values in placeholder order.
#[derive(Debug, Default, PartialEq)]
pub struct WhereClause {
    sql: String,
    binds: Vec<BindValue>,
}

impl WhereClause {
    pub fn from_request(request: &ScanRequest) -> Self {
        let mut conditions: Vec<&str> = Vec::new();
        let mut binds = Vec::new();

        if let Some(range) = request.range {
            conditions.push("timestamp >= fromUnixTimestamp64Milli(?)");
            binds.push(BindValue::Millis(range.start.timestamp_millis()));
            conditions.push("timestamp <= fromUnixTimestamp64Milli(?)");
            binds.push(BindValue::Millis(range.end.timestamp_millis()));
        }

        let filter = &request.filter;
        let equalities = [
            ("project_id = ?", &filter.project),
            ("referrer = ?", &filter.source),
            ("country = ?", &filter.country),
            ("browser = ?", &filter.browser),
            ("os = ?", &filter.os),
            ("device = ?", &filter.device),
            ("event_name = ?", &filter.event),
            ("url = ?", &filter.page),
        ];
        for (condition, value) in equalities {
            if let Some(v) = value {
                conditions.push(condition);
                binds.push(BindValue::Text(v.clone()));
            }
        }

        match filter.bot {
            BotFilter::Bot => conditions.push("is_bot = 1"),
            BotFilter::Human => conditions.push("is_bot = 0"),
            BotFilter::All => {}
        }

        let sql = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        Self { sql, binds }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(&self, mut query: Query) -> Query {
        for value in &self.binds {
            query = match value {
                BindValue::Millis(ms) => query.bind(*ms),
                BindValue::Text(s) => query.bind(s.as_str()),
            };
        }
        query
    }
}

fn query_err(e: clickhouse::error::Error) -> Error {
    Error::database(DbErrorCode::QueryFailed, format!("Query error: {}", e))
}

/// Fetch matching events ordered by timestamp.
pub async fn scan_events(client: &ClickHouseClient, request: &ScanRequest) -> Result<Vec<Event>> {
    let clause = WhereClause::from_request(request);
    let sql = format!(
        "SELECT {} FROM {}{} ORDER BY timestamp ASC, id ASC",
        EVENT_COLUMNS,
        client.table(),
        clause.sql()
    );

    let rows: Vec<EventRow> = clause
        .bind(client.inner().query(&sql))
        .fetch_all()
        .await
        .map_err(query_err)?;

    rows.into_iter().map(Event::try_from).collect()
}

/// Count matching events.
pub async fn count_events(client: &ClickHouseClient, request: &ScanRequest) -> Result<u64> {
    let clause = WhereClause::from_request(request);
    let sql = format!(
        "SELECT count() FROM {}{}",
        client.table(),
        clause.sql()
    );

    clause
        .bind(client.inner().query(&sql))
        .fetch_one::<u64>()
        .await
        .map_err(query_err)
}

/// Distinct non-empty project IDs, sorted.
pub async fn distinct_projects(client: &ClickHouseClient) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT DISTINCT project_id FROM {} WHERE project_id != '' ORDER BY project_id",
        client.table()
    );

    client
        .inner()
        .query(&sql)
        .fetch_all::<String>()
        .await
        .map_err(query_err)
}

/// Largest stored event ID; `max` over an empty table yields 0.
pub async fn max_event_id(client: &ClickHouseClient) -> Result<u64> {
    let sql = format!("SELECT max(id) FROM {}", client.table());

    client
        .inner()
        .query(&sql)
        .fetch_one::<u64>()
        .await
        .map_err(query_err)
}
