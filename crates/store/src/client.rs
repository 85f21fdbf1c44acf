//! Connection handle for the ClickHouse backend.

use crate::config::ClickHouseConfig;
use clickhouse::Client;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Client,
    table: String,
}

impl ClickHouseClient {
    /// Lazily connected: nothing goes over the wire until the first query.
    pub fn new(config: &ClickHouseConfig) -> Self {
        let mut inner = Client::default()
            .with_url(&config.url)
            .with_database(&config.database);
        if let Some(user) = config.username.as_deref() {
            inner = inner.with_user(user);
        }
        if let Some(password) = config.password.as_deref() {
            inner = inner.with_password(password);
        }

        let table = config.qualified_table();
        info!(url = %config.url, table = %table, "ClickHouse backend configured");

        Self { inner, table }
    }

    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// `database.table` for the events table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether the server answers and the events table exists.
    pub async fn ping(&self) -> bool {
        let sql = format!("EXISTS TABLE {}", self.table);
        match self.inner.query(&sql).fetch_one::<u8>().await {
            Ok(1) => {
                debug!(table = %self.table, "ClickHouse events table reachable");
                true
            }
            Ok(_) => {
                warn!(table = %self.table, "ClickHouse events table does not exist");
                false
            }
            Err(e) => {
                warn!("ClickHouse ping failed: {}", e);
                false
            }
        }
    }
}
