//! Read-only query engine over the columnar store.

use chrono::{Duration, Utc};
use engine_core::{
    BrowsersDevicesOs, ChannelStat, ColumnarStore, DashboardStats, DateRange, EntryExitPages,
    Event, EventsPage, FunnelRequest, FunnelResult, NamedCount, OnlineUsers, QueryFilter, Result,
    ScanRequest, StatsResult, TimelineResult, TopPages,
};
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, error};

use crate::{aggregate, funnel, timeline};

/// Executes aggregate queries. Every call reads through to the store.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn ColumnarStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn ColumnarStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ColumnarStore> {
        &self.store
    }

    async fn scan(&self, query: &'static str, request: ScanRequest) -> Result<Vec<Event>> {
        let start = std::time::Instant::now();
        metrics().queries.inc();

        match self.store.range_scan(&request).await {
            Ok(rows) => {
                let elapsed = start.elapsed();
                metrics().query_latency_ms.observe(elapsed.as_millis() as u64);
                debug!(
                    query = query,
                    rows = rows.len(),
                    latency_ms = %elapsed.as_millis(),
                    "Scanned events"
                );
                Ok(rows)
            }
            Err(e) => {
                metrics().query_errors.inc();
                error!("Query {} failed: {}", query, e);
                Err(e)
            }
        }
    }

    async fn scan_range(
        &self,
        query: &'static str,
        range: &DateRange,
        filter: &QueryFilter,
    ) -> Result<Vec<Event>> {
        self.scan(query, ScanRequest::range(*range, filter)).await
    }

    /// Overview for `range` and the equally long period right before it.
    pub async fn top_stats(&self, range: &DateRange, filter: &QueryFilter) -> Result<StatsResult> {
        let current = self.scan_range("top_stats", range, filter).await?;
        let previous = self
            .scan_range("top_stats_previous", &range.previous(), filter)
            .await?;
        Ok(aggregate::overview(&current, &previous))
    }

    /// Series of the filter's metric.
    pub async fn timeline(&self, range: &DateRange, filter: &QueryFilter) -> Result<TimelineResult> {
        let rows = self.scan_range("timeline", range, filter).await?;
        Ok(timeline::timeline(&rows, range, filter.metric))
    }

    pub async fn top_pages(
        &self,
        range: &DateRange,
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<TopPages> {
        let rows = self.scan_range("top_pages", range, filter).await?;
        Ok(aggregate::top_pages(&rows, limit))
    }

    pub async fn entry_exit_pages(
        &self,
        range: &DateRange,
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<EntryExitPages> {
        let rows = self.scan_range("entry_exit_pages", range, filter).await?;
        Ok(aggregate::entry_exit_pages(&rows, limit))
    }

    pub async fn top_countries(
        &self,
        range: &DateRange,
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<Vec<NamedCount>> {
        let rows = self.scan_range("top_countries", range, filter).await?;
        Ok(aggregate::top_countries(&rows, limit))
    }

    pub async fn top_sources(
        &self,
        range: &DateRange,
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<Vec<NamedCount>> {
        let rows = self.scan_range("top_sources", range, filter).await?;
        Ok(aggregate::top_sources(&rows, limit))
    }

    pub async fn top_events(
        &self,
        range: &DateRange,
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<Vec<NamedCount>> {
        let rows = self.scan_range("top_events", range, filter).await?;
        Ok(aggregate::top_events(&rows, limit))
    }

    pub async fn browsers_devices_os(
        &self,
        range: &DateRange,
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<BrowsersDevicesOs> {
        let rows = self.scan_range("browsers_devices_os", range, filter).await?;
        Ok(aggregate::browsers_devices_os(&rows, limit))
    }

    pub async fn channels(&self, range: &DateRange, filter: &QueryFilter) -> Result<Vec<ChannelStat>> {
        let rows = self.scan_range("channels", range, filter).await?;
        Ok(aggregate::channels(&rows))
    }

    /// Users active in the trailing `window_mins` minutes.
    pub async fn online_users(&self, window_mins: i64) -> Result<OnlineUsers> {
        let now = Utc::now();
        let cutoff = now - Duration::minutes(window_mins);
        let range = DateRange::new(cutoff, now)?;
        let rows = self
            .scan("online_users", ScanRequest::range(range, &QueryFilter::new()))
            .await?;
        Ok(aggregate::online_users(&rows, cutoff, window_mins))
    }

    pub async fn funnel(&self, request: &FunnelRequest) -> Result<FunnelResult> {
        let range = funnel::request_range(request)?;
        let f = &request.filters;
        let filter = QueryFilter {
            project: f.project.clone(),
            country: f.country.clone(),
            browser: f.browser.clone(),
            device: f.device.clone(),
            os: f.os.clone(),
            bot: f.bot,
            ..Default::default()
        };
        let rows = self.scan_range("funnel", &range, &filter).await?;
        Ok(funnel::analyze(request, &rows))
    }

    /// Raw events in `range`, newest first.
    pub async fn events(&self, range: &DateRange, limit: usize, offset: usize) -> Result<EventsPage> {
        let mut rows = self.scan_range("events", range, &QueryFilter::new()).await?;
        let total = rows.len() as u64;
        rows.reverse();
        let events = rows.into_iter().skip(offset).take(limit).collect();
        Ok(EventsPage {
            events,
            total,
            limit,
            offset,
        })
    }

    pub async fn projects(&self) -> Result<Vec<String>> {
        metrics().queries.inc();
        self.store.projects().await.inspect_err(|e| {
            metrics().query_errors.inc();
            error!("Query projects failed: {}", e);
        })
    }

    /// Overview, timeline and every top-N list from one scan of each period.
    pub async fn dashboard(
        &self,
        range: &DateRange,
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<DashboardStats> {
        let rows = self.scan_range("dashboard", range, filter).await?;
        let previous = self
            .scan_range("dashboard_previous", &range.previous(), filter)
            .await?;

        let series = timeline::timeline(&rows, range, filter.metric);
        let pages = aggregate::entry_exit_pages(&rows, limit);
        let devices = aggregate::browsers_devices_os(&rows, limit);

        Ok(DashboardStats {
            overview: aggregate::overview(&rows, &previous),
            timeline: series.timeline,
            timeline_format: series.timeline_format,
            top_events: aggregate::top_events(&rows, limit),
            top_pages: aggregate::top_pages(&rows, limit).top_pages,
            entry_pages: pages.entry_pages,
            exit_pages: pages.exit_pages,
            browsers: devices.browsers,
            devices: devices.devices,
            os: devices.os,
            top_countries: aggregate::top_countries(&rows, limit),
            top_sources: aggregate::top_sources(&rows, limit),
        })
    }
}
