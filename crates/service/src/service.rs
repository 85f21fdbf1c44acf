//! The operations the analytics engine exposes to its callers.

use engine_core::error::ValidationErrorCode;
use engine_core::limits::MAX_BATCH_EVENTS;
use engine_core::{
    BrowsersDevicesOs, ChannelStat, ClientContext, DashboardStats, EntryExitPages, Error,
    EventsPage, FunnelRequest, FunnelResult, NamedCount, OnlineUsers, RawEvent, Result,
    StatsResult, TimelineResult, TopPages,
};
use ingest_buffer::EventBuffer;
use query_engine::{CacheStats, CachedQueries};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use telemetry::{health, metrics, HealthReport, MetricsSnapshot};
use tracing::{debug, info, warn};
use validator::Validate;
use worker::Enricher;

use crate::params::{clamp_online_window, EventsParams, QueryParams};

/// Result of an accepted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReceipt {
    pub total: usize,
    pub bots: usize,
    pub ids: Vec<u64>,
}

/// Point-in-time view of engine health and counters.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub health: HealthReport,
    pub metrics: MetricsSnapshot,
    pub cache: CacheStats,
    pub buffered_events: usize,
    pub store_backend: &'static str,
}

#[derive(Clone)]
pub struct AnalyticsService {
    enricher: Arc<Enricher>,
    buffer: Arc<EventBuffer>,
    queries: CachedQueries,
}

impl AnalyticsService {
    pub fn new(enricher: Arc<Enricher>, buffer: Arc<EventBuffer>, queries: CachedQueries) -> Self {
        Self {
            enricher,
            buffer,
            queries,
        }
    }

    pub fn queries(&self) -> &CachedQueries {
        &self.queries
    }

    /// Validate, enrich and buffer one event. Returns its ID.
    pub async fn track_event(&self, raw: RawEvent, ctx: &ClientContext) -> Result<u64> {
        metrics().events_received.inc();

        if let Err(e) = raw.validate() {
            metrics().events_rejected.inc();
            debug!(error = %e, "Rejected event");
            return Err(e.into());
        }

        let event = self.enricher.enrich(raw, ctx).await;
        self.buffer.write(event).inspect_err(|e| {
            metrics().events_rejected.inc();
            warn!("Failed to buffer event: {}", e);
        })
    }

    /// Track up to [`MAX_BATCH_EVENTS`] events. Nothing is buffered unless
    /// every event is valid and the whole batch fits.
    pub async fn track_event_batch(
        &self,
        raws: Vec<RawEvent>,
        ctx: &ClientContext,
    ) -> Result<BatchReceipt> {
        let start = Instant::now();
        let total = raws.len();
        metrics().batches_received.inc();
        metrics().events_received.inc_by(total as u64);

        if total == 0 {
            metrics().events_rejected.inc();
            return Err(Error::validation_code(
                ValidationErrorCode::EmptyBatch,
                "no events provided",
            ));
        }
        if total > MAX_BATCH_EVENTS {
            metrics().events_rejected.inc_by(total as u64);
            return Err(Error::validation_code(
                ValidationErrorCode::BatchTooLarge,
                format!("batch has {} events, exceeds {} limit", total, MAX_BATCH_EVENTS),
            ));
        }

        for (i, raw) in raws.iter().enumerate() {
            if let Err(e) = raw.validate() {
                metrics().events_rejected.inc_by(total as u64);
                return Err(Error::validation_code(
                    ValidationErrorCode::InvalidFormat,
                    format!("event {}: {}", i, e),
                ));
            }
        }

        let mut events = Vec::with_capacity(total);
        for raw in raws {
            events.push(self.enricher.enrich(raw, ctx).await);
        }
        let bots = events.iter().filter(|e| e.is_bot).count();

        let ids = self.buffer.write_batch(events).inspect_err(|e| {
            metrics().events_rejected.inc_by(total as u64);
            warn!(count = total, "Failed to buffer batch: {}", e);
        })?;

        info!(
            count = total,
            bots = bots,
            latency_ms = %start.elapsed().as_millis(),
            "Batch processed"
        );

        Ok(BatchReceipt { total, bots, ids })
    }

    /// Overview, timeline and every top-N list in one call.
    pub async fn get_stats(&self, params: &QueryParams) -> Result<DashboardStats> {
        self.queries
            .dashboard(&params.range, &params.filter, params.limit)
            .await
    }

    pub async fn get_top_stats(&self, params: &QueryParams) -> Result<StatsResult> {
        self.queries.top_stats(&params.range, &params.filter).await
    }

    pub async fn get_timeline(&self, params: &QueryParams) -> Result<TimelineResult> {
        self.queries.timeline(&params.range, &params.filter).await
    }

    pub async fn get_top_pages(&self, params: &QueryParams) -> Result<TopPages> {
        self.queries
            .top_pages(&params.range, &params.filter, params.limit)
            .await
    }

    pub async fn get_entry_exit_pages(&self, params: &QueryParams) -> Result<EntryExitPages> {
        self.queries
            .entry_exit_pages(&params.range, &params.filter, params.limit)
            .await
    }

    pub async fn get_top_countries(&self, params: &QueryParams) -> Result<Vec<NamedCount>> {
        self.queries
            .top_countries(&params.range, &params.filter, params.limit)
            .await
    }

    pub async fn get_top_sources(&self, params: &QueryParams) -> Result<Vec<NamedCount>> {
        self.queries
            .top_sources(&params.range, &params.filter, params.limit)
            .await
    }

    pub async fn get_top_events(&self, params: &QueryParams) -> Result<Vec<NamedCount>> {
        self.queries
            .top_events(&params.range, &params.filter, params.limit)
            .await
    }

    pub async fn get_browsers_devices_os(&self, params: &QueryParams) -> Result<BrowsersDevicesOs> {
        self.queries
            .browsers_devices_os(&params.range, &params.filter, params.limit)
            .await
    }

    pub async fn get_channels(&self, params: &QueryParams) -> Result<Vec<ChannelStat>> {
        self.queries.channels(&params.range, &params.filter).await
    }

    /// Users seen in the trailing window. Defaults to 5 minutes, capped at 60.
    pub async fn get_online_users(&self, window_mins: Option<i64>) -> Result<OnlineUsers> {
        self.queries
            .online_users(clamp_online_window(window_mins))
            .await
    }

    pub async fn get_funnel_analysis(&self, request: &FunnelRequest) -> Result<FunnelResult> {
        if request.steps.is_empty() {
            return Err(Error::validation_code(
                ValidationErrorCode::InvalidFormat,
                "at least one funnel step is required",
            ));
        }
        if request.start_date.is_empty() || request.end_date.is_empty() {
            return Err(Error::validation_code(
                ValidationErrorCode::InvalidDateRange,
                "start date and end date are required",
            ));
        }
        self.queries.funnel(request).await
    }

    /// Raw events, newest first.
    pub async fn get_events(&self, params: &EventsParams) -> Result<EventsPage> {
        self.queries
            .events(&params.range, params.limit, params.offset)
            .await
    }

    pub async fn get_projects(&self) -> Result<Vec<String>> {
        self.queries.projects().await
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            health: health().report(),
            metrics: metrics().snapshot(),
            cache: self.queries.cache().stats(),
            buffered_events: self.buffer.len(),
            store_backend: self.queries.engine().store().backend_name(),
        }
    }
}
