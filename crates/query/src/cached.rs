//! Cache-aside wrapper around [`QueryEngine`].
//!
//! Aggregate reads check the result cache first and populate it on a miss.
//! Online users, funnels, raw events and the project list always go to the
//! store.

use engine_core::{
    BrowsersDevicesOs, ChannelStat, DashboardStats, DateRange, EntryExitPages, EventsPage,
    FunnelRequest, FunnelResult, NamedCount, OnlineUsers, QueryFilter, Result, StatsResult,
    TimelineResult, TopPages,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{generate_key, ResultCache};
use crate::engine::QueryEngine;

/// Endpoint names used in cache keys.
pub mod endpoint {
    pub const STATS: &str = "stats";
    pub const TOP_STATS: &str = "top_stats";
    pub const TIMELINE: &str = "timeline";
    pub const TOP_PAGES: &str = "top_pages";
    pub const ENTRY_EXIT_PAGES: &str = "entry_exit_pages";
    pub const TOP_COUNTRIES: &str = "top_countries";
    pub const TOP_SOURCES: &str = "top_sources";
    pub const TOP_EVENTS: &str = "top_events";
    pub const BROWSERS_DEVICES_OS: &str = "browsers_devices_os";
    pub const CHANNELS: &str = "channels";
}

#[derive(Clone)]
pub struct CachedQueries {
    engine: QueryEngine,
    cache: Arc<ResultCache>,
    ttl: Duration,
}

impl CachedQueries {
    pub fn new(engine: QueryEngine, cache: Arc<ResultCache>, ttl: Duration) -> Self {
        Self { engine, cache, ttl }
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    async fn cached<T, F, Fut>(
        &self,
        endpoint: &'static str,
        range: &DateRange,
        filter: &QueryFilter,
        limit: usize,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = generate_key(endpoint, range, filter, limit);
        if let Some(hit) = self.cache.get::<T>(&key) {
            debug!(endpoint = endpoint, "Cache hit");
            return Ok(hit);
        }

        let value = compute().await?;
        if let Err(e) = self.cache.set(&key, &value, self.ttl) {
            warn!("Failed to cache {} result: {}", endpoint, e);
        }
        Ok(value)
    }

    pub async fn dashboard(
        &self,
        range: &DateRange,
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<DashboardStats> {
        self.cached(endpoint::STATS, range, filter, limit, || {
            self.engine.dashboard(range, filter, limit)
        })
        .await
    }

    pub async fn top_stats(&self, range: &DateRange, filter: &QueryFilter) -> Result<StatsResult> {
        self.cached(endpoint::TOP_STATS, range, filter, 0, || {
            self.engine.top_stats(range, filter)
        })
        .await
    }

    pub async fn timeline(&self, range: &DateRange, filter: &QueryFilter) -> Result<TimelineResult> {
        self.cached(endpoint::TIMELINE, range, filter, 0, || {
            self.engine.timeline(range, filter)
        })
        .await
    }

    pub async fn top_pages(
        &self,
        range: &DateRange,
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<TopPages> {
        self.cached(endpoint::TOP_PAGES, range, filter, limit, || {
            self.engine.top_pages(range, filter, limit)
        })
        .await
    }

    pub async fn entry_exit_pages(
        &self,
        range: &DateRange,
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<EntryExitPages> {
        self.cached(endpoint::ENTRY_EXIT_PAGES, range, filter, limit, || {
            self.engine.entry_exit_pages(range, filter, limit)
        })
        .await
    }

    pub async fn top_countries(
        &self,
        range: &DateRange,
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<Vec<NamedCount>> {
        self.cached(endpoint::TOP_COUNTRIES, range, filter, limit, || {
            self.engine.top_countries(range, filter, limit)
        })
        .await
    }

    pub async fn top_sources(
        &self,
        range: &DateRange,
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<Vec<NamedCount>> {
        self.cached(endpoint::TOP_SOURCES, range, filter, limit, || {
            self.engine.top_sources(range, filter, limit)
        })
        .await
    }

    pub async fn top_events(
        &self,
        range: &DateRange,
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<Vec<NamedCount>> {
        self.cached(endpoint::TOP_EVENTS, range, filter, limit, || {
            self.engine.top_events(range, filter, limit)
        })
        .await
    }

    pub async fn browsers_devices_os(
        &self,
        range: &DateRange,
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<BrowsersDevicesOs> {
        self.cached(endpoint::BROWSERS_DEVICES_OS, range, filter, limit, || {
            self.engine.browsers_devices_os(range, filter, limit)
        })
        .await
    }

    pub async fn channels(&self, range: &DateRange, filter: &QueryFilter) -> Result<Vec<ChannelStat>> {
        self.cached(endpoint::CHANNELS, range, filter, 0, || {
            self.engine.channels(range, filter)
        })
        .await
    }

    pub async fn online_users(&self, window_mins: i64) -> Result<OnlineUsers> {
        self.engine.online_users(window_mins).await
    }

    pub async fn funnel(&self, request: &FunnelRequest) -> Result<FunnelResult> {
        self.engine.funnel(request).await
    }

    pub async fn events(&self, range: &DateRange, limit: usize, offset: usize) -> Result<EventsPage> {
        self.engine.events(range, limit, offset).await
    }

    pub async fn projects(&self) -> Result<Vec<String>> {
        self.engine.projects().await
    }
}
