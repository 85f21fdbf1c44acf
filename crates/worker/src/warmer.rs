//! Pre-populates the result cache for the date ranges dashboards open most.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use engine_core::{DateRange, QueryFilter};
use query_engine::CachedQueries;
use telemetry::metrics;
use tracing::{info, warn};

const TOP_PAGES_LIMIT: usize = 10;
const TOP_COUNTRIES_LIMIT: usize = 10;
const BROWSERS_LIMIT: usize = 5;

/// Named ranges relative to `now`: today, yesterday, last 7 and 30 days, this month.
pub fn presets(now: DateTime<Utc>) -> Vec<(&'static str, DateRange)> {
    let midnight = Utc.from_utc_datetime(&now.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default());
    let yesterday = midnight - Duration::days(1);
    let month_start = Utc.from_utc_datetime(
        &now.date_naive()
            .with_day(1)
            .unwrap_or(now.date_naive())
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default(),
    );

    vec![
        ("today", DateRange { start: midnight, end: now }),
        (
            "yesterday",
            DateRange {
                start: yesterday,
                end: yesterday + Duration::hours(23) + Duration::minutes(59) + Duration::seconds(59),
            },
        ),
        ("last_7_days", DateRange::last_days(now, 7)),
        ("last_30_days", DateRange::last_days(now, 30)),
        ("this_month", DateRange { start: month_start, end: now }),
    ]
}

pub struct CacheWarmer {
    queries: CachedQueries,
}

impl CacheWarmer {
    pub fn new(queries: CachedQueries) -> Self {
        Self { queries }
    }

    /// One warm pass over every preset, unfiltered and per project.
    ///
    /// Returns the number of filter sets warmed. Listing projects failing
    /// aborts the pass; individual query failures do not.
    pub async fn warm(&self) -> usize {
        let start = std::time::Instant::now();

        let projects = match self.queries.projects().await {
            Ok(projects) => projects,
            Err(e) => {
                warn!("Cache warm aborted, listing projects failed: {}", e);
                return 0;
            }
        };

        let mut filters = vec![QueryFilter::new()];
        filters.extend(projects.iter().map(QueryFilter::for_project));

        let mut warmed = 0;
        for (name, range) in presets(Utc::now()) {
            for filter in &filters {
                self.warm_range(name, &range, filter).await;
                warmed += 1;
            }
        }

        info!(
            warmed = warmed,
            projects = projects.len(),
            latency_ms = %start.elapsed().as_millis(),
            "Cache warm completed"
        );
        warmed
    }

    async fn warm_range(&self, preset: &'static str, range: &DateRange, filter: &QueryFilter) {
        let q = &self.queries;
        let results = [
            ("top_stats", q.top_stats(range, filter).await.err()),
            ("timeline", q.timeline(range, filter).await.err()),
            ("top_pages", q.top_pages(range, filter, TOP_PAGES_LIMIT).await.err()),
            (
                "top_countries",
                q.top_countries(range, filter, TOP_COUNTRIES_LIMIT).await.err(),
            ),
            (
                "browsers_devices_os",
                q.browsers_devices_os(range, filter, BROWSERS_LIMIT).await.err(),
            ),
        ];

        for (query, error) in results {
            match error {
                None => metrics().warm_queries.inc(),
                Some(e) => {
                    metrics().warm_errors.inc();
                    warn!(preset = preset, query = query, "Cache warm query failed: {}", e);
                }
            }
        }
    }
}
