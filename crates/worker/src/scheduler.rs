//! Worker scheduler for background tasks.
//!
//! Each background loop is a [`PeriodicTask`] driving a [`TaskJob`]: it ticks
//! on an interval, optionally wakes on an external trigger, and stops on a
//! cancellation signal. `stop` waits for the in-flight run and then gives
//! the job one last call to clean up.

use async_trait::async_trait;
use ingest_buffer::{FlushOutcome, FlushSignal, Flusher};
use query_engine::{CacheConfig, ResultCache};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::warmer::CacheWarmer;

/// Worker scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the cache warmer runs at all
    #[serde(default = "default_warm_enabled")]
    pub warm_enabled: bool,
    /// Cache warm interval in seconds
    #[serde(default = "default_warm_interval_secs")]
    pub warm_interval_secs: u64,
}

fn default_warm_enabled() -> bool {
    true
}

fn default_warm_interval_secs() -> u64 {
    300
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            warm_enabled: default_warm_enabled(),
            warm_interval_secs: default_warm_interval_secs(),
        }
    }
}

/// One unit of periodic background work.
#[async_trait]
pub trait TaskJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One pass. Failures are logged by the job, never propagated.
    async fn run(&self);

    /// Called once after the loop exits.
    async fn shutdown(&self) {}
}

/// How a [`PeriodicTask`] is driven.
pub struct TaskSchedule {
    pub period: Duration,
    /// Run once immediately instead of waiting a full period.
    pub run_on_start: bool,
    /// Extra wake-ups in between ticks.
    pub trigger: Option<FlushSignal>,
}

impl TaskSchedule {
    pub fn every(period: Duration) -> Self {
        Self {
            period,
            run_on_start: false,
            trigger: None,
        }
    }

    pub fn run_on_start(mut self) -> Self {
        self.run_on_start = true;
        self
    }

    pub fn with_trigger(mut self, trigger: FlushSignal) -> Self {
        self.trigger = Some(trigger);
        self
    }
}

/// A spawned background loop with an explicit stop.
pub struct PeriodicTask {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn start(job: Arc<dyn TaskJob>, schedule: TaskSchedule) -> Self {
        let name = job.name();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(job, schedule, shutdown_rx));
        info!(task = name, "Background task started");
        Self {
            name,
            shutdown_tx,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal cancellation and wait for the loop and its shutdown hook.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            error!("Task {} ended abnormally: {}", self.name, e);
        }
        info!(task = self.name, "Background task stopped");
    }
}

async fn next_trigger(trigger: &mut Option<FlushSignal>) -> Option<()> {
    match trigger {
        Some(signal) => signal.recv().await,
        None => std::future::pending().await,
    }
}

async fn run_loop(
    job: Arc<dyn TaskJob>,
    schedule: TaskSchedule,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let TaskSchedule {
        period,
        run_on_start,
        mut trigger,
    } = schedule;

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    if run_on_start {
        job.run().await;
    }

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => job.run().await,
            signal = next_trigger(&mut trigger) => match signal {
                Some(()) => job.run().await,
                None => trigger = None,
            },
        }
    }

    job.shutdown().await;
}

/// Flushes the ingestion buffer; closes it on shutdown.
pub struct FlushJob {
    flusher: Arc<Flusher>,
}

impl FlushJob {
    pub fn new(flusher: Arc<Flusher>) -> Self {
        Self { flusher }
    }
}

#[async_trait]
impl TaskJob for FlushJob {
    fn name(&self) -> &'static str {
        "flush"
    }

    async fn run(&self) {
        match self.flusher.flush().await {
            Ok(FlushOutcome::Flushed(count)) => debug!(count = count, "Periodic flush"),
            Ok(FlushOutcome::Empty) | Ok(FlushOutcome::Busy) => {}
            Err(e) => error!("Flush failed, events kept for retry: {}", e),
        }
    }

    async fn shutdown(&self) {
        if let Err(e) = self.flusher.close().await {
            error!("Final flush failed: {}", e);
        }
    }
}

/// Drops expired cache entries.
pub struct SweepJob {
    cache: Arc<ResultCache>,
}

impl SweepJob {
    pub fn new(cache: Arc<ResultCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl TaskJob for SweepJob {
    fn name(&self) -> &'static str {
        "cache_sweep"
    }

    async fn run(&self) {
        let removed = self.cache.sweep_expired();
        if removed > 0 {
            debug!(removed = removed, "Swept expired cache entries");
        }
    }
}

/// Logs a cache stats snapshot.
pub struct CacheStatsJob {
    cache: Arc<ResultCache>,
}

impl CacheStatsJob {
    pub fn new(cache: Arc<ResultCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl TaskJob for CacheStatsJob {
    fn name(&self) -> &'static str {
        "cache_stats"
    }

    async fn run(&self) {
        self.cache.log_stats();
    }
}

/// Pre-populates the result cache.
pub struct WarmJob {
    warmer: Arc<CacheWarmer>,
}

impl WarmJob {
    pub fn new(warmer: Arc<CacheWarmer>) -> Self {
        Self { warmer }
    }
}

#[async_trait]
impl TaskJob for WarmJob {
    fn name(&self) -> &'static str {
        "cache_warmer"
    }

    async fn run(&self) {
        self.warmer.warm().await;
    }
}

/// Background worker scheduler.
pub struct WorkerScheduler {
    config: WorkerConfig,
    tasks: Vec<PeriodicTask>,
}

impl WorkerScheduler {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            tasks: Vec::new(),
        }
    }

    pub fn spawn(&mut self, job: Arc<dyn TaskJob>, schedule: TaskSchedule) {
        self.tasks.push(PeriodicTask::start(job, schedule));
    }

    /// Flush on the buffer's threshold signal and every `period`.
    pub fn start_flusher(&mut self, flusher: Arc<Flusher>, signal: FlushSignal, period: Duration) {
        self.spawn(
            Arc::new(FlushJob::new(flusher)),
            TaskSchedule::every(period).with_trigger(signal),
        );
    }

    pub fn start_cache_tasks(&mut self, cache: Arc<ResultCache>, config: &CacheConfig) {
        self.spawn(
            Arc::new(SweepJob::new(cache.clone())),
            TaskSchedule::every(Duration::from_secs(config.sweep_interval_secs)),
        );
        self.spawn(
            Arc::new(CacheStatsJob::new(cache)),
            TaskSchedule::every(Duration::from_secs(config.stats_interval_secs)),
        );
    }

    pub fn start_warmer(&mut self, warmer: Arc<CacheWarmer>) {
        if !self.config.warm_enabled {
            info!("Cache warmer disabled");
            return;
        }
        self.spawn(
            Arc::new(WarmJob::new(warmer)),
            TaskSchedule::every(Duration::from_secs(self.config.warm_interval_secs))
                .run_on_start(),
        );
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    /// Stop every task, most recently started first.
    pub async fn stop(mut self) {
        while let Some(task) = self.tasks.pop() {
            task.stop().await;
        }
        info!("Background workers stopped");
    }
}
