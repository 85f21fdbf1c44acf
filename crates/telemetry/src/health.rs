//! Component health for the analytics engine.
//!
//! Storage is essential: without it nothing is persisted or queried.
//! Geolocation is optional: without it events are still accepted, only with
//! an `Unknown` country.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Default)]
struct ComponentState {
    healthy: bool,
    last_error: Option<String>,
    changed_at: Option<DateTime<Utc>>,
}

/// One tracked dependency. Starts unhealthy until something reports in.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    essential: bool,
    state: RwLock<ComponentState>,
    failures: AtomicU64,
}

impl ComponentHealth {
    fn new(name: &'static str, essential: bool) -> Self {
        Self {
            name,
            essential,
            state: RwLock::new(ComponentState::default()),
            failures: AtomicU64::new(0),
        }
    }

    pub fn set_healthy(&self) {
        let mut state = self.state.write();
        if !state.healthy {
            state.changed_at = Some(Utc::now());
        }
        state.healthy = true;
        state.last_error = None;
    }

    pub fn set_unhealthy(&self, error: impl Into<String>) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.write();
        if state.healthy || state.changed_at.is_none() {
            state.changed_at = Some(Utc::now());
        }
        state.healthy = false;
        state.last_error = Some(error.into());
    }

    pub fn is_healthy(&self) -> bool {
        self.state.read().healthy
    }

    fn report(&self) -> ComponentReport {
        let state = self.state.read().clone();
        ComponentReport {
            name: self.name,
            essential: self.essential,
            healthy: state.healthy,
            last_error: state.last_error,
            since: state.changed_at,
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    pub name: &'static str,
    pub essential: bool,
    pub healthy: bool,
    pub last_error: Option<String>,
    /// When the component last changed state.
    pub since: Option<DateTime<Utc>>,
    /// Failures reported since startup.
    pub failures: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub components: Vec<ComponentReport>,
}

pub struct HealthRegistry {
    pub storage: ComponentHealth,
    pub geo: ComponentHealth,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            storage: ComponentHealth::new("storage", true),
            geo: ComponentHealth::new("geo", false),
        }
    }

    /// Unhealthy when an essential component is down, degraded when only
    /// optional ones are.
    pub fn report(&self) -> HealthReport {
        let components = vec![self.storage.report(), self.geo.report()];

        let status = if components.iter().any(|c| c.essential && !c.healthy) {
            HealthStatus::Unhealthy
        } else if components.iter().any(|c| !c.healthy) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            checked_at: Utc::now(),
            components,
        }
    }

    /// Whether tracked events can be persisted.
    pub fn is_ready(&self) -> bool {
        self.storage.is_healthy()
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static HEALTH: LazyLock<HealthRegistry> = LazyLock::new(HealthRegistry::new);

pub fn health() -> &'static HealthRegistry {
    &HEALTH
}
