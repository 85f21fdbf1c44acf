//! IP geolocation backed by a MaxMind-format database.
//!
//! The database is opened from disk and, when missing, optionally downloaded
//! from a configured URL. Lookups go through a small in-memory cache.

use async_trait::async_trait;
use maxminddb::{geoip2, Reader};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use telemetry::{health, metrics};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Country reported when a lookup fails.
pub const UNKNOWN_COUNTRY: &str = "Unknown";
pub const UNKNOWN_COUNTRY_CODE: &str = "XX";

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("invalid IP address: {0}")]
    InvalidIp(String),

    #[error("no record for {0}")]
    NotFound(String),

    #[error("lookup failed: {0}")]
    Lookup(String),

    #[error("geolocation database unavailable: {0}")]
    Unavailable(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: String,
    pub country_code: String,
    pub city: String,
}

impl GeoLocation {
    pub fn unknown() -> Self {
        Self {
            country: UNKNOWN_COUNTRY.to_string(),
            country_code: UNKNOWN_COUNTRY_CODE.to_string(),
            city: String::new(),
        }
    }

    /// Country name, or the ISO code when the database has no name.
    pub fn display_country(&self) -> &str {
        if self.country.is_empty() {
            &self.country_code
        } else {
            &self.country
        }
    }

    fn apply_overrides(mut self) -> Self {
        if self.country == "Israel" {
            self.country = "Palestine".to_string();
            self.country_code = "PS".to_string();
        }
        self
    }
}

/// Geolocation source consumed by the enricher.
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<GeoLocation, GeoError>;

    /// Lookup that never fails; errors become `Unknown`/`XX`.
    async fn lookup_or_default(&self, ip: &str) -> GeoLocation {
        match self.lookup(ip).await {
            Ok(geo) => geo,
            Err(e) => {
                metrics().geo_lookup_failures.inc();
                debug!(ip = ip, error = %e, "Geolocation lookup failed");
                GeoLocation::unknown()
            }
        }
    }
}

/// Used when no database could be opened.
pub struct NoopGeo;

#[async_trait]
impl GeoLookup for NoopGeo {
    async fn lookup(&self, _ip: &str) -> Result<GeoLocation, GeoError> {
        Err(GeoError::Unavailable("no database loaded".into()))
    }
}

pub struct MaxMindGeo {
    reader: Reader<Vec<u8>>,
}

impl MaxMindGeo {
    pub fn open(path: &Path) -> Result<Self, GeoError> {
        let reader = Reader::open_readfile(path)
            .map_err(|e| GeoError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Ok(Self { reader })
    }

    fn lookup_ip(&self, ip: IpAddr) -> Result<GeoLocation, GeoError> {
        let result = self
            .reader
            .lookup(ip)
            .map_err(|e| GeoError::Lookup(e.to_string()))?;

        // City records are a superset of country records.
        if let Ok(Some(city)) = result.decode::<geoip2::City>() {
            return Ok(GeoLocation {
                country: city.country.names.english.unwrap_or_default().to_string(),
                country_code: city.country.iso_code.unwrap_or_default().to_string(),
                city: city.city.names.english.unwrap_or_default().to_string(),
            });
        }

        match result.decode::<geoip2::Country>() {
            Ok(Some(country)) => Ok(GeoLocation {
                country: country.country.names.english.unwrap_or_default().to_string(),
                country_code: country.country.iso_code.unwrap_or_default().to_string(),
                city: String::new(),
            }),
            Ok(None) => Err(GeoError::NotFound(ip.to_string())),
            Err(e) => Err(GeoError::Lookup(e.to_string())),
        }
    }
}

#[async_trait]
impl GeoLookup for MaxMindGeo {
    async fn lookup(&self, ip: &str) -> Result<GeoLocation, GeoError> {
        let addr: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| GeoError::InvalidIp(ip.to_string()))?;
        self.lookup_ip(addr).map(GeoLocation::apply_overrides)
    }
}

/// Caches successful lookups of an inner source.
pub struct CachedGeo {
    inner: Arc<dyn GeoLookup>,
    cache: Cache<String, GeoLocation>,
}

impl CachedGeo {
    pub fn new(inner: Arc<dyn GeoLookup>, capacity: u64, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }
}

#[async_trait]
impl GeoLookup for CachedGeo {
    async fn lookup(&self, ip: &str) -> Result<GeoLocation, GeoError> {
        if let Some(hit) = self.cache.get(ip).await {
            return Ok(hit);
        }

        let geo = self.inner.lookup(ip).await?;
        self.cache.insert(ip.to_string(), geo.clone()).await;
        Ok(geo)
    }
}

/// Geolocation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub database_path: PathBuf,
    /// Fetched when the database file is missing. Must serve a raw `.mmdb`.
    pub download_url: Option<String>,
    pub download_timeout_secs: u64,
    pub cache_capacity: u64,
    pub cache_ttl_secs: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/geodb/dbip-country.mmdb"),
            download_url: None,
            download_timeout_secs: 60,
            cache_capacity: 10_000,
            cache_ttl_secs: 3600,
        }
    }
}

/// Make sure the database exists on disk, downloading it if configured.
pub async fn ensure_database(config: &GeoConfig) -> Result<(), GeoError> {
    if tokio::fs::try_exists(&config.database_path).await? {
        debug!(path = %config.database_path.display(), "Geolocation database found");
        return Ok(());
    }

    let url = config.download_url.as_deref().ok_or_else(|| {
        GeoError::Unavailable(format!(
            "{} not found and no download URL configured",
            config.database_path.display()
        ))
    })?;

    info!(url = url, "Downloading geolocation database");
    download_database(url, &config.database_path, config.download_timeout_secs).await?;
    info!(path = %config.database_path.display(), "Geolocation database downloaded");
    Ok(())
}

async fn download_database(url: &str, path: &Path, timeout_secs: u64) -> Result<(), GeoError> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| GeoError::Download(e.to_string()))?;

    let body = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| GeoError::Download(e.to_string()))?
        .bytes()
        .await
        .map_err(|e| GeoError::Download(e.to_string()))?;

    let tmp = path.with_extension("mmdb.tmp");
    tokio::fs::write(&tmp, &body).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Open the configured database behind a lookup cache.
///
/// Never fails: without a database every lookup resolves to `Unknown`.
pub async fn open_geo(config: &GeoConfig) -> Arc<dyn GeoLookup> {
    let opened = match ensure_database(config).await {
        Ok(()) => MaxMindGeo::open(&config.database_path),
        Err(e) => Err(e),
    };

    match opened {
        Ok(db) => {
            health().geo.set_healthy();
            info!(path = %config.database_path.display(), "Geolocation database loaded");
            Arc::new(CachedGeo::new(
                Arc::new(db),
                config.cache_capacity,
                Duration::from_secs(config.cache_ttl_secs),
            ))
        }
        Err(e) => {
            health().geo.set_unhealthy(e.to_string());
            warn!(error = %e, "Geolocation disabled");
            Arc::new(NoopGeo)
        }
    }
}
