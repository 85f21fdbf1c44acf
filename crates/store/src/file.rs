//! Single-file columnar backend.
//!
//! The live file always holds the full table sorted by timestamp. An append
//! merges the new batch with the existing rows, writes the result to a
//! temporary sibling, fsyncs it, then renames it over the live file, so a
//! reader never observes a partially written table.

use async_trait::async_trait;
use engine_core::error::DbErrorCode;
use engine_core::{ColumnarStore, Error, Event, Result, ScanRequest};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::columns::ColumnBatch;

/// File backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreConfig {
    /// Directory holding the live table file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Live table file name
    #[serde(default = "default_file_name")]
    pub file_name: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/events")
}

fn default_file_name() -> String {
    "events.columns.json".to_string()
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_name: default_file_name(),
        }
    }
}

impl FileStoreConfig {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: dir.into(),
            ..Default::default()
        }
    }
}

pub struct FileStore {
    path: PathBuf,
    /// In-memory mirror of the live file.
    rows: RwLock<Arc<Vec<Event>>>,
    max_id: AtomicU64,
    /// Serialises merges; the file is rewritten whole on every append.
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    /// Opens the table, loading the live file if it exists.
    pub async fn open(config: &FileStoreConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let path = config.data_dir.join(&config.file_name);

        // A leftover temp file means a merge died before its rename.
        let tmp = tmp_path(&path);
        if tokio::fs::try_exists(&tmp).await.unwrap_or(false) {
            warn!(path = %tmp.display(), "Removing incomplete merge file");
            tokio::fs::remove_file(&tmp).await?;
        }

        let rows = match tokio::fs::read(&path).await {
            Ok(bytes) => ColumnBatch::decode(&bytes)?.into_events()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let max_id = rows.iter().map(|e| e.id).max().unwrap_or(0);
        info!(
            path = %path.display(),
            rows = rows.len(),
            max_id = max_id,
            "Opened file store"
        );

        Ok(Self {
            path,
            rows: RwLock::new(Arc::new(rows)),
            max_id: AtomicU64::new(max_id),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    fn snapshot(&self) -> Arc<Vec<Event>> {
        self.rows.read().clone()
    }

    async fn write_atomically(&self, bytes: &[u8]) -> std::io::Result<()> {
        let tmp = tmp_path(&self.path);
        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl ColumnarStore for FileStore {
    async fn append_batch(&self, events: &[Event]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;
        let start = std::time::Instant::now();

        let existing = self.snapshot();
        let mut merged = Vec::with_capacity(existing.len() + events.len());
        merged.extend(existing.iter().cloned());
        merged.extend(events.iter().cloned());
        // Stable, so rows sharing a timestamp keep arrival order.
        merged.sort_by_key(|e| e.timestamp);

        let bytes = ColumnBatch::from_events(&merged).encode()?;
        self.write_atomically(&bytes).await.map_err(|e| {
            Error::database(
                DbErrorCode::StoreFailed,
                format!("failed to replace {}: {}", self.path.display(), e),
            )
        })?;

        let batch_max = events.iter().map(|e| e.id).max().unwrap_or(0);
        self.max_id.fetch_max(batch_max, Ordering::Relaxed);
        let total = merged.len();
        *self.rows.write() = Arc::new(merged);

        debug!(
            count = events.len(),
            total_rows = total,
            bytes = bytes.len(),
            latency_ms = %start.elapsed().as_millis(),
            "Merged batch into file store"
        );

        Ok(events.len())
    }

    async fn range_scan(&self, request: &ScanRequest) -> Result<Vec<Event>> {
        let rows = self.snapshot();

        // Rows are sorted by timestamp, so the range maps to a contiguous slice.
        let slice: &[Event] = match request.range {
            Some(range) => {
                let lo = rows.partition_point(|e| e.timestamp < range.start);
                let hi = rows.partition_point(|e| e.timestamp <= range.end);
                &rows[lo..hi.max(lo)]
            }
            None => &rows[..],
        };

        Ok(slice
            .iter()
            .filter(|e| request.filter.matches(e))
            .cloned()
            .collect())
    }

    async fn count(&self, request: &ScanRequest) -> Result<u64> {
        let rows = self.snapshot();
        Ok(rows.iter().filter(|e| request.matches(e)).count() as u64)
    }

    async fn projects(&self) -> Result<Vec<String>> {
        let rows = self.snapshot();
        let projects: BTreeSet<&str> = rows
            .iter()
            .map(|e| e.project_id.as_str())
            .filter(|p| !p.is_empty())
            .collect();
        Ok(projects.into_iter().map(str::to_string).collect())
    }

    async fn max_id(&self) -> Result<u64> {
        Ok(self.max_id.load(Ordering::Relaxed))
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
