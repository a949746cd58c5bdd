//! The Storage Engine: an in-memory catalog of metrics, optionally
//! durable to a file or a Postgres database.
//!
//! The catalog itself is always the in-memory map: both persistence
//! backends exist to survive a restart, not to serve reads, so every read
//! (`get`, `all`) is served straight from the `RwLock<HashMap<..>>` with no
//! round trip to disk or the database.

mod db;
mod file;

use metrics_core::{RetryError, RetryPolicy};
use metrics_model::{MetricKind, MetricPoint, ValidationError};
use sqlx::PgPool;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info};

/// How a `File` backend writes: on every successful update, or on a
/// background tick that periodically dumps the whole catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    WriteThrough,
    Periodic(Duration),
}

/// Where the catalog is made durable, if anywhere.
pub enum Backend {
    None,
    File { path: PathBuf, mode: FileMode },
    Database { pool: PgPool, policy: RetryPolicy },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("file persistence failed: {0}")]
    File(#[from] std::io::Error),
    #[error("database persistence failed: {0}")]
    Database(String),
}

impl From<RetryError<db::DbError>> for StorageError {
    fn from(err: RetryError<db::DbError>) -> Self {
        let attempts = err.attempts();
        StorageError::Database(format!("{} (after {attempts} attempt(s))", err.into_source()))
    }
}

pub struct Storage {
    map: RwLock<HashMap<String, MetricPoint>>,
    backend: Backend,
}

impl Storage {
    pub fn new(backend: Backend) -> Self {
        Self { map: RwLock::new(HashMap::new()), backend }
    }

    /// Loads whatever the backend holds into the in-memory map. Intended to
    /// be called once at startup, before the HTTP listener binds.
    pub async fn restore(&self) -> Result<usize, StorageError> {
        let points = match &self.backend {
            Backend::None => Vec::new(),
            Backend::File { path, .. } => file::load(path).await?,
            Backend::Database { pool, .. } => db::restore_all(pool)
                .await
                .map_err(|e| StorageError::Database(e.to_string()))?,
        };
        let count = points.len();
        let mut guard = self.map.write().await;
        for point in points {
            guard.insert(point.id.clone(), point);
        }
        Ok(count)
    }

    pub async fn update(&self, point: MetricPoint) -> Result<MetricPoint, StorageError> {
        point.validate()?;
        let stored = {
            let mut guard = self.map.write().await;
            let merged = match guard.get(&point.id) {
                Some(existing) => existing.accumulate(&point),
                None => point.clone(),
            };
            guard.insert(point.id.clone(), merged.clone());
            merged
        };
        self.persist_one(&stored).await?;
        Ok(stored)
    }

    pub async fn update_batch(&self, points: Vec<MetricPoint>) -> Result<(), StorageError> {
        for point in &points {
            point.validate()?;
        }
        let merged = {
            let mut guard = self.map.write().await;
            let mut merged = Vec::with_capacity(points.len());
            for point in points {
                let next = match guard.get(&point.id) {
                    Some(existing) => existing.accumulate(&point),
                    None => point,
                };
                guard.insert(next.id.clone(), next.clone());
                merged.push(next);
            }
            merged
        };
        self.persist_batch(&merged).await?;
        Ok(())
    }

    /// The generic accessor: whatever is stored under `id`, regardless of
    /// its kind.
    pub async fn get_point(&self, id: &str) -> Option<MetricPoint> {
        self.map.read().await.get(id).cloned()
    }

    /// `GetGauge`/`GetCounter` semantics: looks up by id, then treats a
    /// stored point of the wrong kind as a miss.
    pub async fn get(&self, id: &str, kind: MetricKind) -> Option<MetricPoint> {
        self.get_point(id).await.filter(|point| point.kind == kind)
    }

    pub async fn all(&self) -> Vec<MetricPoint> {
        let guard = self.map.read().await;
        let mut points: Vec<_> = guard.values().cloned().collect();
        points.sort_by(|a, b| a.id.cmp(&b.id).then(a.kind.as_str().cmp(b.kind.as_str())));
        points
    }

    pub async fn reset(&self) {
        self.map.write().await.clear();
    }

    pub async fn ping(&self) -> Result<(), StorageError> {
        match &self.backend {
            Backend::Database { pool, .. } => {
                db::ping(pool).await.map_err(|e| StorageError::Database(e.to_string()))
            }
            Backend::None | Backend::File { .. } => {
                Err(StorageError::Database("no database backend configured".into()))
            }
        }
    }

    async fn persist_one(&self, point: &MetricPoint) -> Result<(), StorageError> {
        match &self.backend {
            Backend::None => Ok(()),
            Backend::File { path, mode: FileMode::WriteThrough } => self.flush_to_file(path).await,
            Backend::File { mode: FileMode::Periodic(_), .. } => Ok(()),
            Backend::Database { pool, policy } => {
                db::upsert_one(pool, point, policy).await.map_err(StorageError::from)
            }
        }
    }

    async fn persist_batch(&self, points: &[MetricPoint]) -> Result<(), StorageError> {
        match &self.backend {
            Backend::None => Ok(()),
            Backend::File { path, mode: FileMode::WriteThrough } => self.flush_to_file(path).await,
            Backend::File { mode: FileMode::Periodic(_), .. } => Ok(()),
            Backend::Database { pool, policy } => {
                db::upsert_batch(pool, points, policy).await.map_err(StorageError::from)
            }
        }
    }

    async fn flush_to_file(&self, path: &std::path::Path) -> Result<(), StorageError> {
        let snapshot = self.all().await;
        file::save(path, &snapshot).await?;
        Ok(())
    }

    /// Runs the periodic-flush ticker for a `File { mode: Periodic, .. }`
    /// backend. A no-op for every other backend; callers spawn this once at
    /// startup and let it run for the process lifetime.
    pub async fn run_periodic_flush(&self) {
        let (path, interval) = match &self.backend {
            Backend::File { path, mode: FileMode::Periodic(interval) } => (path.clone(), *interval),
            _ => return,
        };
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = file::save(&path, &self.all().await).await {
                error!(error = %err, "periodic metrics flush failed");
            } else {
                info!(path = %path.display(), "flushed metrics to disk");
            }
        }
    }

    /// Writes the file backend's catalog unconditionally, regardless of
    /// flush mode. Used for a final save on graceful shutdown.
    pub async fn flush(&self) -> Result<(), StorageError> {
        match &self.backend {
            Backend::File { path, .. } => self.flush_to_file(path).await,
            Backend::None | Backend::Database { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_stores_and_echoes_the_merged_point() {
        let storage = Storage::new(Backend::None);
        let stored = storage.update(MetricPoint::counter("PollCount", 2)).await.unwrap();
        assert_eq!(stored.delta, Some(2));

        let stored = storage.update(MetricPoint::counter("PollCount", 3)).await.unwrap();
        assert_eq!(stored.delta, Some(5));
    }

    #[tokio::test]
    async fn gauge_update_overwrites_rather_than_accumulating() {
        let storage = Storage::new(Backend::None);
        storage.update(MetricPoint::gauge("Alloc", 1.0)).await.unwrap();
        storage.update(MetricPoint::gauge("Alloc", 2.0)).await.unwrap();
        let point = storage.get("Alloc", MetricKind::Gauge).await.unwrap();
        assert_eq!(point.value, Some(2.0));
    }

    #[tokio::test]
    async fn a_kind_change_on_the_same_id_replaces_the_existing_entry() {
        let storage = Storage::new(Backend::None);
        storage.update(MetricPoint::counter("X", 5)).await.unwrap();
        storage.update(MetricPoint::gauge("X", 2.5)).await.unwrap();

        // the newly-arrived kind wins outright, and it's the *same* id
        // entry that changed kind, not a second independent record.
        let point = storage.get_point("X").await.unwrap();
        assert_eq!(point.kind, MetricKind::Gauge);
        assert_eq!(point.value, Some(2.5));
        assert_eq!(storage.all().await.len(), 1);
    }

    #[tokio::test]
    async fn invalid_point_is_rejected_and_not_stored() {
        let storage = Storage::new(Backend::None);
        let err = storage.update(MetricPoint::counter("Bad", -1)).await;
        assert!(matches!(err, Err(StorageError::Validation(_))));
        assert!(storage.get("Bad", MetricKind::Counter).await.is_none());
    }

    #[tokio::test]
    async fn batch_validates_every_point_before_mutating_any() {
        let storage = Storage::new(Backend::None);
        let points = vec![
            MetricPoint::gauge("Good", 1.0),
            MetricPoint::counter("Bad", -1),
        ];
        let err = storage.update_batch(points).await;
        assert!(err.is_err());
        assert!(storage.get("Good", MetricKind::Gauge).await.is_none());
    }

    #[tokio::test]
    async fn all_is_sorted_by_id() {
        let storage = Storage::new(Backend::None);
        storage.update(MetricPoint::gauge("Zeta", 1.0)).await.unwrap();
        storage.update(MetricPoint::gauge("Alpha", 1.0)).await.unwrap();
        let all = storage.all().await;
        assert_eq!(all[0].id, "Alpha");
        assert_eq!(all[1].id, "Zeta");
    }

    #[tokio::test]
    async fn write_through_file_backend_persists_every_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let storage = Storage::new(Backend::File { path: path.clone(), mode: FileMode::WriteThrough });

        storage.update(MetricPoint::counter("PollCount", 4)).await.unwrap();
        let on_disk = file::load(&path).await.unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].delta, Some(4));
    }

    #[tokio::test]
    async fn restore_populates_the_map_from_the_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        file::save(&path, &[MetricPoint::gauge("Alloc", 7.0)]).await.unwrap();

        let storage = Storage::new(Backend::File { path, mode: FileMode::WriteThrough });
        let count = storage.restore().await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(storage.get("Alloc", MetricKind::Gauge).await.unwrap().value, Some(7.0));
    }

    #[tokio::test]
    async fn reset_clears_the_catalog() {
        let storage = Storage::new(Backend::None);
        storage.update(MetricPoint::gauge("Alloc", 1.0)).await.unwrap();
        storage.reset().await;
        assert!(storage.all().await.is_empty());
    }

    #[tokio::test]
    async fn ping_fails_without_a_database_backend() {
        let storage = Storage::new(Backend::None);
        assert!(storage.ping().await.is_err());
    }
}
