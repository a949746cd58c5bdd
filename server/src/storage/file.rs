//! File persistence for the File storage backend: the whole map is
//! re-serialized on every write-through save (or periodic tick), and
//! restored wholesale on startup.

use metrics_model::MetricPoint;
use std::io;
use std::path::Path;

pub async fn save(path: &Path, points: &[MetricPoint]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let json = serde_json::to_vec_pretty(points)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    tokio::fs::write(path, json).await
}

/// Returns an empty catalog if the file does not exist yet, matching
/// first-boot behavior when `restore` is set but nothing has been saved.
pub async fn load(path: &Path) -> io::Result<Vec<MetricPoint>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}
