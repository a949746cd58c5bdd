use super::{AuditError, AuditEvent, AuditSubscriber};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends one JSON object per line, exclusive across writers via a mutex
/// rather than relying on `O_APPEND` atomicity across processes.
pub struct FileSubscriber {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSubscriber {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }
}

#[async_trait::async_trait]
impl AuditSubscriber for FileSubscriber {
    async fn notify(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AuditError::Io(e.to_string()))?;
            }
        }

        let mut line =
            serde_json::to_string(event).map_err(|e| AuditError::Encode(e.to_string()))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AuditError::Io(e.to_string()))?;
        file.write_all(line.as_bytes()).await.map_err(|e| AuditError::Io(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_one_json_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.log");
        let subscriber = FileSubscriber::new(&path);

        let event = AuditEvent { ts: 1, metrics: vec!["Alloc".into()], ip_address: "127.0.0.1".into() };
        subscriber.notify(&event).await.unwrap();
        subscriber.notify(&event).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
        let parsed: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["ip_address"], "127.0.0.1");
    }
}
