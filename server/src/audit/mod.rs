//! The Audit Notifier: after a successful batch upsert, fans an event out
//! to whichever subscribers are configured (file, HTTP), isolating one
//! subscriber's failure from the others.

mod file;
mod http;

pub use file::FileSubscriber;
pub use http::HttpSubscriber;

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub ts: i64,
    pub metrics: Vec<String>,
    pub ip_address: String,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to encode audit event: {0}")]
    Encode(String),
    #[error("audit file write failed: {0}")]
    Io(String),
    #[error("audit http delivery failed: {0}")]
    Http(String),
    #[error("audit subscriber task panicked")]
    TaskPanicked,
}

#[async_trait::async_trait]
pub trait AuditSubscriber: Send + Sync {
    async fn notify(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Owns the configured subscribers. Holds no back-reference to storage or
/// the router; it only ever receives an event and fans it out.
#[derive(Clone, Default)]
pub struct AuditNotifier {
    subscribers: Vec<Arc<dyn AuditSubscriber>>,
}

impl AuditNotifier {
    pub fn new(subscribers: Vec<Arc<dyn AuditSubscriber>>) -> Self {
        Self { subscribers }
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Fans `event` out to every subscriber concurrently. Returns the
    /// aggregate of whatever subscribers failed; a caller logs this but
    /// must never let it affect the already-returned HTTP response.
    pub async fn notify(&self, metrics: Vec<String>, ip_address: String) -> Result<(), Vec<AuditError>> {
        if self.subscribers.is_empty() {
            return Ok(());
        }
        let event = Arc::new(AuditEvent { ts: Utc::now().timestamp(), metrics, ip_address });

        let tasks = self.subscribers.iter().cloned().map(|subscriber| {
            let event = event.clone();
            tokio::spawn(async move { subscriber.notify(&event).await })
        });

        let results = futures::future::join_all(tasks).await;
        let errors: Vec<AuditError> = results
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(_) => Some(AuditError::TaskPanicked),
            })
            .collect();

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSubscriber(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl AuditSubscriber for CountingSubscriber {
        async fn notify(&self, _event: &AuditEvent) -> Result<(), AuditError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSubscriber;

    #[async_trait::async_trait]
    impl AuditSubscriber for FailingSubscriber {
        async fn notify(&self, _event: &AuditEvent) -> Result<(), AuditError> {
            Err(AuditError::Http("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn fans_out_to_every_subscriber() {
        let count = Arc::new(AtomicUsize::new(0));
        let notifier = AuditNotifier::new(vec![
            Arc::new(CountingSubscriber(count.clone())),
            Arc::new(CountingSubscriber(count.clone())),
        ]);
        notifier.notify(vec!["Alloc".into()], "127.0.0.1".into()).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn one_failing_subscriber_does_not_stop_the_others() {
        let count = Arc::new(AtomicUsize::new(0));
        let notifier = AuditNotifier::new(vec![
            Arc::new(FailingSubscriber),
            Arc::new(CountingSubscriber(count.clone())),
        ]);
        let result = notifier.notify(vec!["Alloc".into()], "127.0.0.1".into()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().len(), 1);
    }

    #[tokio::test]
    async fn empty_subscriber_list_is_a_no_op() {
        let notifier = AuditNotifier::default();
        assert!(notifier.notify(vec!["Alloc".into()], "127.0.0.1".into()).await.is_ok());
    }
}
