use super::{AuditError, AuditEvent, AuditSubscriber};
use metrics_core::{net, retry, Classify, ErrorCategory, RetryPolicy};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
enum AuditSendError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded with {0}")]
    Status(reqwest::StatusCode),
}

impl Classify for AuditSendError {
    fn category(&self) -> ErrorCategory {
        match self {
            AuditSendError::Transport(e) => net::classify_transport(e),
            AuditSendError::Status(status) => net::classify_status(*status),
        }
    }
}

pub struct HttpSubscriber {
    client: Client,
    url: String,
    policy: RetryPolicy,
}

impl HttpSubscriber {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client configuration is static and valid");
        Self { client, url: url.into(), policy: RetryPolicy::standard() }
    }
}

#[async_trait::async_trait]
impl AuditSubscriber for HttpSubscriber {
    async fn notify(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let body = serde_json::to_vec(event).map_err(|e| AuditError::Encode(e.to_string()))?;

        retry(&self.policy, || async {
            let response = self
                .client
                .post(&self.url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone())
                .send()
                .await?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(AuditSendError::Status(status))
            }
        })
        .await
        .map_err(|e| AuditError::Http(e.into_source().to_string()))
    }
}
