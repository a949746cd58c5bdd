//! The Batch Sender: encodes one batch as a signed, gzip-compressed POST
//! and classifies the outcome for the Retry Controller.

use metrics_core::{net, retry, Classify, ErrorCategory, RetryError, RetryPolicy};
use metrics_model::MetricPoint;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded with {0}")]
    Status(reqwest::StatusCode),
    #[error("response signature mismatch")]
    ResponseIntegrity,
    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to compress batch: {0}")]
    Compress(#[source] std::io::Error),
}

impl Classify for SendError {
    fn category(&self) -> ErrorCategory {
        match self {
            SendError::Transport(e) => net::classify_transport(e),
            SendError::Status(status) => net::classify_status(*status),
            SendError::ResponseIntegrity => ErrorCategory::Permanent,
            SendError::Encode(_) | SendError::Compress(_) => ErrorCategory::Permanent,
        }
    }
}

pub struct BatchSender {
    client: Client,
    url: String,
    key: Option<Vec<u8>>,
}

impl BatchSender {
    pub fn new(url: String, key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client configuration is static and valid");
        Self {
            client,
            url,
            key: key.map(String::into_bytes),
        }
    }

    /// One attempt: serialize, sign (if keyed), compress, POST, check
    /// status, verify the response digest (if present and keyed).
    async fn send_once(&self, batch: &[MetricPoint]) -> Result<(), SendError> {
        let json = serde_json::to_vec(batch)?;
        let compressed = metrics_core::compression::compress(&json).map_err(SendError::Compress)?;

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::CONTENT_ENCODING, "gzip")
            .header(reqwest::header::ACCEPT_ENCODING, "gzip");

        if let Some(key) = &self.key {
            let digest = metrics_core::signing::sign(key, &json);
            request = request.header("HashSHA256", digest);
        }

        let response = request.body(compressed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SendError::Status(status));
        }

        if let Some(key) = &self.key {
            if let Some(header) = response.headers().get("HashSHA256").cloned() {
                let body = response.bytes().await?;
                let digest = header.to_str().unwrap_or_default();
                if !metrics_core::signing::verify(key, &body, digest) {
                    return Err(SendError::ResponseIntegrity);
                }
            }
        }

        Ok(())
    }

    /// Sends one batch under the shared retry policy.
    pub async fn send(
        &self,
        batch: Vec<MetricPoint>,
        policy: &RetryPolicy,
    ) -> Result<(), RetryError<SendError>> {
        retry(policy, || async { self.send_once(&batch).await }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::Request;
    use axum::http::{header, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    async fn spawn_echo_server(
        expected_key: Option<&'static str>,
    ) -> (SocketAddr, Arc<Mutex<Option<Bytes>>>) {
        let received = Arc::new(Mutex::new(None));
        let received_clone = received.clone();

        let app = Router::new().route(
            "/updates/",
            post(move |req: Request| {
                let received = received_clone.clone();
                async move {
                    let headers = req.headers().clone();
                    let body = axum::body::to_bytes(req.into_body(), usize::MAX)
                        .await
                        .unwrap();
                    let json = metrics_core::compression::decompress(&body).unwrap();

                    if let Some(key) = expected_key {
                        let sent = headers
                            .get("HashSHA256")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default();
                        if !metrics_core::signing::verify(key.as_bytes(), &json, sent) {
                            return (StatusCode::BAD_REQUEST, "bad signature").into_response();
                        }
                    }

                    *received.lock().await = Some(Bytes::from(json));
                    (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], "{}")
                        .into_response()
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, received)
    }

    use axum::response::IntoResponse;

    #[tokio::test]
    async fn sends_unsigned_batch_and_server_observes_plain_json() {
        let (addr, received) = spawn_echo_server(None).await;
        let sender = BatchSender::new(format!("http://{addr}/updates/"), None);
        let batch = vec![MetricPoint::gauge("Alloc", 1.0), MetricPoint::counter("PollCount", 2)];

        sender.send(batch.clone(), &RetryPolicy::standard()).await.unwrap();

        let body = received.lock().await.clone().unwrap();
        let decoded: Vec<MetricPoint> = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded, batch);
    }

    #[tokio::test]
    async fn signed_batch_digest_matches_on_uncompressed_body() {
        let (addr, received) = spawn_echo_server(Some("secret")).await;
        let sender = BatchSender::new(format!("http://{addr}/updates/"), Some("secret".into()));
        let batch = vec![MetricPoint::gauge("A", 1.0)];

        sender.send(batch, &RetryPolicy::standard()).await.unwrap();
        assert!(received.lock().await.is_some());
    }

    #[tokio::test]
    async fn non_2xx_status_is_a_failure() {
        let app = Router::new().route(
            "/updates/",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "nope") }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let sender = BatchSender::new(format!("http://{addr}/updates/"), None);
        let policy = RetryPolicy::new(0, vec![Duration::from_millis(1)]);
        let result = sender.send(vec![MetricPoint::gauge("A", 1.0)], &policy).await;
        assert!(result.is_err());
    }
}
