use crate::errors::{AppError, AppResult};
use crate::state::AppState;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use metrics_model::{MetricKind, MetricPoint};
use std::net::SocketAddr;
use std::str::FromStr;

/// `X-Forwarded-For` (first hop) if present, otherwise the TCP peer
/// address axum captured for this connection.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| peer.ip().to_string())
}

pub async fn update_path(
    State(state): State<AppState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> AppResult<impl IntoResponse> {
    if name.is_empty() {
        return Err(AppError::not_found("metric name required"));
    }
    let kind = MetricKind::from_str(&kind).map_err(|_| AppError::bad_request("unknown metric kind"))?;

    let point = match kind {
        MetricKind::Gauge => {
            let v: f64 = value.parse().map_err(|_| AppError::bad_request("invalid gauge value"))?;
            if !v.is_finite() {
                return Err(AppError::bad_request("invalid gauge value"));
            }
            MetricPoint::gauge(name, v)
        }
        MetricKind::Counter => {
            let d: i64 = value.parse().map_err(|_| AppError::bad_request("invalid counter delta"))?;
            MetricPoint::counter(name, d)
        }
    };

    state.storage.update(point).await?;
    Ok(())
}

pub async fn update_json(
    State(state): State<AppState>,
    Json(point): Json<MetricPoint>,
) -> AppResult<impl IntoResponse> {
    let stored = state.storage.update(point).await?;
    Ok(Json(stored))
}

pub async fn update_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(points): Json<Vec<MetricPoint>>,
) -> AppResult<impl IntoResponse> {
    if points.is_empty() {
        return Err(AppError::bad_request("batch must not be empty"));
    }

    let names: Vec<String> = points.iter().map(|p| p.id.clone()).collect();
    state.storage.update_batch(points).await?;

    if !state.audit.is_empty() {
        let ip = client_ip(&headers, peer);
        let audit = state.audit.clone();
        tokio::spawn(async move {
            let deadline = tokio::time::timeout(std::time::Duration::from_secs(5), audit.notify(names, ip));
            match deadline.await {
                Ok(Ok(())) => {}
                Ok(Err(errors)) => {
                    tracing::warn!(?errors, "audit notification failed");
                }
                Err(_) => tracing::warn!("audit notification timed out"),
            }
        });
    }

    Ok(Json(serde_json::json!({"status": "ok"})))
}
