//! HMAC body integrity. When a key is configured, request bodies with a
//! `HashSHA256` header are verified; an absent header is accepted (see the
//! open-questions note on `AppState` construction in `main.rs`). Response
//! bodies are always signed when a key is configured, computed over the
//! bytes the handler produced, before the compression layer runs.

use crate::state::AppState;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
const DIGEST_HEADER: &str = "HashSHA256";

pub async fn signature_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(key) = state.hmac_key.clone() else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid request body").into_response(),
    };

    if let Some(header) = parts.headers.get(DIGEST_HEADER) {
        let provided = header.to_str().unwrap_or_default();
        if !metrics_core::signing::verify(&key, &bytes, provided) {
            return (StatusCode::BAD_REQUEST, "signature mismatch").into_response();
        }
    }

    let req = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(req).await;

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => return Response::from_parts(parts, Body::empty()),
    };
    if !bytes.is_empty() {
        let digest = metrics_core::signing::sign(&key, &bytes);
        if let Ok(value) = HeaderValue::from_str(&digest) {
            parts.headers.insert(DIGEST_HEADER, value);
        }
    }
    Response::from_parts(parts, Body::from(bytes))
}
