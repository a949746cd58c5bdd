//! Transparent gzip handling: decompress a gzip-encoded request body before
//! it reaches routing, and gzip the response body if the client asked for
//! it and the content type is one this system ever compresses.

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::header::{
    ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, VARY,
};
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

fn is_compressible_content_type(value: Option<&HeaderValue>) -> bool {
    value
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json") || ct.starts_with("text/html"))
        .unwrap_or(false)
}

pub async fn compression_middleware(req: Request, next: Next) -> Response {
    let is_gzip_request = req
        .headers()
        .get(CONTENT_ENCODING)
        .map(|v| v.as_bytes() == b"gzip")
        .unwrap_or(false);
    let accepts_gzip = req
        .headers()
        .get(ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("gzip"))
        .unwrap_or(false);

    let req = if is_gzip_request {
        let (mut parts, body) = req.into_parts();
        let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
            Ok(b) => b,
            Err(_) => return (StatusCode::BAD_REQUEST, "invalid request body").into_response(),
        };
        let decompressed = match metrics_core::compression::decompress(&bytes) {
            Ok(d) => d,
            Err(_) => return (StatusCode::BAD_REQUEST, "invalid gzip body").into_response(),
        };
        parts.headers.remove(CONTENT_ENCODING);
        parts.headers.remove(CONTENT_LENGTH);
        Request::from_parts(parts, Body::from(decompressed))
    } else {
        req
    };

    let response = next.run(req).await;

    if !accepts_gzip || !is_compressible_content_type(response.headers().get(CONTENT_TYPE)) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => return Response::from_parts(parts, Body::empty()),
    };
    let compressed = match metrics_core::compression::compress(&bytes) {
        Ok(c) => c,
        Err(_) => return Response::from_parts(parts, Body::from(bytes)),
    };

    parts.headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    parts.headers.insert(VARY, HeaderValue::from_static("Accept-Encoding"));
    parts
        .headers
        .insert(CONTENT_LENGTH, HeaderValue::from_str(&compressed.len().to_string()).unwrap());
    Response::from_parts(parts, Body::from(compressed))
}
