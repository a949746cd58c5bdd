//! Error-category classification for `reqwest`-based transport failures,
//! used by the agent's batch sender and the server's audit HTTP subscriber.

use crate::ErrorCategory;

/// DNS failures, connect refusals/resets, and timeouts all surface through
/// `reqwest::Error`'s `is_*` predicates rather than string matching.
pub fn classify_transport(err: &reqwest::Error) -> ErrorCategory {
    if err.is_timeout() || err.is_connect() {
        return ErrorCategory::Retriable;
    }
    if let Some(status) = err.status() {
        return classify_status(status);
    }
    if err.is_decode() {
        return ErrorCategory::Permanent;
    }
    // Anything else (body stream interrupted mid-transfer, EOF on connect)
    // is presumed transient: we'd rather retry once too often than give up
    // on a batch that simply hit a flaky connection.
    ErrorCategory::Retriable
}

/// Upstream 5xx and 429 are transient; everything else (4xx, in particular)
/// indicates a request we built wrong and retrying won't help.
pub fn classify_status(status: reqwest::StatusCode) -> ErrorCategory {
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        ErrorCategory::Retriable
    } else {
        ErrorCategory::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retriable() {
        assert_eq!(
            classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            ErrorCategory::Retriable
        );
        assert_eq!(
            classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            ErrorCategory::Retriable
        );
    }

    #[test]
    fn client_errors_are_permanent() {
        assert_eq!(
            classify_status(reqwest::StatusCode::BAD_REQUEST),
            ErrorCategory::Permanent
        );
        assert_eq!(
            classify_status(reqwest::StatusCode::NOT_FOUND),
            ErrorCategory::Permanent
        );
    }
}
