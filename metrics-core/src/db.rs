//! Error-category classification for `sqlx` failures, used by the server's
//! database storage backend.

use crate::ErrorCategory;

/// Connection-class SQLSTATEs (`08xxx`), admin shutdown / too-many-connections
/// (`57P03`, `53300`), and pool-level timeouts are retriable. A unique
/// constraint violation is never retriable: accumulating the same delta
/// again would double-count it.
pub fn classify(err: &sqlx::Error) -> ErrorCategory {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            ErrorCategory::Retriable
        }
        sqlx::Error::Database(db_err) => {
            if db_err.is_unique_violation() {
                return ErrorCategory::Permanent;
            }
            match db_err.code() {
                Some(code) if code.starts_with("08") => ErrorCategory::Retriable,
                Some(code) if matches!(code.as_ref(), "57P03" | "53300" | "53400") => {
                    ErrorCategory::Retriable
                }
                _ => ErrorCategory::Permanent,
            }
        }
        _ => ErrorCategory::Permanent,
    }
}
