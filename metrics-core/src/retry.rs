//! The Retry Controller: a single reusable wrapper for "attempt, classify,
//! back off, retry" used by the agent's batch sender, the server's database
//! backend, and the server's HTTP audit subscriber.
//!
//! Classification is by category, never by matching on a rendered error
//! string: callers implement [`Classify`] on their own error type and hand
//! it an [`ErrorCategory`], so a DNS failure and a `5xx` status both read as
//! "retriable" without the controller knowing anything about HTTP or DNS.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient: network hiccup, upstream 5xx/429, DB connection loss,
    /// deadline exceeded. Retrying may succeed.
    Retriable,
    /// Permanent: integrity failure, malformed input, unique-constraint
    /// violation, caller-initiated cancellation. Retrying can't help.
    Permanent,
}

/// Implemented by an operation's error type so the controller can decide
/// whether to retry without knowing what kind of operation it wrapped.
pub trait Classify {
    fn category(&self) -> ErrorCategory;
}

/// A fixed attempt budget and backoff schedule.
///
/// `delays` must have at least `max_retries` entries; if it runs short the
/// controller holds at the last delay rather than panicking, but every
/// caller in this repository supplies a schedule at least as long as its
/// retry budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, delays: Vec<Duration>) -> Self {
        Self { max_retries, delays }
    }

    /// The 1s / 3s / 5s schedule used throughout this system: three
    /// retries after the first attempt, spaced at increasing fixed delays.
    pub fn standard() -> Self {
        Self::new(
            3,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(5),
            ],
        )
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        self.delays
            .get(attempt)
            .copied()
            .or_else(|| self.delays.last().copied())
            .unwrap_or_default()
    }
}

/// Terminal failure returned once the controller gives up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The underlying error classified itself as permanent; no retry was
    /// attempted after it was observed.
    #[error("non-retriable failure after {attempts} attempt(s): {source}")]
    Permanent { source: E, attempts: usize },
    /// The retry budget was exhausted while the error kept classifying as
    /// retriable.
    #[error("retries exhausted after {attempts} attempt(s): {source}")]
    Exhausted { source: E, attempts: usize },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> usize {
        match self {
            RetryError::Permanent { attempts, .. } => *attempts,
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_source(self) -> E {
        match self {
            RetryError::Permanent { source, .. } => source,
            RetryError::Exhausted { source, .. } => source,
        }
    }
}

/// Runs `op` up to `policy.max_retries + 1` times, sleeping between
/// retriable failures per `policy.delays`. `op` is an `FnMut` so it can
/// close over request state it needs to rebuild per attempt (e.g. a fresh
/// HTTP request body).
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RetryError<E>>
where
    E: Classify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => match err.category() {
                ErrorCategory::Permanent => {
                    warn!(attempts = attempt + 1, error = %err, "non-retriable failure");
                    return Err(RetryError::Permanent {
                        source: err,
                        attempts: attempt + 1,
                    });
                }
                ErrorCategory::Retriable => {
                    if attempt >= policy.max_retries {
                        warn!(attempts = attempt + 1, error = %err, "retries exhausted");
                        return Err(RetryError::Exhausted {
                            source: err,
                            attempts: attempt + 1,
                        });
                    }
                    let delay = policy.delay_for(attempt);
                    debug!(attempt = attempt + 1, ?delay, error = %err, "retrying after delay");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("boom ({0})")]
    struct Boom(&'static str);

    impl Classify for Boom {
        fn category(&self) -> ErrorCategory {
            match self.0 {
                "permanent" => ErrorCategory::Permanent,
                _ => ErrorCategory::Retriable,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_without_retry() {
        let policy = RetryPolicy::standard();
        let result: Result<&str, RetryError<Boom>> =
            retry(&policy, || async { Ok("ok") }).await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn retries_up_to_budget_then_fails() {
        let policy = RetryPolicy::new(2, vec![Duration::from_millis(1), Duration::from_millis(1)]);
        let attempts = AtomicUsize::new(0);
        let result: Result<(), RetryError<Boom>> = retry(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Boom("transient")) }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3); // first attempt + 2 retries
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_short_circuits() {
        let policy = RetryPolicy::standard();
        let attempts = AtomicUsize::new(0);
        let result: Result<(), RetryError<Boom>> = retry(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Boom("permanent")) }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Permanent { attempts: 1, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn eventual_success_returns_value() {
        let policy = RetryPolicy::standard();
        let attempts = AtomicUsize::new(0);
        let result: Result<&str, RetryError<Boom>> = retry(&policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Boom("transient"))
                } else {
                    Ok("recovered")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
