//! Plumbing shared by the agent and the server: the retry controller, the
//! HMAC body-integrity helpers, and the gzip framing used on both sides of
//! the wire.
//!
//! None of this is specific to metric points: it would look the same in
//! any HTTP client/server pair that signs and compresses its bodies, which
//! is exactly why it lives in its own crate instead of `agent` or `server`.

pub mod compression;
pub mod retry;
pub mod signing;

#[cfg(feature = "reqwest")]
pub mod net;

#[cfg(feature = "sqlx")]
pub mod db;

pub use retry::{retry, Classify, ErrorCategory, RetryError, RetryPolicy};
