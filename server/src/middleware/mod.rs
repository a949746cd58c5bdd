//! Hand-rolled `axum::middleware::from_fn` layers applied, outermost
//! first, in the order compression → signature → logging → route. The
//! signature digest must observe the pre-compression bytes on both
//! directions, which is why this isn't delegated to tower-http's automatic
//! compression layer.

mod compression;
mod logging;
mod signature;

pub use compression::compression_middleware;
pub use logging::logging_middleware;
pub use signature::signature_middleware;
