//! Rate limiter trait for abstracting admission algorithms.

use async_trait::async_trait;

use crate::error::Result;

/// Trait for rate limiter implementations.
///
/// The HTTP admission layer only depends on this trait, so a different
/// algorithm can be swapped in without touching the middleware.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Decide whether `identity` may make one more request under `limit`.
    ///
    /// Returns `Ok(true)` when admitted, `Ok(false)` when over the limit.
    /// Store failures are returned as errors; whether to admit on error is
    /// left to the caller.
    async fn allow(&self, identity: &str, limit: u64) -> Result<bool>;
}
