//! Counter store adapters.
//!
//! A counter store holds the per-window request counts and evaluates the
//! sliding window decision atomically. Nothing outside the store ever
//! reads and then writes a counter.

mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Errors reported by a counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection, pool or timeout failure
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The decision script was rejected or failed while running
    #[error("script failed: {0}")]
    Script(String),
}

/// Input to one atomic admission decision.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmitRequest {
    /// Counter key of the window containing `now`
    pub current_key: String,
    /// Counter key of the window before it
    pub previous_key: String,
    /// Maximum admitted requests per window
    pub limit: u64,
    /// Contribution of the previous window, in `[0, 1]`
    pub weight: f64,
    /// Window size; counters expire after twice this
    pub window: Duration,
}

impl AdmitRequest {
    /// Expiry applied to the current counter on every admission.
    pub fn counter_ttl(&self) -> Duration {
        self.window * 2
    }

    /// The sliding estimate for the given raw counts.
    pub fn estimate(&self, current: u64, previous: u64) -> f64 {
        current as f64 + previous as f64 * self.weight
    }
}

/// A shared store able to run the sliding window decision atomically.
///
/// Implementations must read both counters, compare the estimate against
/// the limit and conditionally increment as one indivisible step.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Returns `true` when the request was admitted and counted.
    async fn admit(&self, request: &AdmitRequest) -> Result<bool, StoreError>;
}
