//! Sliding window rate limiter backed by a shared counter store.
//!
//! Each identity has one counter per fixed window. A decision blends the
//! current window's count with the previous window's count, weighted by
//! how much of the previous window still overlaps a window-sized span
//! ending now:
//!
//! ```text
//! estimate = current + previous * (1 - elapsed / window)
//! ```
//!
//! The request is admitted when `estimate < limit`, and the store
//! increments the current counter in the same atomic step.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::key::CounterKey;
use super::window::{validate_window, WindowPosition};
use crate::error::{Result, WardenError};
use crate::store::{AdmitRequest, CounterStore};

/// Default namespace for counter keys.
pub const DEFAULT_KEY_PREFIX: &str = "rate";

/// A sliding window rate limiter.
///
/// Holds no mutable state of its own; all counts live in the store, so
/// any number of limiter instances (in any number of processes) sharing a
/// store enforce one quota.
pub struct SlidingWindowLimiter {
    /// The counter store running the atomic decision.
    store: Arc<dyn CounterStore>,
    /// Source of "now".
    clock: Arc<dyn Clock>,
    window: Duration,
    key_prefix: String,
    /// Bound on one decision, store round trip included.
    operation_timeout: Option<Duration>,
}

impl std::fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("window", &self.window)
            .field("key_prefix", &self.key_prefix)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

impl SlidingWindowLimiter {
    /// Create a limiter using the system clock.
    pub fn new(store: Arc<dyn CounterStore>, window: Duration) -> Result<Self> {
        Self::with_clock(store, window, Arc::new(SystemClock))
    }

    /// Create a limiter reading time from `clock`.
    pub fn with_clock(
        store: Arc<dyn CounterStore>,
        window: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        validate_window(window)?;
        Ok(Self {
            store,
            clock,
            window,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            operation_timeout: None,
        })
    }

    /// Use a different key namespace.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Fail decisions that take longer than `timeout`.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Current and previous counter keys for `identity` at the current time.
    pub fn counter_keys(&self, identity: &str) -> (CounterKey, CounterKey) {
        let position = WindowPosition::at(self.clock.now(), self.window);
        self.keys_at(identity, &position)
    }

    fn keys_at(&self, identity: &str, position: &WindowPosition) -> (CounterKey, CounterKey) {
        (
            CounterKey::new(&self.key_prefix, identity, position.current_start),
            CounterKey::new(&self.key_prefix, identity, position.previous_start),
        )
    }

    /// Check the rate limit for `identity` and count the request if admitted.
    pub async fn allow(&self, identity: &str, limit: u64) -> Result<bool> {
        if identity.is_empty() {
            return Err(WardenError::InvalidArgument(
                "identity must not be empty".to_string(),
            ));
        }
        if limit == 0 {
            return Err(WardenError::InvalidArgument(
                "limit must be positive".to_string(),
            ));
        }

        let position = WindowPosition::at(self.clock.now(), self.window);
        let (current, previous) = self.keys_at(identity, &position);

        let request = AdmitRequest {
            current_key: current.to_string(),
            previous_key: previous.to_string(),
            limit,
            weight: position.weight,
            window: self.window,
        };

        trace!(
            identity = %identity,
            window = position.current_start,
            weight = position.weight,
            limit = limit,
            "Checking sliding window rate limit"
        );

        let outcome = match self.operation_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.store.admit(&request))
                .await
                .map_err(|_| WardenError::BackendUnavailable {
                    operation: "allow",
                    identity: identity.to_string(),
                    reason: format!("no decision within {:?}", timeout),
                })?,
            None => self.store.admit(&request).await,
        };

        let admitted = outcome.map_err(|e| WardenError::from_store(e, "allow", identity))?;

        if !admitted {
            debug!(
                identity = %identity,
                window = position.current_start,
                weight = position.weight,
                limit = limit,
                "Rate limit exceeded"
            );
        }

        Ok(admitted)
    }
}

#[async_trait]
impl super::backend::RateLimiter for SlidingWindowLimiter {
    async fn allow(&self, identity: &str, limit: u64) -> Result<bool> {
        self.allow(identity, limit).await
    }
}
