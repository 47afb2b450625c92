//! In-process counter store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use super::{AdmitRequest, CounterStore, StoreError};

/// Expired counters are swept once every this many decisions.
const PURGE_EVERY: u64 = 256;

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: Instant,
}

impl Counter {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

fn retain_live(counters: &mut HashMap<String, Counter>, now: Instant) -> usize {
    let before = counters.len();
    counters.retain(|_, c| c.is_live(now));
    before - counters.len()
}

/// A counter store living in this process.
///
/// Every decision runs under one mutex, which gives the same
/// read-estimate-increment atomicity the Redis script provides, but only
/// for callers sharing this instance. Expired counters read as zero and
/// are swept from the map every [`PURGE_EVERY`] decisions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: Mutex<HashMap<String, Counter>>,
    decisions: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a counter directly, replacing any existing value.
    pub fn seed(&self, key: &str, count: u64, ttl: Duration) {
        let mut counters = self.counters.lock();
        counters.insert(
            key.to_string(),
            Counter {
                count,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Current value of a counter, zero when absent or expired.
    pub fn count(&self, key: &str) -> u64 {
        let counters = self.counters.lock();
        let now = Instant::now();
        counters
            .get(key)
            .filter(|c| c.is_live(now))
            .map_or(0, |c| c.count)
    }

    /// Number of live counters.
    pub fn len(&self) -> usize {
        let counters = self.counters.lock();
        let now = Instant::now();
        counters.values().filter(|c| c.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired counters, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        retain_live(&mut self.counters.lock(), Instant::now())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn admit(&self, request: &AdmitRequest) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut counters = self.counters.lock();

        if (self.decisions.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_EVERY == 0 {
            let purged = retain_live(&mut counters, now);
            if purged > 0 {
                trace!(purged, "Swept expired in-memory counters");
            }
        }

        let live_count = |key: &str| {
            counters
                .get(key)
                .filter(|c| c.is_live(now))
                .map_or(0, |c| c.count)
        };
        let current = live_count(&request.current_key);
        let previous = live_count(&request.previous_key);

        let estimate = request.estimate(current, previous);
        let admitted = estimate < request.limit as f64;

        trace!(
            current_key = %request.current_key,
            current,
            previous,
            estimate,
            admitted,
            "Evaluated in-memory window"
        );

        if admitted {
            counters.insert(
                request.current_key.clone(),
                Counter {
                    count: current + 1,
                    expires_at: now + request.counter_ttl(),
                },
            );
        }

        Ok(admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(limit: u64, weight: f64) -> AdmitRequest {
        AdmitRequest {
            current_key: "rate:u1:120".to_string(),
            previous_key: "rate:u1:60".to_string(),
            limit,
            weight,
            window: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_admit_increments_current_counter() {
        let store = MemoryStore::new();
        let req = request(3, 1.0);

        assert!(store.admit(&req).await.unwrap());
        assert!(store.admit(&req).await.unwrap());
        assert_eq!(store.count("rate:u1:120"), 2);
        assert_eq!(store.count("rate:u1:60"), 0);
    }

    #[tokio::test]
    async fn test_denial_does_not_mutate() {
        let store = MemoryStore::new();
        let req = request(2, 1.0);

        assert!(store.admit(&req).await.unwrap());
        assert!(store.admit(&req).await.unwrap());
        assert!(!store.admit(&req).await.unwrap());
        assert!(!store.admit(&req).await.unwrap());
        assert_eq!(store.count("rate:u1:120"), 2);
    }

    #[tokio::test]
    async fn test_previous_window_is_weighted() {
        let store = MemoryStore::new();
        store.seed("rate:u1:60", 10, Duration::from_secs(120));

        // 0 + 10 * 0.5 = 5, not below 5
        assert!(!store.admit(&request(5, 0.5)).await.unwrap());
        // 0 + 10 * 0.4 = 4
        assert!(store.admit(&request(5, 0.4)).await.unwrap());
        assert_eq!(store.count("rate:u1:60"), 10);
        assert_eq!(store.count("rate:u1:120"), 1);
    }

    #[tokio::test]
    async fn test_estimate_equal_to_limit_denies() {
        let store = MemoryStore::new();
        store.seed("rate:u1:120", 4, Duration::from_secs(120));
        store.seed("rate:u1:60", 2, Duration::from_secs(120));

        // 4 + 2 * 0.5 = 5
        assert!(!store.admit(&request(5, 0.5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_counters_read_as_zero() {
        let store = MemoryStore::new();
        store.seed("rate:u1:120", 100, Duration::ZERO);
        store.seed("rate:u1:60", 100, Duration::ZERO);

        assert!(store.admit(&request(1, 1.0)).await.unwrap());
        assert_eq!(store.count("rate:u1:120"), 1);
    }

    #[test]
    fn test_purge_expired() {
        let store = MemoryStore::new();
        store.seed("stale", 3, Duration::ZERO);
        store.seed("fresh", 3, Duration::from_secs(60));

        assert_eq!(store.len(), 1);
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.count("fresh"), 3);
        assert!(!store.is_empty());
    }

    #[tokio::test]
    async fn test_admit_sweeps_expired_counters() {
        let store = MemoryStore::new();
        for i in 0..50 {
            store.seed(&format!("rate:gone:{}", i), 1, Duration::ZERO);
        }

        let req = request(u64::MAX, 0.0);
        for _ in 0..PURGE_EVERY {
            store.admit(&req).await.unwrap();
        }

        assert_eq!(store.counters.lock().len(), 1);
        assert_eq!(store.purge_expired(), 0);
        assert_eq!(store.count("rate:u1:120"), PURGE_EVERY);
    }
}
