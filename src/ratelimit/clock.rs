//! Time sources for window computation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Supplies the current wall-clock time as a duration since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        // Clocks set before 1970 are treated as the epoch itself.
        let micros = chrono::Utc::now().timestamp_micros().max(0) as u64;
        Duration::from_micros(micros)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        Self {
            micros: AtomicU64::new(start.as_micros() as u64),
        }
    }

    pub fn set(&self, now: Duration) {
        self.micros.store(now.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.micros.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}
