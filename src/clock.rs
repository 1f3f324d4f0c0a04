//! Clock abstractions used by circuit breakers and other time-based policies.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Clock abstraction so timing can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_millis(&self) -> u64;
}

/// Monotonic clock backed by `Instant::now()`.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Wall-clock abstraction for timestamps that must survive a restart
/// (replay entry TTLs, transfer expiry, retry schedule). Unlike `Clock`,
/// which measures elapsed time since process start, `WallClock` returns
/// Unix epoch milliseconds so persisted records stay comparable across
/// restarts.
pub trait WallClock: Send + Sync + std::fmt::Debug {
    fn now_unix_millis(&self) -> u64;
}

/// Production wall clock backed by `SystemTime::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now_unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_millis() as u64
    }
}

/// Test wall clock that only advances when told to.
#[derive(Debug, Clone)]
pub struct ManualWallClock {
    now: std::sync::Arc<AtomicU64>,
}

impl ManualWallClock {
    pub fn new(start_unix_millis: u64) -> Self {
        Self { now: std::sync::Arc::new(AtomicU64::new(start_unix_millis)) }
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, unix_millis: u64) {
        self.now.store(unix_millis, Ordering::SeqCst);
    }
}

impl WallClock for ManualWallClock {
    fn now_unix_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
