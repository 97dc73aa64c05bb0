//! Time source shared by the limiter, the signature validator and the guard.
//!
//! Everything is measured as wall-clock time since the UNIX epoch because the
//! same readings feed `X-RateLimit-Reset` and the signed-timestamp freshness
//! check. Tests substitute [`ManualClock`] to step time deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of "now".
pub trait Clock: Send + Sync + 'static {
    /// Time elapsed since the UNIX epoch.
    fn now(&self) -> Duration;

    fn now_millis(&self) -> u64 {
        self.now().as_millis() as u64
    }

    fn now_secs(&self) -> u64 {
        self.now().as_secs()
    }
}

/// Clock handle shared across subsystems.
pub type SharedClock = Arc<dyn Clock>;

/// The operating system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        Self {
            millis: AtomicU64::new(start.as_millis() as u64),
        }
    }

    /// Convenience constructor returning the clock already wrapped in an `Arc`.
    pub fn shared(start: Duration) -> Arc<Self> {
        Arc::new(Self::new(start))
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, to: Duration) {
        self.millis.store(to.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}
