//! Sliding-window rate limiting with escalating temporary blocks.
//!
//! Every client key owns a list of accepted-request timestamps, a violation
//! counter and an optional block expiry. A quota breach bumps the violation
//! counter; once it reaches the block threshold the key is blocked outright
//! and the counter starts over.
//!
//! State lives in a `DashMap`, so each operation runs under the shard lock of
//! its key and calls for the same key are serialized.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;

use crate::clock::SharedClock;
use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Escalation rule applied on repeated quota breaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPolicy {
    /// Violations that trigger a block.
    pub violation_threshold: u32,
    /// How long a block lasts.
    pub duration: Duration,
}

impl Default for BlockPolicy {
    fn default() -> Self {
        Self {
            violation_threshold: 5,
            duration: Duration::from_secs(600),
        }
    }
}

impl BlockPolicy {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            violation_threshold: config.block_threshold,
            duration: Duration::from_secs(config.block_duration_secs),
        }
    }
}

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCheck {
    pub allowed: bool,
    pub remaining: u32,
}

impl QuotaCheck {
    const DENIED: Self = Self {
        allowed: false,
        remaining: 0,
    };
}

#[derive(Debug, Default)]
struct ClientState {
    /// Accepted request times in ms, in insertion order.
    requests: VecDeque<u64>,
    violations: u32,
    blocked_until: Option<u64>,
}

impl ClientState {
    /// Returns the block expiry if still in force, dropping it otherwise.
    fn live_block(&mut self, now: u64) -> Option<u64> {
        match self.blocked_until {
            Some(until) if now < until => Some(until),
            Some(_) => {
                self.blocked_until = None;
                None
            }
            None => None,
        }
    }

    fn prune(&mut self, now: u64, window_ms: u64) {
        self.requests.retain(|&ts| now.saturating_sub(ts) < window_ms);
    }
}

/// Per-client sliding-window limiter.
pub struct RateLimiter {
    clients: DashMap<String, ClientState>,
    // Keys are never evicted, so this only grows.
    tracked: AtomicUsize,
    policy: BlockPolicy,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(policy: BlockPolicy, clock: SharedClock) -> Self {
        Self {
            clients: DashMap::new(),
            tracked: AtomicUsize::new(0),
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> BlockPolicy {
        self.policy
    }

    /// True iff `key` currently has an unexpired block.
    pub fn is_blocked(&self, key: &str) -> bool {
        let now = self.clock.now_millis();
        match self.clients.get_mut(key) {
            Some(mut state) => state.live_block(now).is_some(),
            None => false,
        }
    }

    /// Charge one request against `key`'s quota.
    pub fn check_quota(&self, key: &str, max_requests: u32, window: Duration) -> QuotaCheck {
        let now = self.clock.now_millis();
        let window_ms = window.as_millis() as u64;

        let mut state = self.state(key);

        if state.live_block(now).is_some() {
            return QuotaCheck::DENIED;
        }

        state.prune(now, window_ms);
        let count = u32::try_from(state.requests.len()).unwrap_or(u32::MAX);

        if count >= max_requests {
            state.violations += 1;
            tracing::debug!(
                client = %key,
                violations = state.violations,
                "Quota exceeded"
            );

            if state.violations >= self.policy.violation_threshold {
                state.blocked_until = Some(self.block_expiry(now, self.policy.duration));
                state.violations = 0;
                tracing::warn!(
                    client = %key,
                    duration_secs = self.policy.duration.as_secs(),
                    "Client blocked after repeated rate limit violations"
                );
                metrics::record_block();
            }

            return QuotaCheck::DENIED;
        }

        state.requests.push_back(now);
        QuotaCheck {
            allowed: true,
            remaining: max_requests - count - 1,
        }
    }

    /// Whole seconds until `key` may try again.
    ///
    /// Blocked keys wait for the block to lapse; otherwise the answer is the
    /// time until the oldest in-window request ages out. Keys without history
    /// get 0.
    pub fn retry_after(&self, key: &str, window: Duration) -> u64 {
        let now = self.clock.now_millis();
        let window_ms = window.as_millis() as u64;

        let Some(mut state) = self.clients.get_mut(key) else {
            return 0;
        };

        if let Some(until) = state.live_block(now) {
            return ceil_secs(until - now);
        }

        match state.requests.iter().min() {
            Some(&oldest) => ceil_secs(oldest.saturating_add(window_ms).saturating_sub(now)),
            None => 0,
        }
    }

    /// Block `key` for `duration`, clearing its violation count.
    pub fn block(&self, key: &str, duration: Duration) {
        let now = self.clock.now_millis();
        let mut state = self.state(key);
        state.blocked_until = Some(self.block_expiry(now, duration));
        state.violations = 0;
        tracing::warn!(client = %key, duration_secs = duration.as_secs(), "Client blocked");
        metrics::record_block();
    }

    /// Current violation count for `key`.
    pub fn violations(&self, key: &str) -> u32 {
        self.clients.get(key).map(|s| s.violations).unwrap_or(0)
    }

    /// Number of client keys holding limiter state.
    pub fn tracked_keys(&self) -> usize {
        self.tracked.load(Ordering::Relaxed)
    }

    // Entry for `key`, created on first sight. The gauge moves only then.
    fn state(&self, key: &str) -> RefMut<'_, String, ClientState> {
        match self.clients.entry(key.to_string()) {
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(entry) => {
                let count = self.tracked.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::record_tracked_clients(count);
                entry.insert(ClientState::default())
            }
        }
    }

    // Expiry is kept strictly after `now` even for a zero duration.
    fn block_expiry(&self, now: u64, duration: Duration) -> u64 {
        now.saturating_add((duration.as_millis() as u64).max(1))
    }
}

fn ceil_secs(millis: u64) -> u64 {
    millis.div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::{Arc, Barrier};

    const WINDOW: Duration = Duration::from_secs(60);
    const START: Duration = Duration::from_secs(1_700_000_000);

    fn limiter() -> (RateLimiter, Arc<ManualClock>) {
        let clock = ManualClock::shared(START);
        (RateLimiter::new(BlockPolicy::default(), clock.clone()), clock)
    }

    #[test]
    fn test_first_request_is_allowed() {
        let (limiter, _) = limiter();
        let check = limiter.check_quota("10.0.0.1", 20, WINDOW);
        assert!(check.allowed);
        assert_eq!(check.remaining, 19);
    }

    #[test]
    fn test_admits_exactly_max_requests() {
        for max in [1u32, 2, 5, 20] {
            let (limiter, _) = limiter();
            let admitted = (0..=max)
                .map(|_| limiter.check_quota("10.0.0.2", max, WINDOW))
                .filter(|c| c.allowed)
                .count();
            assert_eq!(admitted as u32, max, "max = {}", max);
        }
    }

    #[test]
    fn test_remaining_counts_down() {
        let (limiter, _) = limiter();
        let remaining: Vec<u32> = (0..3)
            .map(|_| limiter.check_quota("k", 3, WINDOW).remaining)
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let denied = limiter.check_quota("k", 3, WINDOW);
        assert_eq!(denied, QuotaCheck { allowed: false, remaining: 0 });
        assert_eq!(limiter.violations("k"), 1);
    }

    #[test]
    fn test_window_slides() {
        let (limiter, clock) = limiter();
        assert!(limiter.check_quota("k", 1, WINDOW).allowed);

        clock.advance(Duration::from_millis(59_999));
        assert!(!limiter.check_quota("k", 1, WINDOW).allowed);

        // A record expires once its age reaches the window.
        clock.advance(Duration::from_millis(1));
        assert!(limiter.check_quota("k", 1, WINDOW).allowed);
    }

    #[test]
    fn test_block_after_five_violations() {
        let (limiter, clock) = limiter();
        assert!(limiter.check_quota("k", 1, WINDOW).allowed);

        for expected in 1..=4 {
            assert!(!limiter.check_quota("k", 1, WINDOW).allowed);
            assert_eq!(limiter.violations("k"), expected);
            assert!(!limiter.is_blocked("k"));
        }

        assert!(!limiter.check_quota("k", 1, WINDOW).allowed);
        assert!(limiter.is_blocked("k"));
        assert_eq!(limiter.violations("k"), 0);

        // The window alone would have reset by now.
        clock.advance(Duration::from_secs(120));
        assert!(limiter.is_blocked("k"));
        assert!(!limiter.check_quota("k", 1, WINDOW).allowed);
        // Blocked keys are not charged.
        assert_eq!(limiter.violations("k"), 0);
    }

    #[test]
    fn test_block_expires_exactly() {
        let (limiter, clock) = limiter();
        limiter.block("k", Duration::from_secs(600));

        clock.advance(Duration::from_millis(599_999));
        assert!(limiter.is_blocked("k"));

        clock.advance(Duration::from_millis(1));
        assert!(!limiter.is_blocked("k"));
        assert!(limiter.check_quota("k", 1, WINDOW).allowed);
    }

    #[test]
    fn test_retry_after_while_blocked() {
        let (limiter, clock) = limiter();
        limiter.block("k", Duration::from_secs(600));
        assert_eq!(limiter.retry_after("k", WINDOW), 600);

        clock.advance(Duration::from_secs(100));
        assert_eq!(limiter.retry_after("k", WINDOW), 500);

        clock.advance(Duration::from_secs(500));
        assert_eq!(limiter.retry_after("k", WINDOW), 0);
    }

    #[test]
    fn test_retry_after_from_oldest_record() {
        let (limiter, clock) = limiter();
        assert!(limiter.check_quota("k", 2, WINDOW).allowed);
        clock.advance(Duration::from_secs(10));
        assert!(limiter.check_quota("k", 2, WINDOW).allowed);
        clock.advance(Duration::from_secs(10));

        assert!(!limiter.check_quota("k", 2, WINDOW).allowed);
        assert_eq!(limiter.retry_after("k", WINDOW), 40);
    }

    #[test]
    fn test_retry_after_without_history() {
        let (limiter, _) = limiter();
        assert_eq!(limiter.retry_after("nobody", WINDOW), 0);
        assert!(!limiter.is_blocked("nobody"));
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _) = limiter();
        assert!(limiter.check_quota("a", 1, WINDOW).allowed);
        assert!(!limiter.check_quota("a", 1, WINDOW).allowed);
        assert!(limiter.check_quota("b", 1, WINDOW).allowed);
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_tracked_keys_count_new_keys_only() {
        let (limiter, _) = limiter();
        for _ in 0..5 {
            limiter.check_quota("a", 2, WINDOW);
        }
        limiter.block("a", Duration::from_secs(1));
        assert_eq!(limiter.tracked_keys(), 1);

        limiter.block("b", Duration::from_secs(1));
        limiter.is_blocked("c");
        limiter.retry_after("d", WINDOW);
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_parallel_checks_admit_one() {
        const THREADS: usize = 32;
        let (limiter, _) = limiter();
        let limiter = Arc::new(limiter);
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let limiter = limiter.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    limiter.check_quota("fresh", 1, WINDOW).allowed
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(admitted, 1);
    }
}
