//! Per-client token bucket admission control.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::observability::metrics;

/// Source of time for the limiter.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Virtual clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Admission decision for one client.
pub trait Limiter: Send + Sync {
    /// Never blocks and never fails; consumes one token on success.
    fn allow(&self, client_id: &str) -> bool;
}

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_acquire(&mut self, now: Instant, capacity: f64, refill_rate: f64) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-client token buckets behind one lock.
///
/// Buckets are created full on first sight of a client and never evicted.
#[derive(Debug)]
pub struct RateLimiter<C: Clock = SystemClock> {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    burst: f64,
    rate: f64,
    clock: C,
}

impl RateLimiter {
    pub fn new(burst: u32, rate: u32) -> Self {
        Self::with_clock(burst, rate, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(burst: u32, rate: u32, clock: C) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            burst: burst as f64,
            rate: rate as f64,
            clock,
        }
    }

    /// Number of clients seen so far.
    pub fn client_count(&self) -> usize {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<C: Clock> Limiter for RateLimiter<C> {
    fn allow(&self, client_id: &str) -> bool {
        let now = self.clock.now();
        let allowed = {
            let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
            let bucket = buckets
                .entry(client_id.to_string())
                .or_insert_with(|| TokenBucket::full(self.burst, now));
            bucket.try_acquire(now, self.burst, self.rate)
        };

        if !allowed {
            tracing::debug!(client = %client_id, "Rate limit exceeded");
            metrics::record_rate_limited();
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn burst_then_one_per_second() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(10, 1, clock.clone());

        for i in 0..10 {
            assert!(limiter.allow("client1"), "call {} should pass", i);
        }
        assert!(!limiter.allow("client1"));

        clock.advance(Duration::from_secs(1));
        assert!(limiter.allow("client1"));
        assert!(!limiter.allow("client1"));

        // other clients have their own bucket
        assert!(limiter.allow("client2"));
        assert_eq!(limiter.client_count(), 2);
    }

    #[test]
    fn sustained_rate_after_burst() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(10, 5, clock.clone());

        for _ in 0..10 {
            assert!(limiter.allow("client"));
        }

        for i in 0..5 {
            clock.advance(Duration::from_millis(200));
            assert!(limiter.allow("client"), "spaced call {} should pass", i);
        }
        // same second, bucket empty
        assert!(!limiter.allow("client"));

        clock.advance(Duration::from_secs(1));
        assert!(limiter.allow("client"));
    }

    #[test]
    fn refill_caps_at_burst() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(3, 100, clock.clone());

        clock.advance(Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.allow("client"));
        }
        assert!(!limiter.allow("client"));
    }

    #[test]
    fn system_clock_limiter_admits_first_burst() {
        let limiter = RateLimiter::new(2, 1);
        assert!(limiter.allow("client"));
        assert!(limiter.allow("client"));
        assert!(!limiter.allow("client"));
    }
}
