//! Per-key token bucket rate limiting

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Token bucket limiter keyed by caller (IPC client, user, ...)
#[derive(Debug)]
pub struct RateLimiter<K> {
    capacity: u32,
    refill_interval: Duration,
    buckets: HashMap<K, Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

impl<K: Hash + Eq + Clone> RateLimiter<K> {
    /// Allow `max_requests` per `interval` for each key
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            capacity: max_requests,
            refill_interval: interval,
            buckets: HashMap::new(),
        }
    }

    /// Returns `true` if the request is allowed, `false` if rate limited
    pub fn check(&mut self, key: &K) -> bool {
        self.check_at(key, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit "now"
    pub fn check_at(&mut self, key: &K, now: Instant) -> bool {
        let capacity = self.capacity;
        let bucket = self.buckets.entry(key.clone()).or_insert(Bucket {
            tokens: capacity,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        if elapsed >= self.refill_interval && !self.refill_interval.is_zero() {
            let intervals = (elapsed.as_millis() / self.refill_interval.as_millis().max(1)) as u32;
            bucket.tokens = bucket
                .tokens
                .saturating_add(intervals.saturating_mul(capacity))
                .min(capacity);
            bucket.last_refill = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Forget a key (e.g. on client disconnect)
    pub fn remove(&mut self, key: &K) {
        self.buckets.remove(key);
    }

    /// Drop buckets untouched for longer than `stale_after`
    pub fn cleanup(&mut self, stale_after: Duration) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < stale_after);
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientId;

    #[test]
    fn allows_up_to_capacity_then_limits() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(1));
        let client = ClientId::new();
        let t0 = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at(&client, t0));
        }
        assert!(!limiter.check_at(&client, t0));

        // Bucket refills after one interval
        assert!(limiter.check_at(&client, t0 + Duration::from_secs(1)));
    }

    #[test]
    fn keys_have_independent_buckets() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(60));

        assert!(limiter.check(&"alice"));
        assert!(!limiter.check(&"alice"));
        assert!(limiter.check(&"bob"));

        limiter.remove(&"alice");
        assert!(limiter.check(&"alice"));
        assert_eq!(limiter.tracked_keys(), 2);
    }
}
