//! Token-bucket rate limiting for the HTTP surface.
//!
//! Every externally-reachable API in this workspace sits behind a
//! limiter of this shape, keyed by caller rather than by session.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-key token bucket. Keys are API keys when auth is enabled, or a
/// fixed key for anonymous callers.
pub struct RateLimiter {
    max_tokens: f64,
    refill_rate: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// `max_tokens` bounds burst size; `refill_rate` is tokens added per
    /// second.
    pub fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            max_tokens,
            refill_rate,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Try to consume one token for `key`. Returns `false` if the caller
    /// is over budget.
    pub async fn check(&self, key: &str) -> bool {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.max_tokens,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.max_tokens);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets idle for longer than `max_idle`, bounding memory for
    /// a long-running gateway process.
    pub async fn cleanup(&self, max_idle: Duration) {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        buckets.retain(|_, b| now.duration_since(b.last_refill) < max_idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_burst_up_to_max_tokens() {
        let limiter = RateLimiter::new(3.0, 1.0);
        for _ in 0..3 {
            assert!(limiter.check("client-a").await);
        }
        assert!(!limiter.check("client-a").await);
    }

    #[tokio::test]
    async fn buckets_are_independent_per_key() {
        let limiter = RateLimiter::new(1.0, 0.1);
        assert!(limiter.check("a").await);
        assert!(limiter.check("b").await);
        assert!(!limiter.check("a").await);
    }
}
