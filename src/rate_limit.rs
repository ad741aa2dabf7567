//! Rate limiting for the reading marketplace core.
//!
//! Per-subject token buckets, keyed by `(subject, category)`, with capacity and refill
//! rate chosen so the bucket's steady-state throughput matches the documented window
//! (e.g. "3 / min" becomes a bucket that holds 3 tokens and refills at 3 tokens/min).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Categories of rate limits applied across the HTTP surface.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum RateLimitCategory {
    /// General API traffic: 100 requests / 15 minutes.
    General,
    /// Identity sync calls: 10 / hour.
    AuthSync,
    /// Payment mutations (add-funds, payout): 5 / minute.
    Payment,
    /// Chat messages: 60 / minute.
    Message,
    /// Session requests: 3 / minute.
    SessionRequest,
    /// Uploads: 50 / hour.
    Upload,
}

impl RateLimitCategory {
    /// `(capacity, window_seconds)` for this category, per the documented limits.
    fn window(self) -> (u32, f64) {
        match self {
            RateLimitCategory::General => (100, 15.0 * 60.0),
            RateLimitCategory::AuthSync => (10, 3600.0),
            RateLimitCategory::Payment => (5, 60.0),
            RateLimitCategory::Message => (60, 60.0),
            RateLimitCategory::SessionRequest => (3, 60.0),
            RateLimitCategory::Upload => (50, 3600.0),
        }
    }

    /// Wire tag returned alongside `RATE_LIMIT_EXCEEDED`.
    pub fn tag(self) -> &'static str {
        match self {
            RateLimitCategory::General => "general",
            RateLimitCategory::AuthSync => "auth_sync",
            RateLimitCategory::Payment => "payment",
            RateLimitCategory::Message => "message",
            RateLimitCategory::SessionRequest => "session_request",
            RateLimitCategory::Upload => "upload",
        }
    }
}

/// Token bucket for a single `(subject, category)` pair.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, window_seconds: f64) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_rate: capacity as f64 / window_seconds,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Per-subject, per-category rate limiter. Cheap to clone; the bucket map is shared
/// behind an `Arc<Mutex<_>>`.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<(String, RateLimitCategory), TokenBucket>>>,
}

impl RateLimiter {
    /// Creates an empty rate limiter; buckets are created lazily on first use per subject.
    pub fn new() -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Attempts to consume one token for `subject` in `category`. Returns `false` if the
    /// subject has exhausted their budget for this category.
    pub async fn check(&self, subject: &str, category: RateLimitCategory) -> bool {
        let mut buckets = self.buckets.lock().await;
        let (capacity, window) = category.window();
        let bucket = buckets
            .entry((subject.to_string(), category))
            .or_insert_with(|| TokenBucket::new(capacity, window));
        bucket.try_consume()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the rate-limit key preference: subject identifier when present, else network
/// address.
pub fn limiter_key<'a>(subject: Option<&'a str>, remote_addr: &'a str) -> &'a str {
    subject.unwrap_or(remote_addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn exhausts_after_capacity_requests() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("client-1", RateLimitCategory::SessionRequest).await);
        }
        assert!(!limiter.check("client-1", RateLimitCategory::SessionRequest).await);
    }

    #[tokio::test]
    async fn subjects_are_tracked_independently() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("client-1", RateLimitCategory::SessionRequest).await);
        }
        assert!(limiter.check("client-2", RateLimitCategory::SessionRequest).await);
    }

    #[tokio::test]
    async fn refills_over_time() {
        // Drives the bucket directly with a fast window rather than a real category's,
        // since waiting out a 60s payment window would make this test itself slow.
        let mut bucket = TokenBucket::new(1, 0.1);
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(bucket.try_consume());
    }

    #[test]
    fn key_prefers_subject_over_remote_addr() {
        assert_eq!(limiter_key(Some("user-1"), "1.2.3.4"), "user-1");
        assert_eq!(limiter_key(None, "1.2.3.4"), "1.2.3.4");
    }
}
