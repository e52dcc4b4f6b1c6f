//! Token-bucket rate limiter with a global bucket and lazily created
//! per-resource buckets.
//!
//! Buckets refill continuously: `tokens = min(capacity, tokens + elapsed *
//! refill_rate)`. [`RateLimiter::acquire`] suspends the caller until a token
//! is available rather than returning a rejection, so call sites stay a
//! single `await`.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Configuration for the global bucket and the per-resource bucket template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterConfig {
    /// Maximum burst across all resources.
    pub global_capacity: f64,
    /// Global sustained rate, tokens per second.
    pub global_refill_rate: f64,
    /// Maximum burst against a single resource key.
    pub resource_capacity: f64,
    /// Per-resource sustained rate, tokens per second.
    pub resource_refill_rate: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            global_capacity: 10.0,
            global_refill_rate: 5.0,
            resource_capacity: 2.0,
            resource_refill_rate: 0.5,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Deduct one token, or return how long until one is available.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(deficit / self.refill_rate))
        }
    }
}

/// Token-bucket limiter throttling outbound operations globally and per
/// resource key.
///
/// Resource buckets are created lazily on first use and never evicted for
/// the lifetime of the limiter; at the target scale (thousands of
/// hostnames) the map stays small, but the key space must be bounded by the
/// caller.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    global: Mutex<Bucket>,
    resources: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// Create a limiter with full buckets.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            global: Mutex::new(Bucket::new(config.global_capacity, config.global_refill_rate)),
            resources: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire one token, suspending until it is available.
    ///
    /// With a `resource_key`, the resource bucket is acquired first, then
    /// the global bucket. The two acquires are not atomic together: a
    /// resource token already spent is not refunded while waiting on the
    /// global bucket. The resource bucket keeps refilling during that wait,
    /// so the cost self-heals within one refill interval.
    pub async fn acquire(&self, resource_key: Option<&str>) {
        if let Some(key) = resource_key {
            self.acquire_resource(key).await;
        }
        self.acquire_global().await;
    }

    async fn acquire_global(&self) {
        loop {
            let wait = {
                let mut bucket = self.global.lock().await;
                match bucket.try_take(Instant::now()) {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            sleep(wait).await;
        }
    }

    async fn acquire_resource(&self, key: &str) {
        loop {
            let wait = {
                let mut resources = self.resources.lock().await;
                let bucket = resources.entry(key.to_string()).or_insert_with(|| {
                    Bucket::new(self.config.resource_capacity, self.config.resource_refill_rate)
                });
                match bucket.try_take(Instant::now()) {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            // Sleep outside the map lock so other resource keys proceed.
            sleep(wait).await;
        }
    }

    /// Number of resource buckets created so far.
    pub async fn resource_bucket_count(&self) -> usize {
        self.resources.lock().await.len()
    }

    /// Remaining global tokens (test/diagnostic hook).
    pub async fn global_tokens(&self) -> f64 {
        let mut bucket = self.global.lock().await;
        bucket.refill(Instant::now());
        bucket.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(
        global_capacity: f64,
        global_refill_rate: f64,
        resource_capacity: f64,
        resource_refill_rate: f64,
    ) -> RateLimiterConfig {
        RateLimiterConfig {
            global_capacity,
            global_refill_rate,
            resource_capacity,
            resource_refill_rate,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_up_to_capacity_is_immediate() {
        let limiter = RateLimiter::new(config(3.0, 1.0, 10.0, 10.0));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire(None).await;
        }
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_beyond_capacity_waits_one_refill_interval() {
        // capacity 2, rate 0.5/s: the 3rd acquire must wait >= 2s.
        let limiter = RateLimiter::new(config(2.0, 0.5, 10.0, 10.0));
        limiter.acquire(None).await;
        limiter.acquire(None).await;

        let start = Instant::now();
        limiter.acquire(None).await;
        let waited = Instant::now().duration_since(start);
        assert!(waited >= Duration::from_secs_f64(1.9), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_never_exceed_capacity() {
        let limiter = RateLimiter::new(config(2.0, 100.0, 10.0, 10.0));
        // Long idle: refill must clamp at capacity.
        sleep(Duration::from_secs(60)).await;
        assert!(limiter.global_tokens().await <= 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn resource_buckets_are_independent() {
        // Resource bucket capacity 1: second hit on the same host waits,
        // but a different host does not.
        let limiter = RateLimiter::new(config(100.0, 100.0, 1.0, 1.0));
        limiter.acquire(Some("a.example.org")).await;

        let start = Instant::now();
        limiter.acquire(Some("b.example.org")).await;
        assert_eq!(Instant::now(), start);

        limiter.acquire(Some("a.example.org")).await;
        assert!(Instant::now().duration_since(start) >= Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn resource_buckets_created_lazily() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        assert_eq!(limiter.resource_bucket_count().await, 0);
        limiter.acquire(Some("a.example.org")).await;
        limiter.acquire(Some("b.example.org")).await;
        limiter.acquire(Some("a.example.org")).await;
        assert_eq!(limiter.resource_bucket_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn keyed_acquire_consumes_both_buckets() {
        let limiter = RateLimiter::new(config(2.0, 1.0, 10.0, 10.0));
        limiter.acquire(Some("a.example.org")).await;
        limiter.acquire(Some("b.example.org")).await;
        // Global bucket is now empty even though each resource bucket has
        // plenty left.
        let start = Instant::now();
        limiter.acquire(Some("c.example.org")).await;
        assert!(Instant::now().duration_since(start) >= Duration::from_millis(900));
    }
}
