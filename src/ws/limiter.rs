//! Token-bucket rate limiter, one per connection.
//!
//! Tokens refill continuously at `rate` per second up to `burst`. `allow`
//! takes one token or reports the frame should be dropped. Limits can be
//! retuned at runtime (e.g. by a middleware for authenticated clients).

use std::sync::Mutex;

use tokio::time::Instant;

pub struct RateLimiter {
    inner: Mutex<Bucket>,
}

struct Bucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// A bucket holding `burst` tokens, refilled at `rate` tokens/second.
    /// Starts full.
    pub fn new(rate: f64, burst: u32) -> Self {
        RateLimiter {
            inner: Mutex::new(Bucket {
                rate,
                burst: burst as f64,
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available.
    pub fn allow(&self) -> bool {
        let mut bucket = self.inner.lock().expect("limiter lock");
        bucket.refill(Instant::now());
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Replace rate and burst; the bucket is clamped to the new burst.
    pub fn set_limit(&self, rate: f64, burst: u32) {
        let mut bucket = self.inner.lock().expect("limiter lock");
        bucket.refill(Instant::now());
        bucket.rate = rate;
        bucket.burst = burst as f64;
        bucket.tokens = bucket.tokens.min(bucket.burst);
    }

    /// Current (rate, burst).
    pub fn limit(&self) -> (f64, u32) {
        let bucket = self.inner.lock().expect("limiter lock");
        (bucket.rate, bucket.burst as u32)
    }
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
    }
}
