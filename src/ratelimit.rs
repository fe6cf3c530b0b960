//! Token-bucket rate limiter for outbound IRC messages.
//!
//! Tokens accrue lazily at `fill_rate` per second up to `capacity`; each
//! outbound line consumes one. When the bucket is empty, [`TokenBucket::acquire`]
//! returns how long the caller must wait before sending. Only the writer
//! task consults this, so a plain mutex is enough.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default burst capacity (`irc_burst_size`).
pub const DEFAULT_BURST: u32 = 4;
/// Default fill rate in tokens per second (`irc_fill_rate`).
pub const DEFAULT_FILL_RATE: f64 = 1.0;

#[derive(Debug)]
struct Inner {
    capacity: f64,
    fill_rate: f64,
    tokens: f64,
    last_update: Instant,
}

impl Inner {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.fill_rate).min(self.capacity);
        self.last_update = now;
    }
}

/// Lazy-fill token bucket.
#[derive(Debug)]
pub struct TokenBucket {
    inner: Mutex<Inner>,
}

impl TokenBucket {
    /// Create a bucket starting full.
    pub fn new(capacity: u32, fill_rate: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        TokenBucket {
            inner: Mutex::new(Inner {
                capacity,
                fill_rate: fill_rate.max(f64::MIN_POSITIVE),
                tokens: capacity,
                last_update: Instant::now(),
            }),
        }
    }

    /// Take a token, or report how long to wait for the next one.
    ///
    /// Returns [`Duration::ZERO`] when a token was consumed; otherwise the
    /// wait is `(1 - tokens) / fill_rate` and no token is consumed.
    pub fn acquire(&self, now: Instant) -> Duration {
        let mut inner = self.inner.lock().unwrap();
        inner.refill(now);
        if inner.tokens >= 1.0 {
            inner.tokens -= 1.0;
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - inner.tokens) / inner.fill_rate)
        }
    }

    /// Replace capacity and fill rate, keeping the current balance clamped.
    pub fn reconfigure(&self, capacity: u32, fill_rate: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.capacity = f64::from(capacity.max(1));
        inner.fill_rate = fill_rate.max(f64::MIN_POSITIVE);
        inner.tokens = inner.tokens.min(inner.capacity);
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        TokenBucket::new(DEFAULT_BURST, DEFAULT_FILL_RATE)
    }
}
