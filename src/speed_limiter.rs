//! Aggregate bandwidth cap shared by all episode transfers
//!
//! One token bucket is shared by every running transfer, so the configured limit is
//! a ceiling on the sum of their rates. Transfers draw from the bucket in the order
//! they ask; a transfer that overdraws the bucket sleeps until the debt is repaid,
//! which spreads the available rate across whoever is currently pulling bytes.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Longest single sleep, so limit changes are picked up promptly
const MAX_WAIT: Duration = Duration::from_millis(250);

#[derive(Debug)]
struct Bucket {
    /// Bytes per second (None = unlimited)
    rate: Option<u64>,
    /// Available bytes; negative while transfers are in debt
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        if let Some(rate) = self.rate {
            let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
            // One second of burst at most
            self.tokens = (self.tokens + elapsed * rate as f64).min(rate as f64);
        }
        self.last_refill = now;
    }
}

/// Shared token bucket
///
/// Cloning is cheap; clones share the same bucket.
#[derive(Clone, Debug)]
pub struct SpeedLimiter {
    bucket: Arc<Mutex<Bucket>>,
}

impl SpeedLimiter {
    /// Create a limiter with the given cap in bytes per second
    ///
    /// ```
    /// use podcast_dl::speed_limiter::SpeedLimiter;
    ///
    /// let limiter = SpeedLimiter::new(Some(500 * 1024));
    /// assert_eq!(limiter.limit(), Some(500 * 1024));
    ///
    /// let unlimited = SpeedLimiter::new(None);
    /// assert_eq!(unlimited.limit(), None);
    /// ```
    #[must_use]
    pub fn new(limit_bps: Option<u64>) -> Self {
        let rate = limit_bps.filter(|r| *r > 0);
        Self {
            bucket: Arc::new(Mutex::new(Bucket {
                rate,
                tokens: rate.unwrap_or(0) as f64,
                last_refill: Instant::now(),
            })),
        }
    }

    /// Change the cap; takes effect for the next chunk of every transfer
    pub fn set_limit(&self, limit_bps: Option<u64>) {
        let rate = limit_bps.filter(|r| *r > 0);
        let mut bucket = self.lock();
        bucket.refill(Instant::now());
        bucket.rate = rate;
        // Outstanding debt is forgiven on every change
        bucket.tokens = match rate {
            Some(r) => bucket.tokens.clamp(0.0, r as f64),
            None => 0.0,
        };
    }

    /// Current cap in bytes per second (None = unlimited)
    pub fn limit(&self) -> Option<u64> {
        self.lock().rate
    }

    /// Wait until `bytes` may be transferred
    ///
    /// Returns immediately when unlimited. Otherwise the bytes are debited at once
    /// and the caller sleeps until the bucket is back out of debt.
    pub async fn acquire(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }

        let mut wait = {
            let mut bucket = self.lock();
            let Some(rate) = bucket.rate else {
                return;
            };
            bucket.refill(Instant::now());
            bucket.tokens -= bytes as f64;
            debt_duration(bucket.tokens, rate)
        };

        while !wait.is_zero() {
            tokio::time::sleep(wait.min(MAX_WAIT)).await;
            let mut bucket = self.lock();
            let Some(rate) = bucket.rate else {
                return;
            };
            bucket.refill(Instant::now());
            wait = debt_duration(bucket.tokens, rate);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Bucket> {
        // A panic while holding this lock cannot leave the bucket inconsistent
        self.bucket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn debt_duration(tokens: f64, rate: u64) -> Duration {
    if tokens >= 0.0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(-tokens / rate as f64)
    }
}
