//! Per-platform rate limiting.
//!
//! External platforms rate-limit by app, not by account, so the budget is
//! shared across every concurrent sync run against the same platform. Token
//! buckets refill on a fixed interval; acquisition spins on a CAS over the
//! token count.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use castio_core::types::PlatformKind;
use tokio::sync::Mutex;

/// Token bucket limiter.
pub struct TokenBucket {
    capacity: u64,
    tokens: AtomicU64,
    refill_amount: u64,
    refill_interval: Duration,
    last_refill: Mutex<Instant>,
}

impl TokenBucket {
    /// Create a bucket with explicit capacity and refill behavior.
    #[must_use]
    pub fn new(capacity: u64, refill_amount: u64, refill_interval: Duration) -> Self {
        Self {
            capacity,
            tokens: AtomicU64::new(capacity),
            refill_amount,
            refill_interval,
            last_refill: Mutex::new(Instant::now()),
        }
    }

    /// Create a bucket allowing N calls per minute, refilled once a second.
    #[must_use]
    pub fn per_minute(calls_per_minute: u64) -> Self {
        let refill_amount = calls_per_minute.div_ceil(60);
        Self::new(calls_per_minute, refill_amount, Duration::from_secs(1))
    }

    /// Take one token if available.
    pub async fn try_acquire(&self) -> bool {
        self.refill().await;
        loop {
            let current = self.tokens.load(Ordering::Relaxed);
            if current == 0 {
                return false;
            }
            if self
                .tokens
                .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Take one token, sleeping until one becomes available.
    pub async fn acquire(&self) {
        while !self.try_acquire().await {
            tokio::time::sleep(self.refill_interval / 10).await;
        }
    }

    /// Tokens currently available.
    #[must_use]
    pub fn available(&self) -> u64 {
        self.tokens.load(Ordering::Relaxed)
    }

    async fn refill(&self) {
        let mut last_refill = self.last_refill.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(*last_refill);
        if elapsed < self.refill_interval {
            return;
        }

        let intervals = elapsed.as_secs_f64() / self.refill_interval.as_secs_f64();
        let new_tokens = (intervals as u64) * self.refill_amount;
        if new_tokens == 0 {
            return;
        }
        loop {
            let current = self.tokens.load(Ordering::Relaxed);
            let refilled = (current + new_tokens).min(self.capacity);
            if self
                .tokens
                .compare_exchange(current, refilled, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
        *last_refill = now;
    }
}

/// One token bucket per external platform.
pub struct PlatformRateLimiter {
    buckets: HashMap<PlatformKind, TokenBucket>,
}

impl PlatformRateLimiter {
    /// Create a limiter giving every platform the same per-minute budget.
    #[must_use]
    pub fn new(calls_per_minute: u64) -> Self {
        let buckets = PlatformKind::ALL
            .iter()
            .map(|p| (*p, TokenBucket::per_minute(calls_per_minute)))
            .collect();
        Self { buckets }
    }

    /// Acquire a call slot for a platform, waiting when throttled.
    pub async fn acquire(&self, platform: PlatformKind) {
        if let Some(bucket) = self.buckets.get(&platform) {
            bucket.acquire().await;
        }
    }

    /// Tokens currently available for a platform.
    #[must_use]
    pub fn available(&self, platform: PlatformKind) -> u64 {
        self.buckets.get(&platform).map_or(0, TokenBucket::available)
    }
}
