//! Per-domain rate limiting
//!
//! Token-bucket pacing (capacity 2, refill 1.5 tokens/s) plus cooldown
//! windows set when a domain answers 429/403. Both maps are process-wide,
//! domain-keyed, and concurrency-safe; the service is injected rather than
//! global so tests can construct and reset their own. State is in-memory
//! and best-effort across restarts.

use crate::fetch::jitter;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Token bucket capacity per domain
pub const BUCKET_CAPACITY: f64 = 2.0;

/// Tokens refilled per second
pub const REFILL_RATE: f64 = 1.5;

/// Default cooldown after a 429/403
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3600);

/// Per-domain token bucket.
///
/// An empty bucket hands out future token slots: the accruing token is
/// debited immediately and the bucket clock advances, so the waits
/// returned to N consecutive callers sum to `(N - capacity) / refill_rate`.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    /// Bucket clock; sits in the future while pre-consumed slots drain
    refilled_at: Instant,
}

impl TokenBucket {
    fn new(now: Instant) -> Self {
        Self {
            tokens: BUCKET_CAPACITY,
            refilled_at: now,
        }
    }

    /// Takes one token (or reserves the next slot) and returns how long
    /// the caller must wait before fetching.
    fn take(&mut self, now: Instant) -> Duration {
        if now > self.refilled_at {
            let elapsed = now.duration_since(self.refilled_at).as_secs_f64();
            self.tokens = (self.tokens + elapsed * REFILL_RATE).min(BUCKET_CAPACITY);
            self.refilled_at = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Duration::ZERO;
        }

        let deficit = 1.0 - self.tokens;
        let wait = Duration::from_secs_f64(deficit / REFILL_RATE);
        self.tokens = 0.0;
        self.refilled_at += wait;
        wait
    }
}

/// Process-wide rate limiter service
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    cooldowns: Mutex<HashMap<String, Instant>>,
    default_cooldown: Duration,
}

impl RateLimiter {
    pub fn new(default_cooldown: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            cooldowns: Mutex::new(HashMap::new()),
            default_cooldown,
        }
    }

    /// How long the caller must wait before fetching from `domain`.
    ///
    /// An active cooldown overrides the bucket and returns the remaining
    /// cooldown. Otherwise a token is consumed: available tokens cost only
    /// jitter (0-300ms); an empty bucket costs `deficit / refill_rate`
    /// plus jitter.
    pub fn delay_for(&self, domain: &str) -> Duration {
        let now = Instant::now();

        if let Some(remaining) = self.cooldown_remaining_at(domain, now) {
            return remaining;
        }

        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = buckets
            .entry(domain.to_string())
            .or_insert_with(|| TokenBucket::new(now));

        bucket.take(now) + jitter()
    }

    /// Puts `domain` on cooldown for the default window
    pub fn set_cooldown(&self, domain: &str) {
        self.set_cooldown_for(domain, self.default_cooldown);
    }

    /// Puts `domain` on cooldown for `duration`
    pub fn set_cooldown_for(&self, domain: &str, duration: Duration) {
        let until = Instant::now() + duration;
        let mut cooldowns = self.cooldowns.lock().unwrap_or_else(|e| e.into_inner());
        cooldowns.insert(domain.to_string(), until);
    }

    /// Remaining cooldown for `domain`, if one is active
    pub fn cooldown_remaining(&self, domain: &str) -> Option<Duration> {
        self.cooldown_remaining_at(domain, Instant::now())
    }

    /// Drops all buckets and cooldowns
    pub fn clear(&self) {
        self.buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.cooldowns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn cooldown_remaining_at(&self, domain: &str, now: Instant) -> Option<Duration> {
        let mut cooldowns = self.cooldowns.lock().unwrap_or_else(|e| e.into_inner());
        match cooldowns.get(domain) {
            Some(until) if *until > now => Some(*until - now),
            Some(_) => {
                cooldowns.remove(domain);
                None
            }
            None => None,
        }
    }
}
