//! Per-key token-bucket rate limiting with asynchronous acquisition
//!
//! Each key (a crawl domain, a tenant, an upstream account) gets its own
//! token bucket, created lazily at full capacity on first use. Tokens
//! accrue continuously at `refill_rate` per second up to `capacity`, so
//! capacity caps burst size while the refill rate caps sustained
//! throughput. A background task evicts buckets that have been idle for
//! longer than twice the cleanup interval, bounding memory growth under
//! unbounded key cardinality.
//!
//! Buckets live in a [`DashMap`]; the shard write lock taken by the entry
//! API serializes the refill-then-deduct sequence per key, and operations
//! on different keys do not contend. No lock is held across a suspension
//! point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ConfigError;

use super::{Clock, SystemClock};

/// Configuration for the keyed rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of tokens a bucket can hold
    pub capacity: u32,
    /// Tokens added per second
    pub refill_rate: f64,
    /// How often the eviction task wakes; buckets idle for longer than
    /// twice this interval are removed
    pub cleanup_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { capacity: 10, refill_rate: 1.0, cleanup_interval: Duration::from_secs(300) }
    }
}

impl RateLimiterConfig {
    /// Create a new configuration builder
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::NotPositive { field: "capacity" });
        }
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err(ConfigError::NotPositive { field: "refill_rate" });
        }
        if self.cleanup_interval.is_zero() {
            return Err(ConfigError::NotPositive { field: "cleanup_interval" });
        }
        Ok(())
    }
}

/// Builder for RateLimiterConfig
#[derive(Debug)]
pub struct RateLimiterConfigBuilder {
    config: RateLimiterConfig,
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterConfigBuilder {
    pub fn new() -> Self {
        Self { config: RateLimiterConfig::default() }
    }

    pub fn capacity(mut self, capacity: u32) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn refill_rate(mut self, rate: f64) -> Self {
        self.config.refill_rate = rate;
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.config.cleanup_interval = interval;
        self
    }

    pub fn build(self) -> Result<RateLimiterConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Token bucket state for a single key.
///
/// `tokens` is only read or mutated after a refill pass for the elapsed
/// time since `last_refill`, so every observer sees a current count.
#[derive(Debug)]
struct Bucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self { capacity, refill_rate, tokens: capacity, last_refill: now }
    }

    /// Accrue tokens for the elapsed time, capped at capacity.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Time until `tokens` would be available, assuming no other consumers.
    fn wait_for(&self, tokens: f64) -> Duration {
        if self.tokens >= tokens {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((tokens - self.tokens) / self.refill_rate)
    }
}

/// Per-key token-bucket rate limiter
///
/// Admits or delays units of work per key so that long-run throughput does
/// not exceed `refill_rate` tokens per second and burst size does not
/// exceed `capacity`. Buckets are created lazily at full capacity and
/// evicted by a background task once idle.
///
/// # Examples
///
/// ```
/// use quarry_common::resilience::{RateLimiter, RateLimiterConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let limiter = RateLimiter::new(RateLimiterConfig::default())
///         .expect("default config is valid");
///
///     if limiter.acquire("crawl.example.com", 1, None).await {
///         // issue the request
///     }
/// }
/// ```
pub struct RateLimiter<C: Clock = SystemClock> {
    config: RateLimiterConfig,
    buckets: Arc<DashMap<String, Bucket>>,
    clock: C,
    shutdown: Arc<AtomicBool>,
    janitor: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter<SystemClock> {
    /// Create a new rate limiter with the system clock.
    ///
    /// The background eviction task is started immediately when called
    /// inside a Tokio runtime; outside one, eviction is skipped with a
    /// warning and buckets are never reclaimed.
    pub fn new(config: RateLimiterConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock + Clone> RateLimiter<C> {
    /// Create a new rate limiter with a custom clock
    pub fn with_clock(config: RateLimiterConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;

        let limiter = Self {
            config,
            buckets: Arc::new(DashMap::new()),
            clock,
            shutdown: Arc::new(AtomicBool::new(false)),
            janitor: Mutex::new(None),
        };
        limiter.start_eviction_task();
        Ok(limiter)
    }

    /// Start the background eviction task
    fn start_eviction_task(&self) {
        let buckets = Arc::clone(&self.buckets);
        let shutdown = Arc::clone(&self.shutdown);
        let clock = self.clock.clone();
        let interval = self.config.cleanup_interval;

        match Handle::try_current() {
            Ok(runtime) => {
                let handle = runtime.spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    ticker.tick().await;

                    loop {
                        ticker.tick().await;

                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }

                        let cutoff = interval.saturating_mul(2);
                        let now = clock.now();
                        let before = buckets.len();
                        buckets.retain(|_, bucket| {
                            now.saturating_duration_since(bucket.last_refill) <= cutoff
                        });

                        let removed = before.saturating_sub(buckets.len());
                        if removed > 0 {
                            debug!("Evicted {} idle rate limit buckets ({} live)", removed, buckets.len());
                        }
                    }
                });

                if let Ok(mut guard) = self.janitor.lock() {
                    *guard = Some(handle);
                }
            }
            Err(_) => {
                warn!("Skipping bucket eviction task start: no active Tokio runtime detected");
            }
        }
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Acquire tokens from the key's bucket, waiting at most `timeout`.
    ///
    /// Returns `true` if the tokens were deducted. When the bucket is
    /// short, the minimum wait until the tokens would accrue is computed;
    /// if `timeout` is set and the wait exceeds it, `false` is returned
    /// without sleeping. Otherwise the caller suspends for the computed
    /// wait and consumption is attempted exactly once more. That second
    /// attempt can still fail if a concurrent caller drained the bucket in
    /// the interim; the single-retry shape bounds worst-case latency
    /// rather than looping until the deadline.
    pub async fn acquire(&self, key: &str, tokens: u32, timeout: Option<Duration>) -> bool {
        let requested = f64::from(tokens);

        let wait = match self.try_consume(key, requested) {
            Ok(()) => return true,
            Err(wait) => wait,
        };

        if let Some(limit) = timeout {
            if wait > limit {
                debug!("Rate limit wait {:?} exceeds timeout {:?} for key '{}'", wait, limit, key);
                return false;
            }
        }

        tokio::time::sleep(wait).await;

        self.try_consume(key, requested).is_ok()
    }

    /// Wait until tokens are available, with no deadline.
    ///
    /// Loops {attempt consumption; sleep for the currently-computed wait}
    /// until the tokens are deducted. Only terminates through consumption
    /// or cancellation of the calling task; cancellation while suspended
    /// leaves the bucket untouched.
    pub async fn wait_for_tokens(&self, key: &str, tokens: u32) {
        let requested = f64::from(tokens);

        loop {
            match self.try_consume(key, requested) {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Get the remaining tokens for a key without consuming.
    ///
    /// Applies a refill pass first, so the bucket's timestamp advances as a
    /// side effect; subsequent wait-time computations depend on this.
    /// Unseen keys report full capacity.
    pub fn remaining_tokens(&self, key: &str) -> f64 {
        let now = self.clock.now();
        let mut bucket = self.bucket_entry(key, now);
        bucket.refill(now);
        bucket.tokens
    }

    /// Force a key's bucket back to full capacity.
    ///
    /// Missing keys are left alone; their bucket would be created at full
    /// capacity anyway.
    pub fn reset(&self, key: &str) {
        if let Some(mut bucket) = self.buckets.get_mut(key) {
            bucket.tokens = bucket.capacity;
            bucket.last_refill = self.clock.now();
        }
    }

    /// Number of keys currently tracked
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Stop the background eviction task.
    ///
    /// Buckets remain usable afterwards; they just stop being reclaimed.
    /// Called automatically on drop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut guard) = self.janitor.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }

    /// Refill-then-deduct under the key's shard lock.
    ///
    /// Returns the minimum wait until the requested tokens would accrue
    /// when the bucket is short. The guard never outlives this call, so no
    /// lock is held across a suspension point and deduction is
    /// all-or-nothing.
    fn try_consume(&self, key: &str, requested: f64) -> Result<(), Duration> {
        let now = self.clock.now();
        let mut bucket = self.bucket_entry(key, now);
        bucket.refill(now);

        if bucket.tokens >= requested {
            bucket.tokens -= requested;
            debug!("Acquired {} tokens for key '{}' ({:.2} remaining)", requested, key, bucket.tokens);
            Ok(())
        } else {
            Err(bucket.wait_for(requested))
        }
    }

    fn bucket_entry(&self, key: &str, now: Instant) -> dashmap::mapref::one::RefMut<'_, String, Bucket> {
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(f64::from(self.config.capacity), self.config.refill_rate, now))
    }
}

impl<C: Clock> Drop for RateLimiter<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
