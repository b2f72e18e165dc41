//! Resilience patterns for throttling and fault tolerance
//!
//! This module provides the two primitives callers compose around unreliable
//! outbound work:
//! - **Rate Limiter**: per-key token buckets with asynchronous blocking
//!   acquisition and background eviction of idle buckets
//! - **Retrier**: bounded retry with exponential backoff and jitter,
//!   filtered by failure kind
//!
//! The two are independent; a typical caller acquires a token for the
//! target key, then runs the actual call through the retrier.
//!
//! Time is abstracted behind the [`Clock`] trait so refill and eviction
//! arithmetic can be tested deterministically with [`MockClock`].

pub mod clock;
pub mod rate_limiter;
pub mod retry;

// Re-export clock types
pub use clock::{Clock, MockClock, SystemClock};
// Re-export rate limiter types
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterConfigBuilder};
// Re-export retry types
pub use retry::{run_with_retry, Retrier, RetryPolicy, RetryPolicyBuilder};
