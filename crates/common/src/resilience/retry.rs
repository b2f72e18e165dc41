//! Retry with exponential backoff and jitter, filtered by failure kind
//!
//! Wraps a caller-supplied fallible operation and re-runs it a bounded
//! number of times with geometrically increasing, jittered delay. Which
//! failures are worth retrying is decided by the [`FailureKind`] tag each
//! error carries, never by matching on concrete error types.
//!
//! The retrier holds no state between invocations; each call is
//! independent and needs no synchronization beyond what the wrapped
//! operation itself needs.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::{ConfigError, FailureClassification, FailureKind};

/// Retry behavior, immutable after construction.
///
/// A policy with `max_retries = 0` performs exactly one attempt; in
/// general `max_retries + 1` attempts are made before the final failure is
/// handed back.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Cap applied to the computed delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub backoff_factor: f64,
    /// Scale each delay by a uniformly random factor in [0.5, 1.0] to
    /// avoid synchronized retry storms across concurrent callers
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_delay.is_zero() {
            return Err(ConfigError::NotPositive { field: "base_delay" });
        }
        if self.max_delay < self.base_delay {
            return Err(ConfigError::Invalid {
                message: "max_delay must be at least base_delay".to_string(),
            });
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 1.0 {
            return Err(ConfigError::Invalid {
                message: "backoff_factor must be greater than 1.0".to_string(),
            });
        }
        Ok(())
    }

    /// Delay before the retry following `attempt` (0-based), before jitter.
    fn delay_for(&self, attempt: u32) -> Duration {
        let raw = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        Duration::from_secs_f64(raw.min(self.max_delay.as_secs_f64()))
    }
}

/// Builder for RetryPolicy
#[derive(Debug)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self { policy: RetryPolicy::default() }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.policy.max_retries = retries;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.policy.backoff_factor = factor;
        self
    }

    pub fn jitter(mut self, jitter: bool) -> Self {
        self.policy.jitter = jitter;
        self
    }

    pub fn build(self) -> Result<RetryPolicy, ConfigError> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}

/// Executes operations under a [`RetryPolicy`]
///
/// # Examples
///
/// ```
/// use quarry_common::error::{FailureClassification, FailureKind};
/// use quarry_common::resilience::{Retrier, RetryPolicy};
///
/// #[derive(Debug)]
/// struct FetchError(FailureKind);
///
/// impl FailureClassification for FetchError {
///     fn kind(&self) -> FailureKind {
///         self.0
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let retrier = Retrier::new(RetryPolicy::default());
///     let result: Result<u32, FetchError> = retrier
///         .run(FailureKind::transient(), || async { Ok(42) })
///         .await;
///     assert_eq!(result.unwrap(), 42);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Retrier {
    policy: RetryPolicy,
}

impl Retrier {
    /// Create a retrier with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The policy this retrier runs under
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation`, retrying failures whose kind appears in `retry_on`.
    ///
    /// Success returns immediately. A failure whose kind is not in
    /// `retry_on` short-circuits without retrying. Once the retry budget
    /// is exhausted, the failure from the final attempt is handed back
    /// verbatim; intermediate failures are discarded and reporting them is
    /// the caller's concern, not this component's.
    pub async fn run<T, E, F, Fut>(&self, retry_on: &[FailureKind], mut operation: F) -> Result<T, E>
    where
        E: FailureClassification,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("Operation succeeded after {} retries", attempt);
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let kind = error.kind();

                    if !retry_on.contains(&kind) {
                        debug!("Failure kind '{}' is not retryable, propagating", kind);
                        return Err(error);
                    }

                    if attempt >= self.policy.max_retries {
                        debug!("Retry budget exhausted after {} attempts", attempt + 1);
                        return Err(error);
                    }

                    let delay = self.jittered_delay(attempt);
                    debug!(
                        "Attempt {} failed with '{}', retrying after {:?}",
                        attempt + 1,
                        kind,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.policy.delay_for(attempt);
        if self.policy.jitter {
            delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
        } else {
            delay
        }
    }
}

/// Convenience function: build a retrier for `policy` and run `operation`.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    retry_on: &[FailureKind],
    operation: F,
) -> Result<T, E>
where
    E: FailureClassification,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    Retrier::new(policy).run(retry_on, operation).await
}
