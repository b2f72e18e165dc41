//! Shared utilities for Quarry crates.
//!
//! This crate carries the small, reusable foundation the ingestion and
//! retrieval crates build on:
//!
//! - `resilience`: per-key token-bucket rate limiting and retry with
//!   exponential backoff, for callers that throttle outbound work and
//!   tolerate transient failures
//! - `error`: the failure taxonomy those callers classify against
//! - `validation`: URL validation/normalization and configuration-map checks
//! - `text`: text cleaning and metadata extraction for crawled content

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod error;
pub mod resilience;
pub mod text;
pub mod validation;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use error::{ConfigError, FailureClassification, FailureKind};
pub use resilience::{
    run_with_retry, Clock, MockClock, RateLimiter, RateLimiterConfig, RateLimiterConfigBuilder,
    Retrier, RetryPolicy, RetryPolicyBuilder, SystemClock,
};
pub use text::{TextMetadata, TextProcessor};
pub use validation::{
    validate_key_types, validate_required_keys, JsonKind, UrlReport, UrlValidator, ValidationError,
};
