//! Failure taxonomy shared across Quarry crates.
//!
//! Operations that cross a process or network boundary fail in a small
//! number of recognizable ways. Rather than matching on concrete error
//! types (which couples callers to every collaborator's error enum), each
//! error carries an explicit [`FailureKind`] tag through the
//! [`FailureClassification`] trait, and policy code such as the retrier
//! matches on the tag alone.

use thiserror::Error;

/// The kind of failure an operation produced.
///
/// Tags are deliberately coarse: they describe what a caller can *do*
/// about the failure, not where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The operation did not complete within its deadline
    Timeout,
    /// The remote endpoint could not be reached or dropped the connection
    Connection,
    /// The remote endpoint refused the request due to rate limiting
    RateLimited,
    /// The remote endpoint reported an internal failure (5xx-class)
    Server,
    /// A payload could not be encoded or decoded
    Serialization,
    /// The caller supplied input the operation cannot act on
    InvalidInput,
    /// An invariant was violated inside this process
    Internal,
}

impl FailureKind {
    /// Kinds that are conventionally worth retrying.
    ///
    /// Transient kinds describe conditions expected to clear on their own;
    /// the rest indicate the same call would fail again.
    pub fn transient() -> &'static [FailureKind] {
        &[
            FailureKind::Timeout,
            FailureKind::Connection,
            FailureKind::RateLimited,
            FailureKind::Server,
        ]
    }

    /// Stable lowercase name, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connection => "connection",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Server => "server",
            FailureKind::Serialization => "serialization",
            FailureKind::InvalidInput => "invalid_input",
            FailureKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard interface for classifying errors by failure kind.
///
/// Error types that participate in retry handling implement this trait.
/// The default `is_transient` mirrors [`FailureKind::transient`].
pub trait FailureClassification {
    /// The failure kind tag carried by this error
    fn kind(&self) -> FailureKind;

    /// Check whether this error is conventionally retryable
    fn is_transient(&self) -> bool {
        FailureKind::transient().contains(&self.kind())
    }
}

/// Configuration validation error shared by the crate's builders.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric or duration field that must be strictly positive was not
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    /// Any other constraint violation
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FetchError(FailureKind);

    impl FailureClassification for FetchError {
        fn kind(&self) -> FailureKind {
            self.0
        }
    }

    #[test]
    fn test_transient_kinds() {
        assert!(FetchError(FailureKind::Timeout).is_transient());
        assert!(FetchError(FailureKind::Connection).is_transient());
        assert!(FetchError(FailureKind::RateLimited).is_transient());
        assert!(FetchError(FailureKind::Server).is_transient());

        assert!(!FetchError(FailureKind::Serialization).is_transient());
        assert!(!FetchError(FailureKind::InvalidInput).is_transient());
        assert!(!FetchError(FailureKind::Internal).is_transient());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(FailureKind::RateLimited.to_string(), "rate_limited");
        assert_eq!(FailureKind::Timeout.as_str(), "timeout");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::NotPositive { field: "capacity" };
        assert!(err.to_string().contains("capacity"));

        let err = ConfigError::Invalid { message: "bad config".to_string() };
        assert!(err.to_string().contains("bad config"));
    }
}
