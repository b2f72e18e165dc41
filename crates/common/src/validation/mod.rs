//! URL and configuration validation utilities
//!
//! Crawling and ingestion code needs to decide, cheaply and uniformly,
//! whether a URL is worth fetching and what its canonical form is.
//! [`UrlValidator`] performs that gatekeeping: length limits, scheme
//! allow-lists, domain blocklists, and syntax checks over a normalized
//! form. The module also validates the JSON configuration maps passed
//! between Quarry services ([`validate_required_keys`],
//! [`validate_key_types`]).

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

static URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(?:[a-zA-Z]|[0-9]|[$-_@.&+]|[!*(),]|(?:%[0-9a-fA-F]{2}))+")
        .expect("URL_REGEX should compile - this is a bug")
});

static DOMAIN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)*[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$")
        .expect("DOMAIN_REGEX should compile - this is a bug")
});

/// Errors produced by URL and configuration validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// The URL exceeds the validator's length limit
    #[error("URL exceeds maximum length of {limit}")]
    UrlTooLong { limit: usize },

    /// The URL's scheme is not on the allow-list
    #[error("scheme '{scheme}' is not allowed")]
    SchemeNotAllowed { scheme: String },

    /// The URL has no host component
    #[error("missing domain")]
    MissingDomain,

    /// The URL's domain is on the blocklist
    #[error("domain '{domain}' is blocked")]
    BlockedDomain { domain: String },

    /// The URL's domain is not syntactically valid
    #[error("invalid domain format: '{domain}'")]
    InvalidDomain { domain: String },

    /// The URL could not be parsed at all
    #[error("malformed URL: {message}")]
    MalformedUrl { message: String },

    /// A configuration map is missing required keys
    #[error("missing required configuration keys: {keys:?}")]
    MissingKeys { keys: Vec<String> },

    /// A configuration value has the wrong JSON type
    #[error("configuration key '{key}' must be of type {expected}, got {actual}")]
    WrongType { key: String, expected: JsonKind, actual: JsonKind },
}

/// Outcome of validating a single URL.
///
/// Carries the normalized form and parsed components even for rejected
/// URLs, so callers can log or surface what was actually checked.
#[derive(Debug, Clone, Serialize)]
pub struct UrlReport {
    /// The URL as the caller supplied it
    pub original: String,
    /// Canonical form, empty when the URL could not be parsed
    pub normalized: String,
    pub scheme: String,
    pub domain: String,
    pub path: String,
    /// Why the URL was rejected, if it was
    pub rejection: Option<String>,
}

impl UrlReport {
    pub fn is_valid(&self) -> bool {
        self.rejection.is_none()
    }

    fn rejected(original: &str, normalized: String, error: &ValidationError) -> Self {
        Self {
            original: original.to_string(),
            normalized,
            scheme: String::new(),
            domain: String::new(),
            path: String::new(),
            rejection: Some(error.to_string()),
        }
    }
}

/// URL validation and normalization
///
/// # Examples
///
/// ```
/// use quarry_common::validation::UrlValidator;
///
/// let validator = UrlValidator::new();
/// let report = validator.validate("Example.COM/docs");
/// assert!(report.is_valid());
/// assert_eq!(report.normalized, "https://example.com/docs");
/// ```
#[derive(Debug, Clone)]
pub struct UrlValidator {
    allowed_schemes: Vec<String>,
    blocked_domains: HashSet<String>,
    max_url_length: usize,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    /// Create a validator allowing http/https with no blocklist
    pub fn new() -> Self {
        Self {
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            blocked_domains: HashSet::new(),
            max_url_length: 2048,
        }
    }

    /// Set the allowed schemes
    pub fn allowed_schemes(mut self, schemes: Vec<String>) -> Self {
        self.allowed_schemes = schemes;
        self
    }

    /// Add a domain to the blocklist
    pub fn block_domain(mut self, domain: &str) -> Self {
        self.blocked_domains.insert(domain.to_ascii_lowercase());
        self
    }

    /// Set the maximum accepted URL length
    pub fn max_url_length(mut self, length: usize) -> Self {
        self.max_url_length = length;
        self
    }

    /// Validate and analyze a URL.
    ///
    /// Checks run in order: length, parseability, scheme allow-list, host
    /// presence, domain blocklist, domain syntax. The first failure is
    /// reported; a passing URL's report carries its canonical components.
    pub fn validate(&self, url: &str) -> UrlReport {
        if url.len() > self.max_url_length {
            let error = ValidationError::UrlTooLong { limit: self.max_url_length };
            return UrlReport::rejected(url, String::new(), &error);
        }

        let (normalized, parsed) = match self.parse_normalized(url) {
            Ok(pair) => pair,
            Err(error) => return UrlReport::rejected(url, String::new(), &error),
        };

        let scheme = parsed.scheme().to_string();
        let domain = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
        let path = parsed.path().to_string();

        let rejection = if !self.allowed_schemes.contains(&scheme) {
            Some(ValidationError::SchemeNotAllowed { scheme: scheme.clone() })
        } else if domain.is_empty() {
            Some(ValidationError::MissingDomain)
        } else if self.blocked_domains.contains(&domain) {
            Some(ValidationError::BlockedDomain { domain: domain.clone() })
        } else if !DOMAIN_REGEX.is_match(&domain) {
            Some(ValidationError::InvalidDomain { domain: domain.clone() })
        } else {
            None
        };

        UrlReport {
            original: url.to_string(),
            normalized,
            scheme,
            domain,
            path,
            rejection: rejection.map(|e| e.to_string()),
        }
    }

    /// Normalize a URL for consistent processing.
    ///
    /// Trims surrounding whitespace, assumes `https` when no scheme is
    /// given, lowercases scheme and host, strips default ports, and drops
    /// a bare `/` path.
    pub fn normalize(&self, url: &str) -> Result<String, ValidationError> {
        self.parse_normalized(url).map(|(normalized, _)| normalized)
    }

    /// Extract and normalize all URLs found in free text
    pub fn extract_urls(&self, text: &str) -> Vec<String> {
        URL_REGEX
            .find_iter(text)
            .filter_map(|m| self.normalize(m.as_str()).ok())
            .collect()
    }

    /// Check whether two URLs point at the same domain
    pub fn same_domain(&self, first: &str, second: &str) -> bool {
        let hosts = (Self::host_of(first), Self::host_of(second));
        match hosts {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    fn host_of(url: &str) -> Option<String> {
        Url::parse(url).ok()?.host_str().map(str::to_ascii_lowercase)
    }

    fn parse_normalized(&self, url: &str) -> Result<(String, Url), ValidationError> {
        let trimmed = url.trim();
        let lower = trimmed.to_ascii_lowercase();
        let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        // The url crate lowercases scheme and host and drops default ports
        let parsed = Url::parse(&candidate)
            .map_err(|e| ValidationError::MalformedUrl { message: e.to_string() })?;

        let mut normalized = parsed.to_string();
        if parsed.path() == "/" && parsed.query().is_none() && parsed.fragment().is_none() {
            normalized.truncate(normalized.len() - 1);
        }

        Ok((normalized, parsed))
    }
}

/// JSON value types, for configuration-map validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl JsonKind {
    /// The kind of a `serde_json` value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => JsonKind::Null,
            Value::Bool(_) => JsonKind::Boolean,
            Value::Number(_) => JsonKind::Number,
            Value::String(_) => JsonKind::String,
            Value::Array(_) => JsonKind::Array,
            Value::Object(_) => JsonKind::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JsonKind::Null => "null",
            JsonKind::Boolean => "boolean",
            JsonKind::Number => "number",
            JsonKind::String => "string",
            JsonKind::Array => "array",
            JsonKind::Object => "object",
        }
    }
}

impl std::fmt::Display for JsonKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate that all required keys are present in a configuration map
pub fn validate_required_keys(
    config: &Map<String, Value>,
    required: &[&str],
) -> Result<(), ValidationError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|key| !config.contains_key(**key))
        .map(|key| (*key).to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingKeys { keys: missing })
    }
}

/// Validate that present configuration values have the expected JSON types
pub fn validate_key_types(
    config: &Map<String, Value>,
    expected: &[(&str, JsonKind)],
) -> Result<(), ValidationError> {
    for (key, kind) in expected {
        if let Some(value) = config.get(*key) {
            let actual = JsonKind::of(value);
            if actual != *kind {
                return Err(ValidationError::WrongType {
                    key: (*key).to_string(),
                    expected: *kind,
                    actual,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_normalize_adds_scheme_and_lowercases() {
        let validator = UrlValidator::new();
        assert_eq!(validator.normalize("Example.COM").unwrap(), "https://example.com");
        assert_eq!(
            validator.normalize("  HTTP://Example.com/Path  ").unwrap(),
            "http://example.com/Path"
        );
    }

    #[test]
    fn test_normalize_strips_default_ports() {
        let validator = UrlValidator::new();
        assert_eq!(validator.normalize("http://example.com:80/a").unwrap(), "http://example.com/a");
        assert_eq!(validator.normalize("https://example.com:443").unwrap(), "https://example.com");
        assert_eq!(
            validator.normalize("https://example.com:8443").unwrap(),
            "https://example.com:8443"
        );
    }

    #[test]
    fn test_normalize_keeps_query_and_fragment() {
        let validator = UrlValidator::new();
        assert_eq!(
            validator.normalize("example.com/?q=1#top").unwrap(),
            "https://example.com/?q=1#top"
        );
    }

    #[test]
    fn test_validate_accepts_well_formed_url() {
        let validator = UrlValidator::new();
        let report = validator.validate("https://docs.example.com/guide/intro");

        assert!(report.is_valid());
        assert_eq!(report.scheme, "https");
        assert_eq!(report.domain, "docs.example.com");
        assert_eq!(report.path, "/guide/intro");
    }

    #[test]
    fn test_validate_rejects_disallowed_scheme() {
        let validator = UrlValidator::new().allowed_schemes(vec!["https".to_string()]);
        let report = validator.validate("http://example.com");

        assert!(!report.is_valid());
        assert!(report.rejection.unwrap().contains("not allowed"));
    }

    #[test]
    fn test_validate_rejects_blocked_domain() {
        let validator = UrlValidator::new().block_domain("Spam.example.com");
        let report = validator.validate("https://spam.example.com/offer");

        assert!(!report.is_valid());
        assert!(report.rejection.unwrap().contains("blocked"));
    }

    #[test]
    fn test_validate_rejects_invalid_domain_syntax() {
        let validator = UrlValidator::new();
        let report = validator.validate("https://exa_mple.com");

        assert!(!report.is_valid());
        assert!(report.rejection.unwrap().contains("invalid domain format"));
    }

    #[test]
    fn test_validate_rejects_overlong_url() {
        let validator = UrlValidator::new().max_url_length(30);
        let long = format!("https://example.com/{}", "a".repeat(64));
        let report = validator.validate(&long);

        assert!(!report.is_valid());
        assert!(report.rejection.unwrap().contains("maximum length"));
    }

    #[test]
    fn test_validate_rejects_garbage() {
        let validator = UrlValidator::new();
        let report = validator.validate("https://");
        assert!(!report.is_valid());
    }

    #[test]
    fn test_extract_urls_from_text() {
        let validator = UrlValidator::new();
        let text = "See https://example.com/a and http://Other.example.org/b for details.";
        let urls = validator.extract_urls(text);

        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], "https://example.com/a");
        assert_eq!(urls[1], "http://other.example.org/b");
    }

    #[test]
    fn test_same_domain() {
        let validator = UrlValidator::new();
        assert!(validator.same_domain("https://example.com/a", "https://EXAMPLE.com/b"));
        assert!(!validator.same_domain("https://example.com", "https://example.org"));
        assert!(!validator.same_domain("not a url", "https://example.com"));
    }

    #[test]
    fn test_validate_required_keys() {
        let config = json!({"name": "crawler", "depth": 3});
        let map = config.as_object().unwrap();

        assert!(validate_required_keys(map, &["name", "depth"]).is_ok());

        let err = validate_required_keys(map, &["name", "timeout", "agent"]).unwrap_err();
        match err {
            ValidationError::MissingKeys { keys } => {
                assert_eq!(keys, vec!["timeout".to_string(), "agent".to_string()]);
            }
            other => panic!("expected MissingKeys, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_key_types() {
        let config = json!({"name": "crawler", "depth": 3, "verbose": true});
        let map = config.as_object().unwrap();

        assert!(validate_key_types(
            map,
            &[("name", JsonKind::String), ("depth", JsonKind::Number), ("verbose", JsonKind::Boolean)]
        )
        .is_ok());

        // Absent keys are not a type error
        assert!(validate_key_types(map, &[("missing", JsonKind::String)]).is_ok());

        let err = validate_key_types(map, &[("depth", JsonKind::String)]).unwrap_err();
        match err {
            ValidationError::WrongType { key, expected, actual } => {
                assert_eq!(key, "depth");
                assert_eq!(expected, JsonKind::String);
                assert_eq!(actual, JsonKind::Number);
            }
            other => panic!("expected WrongType, got {other:?}"),
        }
    }
}
