//! Error types for the rate engine.

use crate::domain::CacheKey;

/// Markers that identify an upstream rate-limit signal in a status or message.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "429",
    "too many requests",
    "quota",
    "throttle",
    "rate limit",
];

/// Validation errors (bad user input).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateError {
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    #[error("Invalid currency pair: {0:?}")]
    InvalidPair(String),
}

/// Errors a rate source reports for a single fetch.
///
/// Only `RateLimited` should ever cause backoff; every other variant means
/// "this source has no answer right now".
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("Rate limited by {source_name}: {message}")]
    RateLimited {
        source_name: String,
        message: String,
    },

    #[error("Source {source_name} unavailable: {message}")]
    Unavailable {
        source_name: String,
        message: String,
    },

    #[error("Source {source_name} has no data for {key}")]
    NoData { source_name: String, key: String },

    #[error("HTTP error from {source_name}: {message}")]
    Http {
        source_name: String,
        message: String,
    },
}

impl SourceError {
    pub fn rate_limited(source_name: &str, message: impl Into<String>) -> Self {
        Self::RateLimited {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    pub fn unavailable(source_name: &str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    pub fn no_data(source_name: &str, key: &CacheKey) -> Self {
        Self::NoData {
            source_name: source_name.to_string(),
            key: key.to_string(),
        }
    }

    /// True for errors that should trigger session blocking and backoff.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, SourceError::RateLimited { .. })
    }

    /// True when the vendor legitimately has no rate for the requested key.
    pub fn is_no_data(&self) -> bool {
        matches!(self, SourceError::NoData { .. })
    }
}

/// Persistence collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Returns true if `text` carries one of the known rate-limit markers.
pub fn is_rate_limit_signal(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Classifies a failed upstream response as rate-limit or plain unavailability.
pub fn classify_failure(source_name: &str, status: Option<u16>, message: &str) -> SourceError {
    let status_text = status.map(|s| s.to_string()).unwrap_or_default();
    if status == Some(429) || is_rate_limit_signal(&status_text) || is_rate_limit_signal(message) {
        SourceError::rate_limited(source_name, message)
    } else {
        let message = match status {
            Some(status) => format!("HTTP {}: {}", status, message),
            None => message.to_string(),
        };
        SourceError::unavailable(source_name, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_markers() {
        assert!(is_rate_limit_signal("HTTP 429"));
        assert!(is_rate_limit_signal("Too Many Requests"));
        assert!(is_rate_limit_signal("daily QUOTA exceeded"));
        assert!(is_rate_limit_signal("request throttled"));
        assert!(!is_rate_limit_signal("connection reset by peer"));
    }

    #[test]
    fn test_classify_by_status() {
        assert!(classify_failure("market", Some(429), "").is_rate_limit());
        let err = classify_failure("market", Some(503), "Service Unavailable");
        assert!(!err.is_rate_limit());
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[test]
    fn test_classify_by_message() {
        assert!(classify_failure("market", Some(200), "Too many requests, slow down").is_rate_limit());
        assert!(!classify_failure("market", None, "timed out").is_rate_limit());
    }
}
