// SPDX-License-Identifier: MIT

//! Error classification: turns a worker's raw failure into a closed
//! [`ErrorKind`](poppo_core::ErrorKind).
//!
//! The upstream error surface is often just text, so the default classifier
//! still falls back to message-pattern matching — but that mechanism is
//! isolated behind this trait rather than sprinkled through the Dispatcher,
//! so custom predicates can be registered ahead of it.

use poppo_core::ErrorKind;
use std::time::Duration;

/// What the worker pool observed about a failed attempt, before classification.
#[derive(Debug, Clone, Default)]
pub struct FailureSignal {
    pub status_code: Option<u16>,
    pub message: String,
    /// A parsed `Retry-After` value, if the upstream response carried one.
    pub retry_after: Option<Duration>,
}

/// A pluggable classifier. Custom classifiers are registered ahead of the
/// built-in [`TaxonomyClassifier`] and evaluated in insertion order; the
/// first `Some(_)` wins.
pub trait ErrorClassifier: Send + Sync {
    fn name(&self) -> &str;
    fn classify(&self, signal: &FailureSignal) -> Option<ErrorKind>;
}

/// The built-in, closed-set taxonomy from the spec, evaluated in a fixed order.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaxonomyClassifier;

impl ErrorClassifier for TaxonomyClassifier {
    fn name(&self) -> &str {
        "taxonomy"
    }

    fn classify(&self, signal: &FailureSignal) -> Option<ErrorKind> {
        if let Some(code) = signal.status_code {
            if code == 429 {
                return Some(ErrorKind::RateLimit);
            }
            if code == 401 || code == 403 {
                return Some(ErrorKind::Auth);
            }
            if (400..500).contains(&code) {
                return Some(ErrorKind::Validation);
            }
            if (500..600).contains(&code) {
                return Some(ErrorKind::ApiError);
            }
        }

        let lower = signal.message.to_ascii_lowercase();
        if lower.contains("timed out") || lower.contains("timeout") {
            return Some(ErrorKind::Timeout);
        }
        if lower.contains("connection") || lower.contains("dns") || lower.contains("network") {
            return Some(ErrorKind::Network);
        }
        if lower.contains("unauthorized") || lower.contains("forbidden") {
            return Some(ErrorKind::Auth);
        }
        if lower.contains("rate limit") || lower.contains("too many requests") {
            return Some(ErrorKind::RateLimit);
        }

        Some(ErrorKind::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_429_is_rate_limit() {
        let signal = FailureSignal {
            status_code: Some(429),
            ..Default::default()
        };
        assert_eq!(TaxonomyClassifier.classify(&signal), Some(ErrorKind::RateLimit));
    }

    #[test]
    fn status_5xx_is_api_error() {
        let signal = FailureSignal {
            status_code: Some(503),
            ..Default::default()
        };
        assert_eq!(TaxonomyClassifier.classify(&signal), Some(ErrorKind::ApiError));
    }

    #[test]
    fn textual_timeout_falls_back_to_message_match() {
        let signal = FailureSignal {
            status_code: None,
            message: "operation timed out after 30s".to_string(),
            retry_after: None,
        };
        assert_eq!(TaxonomyClassifier.classify(&signal), Some(ErrorKind::Timeout));
    }

    #[test]
    fn classification_is_idempotent() {
        let signal = FailureSignal {
            status_code: Some(500),
            message: "internal error".to_string(),
            retry_after: None,
        };
        let first = TaxonomyClassifier.classify(&signal);
        let second = TaxonomyClassifier.classify(&signal);
        assert_eq!(first, second);
    }
}
