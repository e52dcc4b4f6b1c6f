//! Structured error model for pipeline stage operations.
//!
//! [`StageError`] carries classification, retry metadata, and optional
//! diagnostic details. Construct via category-specific factory methods so
//! retry behavior stays consistent across stage implementations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classification of a stage error.
///
/// Determines default retry behavior and operator-facing categorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum StageErrorCategory {
    /// Request timed out (retryable).
    Timeout,
    /// Connection reset or refused (retryable).
    ConnectionReset,
    /// DNS resolution failure (retryable).
    Dns,
    /// Explicit rate-limit signal from the remote (retryable).
    RateLimited,
    /// Temporary greylist-style rejection (retryable).
    Greylist,
    /// Anti-automation barrier detected; further attempts are pointless.
    Blocked,
    /// Invalid engine or stage configuration.
    Config,
    /// Durable storage unavailable or failing.
    Storage,
    /// Circuit breaker is open; the call was never attempted.
    BreakerOpen,
    /// Internal stage error.
    Internal,
}

impl fmt::Display for StageErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::ConnectionReset => "connection_reset",
            Self::Dns => "dns",
            Self::RateLimited => "rate_limited",
            Self::Greylist => "greylist",
            Self::Blocked => "blocked",
            Self::Config => "config",
            Self::Storage => "storage",
            Self::BreakerOpen => "breaker_open",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Retry backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffClass {
    /// Millisecond-scale retry.
    Fast,
    /// Second-scale retry.
    Normal,
    /// Minute-scale retry.
    Slow,
}

/// Structured error from a pipeline stage operation.
///
/// Carries classification and retry metadata. Construct via the
/// category-specific factory methods (e.g. [`StageError::timeout`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{category}] {code}: {message}")]
pub struct StageError {
    pub category: StageErrorCategory,
    pub code: String,
    pub message: String,
    pub retryable: bool,
    /// Remote-supplied retry hint, overrides computed backoff when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    pub backoff_class: BackoffClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl StageError {
    fn new(
        category: StageErrorCategory,
        retryable: bool,
        backoff_class: BackoffClass,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retryable,
            retry_after_ms: None,
            backoff_class,
            details: None,
        }
    }

    /// Request timeout (retryable, normal backoff).
    #[must_use]
    pub fn timeout(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StageErrorCategory::Timeout, true, BackoffClass::Normal, code, message)
    }

    /// Connection reset/refused (retryable, fast backoff).
    #[must_use]
    pub fn connection_reset(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StageErrorCategory::ConnectionReset, true, BackoffClass::Fast, code, message)
    }

    /// DNS failure (retryable, normal backoff).
    #[must_use]
    pub fn dns(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StageErrorCategory::Dns, true, BackoffClass::Normal, code, message)
    }

    /// Remote rate-limit signal (retryable, slow backoff).
    #[must_use]
    pub fn rate_limited(
        code: impl Into<String>,
        message: impl Into<String>,
        retry_after_ms: Option<u64>,
    ) -> Self {
        let mut err =
            Self::new(StageErrorCategory::RateLimited, true, BackoffClass::Slow, code, message);
        err.retry_after_ms = retry_after_ms;
        err
    }

    /// Greylist-style transient rejection (retryable, slow backoff).
    #[must_use]
    pub fn greylist(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StageErrorCategory::Greylist, true, BackoffClass::Slow, code, message)
    }

    /// Anti-automation barrier (not retryable; triggers the fallback stage).
    #[must_use]
    pub fn blocked(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StageErrorCategory::Blocked, false, BackoffClass::Normal, code, message)
    }

    /// Configuration error (not retryable, fatal to the run).
    #[must_use]
    pub fn config(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StageErrorCategory::Config, false, BackoffClass::Normal, code, message)
    }

    /// Storage error (not retryable, fatal to the run).
    #[must_use]
    pub fn storage(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StageErrorCategory::Storage, false, BackoffClass::Normal, code, message)
    }

    /// Circuit-breaker rejection (not retryable by the caller's own budget).
    #[must_use]
    pub fn breaker_open(breaker: impl fmt::Display) -> Self {
        Self::new(
            StageErrorCategory::BreakerOpen,
            false,
            BackoffClass::Normal,
            "BREAKER_OPEN",
            format!("circuit breaker '{breaker}' is open"),
        )
    }

    /// Internal stage error (not retryable).
    #[must_use]
    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StageErrorCategory::Internal, false, BackoffClass::Normal, code, message)
    }

    /// Attach structured diagnostic details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// True when the fallback stage should be substituted for this error.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.category == StageErrorCategory::Blocked
    }

    /// True when this error is fatal to the whole run, not just one item.
    #[must_use]
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self.category,
            StageErrorCategory::Config | StageErrorCategory::Storage
        )
    }
}
