//! Engine error model and retry backoff helpers.

use std::time::Duration;

use reachline_types::error::{BackoffClass, StageError};

const BACKOFF_FAST_BASE_MS: u64 = 100;
const BACKOFF_NORMAL_BASE_MS: u64 = 1_000;
const BACKOFF_SLOW_BASE_MS: u64 = 5_000;
const BACKOFF_MAX_MS: u64 = 60_000;

// ---------------------------------------------------------------------------
// EngineError — categorised errors for retry decisions
// ---------------------------------------------------------------------------

/// Categorized engine error.
///
/// `Stage` wraps a typed [`StageError`] with retry metadata. `Infrastructure`
/// wraps opaque host-side errors (store failures outside stage calls, task
/// panics, channel errors) that are never retryable.
#[derive(Debug)]
pub enum EngineError {
    /// Typed stage error with retry metadata.
    Stage(StageError),
    /// Infrastructure error (store, task join, shutdown plumbing).
    Infrastructure(anyhow::Error),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stage(e) => write!(f, "{e}"),
            Self::Infrastructure(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        Self::Infrastructure(e)
    }
}

impl From<StageError> for EngineError {
    fn from(e: StageError) -> Self {
        Self::Stage(e)
    }
}

impl From<reachline_state::StateError> for EngineError {
    fn from(e: reachline_state::StateError) -> Self {
        Self::Infrastructure(e.into())
    }
}

impl EngineError {
    /// Returns `true` if this is a typed stage error marked retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Stage(e) => e.retryable,
            Self::Infrastructure(_) => false,
        }
    }

    /// Returns the typed stage error if this is a `Stage` variant.
    #[must_use]
    pub fn as_stage_error(&self) -> Option<&StageError> {
        match self {
            Self::Stage(e) => Some(e),
            Self::Infrastructure(_) => None,
        }
    }

    /// Returns `true` if this error must abort the whole run rather than
    /// fail a single item.
    #[must_use]
    pub fn is_fatal_to_run(&self) -> bool {
        match self {
            Self::Stage(e) => e.is_fatal_to_run(),
            Self::Infrastructure(_) => true,
        }
    }
}

/// Compute retry delay based on error hints and attempt number.
///
/// `attempt` is 1-based (the attempt that just failed).
#[must_use]
pub fn compute_backoff(err: &StageError, attempt: u32) -> Duration {
    // If the remote specified a retry_after, use it
    if let Some(ms) = err.retry_after_ms {
        return Duration::from_millis(ms);
    }

    let base_ms: u64 = match err.backoff_class {
        BackoffClass::Fast => BACKOFF_FAST_BASE_MS,
        BackoffClass::Normal => BACKOFF_NORMAL_BASE_MS,
        BackoffClass::Slow => BACKOFF_SLOW_BASE_MS,
    };

    let delay_ms = base_ms.saturating_mul(
        2u64.saturating_pow(attempt.saturating_sub(1).min(16)),
    );
    Duration::from_millis(delay_ms.min(BACKOFF_MAX_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reachline_types::error::StageErrorCategory;

    #[test]
    fn stage_error_is_retryable() {
        let err = EngineError::Stage(StageError::connection_reset(
            "CONN_RESET",
            "connection reset by peer",
        ));
        assert!(err.is_retryable());
        let se = err.as_stage_error().unwrap();
        assert_eq!(se.category, StageErrorCategory::ConnectionReset);
        assert_eq!(se.backoff_class, BackoffClass::Fast);
    }

    #[test]
    fn blocked_is_not_retryable() {
        let err = EngineError::Stage(StageError::blocked("CHALLENGE", "captcha wall"));
        assert!(!err.is_retryable());
        assert!(!err.is_fatal_to_run());
    }

    #[test]
    fn config_error_is_fatal_to_run() {
        let err = EngineError::Stage(StageError::config("BAD_RATE", "rate must be > 0"));
        assert!(!err.is_retryable());
        assert!(err.is_fatal_to_run());
    }

    #[test]
    fn infrastructure_is_fatal_and_not_retryable() {
        let err = EngineError::Infrastructure(anyhow::anyhow!("store task panicked"));
        assert!(!err.is_retryable());
        assert!(err.is_fatal_to_run());
        assert!(err.as_stage_error().is_none());
    }

    #[test]
    fn from_anyhow() {
        let pe: EngineError = anyhow::anyhow!("something went wrong").into();
        assert!(matches!(pe, EngineError::Infrastructure(_)));
    }

    #[test]
    fn display_stage() {
        let err = EngineError::Stage(StageError::rate_limited("TOO_MANY", "slow down", None));
        let msg = format!("{err}");
        assert!(msg.contains("rate_limited"));
        assert!(msg.contains("TOO_MANY"));
    }

    // -----------------------------------------------------------------------
    // compute_backoff tests
    // -----------------------------------------------------------------------

    #[test]
    fn backoff_fast() {
        let err = StageError::connection_reset("X", "y");
        assert_eq!(compute_backoff(&err, 1), Duration::from_millis(100));
        assert_eq!(compute_backoff(&err, 2), Duration::from_millis(200));
        assert_eq!(compute_backoff(&err, 3), Duration::from_millis(400));
    }

    #[test]
    fn backoff_normal() {
        let err = StageError::timeout("X", "y");
        assert_eq!(compute_backoff(&err, 1), Duration::from_millis(1000));
        assert_eq!(compute_backoff(&err, 2), Duration::from_millis(2000));
    }

    #[test]
    fn backoff_slow() {
        let err = StageError::greylist("X", "y");
        assert_eq!(compute_backoff(&err, 1), Duration::from_millis(5000));
        assert_eq!(compute_backoff(&err, 2), Duration::from_millis(10000));
    }

    #[test]
    fn backoff_respects_retry_after() {
        let err = StageError::rate_limited("X", "y", Some(7500));
        assert_eq!(compute_backoff(&err, 1), Duration::from_millis(7500));
        assert_eq!(compute_backoff(&err, 5), Duration::from_millis(7500));
    }

    #[test]
    fn backoff_capped_at_60s() {
        let err = StageError::timeout("X", "y");
        assert_eq!(compute_backoff(&err, 20), Duration::from_millis(60_000));
    }
}
