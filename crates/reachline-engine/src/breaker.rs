//! Circuit breaker for failure isolation around a downstream dependency.
//!
//! One breaker guards one dependency kind (e.g. the acquisition stage).
//! While open, calls fail fast with a [`StageError::breaker_open`] error
//! that callers must not count against their own retry budget.

use std::future::Future;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use reachline_types::error::StageError;

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls fail fast until the cooldown elapses.
    Open,
    /// Cooldown elapsed; exactly one probe call is allowed through.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerCore {
    state: BreakerState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    /// A probe is in flight (half-open admits one call at a time).
    probing: bool,
}

/// Circuit breaker with consecutive-failure tripping and a single-probe
/// half-open recovery.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    threshold: u32,
    timeout: Duration,
    core: Mutex<BreakerCore>,
}

impl CircuitBreaker {
    /// Create a closed breaker tripping after `threshold` consecutive
    /// failures and cooling down for `timeout`.
    #[must_use]
    pub fn new(name: impl Into<String>, threshold: u32, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            threshold: threshold.max(1),
            timeout,
            core: Mutex::new(BreakerCore {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure_at: None,
                probing: false,
            }),
        }
    }

    /// Current breaker position (diagnostic hook).
    pub async fn state(&self) -> BreakerState {
        let mut core = self.core.lock().await;
        self.roll_over_if_due(&mut core);
        core.state
    }

    /// Consecutive failures observed while closed.
    pub async fn failure_count(&self) -> u32 {
        self.core.lock().await.failure_count
    }

    fn roll_over_if_due(&self, core: &mut BreakerCore) {
        if core.state == BreakerState::Open {
            let due = core
                .last_failure_at
                .is_some_and(|at| at.elapsed() >= self.timeout);
            if due {
                core.state = BreakerState::HalfOpen;
                core.probing = false;
            }
        }
    }

    /// Run `op` under the breaker.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::breaker_open`] without invoking `op` while the
    /// breaker is open (or while another probe is in flight), otherwise
    /// propagates `op`'s own error.
    pub async fn execute<T, Fut>(
        &self,
        op: impl FnOnce() -> Fut,
    ) -> Result<T, StageError>
    where
        Fut: Future<Output = Result<T, StageError>>,
    {
        {
            let mut core = self.core.lock().await;
            self.roll_over_if_due(&mut core);
            match core.state {
                BreakerState::Closed => {}
                BreakerState::HalfOpen if !core.probing => {
                    core.probing = true;
                    tracing::info!(breaker = %self.name, "Circuit breaker half-open, probing");
                }
                BreakerState::HalfOpen | BreakerState::Open => {
                    return Err(StageError::breaker_open(&self.name));
                }
            }
        }

        let result = op().await;

        let mut core = self.core.lock().await;
        match &result {
            Ok(_) => {
                if core.state == BreakerState::HalfOpen {
                    tracing::info!(breaker = %self.name, "Probe succeeded, closing breaker");
                }
                core.state = BreakerState::Closed;
                core.failure_count = 0;
                core.probing = false;
            }
            Err(_) => match core.state {
                BreakerState::HalfOpen => {
                    // Failed probe: reopen and restart the cooldown clock.
                    core.state = BreakerState::Open;
                    core.last_failure_at = Some(Instant::now());
                    core.probing = false;
                    tracing::warn!(breaker = %self.name, "Probe failed, reopening breaker");
                }
                BreakerState::Closed => {
                    core.failure_count += 1;
                    core.last_failure_at = Some(Instant::now());
                    if core.failure_count >= self.threshold {
                        core.state = BreakerState::Open;
                        tracing::warn!(
                            breaker = %self.name,
                            failures = core.failure_count,
                            "Failure threshold reached, opening breaker"
                        );
                    }
                }
                BreakerState::Open => {}
            },
        }
        result
    }
}
