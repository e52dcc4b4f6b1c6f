//! Engine configuration schema.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::limiter::RateLimiterConfig;
use crate::retry::RetryPolicy;
use crate::scheduler::BatchOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub version: String,
    /// Name of this collection pipeline (used in logs and summaries).
    pub name: String,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub rate: RateConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "RetryConfig::verify_default")]
    pub verify_retry: RetryConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub reverify: ReverifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Path to the SQLite progress database.
    #[serde(default = "default_state_connection")]
    pub connection: String,
}

fn default_state_connection() -> String {
    "reachline.db".to_string()
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            connection: default_state_connection(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Concurrency slots for item pipelines within a batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Items per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Fixed pause between batches, milliseconds.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Independent concurrency limit for the verification stage.
    #[serde(default = "default_verify_concurrency")]
    pub verify_concurrency: usize,
}

fn default_concurrency() -> usize {
    5
}
fn default_batch_size() -> usize {
    50
}
fn default_batch_delay_ms() -> u64 {
    2_000
}
fn default_verify_concurrency() -> usize {
    3
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            verify_concurrency: default_verify_concurrency(),
        }
    }
}

impl LimitsConfig {
    /// Scheduler options derived from these limits.
    #[must_use]
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.concurrency,
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    #[serde(default = "default_global_capacity")]
    pub global_capacity: f64,
    #[serde(default = "default_global_refill_per_sec")]
    pub global_refill_per_sec: f64,
    #[serde(default = "default_domain_capacity")]
    pub domain_capacity: f64,
    #[serde(default = "default_domain_refill_per_sec")]
    pub domain_refill_per_sec: f64,
}

fn default_global_capacity() -> f64 {
    10.0
}
fn default_global_refill_per_sec() -> f64 {
    5.0
}
fn default_domain_capacity() -> f64 {
    2.0
}
fn default_domain_refill_per_sec() -> f64 {
    0.5
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            global_capacity: default_global_capacity(),
            global_refill_per_sec: default_global_refill_per_sec(),
            domain_capacity: default_domain_capacity(),
            domain_refill_per_sec: default_domain_refill_per_sec(),
        }
    }
}

impl RateConfig {
    /// Limiter configuration derived from these rates.
    #[must_use]
    pub fn limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            global_capacity: self.global_capacity,
            global_refill_rate: self.global_refill_per_sec,
            resource_capacity: self.domain_capacity,
            resource_refill_rate: self.domain_refill_per_sec,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl RetryConfig {
    /// Verification default: fewer, slower retries (greylists clear in
    /// minutes, not milliseconds).
    #[must_use]
    pub fn verify_default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 5_000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
        }
    }

    /// Retry policy derived from this config.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    #[serde(default = "default_breaker_threshold")]
    pub threshold: u32,
    /// Cooldown before a half-open probe, milliseconds.
    #[serde(default = "default_breaker_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_breaker_threshold() -> u32 {
    5
}
fn default_breaker_timeout_ms() -> u64 {
    60_000
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: default_breaker_threshold(),
            timeout_ms: default_breaker_timeout_ms(),
        }
    }
}

impl BreakerConfig {
    /// Cooldown as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverifyConfig {
    /// Run the bounded in-run re-verification pass for transiently
    /// rejected candidates.
    #[serde(default = "default_reverify_enabled")]
    pub enabled: bool,
    /// Wait before the re-verification pass, milliseconds.
    #[serde(default = "default_reverify_delay_ms")]
    pub delay_ms: u64,
}

fn default_reverify_enabled() -> bool {
    true
}
fn default_reverify_delay_ms() -> u64 {
    15_000
}

impl Default for ReverifyConfig {
    fn default() -> Self {
        Self {
            enabled: default_reverify_enabled(),
            delay_ms: default_reverify_delay_ms(),
        }
    }
}
