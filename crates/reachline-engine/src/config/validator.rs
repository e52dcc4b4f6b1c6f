//! Semantic validation for parsed engine configuration values.

use anyhow::{bail, Result};

use crate::config::types::{EngineConfig, RetryConfig};

fn validate_retry(retry: &RetryConfig, context: &str, errors: &mut Vec<String>) {
    if retry.backoff_factor < 1.0 {
        errors.push(format!(
            "{context}: backoff_factor must be >= 1.0, got {}",
            retry.backoff_factor
        ));
    }
    if retry.max_delay_ms < retry.initial_delay_ms {
        errors.push(format!(
            "{context}: max_delay_ms ({}) must be >= initial_delay_ms ({})",
            retry.max_delay_ms, retry.initial_delay_ms
        ));
    }
}

/// Validate a parsed engine configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported config version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.name.trim().is_empty() {
        errors.push("Pipeline name must not be empty".to_string());
    }

    if config.state.connection.trim().is_empty() {
        errors.push("State connection path must not be empty".to_string());
    }

    if config.limits.concurrency == 0 {
        errors.push("limits.concurrency must be at least 1".to_string());
    }

    if config.limits.batch_size == 0 {
        errors.push("limits.batch_size must be at least 1".to_string());
    }

    if config.limits.verify_concurrency == 0 {
        errors.push("limits.verify_concurrency must be at least 1".to_string());
    }

    for (value, field) in [
        (config.rate.global_capacity, "rate.global_capacity"),
        (config.rate.global_refill_per_sec, "rate.global_refill_per_sec"),
        (config.rate.domain_capacity, "rate.domain_capacity"),
        (config.rate.domain_refill_per_sec, "rate.domain_refill_per_sec"),
    ] {
        if !value.is_finite() || value <= 0.0 {
            errors.push(format!("{field} must be a positive number, got {value}"));
        }
    }

    validate_retry(&config.retry, "retry", &mut errors);
    validate_retry(&config.verify_retry, "verify_retry", &mut errors);

    if config.breaker.threshold == 0 {
        errors.push("breaker.threshold must be at least 1".to_string());
    }

    if !errors.is_empty() {
        bail!("Invalid engine configuration:\n  - {}", errors.join("\n  - "));
    }

    Ok(())
}
