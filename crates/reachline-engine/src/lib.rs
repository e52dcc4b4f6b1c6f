//! Core orchestration crate for the Reachline contact pipeline.
//!
//! Composes the token-bucket rate limiter, retry/circuit-breaker wrappers,
//! batch scheduler, and durable progress store into a crash-resumable
//! engine driving acquisition, enrichment, and verification stages over a
//! fixed item population.

pub mod breaker;
pub mod config;
pub mod driver;
pub mod errors;
pub mod export;
pub mod limiter;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod stages;

// Re-export public API for convenience
pub use breaker::CircuitBreaker;
pub use config::EngineConfig;
pub use driver::Engine;
pub use errors::EngineError;
pub use limiter::RateLimiter;
pub use report::RunReport;
pub use retry::{with_retry, RetryPolicy};
