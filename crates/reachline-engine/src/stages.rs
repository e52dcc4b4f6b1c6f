//! Collaborator contracts consumed by the pipeline driver.
//!
//! The engine core is agnostic to how candidates are actually acquired or
//! verified; implementations live outside this crate and are handed to
//! [`Engine`](crate::Engine) as trait objects.

use async_trait::async_trait;

use reachline_types::error::StageError;
use reachline_types::item::{Candidate, VerifyStatus, WorkItem};

/// Primary acquisition stage: extract contact candidates for one item.
///
/// This is the expensive, I/O-bound stage (page fetches, document parses).
/// Implementations classify their failures through [`StageError`]: transient
/// categories are retried by the driver, [`StageError::blocked`] triggers
/// the fallback substitution, and config/storage errors abort the run.
#[async_trait]
pub trait AcquireStage: Send + Sync {
    async fn acquire(&self, item: &WorkItem) -> Result<Vec<Candidate>, StageError>;
}

/// Cheap fallback used when acquisition is blocked: pattern-based guesses.
///
/// Infallible by contract; an empty vector is a valid answer.
pub trait FallbackStage: Send + Sync {
    fn guess(&self, item: &WorkItem) -> Vec<Candidate>;
}

/// Pure enrichment over the candidate set (dedup, normalization, ranking).
///
/// Synchronous, no I/O, never retried; must not fail for valid input.
pub trait EnrichStage: Send + Sync {
    fn enrich(&self, candidates: Vec<Candidate>, item: &WorkItem) -> Vec<Candidate>;
}

/// Verification stage: probe one candidate against the downstream
/// dependency (mail-handshake semantics live behind this trait).
#[async_trait]
pub trait VerifyStage: Send + Sync {
    async fn verify(&self, candidate: &Candidate) -> Result<VerifyStatus, StageError>;
}

/// Initial population loader, invoked once when the progress store reports
/// no items recorded yet.
#[async_trait]
pub trait ItemLoader: Send + Sync {
    async fn load(&self) -> Result<Vec<WorkItem>, StageError>;
}

/// The full stage set wired into one engine instance.
pub struct PipelineStages {
    pub loader: std::sync::Arc<dyn ItemLoader>,
    pub acquire: std::sync::Arc<dyn AcquireStage>,
    pub fallback: std::sync::Arc<dyn FallbackStage>,
    pub enrich: std::sync::Arc<dyn EnrichStage>,
    pub verify: std::sync::Arc<dyn VerifyStage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_traits_are_object_safe() {
        fn _acquire(_: &dyn AcquireStage) {}
        fn _fallback(_: &dyn FallbackStage) {}
        fn _enrich(_: &dyn EnrichStage) {}
        fn _verify(_: &dyn VerifyStage) {}
        fn _loader(_: &dyn ItemLoader) {}
    }
}
