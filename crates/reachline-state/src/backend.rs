//! Progress store trait definition.
//!
//! [`ProgressStore`] defines the storage contract for work items, run
//! history, outcome audit records, and persisted results. Model types live
//! in [`reachline_types`].

use reachline_types::item::{ContactResult, ItemId, WorkItem};
use reachline_types::state::{ItemOutcome, RunError, RunRecord, RunStats, RunStatus};

use crate::error;

/// Storage contract for engine progress.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn ProgressStore>`.
/// Item status transitions are forward-only: `pending → processing →
/// {completed, failed}`. The item status column is the single authoritative
/// record of progress; the per-run outcome log is an audit trail only.
pub trait ProgressStore: Send + Sync {
    /// Record the initial item population. Idempotent: items whose id is
    /// already present are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn insert_items(&self, items: &[WorkItem]) -> error::Result<u64>;

    /// Number of items ever recorded.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn item_count(&self) -> error::Result<u64>;

    /// Items eligible for processing: status `pending`, plus `processing`
    /// left behind by a run that died mid-item. Failed items are excluded;
    /// callers opt in to retrying them via [`ProgressStore::requeue_failed`].
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn load_unprocessed(&self) -> error::Result<Vec<WorkItem>>;

    /// Reset all `failed` items to `pending`, clearing their error.
    /// Returns the number of items requeued.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn requeue_failed(&self) -> error::Result<u64>;

    /// Transition an item to `processing`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn mark_processing(&self, item: &ItemId) -> error::Result<()>;

    /// Transition an item to `completed`, stamping `processed_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn mark_completed(&self, item: &ItemId) -> error::Result<()>;

    /// Transition an item to `failed`, recording the error message.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn mark_failed(&self, item: &ItemId, error_message: &str) -> error::Result<()>;

    /// Upsert the persisted result for an item.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn persist_result(&self, item: &ItemId, result: &ContactResult) -> error::Result<()>;

    /// All persisted results, ordered by item id for stable export.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn load_results(&self) -> error::Result<Vec<ContactResult>>;

    /// Begin a new run over `total` items, returning its unique ID.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn start_run(&self, total: u64) -> error::Result<i64>;

    /// Finalize a run with status and aggregate stats.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()>;

    /// Append an outcome audit record for an item within a run.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn record_outcome(&self, run_id: i64, outcome: &ItemOutcome) -> error::Result<()>;

    /// Append a per-item error against a run.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn append_run_error(&self, run_id: i64, error: &RunError) -> error::Result<()>;

    /// Errors recorded against a run, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn run_errors(&self, run_id: i64) -> error::Result<Vec<RunError>>;

    /// Current aggregate counts derived from item statuses.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn run_stats(&self) -> error::Result<RunStats>;

    /// Most recent runs, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn latest_runs(&self, limit: u64) -> error::Result<Vec<RunRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the trait is object-safe (can be used as `dyn ProgressStore`).
    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn ProgressStore) {}
    }
}
