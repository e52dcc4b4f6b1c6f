//! Pipeline driver: composes the rate limiter, retry/circuit-breaker
//! wrappers, batch scheduler, and progress store with externally supplied
//! stages to process every unprocessed item end-to-end.
//!
//! Run lifecycle: `Initializing` loads the item population (from the loader
//! on first run, otherwise the store) and persists a new run record;
//! `Running` feeds unprocessed items through the scheduler. A per-item
//! failure marks that item `failed` and never aborts its batch; only
//! initialization errors, run-record persistence failures, fatal stage
//! classes (config/storage), and an explicit interrupt end the run early.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Semaphore};

use reachline_state::{ProgressStore, StateError};
use reachline_types::item::{
    Candidate, ContactResult, ItemId, ItemStatus, VerifyStatus, WorkItem,
};
use reachline_types::state::{ItemOutcome, RunError, RunStatus};

use crate::breaker::CircuitBreaker;
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::limiter::RateLimiter;
use crate::report::RunReport;
use crate::retry::{with_retry, RetryPolicy};
use crate::scheduler::run_in_batches;
use crate::stages::{
    AcquireStage, EnrichStage, FallbackStage, ItemLoader, PipelineStages, VerifyStage,
};

/// Requests a graceful stop: the current batch drains, no further batch
/// starts, and the run is finalized as `stopped`.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Signal the engine to stop after the current batch.
    pub fn request_stop(&self) {
        let _ = self.tx.send(true);
    }
}

/// Shared per-run context handed to every item handler.
struct ItemContext {
    store: Arc<dyn ProgressStore>,
    stages: Arc<PipelineStages>,
    limiter: RateLimiter,
    acquire_breaker: CircuitBreaker,
    verify_breaker: CircuitBreaker,
    verify_semaphore: Semaphore,
    acquire_policy: RetryPolicy,
    verify_policy: RetryPolicy,
    reverify_enabled: bool,
    reverify_delay: std::time::Duration,
    run_id: i64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// The batch orchestration engine.
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn ProgressStore>,
    stages: Arc<PipelineStages>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Engine {
    /// Wire an engine from validated config, an opened store, and a stage
    /// set.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ProgressStore>,
        stages: PipelineStages,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            store,
            stages: Arc::new(stages),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Handle for requesting a graceful stop from outside the run.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Execute one run over the unprocessed item set.
    ///
    /// # Errors
    ///
    /// Returns an error on initialization failure, run-record persistence
    /// failure, or the first fatal (config/storage) stage error. Per-item
    /// failures are recorded in the report, not returned as errors.
    pub async fn run(mut self) -> Result<RunReport, EngineError> {
        let started = Instant::now();
        tracing::info!(pipeline = %self.config.name, "Initializing run");

        let items = self.initialize().await?;
        let total = store_call(&self.store, "run_stats", |s| s.run_stats())
            .await?
            .total;
        let run_id =
            store_call(&self.store, "start_run", move |s| s.start_run(total)).await?;

        tracing::info!(
            pipeline = %self.config.name,
            run_id,
            total,
            unprocessed = items.len(),
            concurrency = self.config.limits.concurrency,
            batch_size = self.config.limits.batch_size,
            "Starting batch execution"
        );

        let ctx = Arc::new(ItemContext {
            store: self.store.clone(),
            stages: self.stages.clone(),
            limiter: RateLimiter::new(self.config.rate.limiter_config()),
            acquire_breaker: CircuitBreaker::new(
                "acquire",
                self.config.breaker.threshold,
                self.config.breaker.timeout(),
            ),
            verify_breaker: CircuitBreaker::new(
                "verify",
                self.config.breaker.threshold,
                self.config.breaker.timeout(),
            ),
            verify_semaphore: Semaphore::new(self.config.limits.verify_concurrency),
            acquire_policy: self.config.retry.policy(),
            verify_policy: self.config.verify_retry.policy(),
            reverify_enabled: self.config.reverify.enabled,
            reverify_delay: std::time::Duration::from_millis(self.config.reverify.delay_ms),
            run_id,
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        let processed = items.len() as u64;
        let shutdown_rx = self.shutdown_rx.clone();
        let observe_ctx = ctx.clone();
        let mut batches_run = 0usize;

        let handler_ctx = ctx.clone();
        let results = run_in_batches(
            items,
            self.config.limits.batch_options(),
            move || !*shutdown_rx.borrow(),
            |batch_index, batches_total| {
                batches_run += 1;
                tracing::info!(
                    run_id,
                    batch = batch_index + 1,
                    batches_total,
                    completed = observe_ctx.completed.load(Ordering::Relaxed),
                    failed = observe_ctx.failed.load(Ordering::Relaxed),
                    "Batch settled"
                );
            },
            move |item: WorkItem| {
                let ctx = handler_ctx.clone();
                async move { handle_item(&ctx, item).await }
            },
        )
        .await?;

        let interrupted = *self.shutdown_rx.borrow();

        // Fatal stage classes abort the run once the batch has settled.
        let first_fatal = results
            .into_iter()
            .filter_map(|(_, result)| result.err())
            .find(EngineError::is_fatal_to_run);

        let stats =
            store_call(&self.store, "run_stats", |s| s.run_stats()).await?;

        if let Some(err) = first_fatal {
            tracing::error!(run_id, error = %err, "Fatal error, failing run");
            store_call(&self.store, "complete_run", move |s| {
                s.complete_run(run_id, RunStatus::Failed, &stats)
            })
            .await?;
            return Err(err);
        }

        let status = if interrupted && !stats.is_settled() {
            RunStatus::Stopped
        } else {
            RunStatus::Completed
        };
        store_call(&self.store, "complete_run", move |s| {
            s.complete_run(run_id, status, &stats)
        })
        .await?;

        let errors =
            store_call(&self.store, "run_errors", move |s| s.run_errors(run_id)).await?;
        let duration_secs = started.elapsed().as_secs_f64();

        tracing::info!(
            run_id,
            status = %status,
            completed = stats.completed,
            failed = stats.failed,
            duration_secs,
            "Run finished"
        );

        Ok(RunReport {
            run_id,
            status,
            stats,
            processed,
            batches: batches_run,
            duration_secs,
            errors,
        })
    }

    /// Load the population on first run; compute the unprocessed set.
    async fn initialize(&mut self) -> Result<Vec<WorkItem>, EngineError> {
        let count = store_call(&self.store, "item_count", |s| s.item_count()).await?;
        if count == 0 {
            let loaded = self
                .stages
                .loader
                .load()
                .await
                .map_err(EngineError::Stage)?;
            tracing::info!(items = loaded.len(), "Loaded initial item population");
            let inserted = store_call(&self.store, "insert_items", move |s| {
                s.insert_items(&loaded)
            })
            .await?;
            tracing::info!(inserted, "Recorded item population");
        }

        store_call(&self.store, "load_unprocessed", |s| s.load_unprocessed())
            .await
            .map_err(Into::into)
    }
}

/// Run a blocking store operation off the async runtime.
async fn store_call<T, F>(
    store: &Arc<dyn ProgressStore>,
    op: &'static str,
    f: F,
) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: FnOnce(&dyn ProgressStore) -> Result<T, StateError> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| EngineError::Infrastructure(anyhow::anyhow!("{op} task panicked: {e}")))?
        .map_err(EngineError::from)
}

/// Process one item and record its outcome; never lets an error escape to
/// the batch.
async fn handle_item(ctx: &ItemContext, item: WorkItem) -> Result<(), EngineError> {
    let started = Instant::now();
    let item_id = item.id.clone();

    store_call(&ctx.store, "mark_processing", {
        let id = item_id.clone();
        move |s| s.mark_processing(&id)
    })
    .await?;

    match process_item(ctx, &item).await {
        Ok(result) => {
            let candidate_count = result.candidates.len();
            let fallback_used = result.fallback_used;
            store_call(&ctx.store, "persist_result", {
                let id = item_id.clone();
                move |s| s.persist_result(&id, &result)
            })
            .await?;
            store_call(&ctx.store, "mark_completed", {
                let id = item_id.clone();
                move |s| s.mark_completed(&id)
            })
            .await?;
            record_outcome_best_effort(
                ctx,
                &item_id,
                ItemStatus::Completed,
                started,
                serde_json::json!({
                    "candidates": candidate_count,
                    "fallback_used": fallback_used,
                }),
            )
            .await;
            ctx.completed.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        Err(err) => {
            let message = err.to_string();
            tracing::warn!(item = %item_id, error = %message, "Item failed");

            // Recording the failure is best-effort: a store error here must
            // not mask the original failure.
            let marked = store_call(&ctx.store, "mark_failed", {
                let id = item_id.clone();
                let message = message.clone();
                move |s| s.mark_failed(&id, &message)
            })
            .await;
            if let Err(store_err) = marked {
                tracing::error!(item = %item_id, error = %store_err, "Failed to record item failure");
            }
            let appended = store_call(&ctx.store, "append_run_error", {
                let run_id = ctx.run_id;
                let error = RunError {
                    item_id: item_id.clone(),
                    message,
                    timestamp: chrono::Utc::now().to_rfc3339(),
                };
                move |s| s.append_run_error(run_id, &error)
            })
            .await;
            if let Err(store_err) = appended {
                tracing::error!(item = %item_id, error = %store_err, "Failed to append run error");
            }
            record_outcome_best_effort(ctx, &item_id, ItemStatus::Failed, started, serde_json::Value::Null)
                .await;
            ctx.failed.fetch_add(1, Ordering::Relaxed);
            Err(err)
        }
    }
}

async fn record_outcome_best_effort(
    ctx: &ItemContext,
    item_id: &ItemId,
    status: ItemStatus,
    started: Instant,
    details: serde_json::Value,
) {
    let outcome = ItemOutcome {
        item_id: item_id.clone(),
        status,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        details: if details.is_null() { None } else { Some(details) },
    };
    let run_id = ctx.run_id;
    let recorded = store_call(&ctx.store, "record_outcome", move |s| {
        s.record_outcome(run_id, &outcome)
    })
    .await;
    if let Err(err) = recorded {
        tracing::error!(item = %item_id, error = %err, "Failed to record outcome");
    }
}

/// One item through acquire → (fallback) → enrich → verify.
async fn process_item(ctx: &ItemContext, item: &WorkItem) -> Result<ContactResult, EngineError> {
    ctx.limiter.acquire(Some(item.resource_key.as_str())).await;

    // `Blocked` is a healthy stage's answer for a hostile site, so it is
    // mapped out before the breaker counts failures: only genuine
    // dependency trouble (exhausted transient retries, internal errors)
    // moves breaker state.
    let acquired = ctx
        .acquire_breaker
        .execute(|| async {
            let attempt = with_retry(
                ctx.acquire_policy,
                |err, attempt| {
                    tracing::warn!(
                        item = %item.id,
                        attempt,
                        category = %err.category,
                        "Acquisition retry"
                    );
                },
                || ctx.stages.acquire.acquire(item),
            )
            .await;
            match attempt {
                Ok(candidates) => Ok(Some(candidates)),
                Err(err) if err.is_blocked() => Ok(None),
                Err(err) => Err(err),
            }
        })
        .await;

    let (candidates, fallback_used) = match acquired {
        Ok(Some(candidates)) => (candidates, false),
        Ok(None) => {
            // Documented policy: a blocked item is not an error. Pattern
            // guesses are substituted at lower confidence and the item
            // still completes.
            tracing::info!(item = %item.id, "Acquisition blocked, using pattern fallback");
            (ctx.stages.fallback.guess(item), true)
        }
        Err(err) => return Err(EngineError::Stage(err)),
    };

    let candidates = ctx.stages.enrich.enrich(candidates, item);

    let mut verified = Vec::with_capacity(candidates.len());
    for mut candidate in candidates {
        candidate.verify_status = verify_candidate(ctx, &candidate).await?;
        verified.push(candidate);
    }

    // Bounded in-run re-verification: one extra pass for greylisted
    // candidates after a fixed delay.
    if ctx.reverify_enabled
        && verified
            .iter()
            .any(|c| c.verify_status == VerifyStatus::TransientReject)
    {
        tracing::info!(item = %item.id, "Re-verifying transiently rejected candidates");
        tokio::time::sleep(ctx.reverify_delay).await;
        for candidate in &mut verified {
            if candidate.verify_status == VerifyStatus::TransientReject {
                candidate.verify_status = verify_candidate(ctx, candidate).await?;
            }
        }
    }

    let best = pick_best(&verified);
    Ok(ContactResult {
        item_id: item.id.clone(),
        candidates: verified,
        best,
        fallback_used,
    })
}

/// Verify one candidate under the verify concurrency limit, breaker, and
/// retry policy. Non-fatal verification errors degrade to `Unverified`.
async fn verify_candidate(
    ctx: &ItemContext,
    candidate: &Candidate,
) -> Result<VerifyStatus, EngineError> {
    let _permit = ctx.verify_semaphore.acquire().await.map_err(|e| {
        EngineError::Infrastructure(anyhow::anyhow!("verify semaphore closed: {e}"))
    })?;

    let result = ctx
        .verify_breaker
        .execute(|| {
            with_retry(
                ctx.verify_policy,
                |err, attempt| {
                    tracing::warn!(
                        address = %candidate.address,
                        attempt,
                        category = %err.category,
                        "Verification retry"
                    );
                },
                || ctx.stages.verify.verify(candidate),
            )
        })
        .await;

    match result {
        Ok(status) => Ok(status),
        Err(err) if err.is_fatal_to_run() => Err(EngineError::Stage(err)),
        Err(err) => {
            tracing::warn!(
                address = %candidate.address,
                error = %err,
                "Verification unavailable, leaving candidate unverified"
            );
            Ok(VerifyStatus::Unverified)
        }
    }
}

/// Rank candidates: verified beats unverified/greylisted, invalid is
/// excluded, confidence breaks ties.
fn pick_best(candidates: &[Candidate]) -> Option<Candidate> {
    candidates
        .iter()
        .filter(|c| c.verify_status != VerifyStatus::Invalid)
        .max_by_key(|c| {
            let status_rank = match c.verify_status {
                VerifyStatus::Verified => 2u8,
                VerifyStatus::Unverified | VerifyStatus::TransientReject => 1,
                VerifyStatus::Invalid => 0,
            };
            (status_rank, c.confidence)
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reachline_types::item::{CandidateSource, Confidence};

    fn candidate(addr: &str, conf: Confidence, status: VerifyStatus) -> Candidate {
        let mut c = Candidate::new(addr, conf, CandidateSource::Scraped);
        c.verify_status = status;
        c
    }

    #[test]
    fn pick_best_prefers_verified_over_confidence() {
        let candidates = vec![
            candidate("hi@x.org", Confidence::High, VerifyStatus::Unverified),
            candidate("lo@x.org", Confidence::Low, VerifyStatus::Verified),
        ];
        assert_eq!(pick_best(&candidates).unwrap().address, "lo@x.org");
    }

    #[test]
    fn pick_best_breaks_ties_by_confidence() {
        let candidates = vec![
            candidate("a@x.org", Confidence::Low, VerifyStatus::Verified),
            candidate("b@x.org", Confidence::High, VerifyStatus::Verified),
        ];
        assert_eq!(pick_best(&candidates).unwrap().address, "b@x.org");
    }

    #[test]
    fn pick_best_excludes_invalid() {
        let candidates = vec![
            candidate("bad@x.org", Confidence::High, VerifyStatus::Invalid),
        ];
        assert!(pick_best(&candidates).is_none());
    }

    #[test]
    fn pick_best_accepts_greylisted_as_usable() {
        let candidates = vec![
            candidate("grey@x.org", Confidence::Medium, VerifyStatus::TransientReject),
        ];
        assert_eq!(pick_best(&candidates).unwrap().address, "grey@x.org");
    }
}
