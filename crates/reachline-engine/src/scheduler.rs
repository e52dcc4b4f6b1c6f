//! Bounded-concurrency batch scheduler.
//!
//! Executes a per-item async handler over a work set in fixed-size batches:
//! at most `concurrency` handlers run simultaneously within a batch, a
//! batch fully settles before the next begins, and a fixed delay separates
//! batches to spread external-resource pressure over time (independent of
//! the rate limiter). One item's failure never aborts its siblings.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Duration;

use crate::errors::EngineError;

/// Scheduler knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Concurrency slots within a batch.
    pub concurrency: usize,
    /// Items per batch.
    pub batch_size: usize,
    /// Fixed pause between batches (not applied after the last).
    pub batch_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            batch_size: 50,
            batch_delay: Duration::from_secs(2),
        }
    }
}

/// Run `handler` for every item with bounded concurrency and batching.
///
/// Returns one result per item that was scheduled, in input order. Handler
/// panics are captured as [`EngineError::Infrastructure`] results for the
/// panicking item only. `should_continue` is consulted before each batch:
/// once it returns `false`, in-flight work has already settled (a batch is
/// never abandoned mid-flight) and the remaining batches are skipped.
///
/// # Errors
///
/// Returns an error only when scheduler plumbing itself fails (semaphore
/// closed); per-item handler failures are carried in the returned vector.
pub async fn run_in_batches<I, T, F, Fut>(
    items: Vec<I>,
    options: BatchOptions,
    mut should_continue: impl FnMut() -> bool,
    mut observe_batch: impl FnMut(usize, usize),
    handler: F,
) -> Result<Vec<(I, Result<T, EngineError>)>, EngineError>
where
    I: Clone + Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Clone + Send + 'static,
    Fut: std::future::Future<Output = Result<T, EngineError>> + Send + 'static,
{
    let concurrency = options.concurrency.max(1);
    let batch_size = options.batch_size.max(1);
    let batches_total = items.len().div_ceil(batch_size);

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut all_results: Vec<(I, Result<T, EngineError>)> = Vec::with_capacity(items.len());

    for (batch_index, batch) in items.chunks(batch_size).enumerate() {
        if !should_continue() {
            tracing::info!(
                batches_done = batch_index,
                batches_total,
                "Scheduler stopping before next batch"
            );
            break;
        }

        let mut join_set: JoinSet<(usize, Result<T, EngineError>)> = JoinSet::new();

        for (slot, item) in batch.iter().cloned().enumerate() {
            let permit = semaphore.clone().acquire_owned().await.map_err(|e| {
                EngineError::Infrastructure(anyhow::anyhow!("scheduler semaphore closed: {e}"))
            })?;
            let handler = handler.clone();
            join_set.spawn(async move {
                let _permit = permit;
                (slot, handler(item).await)
            });
        }

        let mut batch_results: Vec<Option<Result<T, EngineError>>> =
            (0..batch.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((slot, result)) => batch_results[slot] = Some(result),
                Err(join_err) => {
                    // A panicked handler loses its slot identity; surface it
                    // on the first unfilled slot rather than killing the run.
                    let err = EngineError::Infrastructure(anyhow::anyhow!(
                        "item handler panicked: {join_err}"
                    ));
                    if let Some(open) = batch_results.iter_mut().find(|r| r.is_none()) {
                        *open = Some(Err(err));
                    }
                }
            }
        }

        for (item, result) in batch.iter().cloned().zip(batch_results) {
            let result = result.unwrap_or_else(|| {
                Err(EngineError::Infrastructure(anyhow::anyhow!(
                    "item handler vanished without a result"
                )))
            });
            all_results.push((item, result));
        }

        observe_batch(batch_index, batches_total);

        let last = batch_index + 1 == batches_total;
        if !last && !options.batch_delay.is_zero() {
            tokio::time::sleep(options.batch_delay).await;
        }
    }

    Ok(all_results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn options(concurrency: usize, batch_size: usize, delay_ms: u64) -> BatchOptions {
        BatchOptions {
            concurrency,
            batch_size,
            batch_delay: Duration::from_millis(delay_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn all_items_settle_in_input_order() {
        let items: Vec<u32> = (0..10).collect();
        let results = run_in_batches(items.clone(), options(3, 4, 0), || true, |_, _| {}, |n| async move {
            Ok::<_, EngineError>(n * 2)
        })
        .await
        .unwrap();

        let ids: Vec<u32> = results.iter().map(|(i, _)| *i).collect();
        assert_eq!(ids, items);
        for (n, result) in &results {
            assert_eq!(*result.as_ref().unwrap(), n * 2);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let in_flight_h = in_flight.clone();
        let peak_h = peak.clone();
        run_in_batches((0..10).collect(), options(3, 5, 10), || true, |_, _| {}, move |_| {
            let in_flight = in_flight_h.clone();
            let peak = peak_h.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, EngineError>(())
            }
        })
        .await
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 3, "peak {peak:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_does_not_abort_siblings() {
        let results = run_in_batches((0..6).collect(), options(2, 3, 0), || true, |_, _| {}, |n| async move {
            if n == 2 {
                Err(EngineError::Infrastructure(anyhow::anyhow!("boom")))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();

        assert_eq!(results.len(), 6);
        let failures = results.iter().filter(|(_, r)| r.is_err()).count();
        assert_eq!(failures, 1);
        assert!(results.iter().all(|(n, r)| (*n == 2) == r.is_err()));
    }

    #[tokio::test(start_paused = true)]
    async fn batches_run_sequentially_with_delay_between() {
        // 10 items, batch 5 => 2 batches, delay applied once.
        let start = Instant::now();
        let mut observed = Vec::new();
        run_in_batches(
            (0..10).collect(),
            options(3, 5, 1_000),
            || true,
            |i, total| observed.push((i, total)),
            |_| async move { Ok::<_, EngineError>(()) },
        )
        .await
        .unwrap();

        assert_eq!(observed, vec![(0, 2), (1, 2)]);
        let elapsed = Instant::now().duration_since(start);
        assert!(elapsed >= Duration::from_millis(1_000), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(2_000), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn handler_panic_is_contained() {
        let results = run_in_batches(
            (0..3).collect(),
            options(2, 3, 0),
            || true,
            |_, _| {},
            |n: u32| async move {
                assert!(n != 1, "induced panic");
                Ok::<_, EngineError>(n)
            },
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 3);
        let failures = results.iter().filter(|(_, r)| r.is_err()).count();
        assert_eq!(failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_request_drains_current_batch_only() {
        // Stop after the first batch: its items settle, later batches never
        // start.
        let settled = Arc::new(AtomicUsize::new(0));
        let settled_h = settled.clone();
        let batches_done = std::cell::Cell::new(0usize);
        let results = run_in_batches(
            (0..9).collect(),
            options(2, 3, 0),
            || batches_done.get() == 0,
            |_, _| batches_done.set(batches_done.get() + 1),
            move |n: u32| {
                let settled = settled_h.clone();
                async move {
                    settled.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, EngineError>(n)
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(settled.load(Ordering::SeqCst), 3);
        assert_eq!(batches_done.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_input_yields_no_batches() {
        let mut batches = 0;
        let results = run_in_batches(
            Vec::<u32>::new(),
            BatchOptions::default(),
            || true,
            |_, _| batches += 1,
            |n| async move { Ok::<_, EngineError>(n) },
        )
        .await
        .unwrap();
        assert!(results.is_empty());
        assert_eq!(batches, 0);
    }
}
