use std::path::Path;

use anyhow::{Context, Result};

use reachline_engine::Engine;
use reachline_state::ProgressStore;

use crate::stages_builtin::{self, Seed};

/// Execute the `run` command: parse, validate, and run the pipeline.
pub async fn execute(config_path: &Path, items_path: &Path, resume_failed: bool) -> Result<()> {
    let (config, store) = super::load_config_and_store(config_path)?;
    let seed = Seed::from_path(items_path)?;

    tracing::info!(
        pipeline = %config.name,
        state = %config.state.connection,
        "Configuration validated"
    );

    if resume_failed {
        let requeued = store.requeue_failed().context("Failed to requeue failed items")?;
        if requeued > 0 {
            tracing::info!(requeued, "Requeued previously failed items");
        }
    }

    let pipeline_name = config.name.clone();
    let engine = Engine::new(config, store, stages_builtin::from_seed(seed));

    // Drain on interrupt: in-flight items finish, no further batch starts.
    let shutdown = engine.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, draining current batch");
            shutdown.request_stop();
        }
    });

    let report = engine.run().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("Pipeline '{}' finished: {}", pipeline_name, report.status);
    println!("  Items total:     {}", report.stats.total);
    println!("  Completed:       {}", report.stats.completed);
    println!("  Failed:          {}", report.stats.failed);
    println!("  Pending:         {}", report.stats.pending);
    println!("  Processed now:   {}", report.processed);
    println!("  Batches:         {}", report.batches);
    println!("  Duration:        {:.2}s", report.duration_secs);
    if !report.errors.is_empty() {
        println!("  Errors ({}):", report.errors.len());
        for error in report.errors.iter().take(10) {
            println!("    {}: {}", error.item_id, error.message);
        }
        if report.errors.len() > 10 {
            println!("    ... {} more", report.errors.len() - 10);
        }
    }

    // Machine-readable line for wrapping tooling
    let json = serde_json::json!({
        "run_id": report.run_id,
        "status": report.status,
        "total": report.stats.total,
        "completed": report.stats.completed,
        "failed": report.stats.failed,
        "pending": report.stats.pending,
        "processed": report.processed,
        "batches": report.batches,
        "duration_secs": report.duration_secs,
        "error_count": report.errors.len(),
    });
    println!("@@RUN_JSON@@{json}");

    Ok(())
}
