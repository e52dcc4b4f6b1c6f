use std::path::Path;

use anyhow::Result;

use reachline_state::ProgressStore;

/// Execute the `status` command: show item counts and run history.
pub fn execute(config_path: &Path, runs: u64) -> Result<()> {
    let (config, store) = super::load_config_and_store(config_path)?;

    let stats = store.run_stats()?;
    println!("Pipeline '{}'", config.name);
    println!(
        "  Items: {} total ({} completed, {} failed, {} processing, {} pending)",
        stats.total, stats.completed, stats.failed, stats.processing, stats.pending
    );

    let history = store.latest_runs(runs)?;
    if history.is_empty() {
        println!("  No runs recorded yet.");
        return Ok(());
    }

    println!("  Recent runs:");
    for run in history {
        let finished = run.finished_at.as_deref().unwrap_or("-");
        println!(
            "    #{:<4} {:<9} started {} finished {} ({} completed, {} failed)",
            run.run_id,
            run.status.as_str(),
            run.started_at,
            finished,
            run.stats.completed,
            run.stats.failed,
        );
    }

    Ok(())
}
