use std::path::Path;

use anyhow::Result;

use reachline_state::ProgressStore;

/// Execute the `check` command: validate config and storage reachability.
pub fn execute(config_path: &Path) -> Result<()> {
    let (config, store) = super::load_config_and_store(config_path)?;

    let stats = store.run_stats()?;

    println!("Configuration OK: '{}'", config.name);
    println!("  State:             {}", config.state.connection);
    println!("  Items recorded:    {}", stats.total);
    println!("  Concurrency:       {}", config.limits.concurrency);
    println!("  Batch size:        {}", config.limits.batch_size);
    println!(
        "  Rate:              {}/s global, {}/s per domain",
        config.rate.global_refill_per_sec, config.rate.domain_refill_per_sec
    );
    println!(
        "  Retry:             {} retries, {}ms initial delay",
        config.retry.max_retries, config.retry.initial_delay_ms
    );
    println!(
        "  Breaker:           threshold {}, cooldown {}ms",
        config.breaker.threshold, config.breaker.timeout_ms
    );

    Ok(())
}
