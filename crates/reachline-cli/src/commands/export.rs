use std::path::Path;

use anyhow::{Context, Result};

use reachline_engine::export::export_csv;
use reachline_state::ProgressStore;

/// Execute the `export` command: render persisted results as CSV.
pub fn execute(config_path: &Path, output: Option<&Path>) -> Result<()> {
    let (config, store) = super::load_config_and_store(config_path)?;

    let results = store.load_results()?;
    let csv = export_csv(&results);

    match output {
        Some(path) => {
            std::fs::write(path, &csv)
                .with_context(|| format!("Failed to write export: {}", path.display()))?;
            tracing::info!(
                pipeline = %config.name,
                results = results.len(),
                output = %path.display(),
                "Export written"
            );
        }
        None => print!("{csv}"),
    }

    Ok(())
}
