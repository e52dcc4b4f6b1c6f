pub mod check;
pub mod export;
pub mod run;
pub mod status;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use reachline_engine::config::{parser, validator, EngineConfig};
use reachline_state::{ProgressStore, SqliteProgressStore};

/// Parse and validate a config file, then open its progress store.
pub fn load_config_and_store(
    config_path: &Path,
) -> Result<(EngineConfig, Arc<dyn ProgressStore>)> {
    let config = parser::parse_config(config_path)
        .with_context(|| format!("Failed to parse config: {}", config_path.display()))?;
    validator::validate_config(&config)?;

    let store = SqliteProgressStore::open(Path::new(&config.state.connection))
        .with_context(|| format!("Failed to open progress store: {}", config.state.connection))?;
    Ok((config, Arc::new(store)))
}
