mod commands;
mod logging;
mod stages_builtin;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "reachline",
    version,
    about = "Resilient contact acquisition pipeline for fixed entity populations"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over all unprocessed items
    Run {
        /// Path to engine config YAML file
        config: PathBuf,
        /// Seed file with the item population and recorded contacts
        #[arg(long)]
        items: PathBuf,
        /// Requeue previously failed items before running
        #[arg(long)]
        resume_failed: bool,
    },
    /// Validate engine configuration and storage reachability
    Check {
        /// Path to engine config YAML file
        config: PathBuf,
    },
    /// Show run history and current item counts
    Status {
        /// Path to engine config YAML file
        config: PathBuf,
        /// Number of historical runs to show
        #[arg(long, default_value_t = 10)]
        runs: u64,
    },
    /// Export persisted results as CSV
    Export {
        /// Path to engine config YAML file
        config: PathBuf,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { config, items, resume_failed } => {
            commands::run::execute(&config, &items, resume_failed).await
        }
        Commands::Check { config } => commands::check::execute(&config),
        Commands::Status { config, runs } => commands::status::execute(&config, runs),
        Commands::Export { config, output } => {
            commands::export::execute(&config, output.as_deref())
        }
    }
}
