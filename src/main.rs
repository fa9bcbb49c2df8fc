use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use symdex::cli::{Cli, Commands};
use symdex::config::Config;
use symdex::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let config = Config::load(&project_root).unwrap_or_default();

    // The guard must be held until exit so pending logs are flushed
    let _logging_guard = init_logging(&config.logging, &project_root)?;

    tracing::info!("symdex starting up");

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            symdex::commands::init::run(&project_root, force).await?;
        }
        Commands::Index => {
            symdex::commands::index::run(&project_root).await?;
        }
        Commands::Search {
            query,
            include,
            exclude,
        } => {
            symdex::commands::search::run(&project_root, &query, include, exclude).await?;
        }
        Commands::Container { file, line } => {
            symdex::commands::container::run(&project_root, &file, line).await?;
        }
        Commands::Fqn { file, name, line } => {
            symdex::commands::container::fqn(&project_root, &file, &name, line).await?;
        }
        Commands::Semantic { query, top_k } => {
            symdex::commands::semantic::run(&project_root, &query, top_k).await?;
        }
        Commands::Watch { debounce_ms } => {
            symdex::commands::watch::run(&project_root, debounce_ms).await?;
        }
        Commands::Stats => {
            symdex::commands::stats::run(&project_root).await?;
        }
    }

    Ok(())
}
