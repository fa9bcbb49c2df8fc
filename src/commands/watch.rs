use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::service::ContentIndexService;

pub async fn run(root: &Path, debounce_ms: Option<u64>) -> Result<()> {
    let mut config = Config::load(root)?;
    if let Some(ms) = debounce_ms {
        config.watcher.debounce_ms = ms;
    }

    let service = ContentIndexService::new(root.to_path_buf(), config);
    let report = service
        .initialize()
        .await
        .context("Failed to initialize the index")?;
    println!(
        "Indexed {} files ({} failed), watching for changes. Press Ctrl+C to stop.",
        report.indexed, report.failed
    );

    let mut handle = service.spawn_watcher()?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    println!("\nShutting down...");

    handle.shutdown();
    let stats = handle.wait().await?;

    println!(
        "{} files re-indexed, {} removed, {} errors",
        stats.reindexed, stats.removed, stats.errors
    );

    service.dispose().await;
    Ok(())
}
