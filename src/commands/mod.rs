//! Thin CLI command wrappers over the service facade.

pub mod container;
pub mod index;
pub mod init;
pub mod search;
pub mod semantic;
pub mod stats;
pub mod watch;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::service::ContentIndexService;

/// Build and initialize a service for the given project root,
/// showing a spinner while the bulk scan runs.
pub async fn ready_service(root: &Path) -> Result<ContentIndexService> {
    let config = Config::load(root)?;
    let service = ContentIndexService::new(root.to_path_buf(), config);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.set_message("Indexing...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let report = service
        .initialize()
        .await
        .context("Failed to initialize the index")?;

    spinner.finish_with_message(format!(
        "Indexed {} files ({} failed)",
        report.indexed, report.failed
    ));

    Ok(service)
}
