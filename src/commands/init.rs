use anyhow::{bail, Result};
use std::path::Path;

use crate::config::Config;

pub async fn run(root: &Path, force: bool) -> Result<()> {
    if Config::is_initialized(root) && !force {
        bail!(
            "symdex is already initialized in {} (use --force to overwrite)",
            root.display()
        );
    }

    let config = Config::default();
    config.save(root)?;

    println!("Initialized symdex in {}", Config::symdex_dir(root).display());
    println!("Edit .symdex/config.toml to adjust extensions, ignore patterns, and the tagger path.");
    Ok(())
}
