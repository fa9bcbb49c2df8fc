use anyhow::Result;
use std::path::Path;

pub async fn run(root: &Path) -> Result<()> {
    let service = super::ready_service(root).await?;
    let cache = service.cache()?;

    println!("State:        {}", service.state().name());
    println!("Files:        {}", cache.file_count());
    println!("Failed files: {}", cache.failed_count());

    let paths = cache.all_paths(None, None);
    let mut by_extension = std::collections::BTreeMap::new();
    for path in &paths {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("(none)")
            .to_string();
        *by_extension.entry(ext).or_insert(0usize) += 1;
    }

    if !by_extension.is_empty() {
        println!("\nBy extension:");
        for (ext, count) in by_extension {
            println!("  {:8} {}", ext, count);
        }
    }

    service.dispose().await;
    Ok(())
}
