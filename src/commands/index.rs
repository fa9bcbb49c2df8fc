use anyhow::Result;
use std::path::Path;

pub async fn run(root: &Path) -> Result<()> {
    let service = super::ready_service(root).await?;

    println!("{} files in the index", service.file_count());
    service.dispose().await;
    Ok(())
}
