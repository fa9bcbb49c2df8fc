use anyhow::Result;
use std::path::Path;

pub async fn run(root: &Path, query: &str, top_k: usize) -> Result<()> {
    let service = super::ready_service(root).await?;

    let hits = service.search_embeddings(query, top_k, None).await?;

    if hits.is_empty() {
        println!("No semantic results (is the embedding backend configured and running?)");
    } else {
        for hit in &hits {
            println!(
                "{:.3}  {}:{}-{}",
                hit.score,
                hit.path.display(),
                hit.start_line,
                hit.end_line
            );
        }
    }

    service.dispose().await;
    Ok(())
}
