use anyhow::Result;
use std::path::Path;

pub async fn run(
    root: &Path,
    query: &str,
    include: Vec<String>,
    exclude: Vec<String>,
) -> Result<()> {
    let service = super::ready_service(root).await?;

    let include = (!include.is_empty()).then_some(include);
    let exclude = (!exclude.is_empty()).then_some(exclude);

    let matches = service
        .document_matches(query, include.as_deref(), exclude.as_deref(), None)
        .await?;

    if matches.results.is_empty() {
        println!("No matches for '{}'", query);
    } else {
        for result in &matches.results {
            println!("{}:{}: {}", result.path.display(), result.line, result.text);
        }
        println!("\n{} matching lines", matches.results.len());
    }

    if matches.failed_files > 0 {
        eprintln!("{} files could not be searched", matches.failed_files);
    }

    service.dispose().await;
    Ok(())
}
