use anyhow::Result;
use std::path::Path;

/// `container` subcommand: innermost symbol at a line.
pub async fn run(root: &Path, file: &Path, line: usize) -> Result<()> {
    let service = super::ready_service(root).await?;
    let file = if file.is_absolute() {
        file.to_path_buf()
    } else {
        root.join(file)
    };

    match service.container(&file, line).await? {
        Some(symbol) => {
            println!(
                "{} {} (lines {}-{})",
                symbol.kind.as_str(),
                symbol.fqn(),
                symbol.start_line,
                symbol.end_line
            );
        }
        None => println!("No symbol contains line {}", line),
    }

    service.dispose().await;
    Ok(())
}

/// `fqn` subcommand: fully qualified name of a named symbol.
pub async fn fqn(root: &Path, file: &Path, name: &str, line: usize) -> Result<()> {
    let service = super::ready_service(root).await?;
    let file = if file.is_absolute() {
        file.to_path_buf()
    } else {
        root.join(file)
    };

    match service.fully_qualified_name(&file, name, line).await? {
        Some(fqn) => println!("{}", fqn),
        None => println!("Symbol '{}' not found in {}", name, file.display()),
    }

    service.dispose().await;
    Ok(())
}
