use anyhow::Result;
use std::path::Path;

use super::open_storage;

/// List table names with their row counts.
pub async fn run_tables(config: &Path) -> Result<()> {
    let storage = open_storage(config).await?;
    let data = storage.read().await?;
    storage.close().await?;

    if data.is_empty() {
        println!("No tables");
        return Ok(());
    }

    let width = data.keys().map(String::len).max().unwrap_or(0).max(5);
    println!("{:<width$}  {:>8}", "TABLE", "ROWS", width = width);
    println!("{}", "-".repeat(width + 10));
    for (name, table) in &data {
        println!("{:<width$}  {:>8}", name, table.len(), width = width);
    }

    Ok(())
}
