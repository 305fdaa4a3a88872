//! Dump command implementation.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tablestore::{encode, TableSet};

use super::open_storage;

/// Print the table set (or a single table) as JSON.
pub async fn run_dump(
    config: &Path,
    table: Option<&str>,
    output: Option<PathBuf>,
    compact: bool,
) -> Result<()> {
    let storage = open_storage(config).await?;
    let mut data = storage.read().await?;
    storage.close().await?;

    if let Some(name) = table {
        let rows = data
            .remove(name)
            .with_context(|| format!("Table '{}' not found", name))?;
        data = TableSet::from([(name.to_string(), rows)]);
    }

    let mut bytes = encode(&data, !compact)?;
    bytes.push(b'\n');

    match output {
        Some(path) => {
            std::fs::write(&path, &bytes)
                .with_context(|| format!("Failed to write {:?}", path))?;
            tracing::info!("Wrote {} tables to {}", data.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }

    Ok(())
}
