//! Migrate command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;
use tablestore::row_count;

use super::open_storage;

/// Copy the full table set from one back-end to another.
///
/// The target's previous content is replaced.
pub async fn run_migrate(from: &Path, to: &Path, dry_run: bool) -> Result<()> {
    let start = Instant::now();

    let source = open_storage(from).await.context("Opening source")?;
    let data = source.read().await?;
    source.close().await?;

    println!(
        "Read {} tables ({} rows) from {} storage",
        data.len(),
        row_count(&data),
        source.backend_name()
    );

    if dry_run {
        println!("Dry run: target not written");
        return Ok(());
    }

    let target = open_storage(to).await.context("Opening target")?;
    target.write(&data).await?;

    let written = target.read().await?;
    target.close().await?;
    if written != data {
        anyhow::bail!(
            "Target {} storage returned different content after write",
            target.backend_name()
        );
    }

    println!(
        "Migration complete: {} -> {} in {:.2}s",
        source.backend_name(),
        target.backend_name(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
