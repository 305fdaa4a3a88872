//! Load command implementation.

use anyhow::{Context, Result};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tablestore::{decode, row_count, TableSet};

use super::open_storage;

/// Source of the table set to load
pub enum TableSource {
    FromFile(PathBuf),
    FromStdin,
}

impl TableSource {
    /// Read and decode the whole source.
    pub fn read(&self) -> Result<TableSet> {
        let bytes = match self {
            TableSource::FromFile(path) => {
                std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?
            }
            TableSource::FromStdin => {
                let mut bytes = Vec::new();
                io::stdin().lock().read_to_end(&mut bytes)?;
                bytes
            }
        };
        decode(&bytes).context("Input is not a table set")
    }
}

/// Write a table set to the configured back-end.
///
/// Replaces the stored set unless `merge` is set, in which case the input
/// tables replace same-named stored tables and everything else is kept.
pub async fn run_load(config: &Path, source: TableSource, merge: bool) -> Result<()> {
    let input = source.read()?;
    let storage = open_storage(config).await?;

    let data = if merge {
        let mut current = storage.read().await?;
        current.extend(input);
        current
    } else {
        input
    };

    storage.write(&data).await?;
    storage.close().await?;

    tracing::info!(
        "Loaded {} tables ({} rows) into {} storage",
        data.len(),
        row_count(&data),
        storage.backend_name()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(existing: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("db.json");
        std::fs::write(&data, existing).unwrap();
        let config = dir.path().join("store.toml");
        std::fs::write(
            &config,
            format!("[storage]\nbackend = \"file\"\npath = {:?}\n", data.display().to_string()),
        )
        .unwrap();
        (dir, config)
    }

    fn stored(dir: &TempDir) -> serde_json::Value {
        serde_json::from_slice(&std::fs::read(dir.path().join("db.json")).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_load_replaces() {
        let (dir, config) = setup(r#"{"old": {"1": {}}}"#);
        let input = dir.path().join("input.json");
        std::fs::write(&input, r#"{"new": {"1": {"a": 1}}}"#).unwrap();

        run_load(&config, TableSource::FromFile(input), false)
            .await
            .unwrap();
        assert_eq!(stored(&dir), serde_json::json!({"new": {"1": {"a": 1}}}));
    }

    #[tokio::test]
    async fn test_load_merge_keeps_other_tables() {
        let (dir, config) = setup(r#"{"old": {"1": {}}, "new": {"9": {}}}"#);
        let input = dir.path().join("input.json");
        std::fs::write(&input, r#"{"new": {"1": {"a": 1}}}"#).unwrap();

        run_load(&config, TableSource::FromFile(input), true)
            .await
            .unwrap();
        assert_eq!(
            stored(&dir),
            serde_json::json!({"new": {"1": {"a": 1}}, "old": {"1": {}}})
        );
    }

    #[test]
    fn test_rejects_non_table_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.json");
        std::fs::write(&input, r#"[1, 2, 3]"#).unwrap();
        assert!(TableSource::FromFile(input).read().is_err());
    }
}
