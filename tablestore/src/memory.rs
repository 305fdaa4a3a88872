//! In-memory storage backend.
//!
//! Volatile: everything is lost when the process exits. Useful for tests and
//! for databases that never need to outlive the process.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::table::{row_count, TableSet};
use crate::traits::TableStorage;

/// Process-local table set storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: RwLock<TableSet>,
}

impl MemoryStorage {
    /// Create an empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an in-memory storage holding `data`.
    pub fn with_data(data: TableSet) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Drop all held tables.
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

#[async_trait]
impl TableStorage for MemoryStorage {
    async fn read(&self) -> Result<TableSet> {
        Ok(self.data.read().clone())
    }

    #[instrument(skip(self, data), fields(tables = data.len()))]
    async fn write(&self, data: &TableSet) -> Result<()> {
        debug!("Replacing in-memory table set ({} rows)", row_count(data));
        *self.data.write() = data.clone();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tables(value: serde_json::Value) -> TableSet {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_new_is_empty() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.read().await.unwrap(), TableSet::new());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let storage = MemoryStorage::new();
        let data = tables(json!({"t": {"1": {"a": 1}}}));

        storage.write(&data).await.unwrap();
        assert_eq!(storage.read().await.unwrap(), data);

        storage.write(&TableSet::new()).await.unwrap();
        assert_eq!(storage.read().await.unwrap(), TableSet::new());
    }

    #[tokio::test]
    async fn test_write_replaces_wholesale() {
        let storage = MemoryStorage::with_data(tables(json!({
            "a": {"1": {"x": 1}},
            "b": {"1": {"y": 2}}
        })));

        let data = tables(json!({"b": {"2": {"y": 3}}}));
        storage.write(&data).await.unwrap();

        let read = storage.read().await.unwrap();
        assert!(!read.contains_key("a"));
        assert_eq!(read, data);
    }

    #[tokio::test]
    async fn test_read_returns_snapshot() {
        let storage = MemoryStorage::with_data(tables(json!({"t": {"1": {"a": 1}}})));

        let mut snapshot = storage.read().await.unwrap();
        snapshot.clear();

        // mutating the returned value does not touch held state
        assert_eq!(storage.read().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let storage = MemoryStorage::with_data(tables(json!({"t": {}})));
        storage.clear();
        assert!(storage.read().await.unwrap().is_empty());
    }
}
