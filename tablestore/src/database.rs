//! Minimal embedded document database on top of a [`TableStorage`].
//!
//! The database hydrates its table set with one `read()` at open and issues
//! a full `write()` after every mutation. There is no query language: rows
//! are addressed by their numeric id.
//!
//! ```
//! use std::sync::Arc;
//! use tablestore::{Database, MemoryStorage};
//!
//! # async fn example() -> tablestore::Result<()> {
//! let db = Database::open(Arc::new(MemoryStorage::new())).await?;
//! let users = db.table("users");
//!
//! let mut row = serde_json::Map::new();
//! row.insert("name".into(), "ada".into());
//! let id = users.insert(row).await?;
//!
//! assert_eq!(id, 1);
//! assert_eq!(users.len().await, 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::{Result, StorageError};
use crate::table::{Document, Table, TableSet};
use crate::traits::TableStorage;

/// Name of the table returned by [`Database::default_table`].
pub const DEFAULT_TABLE: &str = "_default";

/// Document database persisting through a storage backend.
pub struct Database {
    storage: Arc<dyn TableStorage>,
    // Held across the storage write so mutations apply in order.
    tables: Mutex<TableSet>,
}

impl Database {
    /// Open a database, reading the current table set from `storage`.
    #[instrument(skip(storage), fields(backend = storage.backend_name()))]
    pub async fn open(storage: Arc<dyn TableStorage>) -> Result<Self> {
        let tables = storage.read().await?;
        debug!("Opened database with {} tables", tables.len());
        Ok(Self {
            storage,
            tables: Mutex::new(tables),
        })
    }

    /// Get the storage backend.
    pub fn storage(&self) -> &Arc<dyn TableStorage> {
        &self.storage
    }

    /// Get a handle to the named table. The table is created on first insert.
    pub fn table(&self, name: impl Into<String>) -> TableRef<'_> {
        TableRef {
            db: self,
            name: name.into(),
        }
    }

    /// Get a handle to the `_default` table.
    pub fn default_table(&self) -> TableRef<'_> {
        self.table(DEFAULT_TABLE)
    }

    /// Names of all tables.
    pub async fn tables(&self) -> Vec<String> {
        self.tables.lock().await.keys().cloned().collect()
    }

    /// Remove a table and all its rows. Returns whether it existed.
    pub async fn drop_table(&self, name: &str) -> Result<bool> {
        self.mutate(|tables| Ok(tables.remove(name).is_some())).await
    }

    /// Remove every table.
    pub async fn drop_tables(&self) -> Result<()> {
        self.mutate(|tables| {
            tables.clear();
            Ok(())
        })
        .await
    }

    /// Re-read the table set from storage, discarding the in-memory copy.
    pub async fn reload(&self) -> Result<()> {
        let mut tables = self.tables.lock().await;
        *tables = self.storage.read().await?;
        Ok(())
    }

    /// Close the storage backend.
    pub async fn close(&self) -> Result<()> {
        self.storage.close().await
    }

    /// Apply `f` to a copy of the table set and persist the result.
    ///
    /// The in-memory state only changes once the write succeeded. A copy
    /// equal to the current state is not written, and nothing is written
    /// when `f` fails.
    async fn mutate<R>(&self, f: impl FnOnce(&mut TableSet) -> Result<R>) -> Result<R> {
        let mut tables = self.tables.lock().await;
        let mut next = tables.clone();
        let out = f(&mut next)?;

        if next != *tables {
            self.storage.write(&next).await?;
            *tables = next;
        }
        Ok(out)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("storage", &self.storage.backend_name())
            .finish()
    }
}

/// Handle to one table of a [`Database`].
#[derive(Debug)]
pub struct TableRef<'a> {
    db: &'a Database,
    name: String,
}

impl TableRef<'_> {
    /// Get the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert a document, returning its id.
    ///
    /// Fails with [`StorageError::IdsExhausted`] when the table already
    /// holds the largest possible id.
    pub async fn insert(&self, document: Document) -> Result<u64> {
        let name = self.name.clone();
        self.db
            .mutate(move |tables| {
                let table = tables.entry(name.clone()).or_default();
                let id = next_id(table).ok_or(StorageError::IdsExhausted(name))?;
                table.insert(id.to_string(), document);
                Ok(id)
            })
            .await
    }

    /// Insert several documents with a single storage write.
    ///
    /// Either every document is inserted or none is.
    pub async fn insert_multiple(&self, documents: Vec<Document>) -> Result<Vec<u64>> {
        let name = self.name.clone();
        self.db
            .mutate(move |tables| {
                let table = tables.entry(name.clone()).or_default();
                let ids = next_ids(table, documents.len())
                    .ok_or(StorageError::IdsExhausted(name))?;
                for (id, document) in ids.iter().zip(documents) {
                    table.insert(id.to_string(), document);
                }
                Ok(ids)
            })
            .await
    }

    /// Get a document by id.
    pub async fn get(&self, id: u64) -> Option<Document> {
        let tables = self.db.tables.lock().await;
        tables.get(&self.name)?.get(&id.to_string()).cloned()
    }

    /// All documents, ordered by id.
    pub async fn all(&self) -> Vec<Document> {
        let tables = self.db.tables.lock().await;
        let Some(table) = tables.get(&self.name) else {
            return Vec::new();
        };

        let mut rows: Vec<(Option<u64>, &String, &Document)> = table
            .iter()
            .map(|(id, doc)| (id.parse().ok(), id, doc))
            .collect();
        rows.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        rows.into_iter().map(|(_, _, doc)| doc.clone()).collect()
    }

    /// Number of documents.
    pub async fn len(&self) -> usize {
        let tables = self.db.tables.lock().await;
        tables.get(&self.name).map_or(0, Table::len)
    }

    /// Whether the table holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Merge `fields` into the document with `id`. Returns whether it existed.
    pub async fn update(&self, id: u64, fields: Document) -> Result<bool> {
        let name = self.name.clone();
        self.db
            .mutate(move |tables| {
                let Some(row) = tables
                    .get_mut(&name)
                    .and_then(|table| table.get_mut(&id.to_string()))
                else {
                    return Ok(false);
                };
                row.extend(fields);
                Ok(true)
            })
            .await
    }

    /// Remove the document with `id`. Returns whether it existed.
    pub async fn remove(&self, id: u64) -> Result<bool> {
        let name = self.name.clone();
        self.db
            .mutate(move |tables| {
                Ok(tables
                    .get_mut(&name)
                    .is_some_and(|table| table.remove(&id.to_string()).is_some()))
            })
            .await
    }

    /// Remove every document, keeping the (empty) table.
    pub async fn truncate(&self) -> Result<()> {
        let name = self.name.clone();
        self.db
            .mutate(move |tables| {
                tables.insert(name, Table::new());
                Ok(())
            })
            .await
    }
}

/// Next free id: one past the largest numeric id in use.
fn next_id(table: &Table) -> Option<u64> {
    match table.keys().filter_map(|id| id.parse::<u64>().ok()).max() {
        Some(max) => max.checked_add(1),
        None => Some(1),
    }
}

/// `count` consecutive free ids, or `None` if they do not all fit in `u64`.
fn next_ids(table: &Table, count: usize) -> Option<Vec<u64>> {
    let first = next_id(table)?;
    if count > 0 {
        first.checked_add(u64::try_from(count - 1).ok()?)?;
    }
    Some((0..count as u64).map(|offset| first + offset).collect())
}
