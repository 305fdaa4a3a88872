//! Core storage trait definition.
//!
//! The `TableStorage` trait is the whole contract between a document
//! database and its persistence layer: read the full table set, write the
//! full table set, optionally release resources.

use async_trait::async_trait;

use crate::error::Result;
use crate::table::TableSet;

/// Whole-table-set storage back-end.
///
/// # Contract
///
/// - `read` returns the complete table set, or an empty one when nothing has
///   been stored yet. A missing file, object or key set is never an error.
/// - `write` replaces the complete table set. There is no partial or
///   row-level access and no diffing.
/// - After `write(t)` succeeds, `read()` returns a value equal to `t`
///   (subject to a cache decorator's staleness window for out-of-band
///   writers).
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`. None of them coordinate with
/// other processes: concurrent writers race and the last write wins.
#[async_trait]
pub trait TableStorage: Send + Sync {
    /// Read the full table set.
    async fn read(&self) -> Result<TableSet>;

    /// Replace the full table set.
    async fn write(&self, data: &TableSet) -> Result<()>;

    /// Release any held connection or handle.
    ///
    /// The default does nothing.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Get a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;
}
