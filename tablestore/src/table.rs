//! Table set data model and its JSON encoding.
//!
//! Every back-end moves the same shape around:
//!
//! ```text
//! TableSet = { table name -> Table }
//! Table    = { row id     -> Document }
//! Document = JSON object
//! ```
//!
//! ```
//! use tablestore::{decode, encode, TableSet};
//!
//! let data: TableSet = serde_json::from_str(r#"{"t": {"1": {"a": 1}}}"#).unwrap();
//! let bytes = encode(&data, false).unwrap();
//! assert_eq!(decode(&bytes).unwrap(), data);
//! ```

use std::collections::BTreeMap;

use crate::error::Result;

/// A single row: an arbitrary JSON object.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// One named table: row id to document.
pub type Table = BTreeMap<String, Document>;

/// The full collection of named tables held by a back-end.
pub type TableSet = BTreeMap<String, Table>;

/// Encode a table set as JSON.
pub fn encode(data: &TableSet, pretty: bool) -> Result<Vec<u8>> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(data)?
    } else {
        serde_json::to_vec(data)?
    };
    Ok(bytes)
}

/// Decode a table set from JSON.
///
/// An empty (or whitespace-only) body is the empty table set: a freshly
/// created file has no content yet.
pub fn decode(bytes: &[u8]) -> Result<TableSet> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(TableSet::new());
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// Encode a single table as a JSON string.
pub fn encode_table(table: &Table) -> Result<String> {
    Ok(serde_json::to_string(table)?)
}

/// Decode a single table from JSON text.
pub fn decode_table(text: &str) -> Result<Table> {
    Ok(serde_json::from_str(text)?)
}

/// Total number of rows across all tables.
pub fn row_count(data: &TableSet) -> usize {
    data.values().map(BTreeMap::len).sum()
}
