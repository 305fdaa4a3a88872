//! Redis storage backend.
//!
//! Each table is one Redis key holding the table's JSON text:
//!
//! ```text
//! {key_prefix}{table name}  ->  {"1": {...}, "2": {...}}
//! ```
//!
//! A write replaces the storage's key namespace: keys under the prefix whose
//! table is missing from the written set are deleted, the rest are
//! overwritten, all inside one `MULTI/EXEC`. `FLUSHDB` is never issued.
//!
//! The namespace is every key matching `{key_prefix}*`. With the default
//! empty prefix that is the whole logical database, so any write deletes
//! every key that is not one of the written tables. Set a prefix when the
//! database holds anything else.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::AsyncConnectionConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{Result, StorageError};
use crate::table::{decode_table, encode_table, TableSet};
use crate::traits::TableStorage;

/// Keys requested per SCAN round trip
const SCAN_COUNT: usize = 500;

/// Options for [`RedisStorage::connect`].
///
/// Everything else the client supports (database index, username,
/// password, TLS) is given in the connection URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisOptions {
    /// Prefix prepended to every table key.
    ///
    /// Writes delete keys under this prefix that are not written tables.
    /// Empty means the whole database belongs to this storage.
    pub key_prefix: String,
    /// Limit on establishing the connection
    pub connection_timeout: Option<Duration>,
    /// Limit on waiting for each response
    pub response_timeout: Option<Duration>,
}

impl RedisOptions {
    /// Namespace table keys under `prefix`.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Fail `connect` if the connection is not up within `timeout`.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Fail a command whose response takes longer than `timeout`.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    fn connection_config(&self) -> AsyncConnectionConfig {
        let mut config = AsyncConnectionConfig::new();
        if let Some(timeout) = self.connection_timeout {
            config = config.set_connection_timeout(timeout);
        }
        if let Some(timeout) = self.response_timeout {
            config = config.set_response_timeout(timeout);
        }
        config
    }
}

/// Mapping between table names and Redis keys.
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeySpace {
    prefix: String,
}

impl KeySpace {
    fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn key_for(&self, table: &str) -> String {
        format!("{}{}", self.prefix, table)
    }

    /// Table name stored at `key`, if `key` is in this namespace.
    fn table_name<'k>(&self, key: &'k str) -> Option<&'k str> {
        key.strip_prefix(self.prefix.as_str())
    }

    /// SCAN pattern matching every key in this namespace.
    fn pattern(&self) -> String {
        format!("{}*", escape_glob(&self.prefix))
    }

    /// Keys to delete so that only the tables of `data` remain.
    fn stale_keys(&self, keys: Vec<String>, data: &TableSet) -> Vec<String> {
        keys.into_iter()
            .filter(|key| {
                self.table_name(key)
                    .map_or(true, |name| !data.contains_key(name))
            })
            .collect()
    }

    /// `(key, JSON)` pairs for every table of `data`.
    fn encode(&self, data: &TableSet) -> Result<Vec<(String, String)>> {
        data.iter()
            .map(|(name, table)| Ok((self.key_for(name), encode_table(table)?)))
            .collect()
    }

    /// Rebuild a table set from scanned keys and their fetched values.
    ///
    /// A `None` value is a key deleted between SCAN and GET and is skipped.
    fn decode(&self, keys: &[String], values: Vec<Option<String>>) -> Result<TableSet> {
        let mut data = TableSet::new();
        for (key, value) in keys.iter().zip(values) {
            let (Some(name), Some(text)) = (self.table_name(key), value) else {
                continue;
            };
            data.insert(name.to_string(), decode_table(&text)?);
        }
        Ok(data)
    }
}

/// Redis storage backend.
pub struct RedisStorage {
    conn: Mutex<Option<MultiplexedConnection>>,
    keys: KeySpace,
}

impl RedisStorage {
    /// Connect to the server at `uri`, e.g. `redis://localhost:6379/1`.
    ///
    /// Fails immediately on a malformed URI or an unreachable server.
    #[instrument(skip(uri, options), fields(prefix = %options.key_prefix))]
    pub async fn connect(uri: &str, options: RedisOptions) -> Result<Self> {
        let client = redis::Client::open(uri)?;
        let conn = client
            .get_multiplexed_async_connection_with_config(&options.connection_config())
            .await?;
        debug!("Connected to redis");

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            keys: KeySpace::new(options.key_prefix),
        })
    }

    /// Get the key prefix.
    pub fn key_prefix(&self) -> &str {
        &self.keys.prefix
    }

    fn connection(&self) -> Result<MultiplexedConnection> {
        self.conn
            .lock()
            .clone()
            .ok_or(StorageError::Closed("redis"))
    }

    /// Collect every key under the prefix.
    ///
    /// SCAN may report a key more than once; the result is deduplicated.
    async fn scan_keys(&self, conn: &mut MultiplexedConnection) -> Result<Vec<String>> {
        let pattern = self.keys.pattern();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut *conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

/// Escape Redis glob metacharacters so a prefix matches literally.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStorage")
            .field("prefix", &self.keys.prefix)
            .field("connected", &self.conn.lock().is_some())
            .finish()
    }
}

#[async_trait]
impl TableStorage for RedisStorage {
    #[instrument(skip(self), fields(prefix = %self.keys.prefix))]
    async fn read(&self) -> Result<TableSet> {
        let mut conn = self.connection()?;
        let keys = self.scan_keys(&mut conn).await?;
        if keys.is_empty() {
            return Ok(TableSet::new());
        }

        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.get(key);
        }
        let values: Vec<Option<String>> = pipe.query_async(&mut conn).await?;
        debug!("Fetched {} table keys", keys.len());

        self.keys.decode(&keys, values)
    }

    #[instrument(skip(self, data), fields(prefix = %self.keys.prefix, tables = data.len()))]
    async fn write(&self, data: &TableSet) -> Result<()> {
        let entries = self.keys.encode(data)?;
        let mut conn = self.connection()?;
        let stale = self.keys.stale_keys(self.scan_keys(&mut conn).await?, data);

        if stale.is_empty() && entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        if !stale.is_empty() {
            debug!("Deleting {} stale table keys", stale.len());
            pipe.del(stale).ignore();
        }
        for (key, text) in entries {
            pipe.set(key, text).ignore();
        }
        pipe.exec_async(&mut conn).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.conn.lock().take().is_some() {
            debug!("Closed redis connection");
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tables(value: serde_json::Value) -> TableSet {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob(""), "");
        assert_eq!(escape_glob("app:"), "app:");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    #[test]
    fn test_options_default() {
        let options = RedisOptions::default();
        assert!(options.key_prefix.is_empty());
        assert_eq!(options.with_key_prefix("db:").key_prefix, "db:");
    }

    #[tokio::test]
    async fn test_connect_malformed_uri() {
        let err = RedisStorage::connect("definitely not a uri", RedisOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Redis(_)));
    }

    #[test]
    fn test_options_timeouts() {
        let options = RedisOptions::default()
            .with_connection_timeout(Duration::from_secs(2))
            .with_response_timeout(Duration::from_millis(500));
        assert_eq!(options.connection_timeout, Some(Duration::from_secs(2)));
        assert_eq!(options.response_timeout, Some(Duration::from_millis(500)));
        assert!(RedisOptions::default().connection_timeout.is_none());
    }

    #[test]
    fn test_key_mapping_with_prefix() {
        let keys = KeySpace::new("app:");
        assert_eq!(keys.key_for("users"), "app:users");
        assert_eq!(keys.table_name("app:users"), Some("users"));
        assert_eq!(keys.table_name("app:"), Some(""));
        assert_eq!(keys.table_name("other:users"), None);
        assert_eq!(keys.pattern(), "app:*");

        for name in ["users", "", "with space", "a:b:c", "ünïcode"] {
            assert_eq!(keys.table_name(&keys.key_for(name)), Some(name));
        }
    }

    #[test]
    fn test_key_mapping_without_prefix() {
        let keys = KeySpace::new("");
        assert_eq!(keys.key_for("users"), "users");
        assert_eq!(keys.table_name("users"), Some("users"));
        assert_eq!(keys.table_name("app:users"), Some("app:users"));
        assert_eq!(keys.pattern(), "*");
    }

    #[test]
    fn test_encode_decode_tables() {
        let data = tables(json!({
            "key1": {"1": {"value": "A"}},
            "key2": {"1": {"value": "B"}, "2": {"nested": {"x": [1, 2]}}},
            "empty": {}
        }));

        for prefix in ["", "app:"] {
            let keys = KeySpace::new(prefix);
            let entries = keys.encode(&data).unwrap();
            assert_eq!(entries.len(), 3);
            let key1 = (format!("{}key1", prefix), r#"{"1":{"value":"A"}}"#.to_string());
            assert!(entries.contains(&key1));

            let (names, values): (Vec<String>, Vec<Option<String>>) =
                entries.into_iter().map(|(k, v)| (k, Some(v))).unzip();
            assert_eq!(keys.decode(&names, values).unwrap(), data);
        }
    }

    #[test]
    fn test_decode_skips_vanished_and_foreign_keys() {
        let keys = KeySpace::new("app:");
        let scanned = vec![
            "app:gone".to_string(),
            "app:t".to_string(),
            "other:t".to_string(),
        ];
        let values = vec![
            None,
            Some(r#"{"1":{"a":1}}"#.to_string()),
            Some(r#"{"9":{}}"#.to_string()),
        ];

        let data = keys.decode(&scanned, values).unwrap();
        assert_eq!(data, tables(json!({"t": {"1": {"a": 1}}})));
    }

    #[test]
    fn test_decode_malformed_value() {
        let keys = KeySpace::new("");
        let err = keys
            .decode(&["t".to_string()], vec![Some("not json".to_string())])
            .unwrap_err();
        assert!(matches!(err, StorageError::Json(_)));
    }

    #[test]
    fn test_stale_keys() {
        let data = tables(json!({"b": {"2": {}}, "c": {}}));

        let keys = KeySpace::new("app:");
        let scanned = vec!["app:a".to_string(), "app:b".to_string(), "app:c".to_string()];
        assert_eq!(keys.stale_keys(scanned, &data), vec!["app:a".to_string()]);

        let keys = KeySpace::new("");
        let scanned = vec!["a".to_string(), "b".to_string(), "unrelated".to_string()];
        assert_eq!(
            keys.stale_keys(scanned, &data),
            vec!["a".to_string(), "unrelated".to_string()]
        );
    }

    #[test]
    fn test_stale_keys_for_empty_write() {
        let keys = KeySpace::new("app:");
        let scanned = vec!["app:a".to_string(), "app:b".to_string()];
        assert_eq!(keys.stale_keys(scanned.clone(), &TableSet::new()), scanned);
        assert!(keys.encode(&TableSet::new()).unwrap().is_empty());
    }

    // Integration tests require a running Redis - run with:
    // cargo test -p tablestore -- --ignored
    const TEST_URI: &str = "redis://127.0.0.1:6379/1";

    async fn connect(prefix: &str) -> RedisStorage {
        let storage = RedisStorage::connect(TEST_URI, RedisOptions::default().with_key_prefix(prefix))
            .await
            .unwrap();
        storage.write(&TableSet::new()).await.unwrap();
        storage
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_read_empty() {
        let storage = connect("tablestore-test-empty:").await;
        assert!(storage.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_write_and_read() {
        let storage = connect("tablestore-test-rw:").await;
        let data = tables(json!({
            "key1": {"1": {"value": "A"}},
            "key2": {"1": {"value": "B"}}
        }));

        storage.write(&data).await.unwrap();
        assert_eq!(storage.read().await.unwrap(), data);

        let mut conn = storage.connection().unwrap();
        let raw: String = redis::cmd("GET")
            .arg("tablestore-test-rw:key1")
            .query_async(&mut conn)
            .await
            .unwrap();
        assert_eq!(raw, r#"{"1":{"value":"A"}}"#);
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_write_replaces_namespace() {
        let storage = connect("tablestore-test-replace:").await;
        let neighbour = connect("tablestore-test-neighbour:").await;
        neighbour
            .write(&tables(json!({"kept": {"1": {"a": 1}}})))
            .await
            .unwrap();

        storage
            .write(&tables(json!({"a": {"1": {}}, "b": {"1": {}}})))
            .await
            .unwrap();
        storage.write(&tables(json!({"b": {"2": {}}}))).await.unwrap();

        let read = storage.read().await.unwrap();
        assert_eq!(read, tables(json!({"b": {"2": {}}})));

        storage.write(&TableSet::new()).await.unwrap();
        assert!(storage.read().await.unwrap().is_empty());

        // other namespaces survive an empty write
        assert_eq!(neighbour.read().await.unwrap().len(), 1);
        neighbour.write(&TableSet::new()).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_close() {
        let storage = connect("tablestore-test-close:").await;
        storage.close().await.unwrap();

        let err = storage.read().await.unwrap_err();
        assert!(matches!(err, StorageError::Closed("redis")));
    }
}
