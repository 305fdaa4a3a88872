//! End-to-end tests: configuration -> backend -> database -> reopen.

use serde_json::{json, Value};
use std::sync::Arc;
use tablestore::{
    create_storage, Database, Document, MemoryStorage, StorageError, StoreConfig, TableStorage,
    DEFAULT_TABLE,
};
use tempfile::TempDir;

fn doc(value: Value) -> Document {
    serde_json::from_value(value).unwrap()
}

fn file_config(temp: &TempDir, extra: &str) -> StoreConfig {
    let path = temp.path().join("nested").join("db.json");
    let toml = format!(
        "[storage]\nbackend = \"file\"\npath = {:?}\ncreate_dirs = true\n{}",
        path.display().to_string(),
        extra
    );
    StoreConfig::from_toml_str(&toml).unwrap()
}

#[tokio::test]
async fn test_file_database_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let config = file_config(&temp, "");

    let db = Database::open(create_storage(&config).await.unwrap())
        .await
        .unwrap();
    let users = db.table("users");
    users.insert(doc(json!({"name": "ada"}))).await.unwrap();
    users.insert(doc(json!({"name": "grace"}))).await.unwrap();
    db.default_table()
        .insert(doc(json!({"note": "hello"})))
        .await
        .unwrap();
    db.close().await.unwrap();

    let db = Database::open(create_storage(&config).await.unwrap())
        .await
        .unwrap();
    assert_eq!(db.tables().await, vec![DEFAULT_TABLE.to_string(), "users".to_string()]);

    let users = db.table("users");
    assert_eq!(users.len().await, 2);
    assert_eq!(users.get(2).await.unwrap()["name"], json!("grace"));
    assert_eq!(users.insert(doc(json!({}))).await.unwrap(), 3);
}

#[tokio::test]
async fn test_cached_file_backend() {
    let temp = TempDir::new().unwrap();
    let config = file_config(&temp, "\n[cache]\nttl_secs = 60\n");

    let storage = create_storage(&config).await.unwrap();
    assert_eq!(storage.backend_name(), "cached");

    let db = Database::open(storage.clone()).await.unwrap();
    db.table("t").insert(doc(json!({"a": 1}))).await.unwrap();

    // write-through: the cache and the file agree
    let read = storage.read().await.unwrap();
    assert_eq!(read["t"]["1"], doc(json!({"a": 1})));

    let on_disk: Value =
        serde_json::from_slice(&std::fs::read(temp.path().join("nested/db.json")).unwrap())
            .unwrap();
    assert_eq!(on_disk, json!({"t": {"1": {"a": 1}}}));
}

#[tokio::test]
async fn test_read_only_file_rejects_mutation() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db.json");
    std::fs::write(&path, r#"{"t": {"1": {"a": 1}}}"#).unwrap();

    let toml = format!(
        "[storage]\nbackend = \"file\"\npath = {:?}\naccess_mode = \"r\"\n",
        path.display().to_string()
    );
    let config = StoreConfig::from_toml_str(&toml).unwrap();
    let db = Database::open(create_storage(&config).await.unwrap())
        .await
        .unwrap();

    let err = db.table("t").remove(1).await.unwrap_err();
    assert!(matches!(err, StorageError::ReadOnly(_)));

    // state is unchanged after the failed write
    assert_eq!(db.table("t").len().await, 1);
}

#[tokio::test]
async fn test_migrate_between_backends() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemoryStorage::new());
    let db = Database::open(source.clone()).await.unwrap();
    db.table("a")
        .insert_multiple(vec![doc(json!({"x": 1})), doc(json!({"x": 2}))])
        .await
        .unwrap();

    let target = create_storage(&file_config(&temp, "")).await.unwrap();
    target.write(&source.read().await.unwrap()).await.unwrap();

    assert_eq!(target.read().await.unwrap(), source.read().await.unwrap());
}
