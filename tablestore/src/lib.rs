//! Whole-table-set storage for embedded document databases.
//!
//! A database keeps every table in memory and hands the complete set to a
//! [`TableStorage`] backend whenever it changes. Backends only need to
//! persist and return one JSON-shaped value, so they are small and
//! interchangeable.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 ┌──────────┐                    │
//! │                 │ Database │                    │
//! │                 └────┬─────┘                    │
//! │                      ▼                          │
//! │            ┌─────────────────┐                  │
//! │            │  TableStorage   │  ← Unified trait │
//! │            └────────┬────────┘                  │
//! │                     │                           │
//! │   ┌─────────┬───────┼───────┬─────────┐         │
//! │   ▼         ▼       ▼       ▼         ▼         │
//! │ Memory    File    Redis    S3      Cached       │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Table Set Layout
//!
//! ```text
//! { "<table>": { "<doc id>": { ...document fields... } } }
//!
//! {"_default": {"1": {"name": "ada"}, "2": {"name": "grace"}}}
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use tablestore::{FileOptions, FileStorage, TableStorage};
//!
//! # async fn example() -> tablestore::Result<()> {
//! let storage = FileStorage::open("./data/db.json", FileOptions::default()).await?;
//!
//! let mut data = storage.read().await?;
//! data.entry("users".to_string()).or_default();
//! storage.write(&data).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # From Configuration
//!
//! ```ignore
//! use tablestore::{create_storage, Database, StoreConfig};
//!
//! let config = StoreConfig::load("tablestore.toml")?;
//! let db = Database::open(create_storage(&config).await?).await?;
//! db.table("users").insert(document).await?;
//! ```
//!
//! # Features
//!
//! - `redis` - Enable the Redis backend (requires `redis`)
//! - `s3` - Enable S3/object storage backend (requires `object_store`)
//! - `full` - Enable all features

mod cached;
mod config;
mod database;
mod error;
mod file;
mod memory;
mod table;
mod traits;

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "s3")]
mod s3;

pub use cached::{CacheConfig, CacheStats, CachedStorage, DEFAULT_TTL};
pub use config::{create_storage, CacheSettings, S3Config, StorageConfig, StoreConfig};
pub use database::{Database, TableRef, DEFAULT_TABLE};
pub use error::{Result, StorageError};
pub use file::{AccessMode, FileOptions, FileStorage};
pub use memory::MemoryStorage;
pub use table::{
    decode, decode_table, encode, encode_table, row_count, Document, Table, TableSet,
};
pub use traits::TableStorage;

#[cfg(feature = "redis")]
pub use self::redis::{RedisOptions, RedisStorage};

#[cfg(feature = "s3")]
pub use self::s3::S3Storage;
