//! Storage configuration.
//!
//! # Configuration Examples
//!
//! ## Memory
//!
//! ```toml
//! [storage]
//! backend = "memory"
//! ```
//!
//! ## JSON file
//!
//! ```toml
//! [storage]
//! backend = "file"
//! path = "./data/db.json"
//! create_dirs = true
//! access_mode = "r+"
//! ```
//!
//! ## Redis
//!
//! ```toml
//! [storage]
//! backend = "redis"
//! uri = "redis://localhost:6379/1"
//! key_prefix = "app:"
//! connection_timeout_secs = 5
//! ```
//!
//! ## S3 with a read cache
//!
//! ```toml
//! [storage]
//! backend = "s3"
//! bucket = "tables"
//! path = "app/db.json"
//! region = "us-east-1"
//! access_key_id = "AKIA..."
//! secret_access_key = "..."
//!
//! [cache]
//! ttl_secs = 600
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cached::{CacheConfig, CachedStorage, DEFAULT_TTL};
use crate::error::{Result, StorageError};
use crate::file::{FileOptions, FileStorage};
use crate::memory::MemoryStorage;
use crate::traits::TableStorage;

/// Connection parameters for S3 storage.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// Object key holding the table set
    pub path: String,
    /// AWS region
    pub region: String,
    /// Access key id
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Optional custom endpoint (for MinIO, etc.)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Use path-style requests (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Allow HTTP (non-HTTPS) connections
    #[serde(default)]
    pub allow_http: bool,
}

impl S3Config {
    /// Create a configuration for AWS S3.
    pub fn new(
        bucket: impl Into<String>,
        path: impl Into<String>,
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
            region: region.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            endpoint: None,
            force_path_style: false,
            allow_http: false,
        }
    }

    /// Point at an S3-compatible endpoint such as MinIO.
    ///
    /// Enables path-style requests, and plain HTTP when the endpoint uses it.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        self.allow_http = endpoint.starts_with("http://");
        self.force_path_style = true;
        self.endpoint = Some(endpoint);
        self
    }

    /// Check that every required field is set.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("bucket", &self.bucket),
            ("path", &self.path),
            ("region", &self.region),
            ("access_key_id", &self.access_key_id),
            ("secret_access_key", &self.secret_access_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(StorageError::Config(format!(
                    "S3 config field '{}' must not be empty",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("path", &self.path)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("force_path_style", &self.force_path_style)
            .field("allow_http", &self.allow_http)
            .finish()
    }
}

/// Backend selection, tagged by `backend`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Process-local storage
    #[default]
    Memory,
    /// JSON file
    File {
        /// Path of the JSON file
        path: PathBuf,
        /// Open options
        #[serde(flatten)]
        options: FileOptions,
    },
    /// One Redis key per table
    Redis {
        /// Connection URI, e.g. `redis://localhost:6379/1`
        uri: String,
        /// Prefix prepended to every table key; writes delete other keys
        /// under it
        #[serde(default)]
        key_prefix: String,
        /// Connection timeout in seconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        connection_timeout_secs: Option<u64>,
        /// Per-response timeout in seconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_timeout_secs: Option<u64>,
    },
    /// One S3 object for the whole table set
    S3(S3Config),
}

/// Read cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Entry lifetime in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        CacheConfig::with_ttl(Duration::from_secs(settings.ttl_secs))
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend to open
    #[serde(default)]
    pub storage: StorageConfig,
    /// Wrap the backend in a TTL read cache when present
    #[serde(default)]
    pub cache: Option<CacheSettings>,
}

impl StoreConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| StorageError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        debug!("Loaded config from {:?}", path);
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML text.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| StorageError::Config(e.to_string()))
    }
}

/// Create a storage backend from configuration.
///
/// Connects eagerly where the backend does (Redis). Backends whose feature
/// is not compiled in yield [`StorageError::Config`].
pub async fn create_storage(config: &StoreConfig) -> Result<Arc<dyn TableStorage>> {
    let storage = open_backend(&config.storage).await?;

    match &config.cache {
        Some(settings) => {
            debug!("Wrapping {} in read cache", storage.backend_name());
            Ok(Arc::new(CachedStorage::new(storage, settings.into())))
        }
        None => Ok(storage),
    }
}

async fn open_backend(config: &StorageConfig) -> Result<Arc<dyn TableStorage>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageConfig::File { path, options } => {
            Ok(Arc::new(FileStorage::open(path, options.clone()).await?))
        }
        #[cfg(feature = "redis")]
        StorageConfig::Redis {
            uri,
            key_prefix,
            connection_timeout_secs,
            response_timeout_secs,
        } => {
            use crate::redis::{RedisOptions, RedisStorage};

            let mut options = RedisOptions::default().with_key_prefix(key_prefix.clone());
            if let Some(secs) = connection_timeout_secs {
                options = options.with_connection_timeout(Duration::from_secs(*secs));
            }
            if let Some(secs) = response_timeout_secs {
                options = options.with_response_timeout(Duration::from_secs(*secs));
            }
            Ok(Arc::new(RedisStorage::connect(uri, options).await?))
        }
        #[cfg(not(feature = "redis"))]
        StorageConfig::Redis { .. } => Err(StorageError::Config(
            "Redis storage requires 'redis' feature".to_string(),
        )),
        #[cfg(feature = "s3")]
        StorageConfig::S3(s3_config) => Ok(Arc::new(crate::s3::S3Storage::new(s3_config.clone())?)),
        #[cfg(not(feature = "s3"))]
        StorageConfig::S3(_) => Err(StorageError::Config(
            "S3 storage requires 's3' feature".to_string(),
        )),
    }
}
