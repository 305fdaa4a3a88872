//! S3-compatible object storage backend.
//!
//! The whole table set is one JSON object at `(bucket, path)`. Uses the
//! `object_store` crate for S3, MinIO, and other S3-compatible services.
//!
//! # Configuration
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
//! # Optional: For MinIO or other S3-compatible services
//! endpoint = "http://localhost:9000"
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::S3Config;
use crate::error::{Result, StorageError};
use crate::table::{decode, encode, TableSet};
use crate::traits::TableStorage;

/// S3-compatible object storage backend.
#[derive(Clone)]
pub struct S3Storage {
    store: Arc<dyn ObjectStore>,
    location: ObjectPath,
}

impl S3Storage {
    /// Create a new S3 storage backend from configuration.
    ///
    /// Builds the client only; nothing is sent until the first read or write.
    pub fn new(config: S3Config) -> Result<Self> {
        config.validate()?;

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_allow_http(config.allow_http);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        if config.force_path_style {
            builder = builder.with_virtual_hosted_style_request(false);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        debug!("Configured s3://{}/{}", config.bucket, config.path);
        Ok(Self::from_store(Arc::new(store), &config.path))
    }

    /// Create from an existing ObjectStore instance.
    pub fn from_store(store: Arc<dyn ObjectStore>, path: &str) -> Self {
        Self {
            store,
            location: ObjectPath::from(path),
        }
    }

    /// Get the object key holding the table set.
    pub fn location(&self) -> &ObjectPath {
        &self.location
    }
}

/// Turn the outcome of a GET into a table set.
///
/// Not-found means nothing has been written yet; every other fault is
/// returned to the caller.
fn table_set_from(fetched: object_store::Result<Bytes>) -> Result<TableSet> {
    match fetched {
        Ok(bytes) => decode(&bytes),
        Err(object_store::Error::NotFound { .. }) => Ok(TableSet::new()),
        Err(e) => Err(StorageError::from(e)),
    }
}

impl fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Storage")
            .field("store", &self.store.to_string())
            .field("location", &self.location)
            .finish()
    }
}

#[async_trait]
impl TableStorage for S3Storage {
    #[instrument(skip(self), fields(location = %self.location))]
    async fn read(&self) -> Result<TableSet> {
        debug!("Reading from {}", self.location);

        let fetched = match self.store.get(&self.location).await {
            Ok(result) => result.bytes().await,
            Err(e) => Err(e),
        };
        table_set_from(fetched)
    }

    #[instrument(skip(self, data), fields(location = %self.location, tables = data.len()))]
    async fn write(&self, data: &TableSet) -> Result<()> {
        let bytes = Bytes::from(encode(data, false)?);
        debug!("Writing {} bytes to {}", bytes.len(), self.location);

        self.store
            .put(&self.location, PutPayload::from(bytes))
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}
