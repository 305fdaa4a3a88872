pub mod dump;
pub mod load;
pub mod migrate;
pub mod tables;

pub use dump::run_dump;
pub use load::{run_load, TableSource};
pub use migrate::run_migrate;
pub use tables::run_tables;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tablestore::{create_storage, StoreConfig, TableStorage};

/// Load a config file and open the back-end it describes.
pub async fn open_storage(config_path: &Path) -> Result<Arc<dyn TableStorage>> {
    let config = StoreConfig::load(config_path)
        .with_context(|| format!("Failed to load config {:?}", config_path))?;
    let storage = create_storage(&config)
        .await
        .with_context(|| format!("Failed to open storage from {:?}", config_path))?;
    tracing::debug!("Opened {} storage", storage.backend_name());
    Ok(storage)
}
