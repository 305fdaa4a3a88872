//! JSON file storage backend.
//!
//! The whole table set lives in one JSON text file. Writes go to a sibling
//! `.tmp` file which is synced and then renamed over the target, so readers
//! never observe a half-written file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::error::{Result, StorageError};
use crate::table::{decode, encode, TableSet};
use crate::traits::TableStorage;

/// How the backing file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AccessMode {
    /// `"r"`: read only; writes fail with [`StorageError::ReadOnly`].
    ReadOnly,
    /// `"r+"`: read and write, keep existing content.
    #[default]
    ReadWrite,
    /// `"w"` / `"w+"`: read and write, truncate existing content at open.
    Truncate,
}

impl AccessMode {
    /// Whether writes are permitted.
    pub fn is_writable(self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }

    /// The mode string this variant is usually spelled as.
    pub fn as_str(self) -> &'static str {
        match self {
            AccessMode::ReadOnly => "r",
            AccessMode::ReadWrite => "r+",
            AccessMode::Truncate => "w+",
        }
    }
}

impl FromStr for AccessMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(AccessMode::ReadOnly),
            "r+" => Ok(AccessMode::ReadWrite),
            "w" | "w+" => Ok(AccessMode::Truncate),
            other => Err(StorageError::Config(format!(
                "Unsupported access mode: '{}'. Use 'r', 'r+', 'w' or 'w+'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for AccessMode {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<AccessMode> for String {
    fn from(mode: AccessMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for [`FileStorage::open`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOptions {
    /// Create missing parent directories
    pub create_dirs: bool,
    /// Text encoding of the file; `None` means UTF-8
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// File access mode
    pub access_mode: AccessMode,
    /// Pretty-print JSON on write
    pub pretty: bool,
}

impl FileOptions {
    /// Create missing parent directories at open and on write.
    pub fn with_create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }

    /// Set the text encoding.
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Set the access mode.
    pub fn with_access_mode(mut self, access_mode: AccessMode) -> Self {
        self.access_mode = access_mode;
        self
    }

    /// Pretty-print JSON on write.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn validate(&self) -> Result<()> {
        match self.encoding.as_deref() {
            None => Ok(()),
            Some(enc) if enc.eq_ignore_ascii_case("utf-8") || enc.eq_ignore_ascii_case("utf8") => {
                Ok(())
            }
            Some(other) => Err(StorageError::Config(format!(
                "Unsupported encoding: '{}'. JSON files are UTF-8",
                other
            ))),
        }
    }
}

/// JSON file storage backend.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    options: FileOptions,
}

impl FileStorage {
    /// Open (and for writable modes, create) the JSON file at `path`.
    ///
    /// Writable modes touch the file so it exists after open; `Truncate`
    /// empties it. Without `create_dirs` a missing parent directory is an
    /// I/O error.
    #[instrument(skip(path, options), fields(path = %path.as_ref().display(), mode = %options.access_mode))]
    pub async fn open(path: impl AsRef<Path>, options: FileOptions) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();

        if options.access_mode.is_writable() {
            if options.create_dirs {
                ensure_parent(&path).await?;
            }

            let mut open = fs::OpenOptions::new();
            open.write(true).create(true);
            if options.access_mode == AccessMode::Truncate {
                open.truncate(true);
            }
            open.open(&path).await?;
            debug!("Opened {:?}", path);
        }

        Ok(Self { path, options })
    }

    /// Get the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the options this storage was opened with.
    pub fn options(&self) -> &FileOptions {
        &self.options
    }

    fn temp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

/// Ensure parent directories exist for a path.
async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl TableStorage for FileStorage {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn read(&self) -> Result<TableSet> {
        match fs::read(&self.path).await {
            Ok(bytes) => {
                debug!("Read {} bytes from {:?}", bytes.len(), self.path);
                decode(&bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TableSet::new()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, data), fields(path = %self.path.display(), tables = data.len()))]
    async fn write(&self, data: &TableSet) -> Result<()> {
        if !self.options.access_mode.is_writable() {
            return Err(StorageError::ReadOnly(self.path.display().to_string()));
        }

        let bytes = encode(data, self.options.pretty)?;
        if self.options.create_dirs {
            ensure_parent(&self.path).await?;
        }

        let tmp = self.temp_path();
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        debug!("Writing {} bytes to {:?}", bytes.len(), self.path);
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
