//! TTL read cache composed around any storage backend.
//!
//! ```text
//! ┌─────────────┐
//! │    read     │
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐   fresh entry
//! │  TTL entry  │──────────────► Return
//! └──────┬──────┘
//!        │ missing / expired
//!        ▼
//! ┌─────────────┐
//! │    inner    │
//! │   backend   │
//! └──────┬──────┘
//!        │
//!        ▼
//!   Store entry
//! ```
//!
//! The cached value is the whole table set, so an instance holds at most one
//! entry. Changes made to the backing medium by anyone other than this
//! instance stay invisible until the entry expires: readers accept up to
//! `ttl` of staleness. Writes through this instance go to the inner backend
//! first and then replace the entry, so they are visible immediately. When
//! writes through one instance overlap, the entry is dropped instead and the
//! next read goes to the backend.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::table::TableSet;
use crate::traits::TableStorage;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Configuration for cached storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a read result is served before the inner backend is asked again
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

impl CacheConfig {
    /// Create config with the given entry lifetime.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl }
    }
}

#[derive(Debug)]
struct CacheEntry {
    data: TableSet,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entry: Option<CacheEntry>,
    /// Bumped when a write starts and on invalidation, so a read or write
    /// that raced with a newer one does not store its result.
    generation: u64,
    hits: u64,
    misses: u64,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Reads served from the cached entry
    pub hits: u64,
    /// Reads that went to the inner backend
    pub misses: u64,
    /// Whether an unexpired entry is currently held
    pub cached: bool,
    /// Cache hit rate (0.0 to 1.0)
    pub hit_rate: f64,
}

/// Storage decorator serving reads from a time-bounded cache.
pub struct CachedStorage {
    inner: Arc<dyn TableStorage>,
    state: Mutex<CacheState>,
    config: CacheConfig,
}

impl CachedStorage {
    /// Wrap `inner` with a read cache.
    pub fn new(inner: Arc<dyn TableStorage>, config: CacheConfig) -> Self {
        Self {
            inner,
            state: Mutex::new(CacheState::default()),
            config,
        }
    }

    /// Wrap `inner` with the default ten minute TTL.
    pub fn with_defaults(inner: Arc<dyn TableStorage>) -> Self {
        Self::new(inner, CacheConfig::default())
    }

    /// Get the wrapped backend.
    pub fn inner(&self) -> &Arc<dyn TableStorage> {
        &self.inner
    }

    /// Get the configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Drop the cached entry; the next read goes to the inner backend.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.entry = None;
        state.generation += 1;
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let total = state.hits + state.misses;
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            cached: state
                .entry
                .as_ref()
                .is_some_and(|e| e.stored_at.elapsed() < self.config.ttl),
            hit_rate: if total == 0 {
                0.0
            } else {
                state.hits as f64 / total as f64
            },
        }
    }
}

impl std::fmt::Debug for CachedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("CachedStorage")
            .field("inner", &self.inner.backend_name())
            .field("ttl", &self.config.ttl)
            .field("cached", &stats.cached)
            .field("hit_rate", &format!("{:.1}%", stats.hit_rate * 100.0))
            .finish()
    }
}

#[async_trait]
impl TableStorage for CachedStorage {
    #[instrument(skip(self), fields(inner = self.inner.backend_name()))]
    async fn read(&self) -> Result<TableSet> {
        let generation = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if let Some(entry) = &state.entry {
                if entry.stored_at.elapsed() < self.config.ttl {
                    state.hits += 1;
                    return Ok(entry.data.clone());
                }
                debug!("Cached table set expired");
            }
            state.entry = None;
            state.misses += 1;
            state.generation
        };

        let data = self.inner.read().await?;

        let mut state = self.state.lock();
        if state.generation == generation {
            state.entry = Some(CacheEntry {
                data: data.clone(),
                stored_at: Instant::now(),
            });
        }
        Ok(data)
    }

    #[instrument(skip(self, data), fields(inner = self.inner.backend_name(), tables = data.len()))]
    async fn write(&self, data: &TableSet) -> Result<()> {
        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.generation
        };

        let result = self.inner.write(data).await;

        // Only the most recently started write may fill the entry: a write
        // that finishes after a newer one started cannot tell which of the
        // two the backend kept.
        let mut state = self.state.lock();
        state.entry = match (&result, state.generation == generation) {
            (Ok(()), true) => Some(CacheEntry {
                data: data.clone(),
                stored_at: Instant::now(),
            }),
            _ => None,
        };
        result
    }

    async fn close(&self) -> Result<()> {
        self.invalidate();
        self.inner.close().await
    }

    fn backend_name(&self) -> &'static str {
        "cached"
    }
}
