//! Content-addressed store for extraction results.

use crate::extraction::types::{CacheEntry, CacheError, CacheKey, ExtractionResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::RwLock;

/// What an [`CacheStore::insert`] call did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The key was absent and is now present.
    Inserted,
    /// The key held different content, which was overwritten.
    Replaced,
    /// The key already held equal content; nothing changed.
    Unchanged,
    /// The store was cleared after the caller read its epoch; the write was dropped.
    Stale,
}

/// Interface implemented by result caches.
///
/// Every insert carries the epoch observed by the writer before it started computing the
/// result. `clear` bumps the epoch, so results computed across a clear never land as valid.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Return a cached result for `key`, if any.
    async fn lookup(&self, key: &CacheKey) -> Result<Option<ExtractionResult>, CacheError>;

    /// Current invalidation generation.
    async fn epoch(&self) -> Result<u64, CacheError>;

    /// Store `result` under `key` if `epoch` is still current.
    async fn insert(
        &self,
        key: CacheKey,
        result: ExtractionResult,
        epoch: u64,
    ) -> Result<InsertOutcome, CacheError>;

    /// Drop every entry and start a new epoch.
    async fn clear(&self) -> Result<(), CacheError>;

    /// Number of live entries.
    async fn len(&self) -> Result<usize, CacheError>;
}

struct StoredEntry {
    entry: CacheEntry,
    last_access: AtomicU64,
}

#[derive(Default)]
struct CacheState {
    epoch: u64,
    entries: HashMap<CacheKey, StoredEntry>,
}

/// In-process cache guarded by a single async read/write lock.
///
/// Unbounded by default. With a capacity, the least recently used entry is evicted when an
/// insert would exceed it.
pub struct MemoryCache {
    state: RwLock<CacheState>,
    clock: AtomicU64,
    capacity: Option<NonZeroUsize>,
}

impl MemoryCache {
    /// Create an unbounded cache.
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Create a cache with an optional entry limit.
    pub fn with_capacity(capacity: Option<NonZeroUsize>) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            clock: AtomicU64::new(0),
            capacity,
        }
    }

    /// Look up the full entry, including insertion metadata.
    pub async fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let state = self.state.read().await;
        state.entries.get(key).map(|stored| {
            stored.last_access.store(self.tick(), Ordering::Relaxed);
            stored.entry.clone()
        })
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn evict_lru(entries: &mut HashMap<CacheKey, StoredEntry>) {
        let oldest = entries
            .iter()
            .min_by_key(|(_, stored)| stored.last_access.load(Ordering::Relaxed))
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            tracing::debug!(key = %key, "Evicting least recently used cache entry");
            entries.remove(&key);
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<ExtractionResult>, CacheError> {
        Ok(self.entry(key).await.map(|entry| entry.result))
    }

    async fn epoch(&self) -> Result<u64, CacheError> {
        Ok(self.state.read().await.epoch)
    }

    async fn insert(
        &self,
        key: CacheKey,
        result: ExtractionResult,
        epoch: u64,
    ) -> Result<InsertOutcome, CacheError> {
        let mut state = self.state.write().await;
        if epoch != state.epoch {
            tracing::debug!(
                key = %key,
                writer_epoch = epoch,
                current_epoch = state.epoch,
                "Dropping cache insert from a cleared epoch"
            );
            return Ok(InsertOutcome::Stale);
        }

        let now = self.tick();
        if let Some(existing) = state.entries.get(&key)
            && existing.entry.result == result
        {
            existing.last_access.store(now, Ordering::Relaxed);
            return Ok(InsertOutcome::Unchanged);
        }

        let replacing = state.entries.contains_key(&key);
        if !replacing
            && let Some(capacity) = self.capacity
            && state.entries.len() >= capacity.get()
        {
            Self::evict_lru(&mut state.entries);
        }

        let entry = CacheEntry {
            result,
            inserted_at: current_timestamp_rfc3339(),
            epoch,
        };
        state.entries.insert(
            key,
            StoredEntry {
                entry,
                last_access: AtomicU64::new(now),
            },
        );

        Ok(if replacing {
            InsertOutcome::Replaced
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        let removed = state.entries.len();
        state.entries.clear();
        state.epoch += 1;
        tracing::info!(removed, epoch = state.epoch, "Extraction cache cleared");
        Ok(())
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.state.read().await.entries.len())
    }
}

fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}
