//! Cache tier interface.
//!
//! A tier is one bounded storage layer keyed by
//! `"{projection}-{quadkey}"`. Every tier enforces its own count and byte
//! limits after each insert and its age limit on [`CacheTier::purge_expired`].
//!
//! The trait uses boxed futures so tiers can be held as
//! `Arc<dyn CacheTier>` in a [`super::CacheChain`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;

use super::eviction::TierLimits;
use crate::fragment::{Fragment, FragmentKey};

/// Result of an age purge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeResult {
    pub entries_removed: usize,
    pub bytes_freed: u64,
    pub duration_ms: u64,
}

impl fmt::Display for PurgeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Purge: removed {} entries, freed {} bytes in {}ms",
            self.entries_removed, self.bytes_freed, self.duration_ms
        )
    }
}

/// Errors that can occur during tier operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Scale-0 keys have no quadkey and cannot be cached.
    #[error("Key '{0}' is not addressable")]
    NotAddressable(String),

    #[error("Fragment '{0}' has no image to cache")]
    MissingImage(String),

    #[error("Invalid cache key '{0}'")]
    InvalidKey(String),
}

/// Live tier counters.
#[derive(Debug, Default)]
pub struct TierStats {
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl TierStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_insertion(&self) {
        self.insertions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: usize) {
        self.expirations.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, entries: usize, size_bytes: u64) -> TierStatsSnapshot {
        TierStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entries,
            size_bytes,
        }
    }
}

/// Point-in-time tier statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    /// Entries removed by count or byte limits.
    pub evictions: u64,
    /// Entries removed by the age limit.
    pub expirations: u64,
    pub entries: usize,
    pub size_bytes: u64,
}

impl TierStatsSnapshot {
    /// Hit rate in `[0, 1]`, 0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// One storage layer of the cache chain.
///
/// # Thread Safety
///
/// Implementations are `Send + Sync`; index mutation is synchronous and
/// never held across an await point.
pub trait CacheTier: Send + Sync {
    /// Short name for logs (`memory`, `disk`).
    fn name(&self) -> &str;

    fn limits(&self) -> TierLimits;

    /// Looks up a fragment, refreshing its last-accessed time on a hit.
    fn get<'a>(
        &'a self,
        key: &'a FragmentKey,
    ) -> BoxFuture<'a, Result<Option<Arc<Fragment>>, CacheError>>;

    /// Stores a loaded fragment, replacing any entry with the same key, then
    /// applies count and byte limits.
    fn insert(&self, fragment: Arc<Fragment>) -> BoxFuture<'_, Result<(), CacheError>>;

    /// Removes an entry by cache key. Returns whether it existed.
    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, CacheError>>;

    fn contains(&self, key: &str) -> bool;

    fn entry_count(&self) -> usize;

    /// Total payload bytes held.
    fn size_bytes(&self) -> u64;

    /// Removes entries not accessed within the retention period.
    fn purge_expired(&self) -> BoxFuture<'_, Result<PurgeResult, CacheError>>;

    /// Removes every entry. Returns how many were removed.
    fn clear(&self) -> BoxFuture<'_, Result<usize, CacheError>>;

    fn stats(&self) -> TierStatsSnapshot;
}

/// Checks that a fragment can be stored in a tier.
pub(crate) fn validate_insert(fragment: &Fragment) -> Result<(), CacheError> {
    if !fragment.key().is_addressable() {
        return Err(CacheError::NotAddressable(fragment.cache_key()));
    }
    if !fragment.has_image() {
        return Err(CacheError::MissingImage(fragment.cache_key()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = TierStats::default();
        assert_eq!(stats.snapshot(0, 0).hit_rate(), 0.0);

        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        let snapshot = stats.snapshot(3, 42);
        assert_eq!(snapshot.hit_rate(), 0.75);
        assert_eq!(snapshot.entries, 3);
        assert_eq!(snapshot.size_bytes, 42);
    }

    #[test]
    fn test_purge_result_display() {
        let result = PurgeResult {
            entries_removed: 3,
            bytes_freed: 1024,
            duration_ms: 7,
        };
        assert_eq!(
            result.to_string(),
            "Purge: removed 3 entries, freed 1024 bytes in 7ms"
        );
    }
}
