//! In-memory cache tier.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::eviction::{TierIndex, TierLimits};
use super::tier::{validate_insert, CacheError, CacheTier, PurgeResult, TierStats, TierStatsSnapshot};
use crate::fragment::{Fragment, FragmentKey};

/// Hash-map tier holding shared fragments.
pub struct MemoryTier {
    name: String,
    limits: TierLimits,
    index: Mutex<TierIndex<Arc<Fragment>>>,
    stats: TierStats,
}

impl MemoryTier {
    pub fn new(limits: TierLimits) -> Self {
        Self::named("memory", limits)
    }

    pub fn named(name: impl Into<String>, limits: TierLimits) -> Self {
        Self {
            name: name.into(),
            limits,
            index: Mutex::new(TierIndex::new()),
            stats: TierStats::default(),
        }
    }
}

impl CacheTier for MemoryTier {
    fn name(&self) -> &str {
        &self.name
    }

    fn limits(&self) -> TierLimits {
        self.limits
    }

    fn get<'a>(
        &'a self,
        key: &'a FragmentKey,
    ) -> BoxFuture<'a, Result<Option<Arc<Fragment>>, CacheError>> {
        async move {
            let now = Utc::now();
            let hit = self
                .index
                .lock()
                .touch(&key.cache_key(), now)
                .map(|entry| Arc::clone(&entry.payload));

            match hit {
                Some(fragment) => {
                    fragment.touch();
                    self.stats.record_hit();
                    Ok(Some(fragment))
                }
                None => {
                    self.stats.record_miss();
                    Ok(None)
                }
            }
        }
        .boxed()
    }

    fn insert(&self, fragment: Arc<Fragment>) -> BoxFuture<'_, Result<(), CacheError>> {
        async move {
            validate_insert(&fragment)?;
            let key = fragment.cache_key();
            let size = fragment.size_bytes();
            // count eviction ranks by arrival in this tier
            let created = Utc::now();
            let accessed = fragment.last_accessed_utc();

            let evicted = {
                let mut index = self.index.lock();
                if index.insert(key.clone(), fragment, size, created, accessed).is_some() {
                    warn!(tier = %self.name, key = %key, "Replacing existing cache entry");
                }
                index.enforce(&self.limits)
            };

            self.stats.record_insertion();
            if !evicted.is_empty() {
                self.stats.record_evictions(evicted.len());
                debug!(tier = %self.name, evicted = evicted.len(), "Evicted entries over limit");
            }
            Ok(())
        }
        .boxed()
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, CacheError>> {
        async move { Ok(self.index.lock().remove(key).is_some()) }.boxed()
    }

    fn contains(&self, key: &str) -> bool {
        self.index.lock().contains(key)
    }

    fn entry_count(&self) -> usize {
        self.index.lock().len()
    }

    fn size_bytes(&self) -> u64 {
        self.index.lock().total_bytes()
    }

    fn purge_expired(&self) -> BoxFuture<'_, Result<PurgeResult, CacheError>> {
        async move {
            let start = Instant::now();
            let removed = self
                .index
                .lock()
                .purge_expired(Utc::now(), self.limits.retention);

            self.stats.record_expirations(removed.len());
            Ok(PurgeResult {
                entries_removed: removed.len(),
                bytes_freed: removed.iter().map(|(_, e)| e.size).sum(),
                duration_ms: start.elapsed().as_millis() as u64,
            })
        }
        .boxed()
    }

    fn clear(&self) -> BoxFuture<'_, Result<usize, CacheError>> {
        async move { Ok(self.index.lock().drain().len()) }.boxed()
    }

    fn stats(&self) -> TierStatsSnapshot {
        let (entries, bytes) = {
            let index = self.index.lock();
            (index.len(), index.total_bytes())
        };
        self.stats.snapshot(entries, bytes)
    }
}
