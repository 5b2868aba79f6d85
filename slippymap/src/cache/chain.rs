//! Ordered cache chain.
//!
//! The chain holds an explicit list of tiers, fastest first. A lookup walks
//! the list and stops at the first hit; a hit below level 0 is copied into
//! every faster tier so the next lookup is served from level 0.
//!
//! ```text
//! get_entry ──► tier 0 ──miss──► tier 1 ──miss──► ... ──miss──► FragmentSource
//!                 ▲                 │                                 │
//!                 └──── promote ────┘                                 │
//!                 ▲                                                   │
//!                 └──────────────── insert (tier 0 only) ─────────────┘
//! ```
//!
//! Network results land in tier 0 only. Slower tiers are written by an
//! explicit [`CacheChain::update_caches`] call.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::entry::{CacheEntry, EntryOrigin};
use super::tier::{CacheTier, PurgeResult, TierStatsSnapshot};
use crate::coord::TileCoord;
use crate::fragment::{Fragment, FragmentKey};
use crate::projection::Projection;

/// Whether a source should load image bytes before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    #[default]
    Immediate,
    /// Return the fragment unloaded; the caller loads it later.
    Deferred,
}

/// Builds fragments when every tier misses.
pub trait FragmentSource: Send + Sync {
    /// Returns a loaded fragment, or in [`LoadMode::Deferred`] an unloaded
    /// one. `None` means the fragment could not be produced.
    fn fetch_fragment<'a>(
        &'a self,
        key: &'a FragmentKey,
        mode: LoadMode,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Option<Arc<Fragment>>>;
}

/// Tiers checked in order, fastest first.
pub struct CacheChain {
    tiers: Vec<Arc<dyn CacheTier>>,
    promote_on_hit: bool,
}

impl CacheChain {
    pub fn new(tiers: Vec<Arc<dyn CacheTier>>) -> Self {
        Self {
            tiers,
            promote_on_hit: true,
        }
    }

    /// Enables or disables copying lower-level hits into faster tiers.
    pub fn with_promotion(mut self, promote_on_hit: bool) -> Self {
        self.promote_on_hit = promote_on_hit;
        self
    }

    pub fn tiers(&self) -> &[Arc<dyn CacheTier>] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Walks the tiers for `key`, promoting a lower-level hit when enabled.
    ///
    /// Tier errors are logged and treated as misses.
    pub async fn lookup(&self, key: &FragmentKey) -> Option<CacheEntry> {
        if !key.is_addressable() {
            return None;
        }

        for (level, tier) in self.tiers.iter().enumerate() {
            match tier.get(key).await {
                Ok(Some(fragment)) => {
                    debug!(key = %key, tier = tier.name(), level, "Cache hit");
                    let entry = CacheEntry::new(fragment, EntryOrigin::Tier(level));
                    if level > 0 && self.promote_on_hit {
                        self.promote(&entry).await;
                    }
                    return Some(entry);
                }
                Ok(None) => {
                    debug!(key = %key, tier = tier.name(), level, "Cache miss");
                }
                Err(e) => {
                    warn!(key = %key, tier = tier.name(), error = %e, "Cache tier read failed");
                }
            }
        }
        None
    }

    /// Looks up the tile at `(x, y)` at the projection's current scale,
    /// falling through to `source` when every tier misses.
    ///
    /// Coordinates outside the tile grid are clamped. An uninitialized
    /// projection yields `None`.
    pub async fn get_entry(
        &self,
        projection: &Projection,
        x: u32,
        y: u32,
        source: &dyn FragmentSource,
        mode: LoadMode,
        cancel: &CancellationToken,
    ) -> Option<CacheEntry> {
        if !projection.is_initialized() {
            error!(projection = projection.name(), "Cache lookup on uninitialized projection");
            return None;
        }

        let coord: TileCoord = projection.clamp_tile(x, y);
        let key = FragmentKey::tile(projection.name(), coord);
        self.get_or_fetch(&key, source, mode, cancel).await
    }

    /// Looks up `key`, falling through to `source` on a miss.
    ///
    /// A loaded network fragment is inserted into tier 0 only. Deferred
    /// fragments without bytes are returned uncached. Keys that are not
    /// addressable bypass the tiers entirely.
    pub async fn get_or_fetch(
        &self,
        key: &FragmentKey,
        source: &dyn FragmentSource,
        mode: LoadMode,
        cancel: &CancellationToken,
    ) -> Option<CacheEntry> {
        if let Some(entry) = self.lookup(key).await {
            return Some(entry);
        }
        if !key.is_addressable() {
            debug!(key = %key, "Key not addressable, bypassing cache");
        }

        let fragment = source.fetch_fragment(key, mode, cancel).await?;
        if !fragment.has_image() {
            if mode == LoadMode::Deferred {
                return Some(CacheEntry::new(fragment, EntryOrigin::Network));
            }
            warn!(key = %key, "Source returned a fragment without an image");
            return None;
        }

        if key.is_addressable() {
            if let Some(tier) = self.tiers.first() {
                if let Err(e) = tier.insert(Arc::clone(&fragment)).await {
                    warn!(key = %key, tier = tier.name(), error = %e, "Failed to cache fragment");
                }
            }
        }
        Some(CacheEntry::new(fragment, EntryOrigin::Network))
    }

    /// Copies a hit at level `L` into tiers `0..L`. Returns the number of
    /// tiers written.
    pub async fn promote(&self, entry: &CacheEntry) -> usize {
        let Some(level) = entry.level() else {
            return 0;
        };
        self.write_missing(entry, |index| index < level).await
    }

    /// Writes the entry into every tier that lacks it, other than the one it
    /// came from. Returns the number of tiers written.
    pub async fn update_caches(&self, entry: &CacheEntry) -> usize {
        let origin = entry.level();
        self.write_missing(entry, |index| Some(index) != origin).await
    }

    async fn write_missing(&self, entry: &CacheEntry, include: impl Fn(usize) -> bool) -> usize {
        if !entry.is_populated() || !entry.key().is_addressable() {
            return 0;
        }

        let cache_key = entry.key().cache_key();
        let mut written = 0;
        for (index, tier) in self.tiers.iter().enumerate() {
            if !include(index) || tier.contains(&cache_key) {
                continue;
            }
            match tier.insert(Arc::clone(entry.fragment())).await {
                Ok(()) => {
                    debug!(key = %cache_key, tier = tier.name(), level = index, "Cache updated");
                    written += 1;
                }
                Err(e) => {
                    warn!(key = %cache_key, tier = tier.name(), error = %e, "Cache update failed");
                }
            }
        }
        written
    }

    /// Runs the age purge on every tier.
    pub async fn purge_expired(&self) -> Vec<(String, PurgeResult)> {
        let mut results = Vec::with_capacity(self.tiers.len());
        for tier in &self.tiers {
            match tier.purge_expired().await {
                Ok(result) => results.push((tier.name().to_string(), result)),
                Err(e) => warn!(tier = tier.name(), error = %e, "Purge failed"),
            }
        }
        results
    }

    /// Clears every tier. Returns the total number of entries removed.
    pub async fn clear(&self) -> usize {
        let mut removed = 0;
        for tier in &self.tiers {
            match tier.clear().await {
                Ok(count) => removed += count,
                Err(e) => warn!(tier = tier.name(), error = %e, "Clear failed"),
            }
        }
        removed
    }

    /// Per-tier statistics in chain order.
    pub fn stats(&self) -> Vec<(String, TierStatsSnapshot)> {
        self.tiers
            .iter()
            .map(|tier| (tier.name().to_string(), tier.stats()))
            .collect()
    }
}

impl std::fmt::Debug for CacheChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheChain")
            .field("tiers", &self.tiers.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("promote_on_hit", &self.promote_on_hit)
            .finish()
    }
}
