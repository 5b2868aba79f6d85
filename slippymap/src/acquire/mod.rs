//! Image acquisition pipeline.
//!
//! Orchestrates a cache chain lookup, falls through to the network on a
//! miss and, when write-through is enabled, populates every tier with the
//! result.
//!
//! ```text
//! ViewportRequest ──► resolve ──► keys ──► CacheChain ──miss──► NetworkSource
//!                                             ▲                      │
//!                                             └──── update_caches ───┘
//! ```

mod coalesce;
mod network;

pub use coalesce::{CoalescerStats, RequestCoalescer};
pub use network::{FetchPolicy, NetworkSource};

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{CacheChain, CacheEntry, LoadMode};
use crate::fragment::FragmentKey;
use crate::projection::Projection;
use crate::viewport::{self, StaticView, ViewportRequest};

/// Pipeline behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Write every acquired fragment into all tiers that lack it.
    pub write_through: bool,
    pub load_mode: LoadMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            write_through: true,
            load_mode: LoadMode::Immediate,
        }
    }
}

/// One fragment of an acquired view.
#[derive(Debug, Clone)]
pub struct AcquiredFragment {
    pub key: FragmentKey,
    /// `None` when the fragment could not be produced.
    pub entry: Option<CacheEntry>,
}

impl AcquiredFragment {
    pub fn is_loaded(&self) -> bool {
        self.entry.as_ref().is_some_and(CacheEntry::is_populated)
    }
}

/// Cache-backed fragment acquisition for one provider.
pub struct ImagePipeline {
    chain: Arc<CacheChain>,
    source: NetworkSource,
    config: PipelineConfig,
}

impl ImagePipeline {
    pub fn new(chain: Arc<CacheChain>, source: NetworkSource, config: PipelineConfig) -> Self {
        Self {
            chain,
            source,
            config,
        }
    }

    pub fn chain(&self) -> &Arc<CacheChain> {
        &self.chain
    }

    pub fn source(&self) -> &NetworkSource {
        &self.source
    }

    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    /// Acquires the tile at `(x, y)` at the projection's current scale.
    pub async fn acquire_tile(
        &self,
        projection: &Projection,
        x: u32,
        y: u32,
        cancel: &CancellationToken,
    ) -> Option<CacheEntry> {
        let entry = self
            .chain
            .get_entry(projection, x, y, &self.source, self.config.load_mode, cancel)
            .await?;
        self.write_through(&entry).await;
        Some(entry)
    }

    /// Acquires one fragment by key.
    pub async fn acquire(&self, key: &FragmentKey, cancel: &CancellationToken) -> Option<CacheEntry> {
        let entry = self
            .chain
            .get_or_fetch(key, &self.source, self.config.load_mode, cancel)
            .await?;
        self.write_through(&entry).await;
        Some(entry)
    }

    /// Acquires every fragment covering a viewport, in row-major order.
    ///
    /// Returns an empty list when the viewport cannot be resolved.
    pub async fn acquire_view(
        &self,
        projection: &Projection,
        request: &ViewportRequest,
        cancel: &CancellationToken,
    ) -> Vec<AcquiredFragment> {
        let Some(resolution) = viewport::resolve(projection, request) else {
            return Vec::new();
        };

        let keys = resolution.keys();
        debug!(
            projection = projection.name(),
            fragments = keys.len(),
            "Acquiring view"
        );

        let entries = join_all(keys.iter().map(|key| self.acquire(key, cancel))).await;
        let acquired: Vec<_> = keys
            .into_iter()
            .zip(entries)
            .map(|(key, entry)| AcquiredFragment { key, entry })
            .collect();

        let missing = acquired.iter().filter(|a| a.entry.is_none()).count();
        if missing > 0 {
            warn!(
                projection = projection.name(),
                missing,
                total = acquired.len(),
                "View acquired with missing fragments"
            );
        }
        acquired
    }

    /// Acquires a single static image.
    pub async fn acquire_static(
        &self,
        projection: &Projection,
        view: &StaticView,
        cancel: &CancellationToken,
    ) -> Option<CacheEntry> {
        if view.projection != projection.name() {
            warn!(
                projection = projection.name(),
                view = %view.projection,
                "Static view belongs to another projection"
            );
            return None;
        }
        self.acquire(&view.key(), cancel).await
    }

    async fn write_through(&self, entry: &CacheEntry) {
        if self.config.write_through && entry.is_populated() {
            self.chain.update_caches(entry).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheTier, EntryOrigin, MemoryTier, TierLimits};
    use crate::coord::{LatLon, TileCoord};
    use crate::projection::ProviderMetadata;
    use crate::provider::tests::{MockFetcher, TemplateBuilder};

    struct Fixture {
        pipeline: ImagePipeline,
        fast: Arc<MemoryTier>,
        slow: Arc<MemoryTier>,
        fetcher: Arc<MockFetcher>,
    }

    fn fixture(config: PipelineConfig) -> Fixture {
        let fast = Arc::new(MemoryTier::named("fast", TierLimits::unlimited()));
        let slow = Arc::new(MemoryTier::named("slow", TierLimits::unlimited()));
        let chain = Arc::new(CacheChain::new(vec![
            fast.clone() as Arc<dyn CacheTier>,
            slow.clone() as Arc<dyn CacheTier>,
        ]));
        let fetcher = Arc::new(MockFetcher::ok(vec![0xAB; 32]));
        let source = NetworkSource::new(Arc::new(TemplateBuilder), fetcher.clone());
        Fixture {
            pipeline: ImagePipeline::new(chain, source, config),
            fast,
            slow,
            fetcher,
        }
    }

    fn projection(scale: u8) -> Projection {
        let projection = Projection::with_metadata("osm", &ProviderMetadata::tiled(0, 19, 256));
        projection.set_scale(scale);
        projection
    }

    #[tokio::test]
    async fn test_acquire_tile_writes_through() {
        let f = fixture(PipelineConfig::default());
        let cancel = CancellationToken::new();

        let entry = f
            .pipeline
            .acquire_tile(&projection(4), 2, 3, &cancel)
            .await
            .unwrap();
        assert_eq!(entry.origin(), EntryOrigin::Network);
        assert!(f.fast.contains(&entry.key().cache_key()));
        assert!(f.slow.contains(&entry.key().cache_key()));
    }

    #[tokio::test]
    async fn test_without_write_through_only_tier_zero() {
        let f = fixture(PipelineConfig {
            write_through: false,
            ..Default::default()
        });
        let entry = f
            .pipeline
            .acquire_tile(&projection(4), 2, 3, &CancellationToken::new())
            .await
            .unwrap();
        assert!(f.fast.contains(&entry.key().cache_key()));
        assert_eq!(f.slow.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_acquire_view_row_major() {
        let f = fixture(PipelineConfig::default());
        let projection = projection(3);
        // spans columns 2..=5 and rows 3..=4 at scale 3
        let request = ViewportRequest::new(LatLon::new(0.0, 0.0), 600, 300);
        let frame = projection.frame().unwrap();
        let center_tile = frame.lat_long_to_tile(request.center);
        assert_eq!((center_tile.x, center_tile.y), (4, 4));

        let acquired = f
            .pipeline
            .acquire_view(&projection, &request, &CancellationToken::new())
            .await;

        let tiles: Vec<_> = acquired.iter().filter_map(|a| a.key.tile_coord()).collect();
        let mut sorted = tiles.clone();
        sorted.sort_by_key(|t| (t.y, t.x));
        assert_eq!(tiles, sorted);
        assert!(acquired.iter().all(AcquiredFragment::is_loaded));
        assert_eq!(f.fetcher.calls(), acquired.len());
    }

    #[tokio::test]
    async fn test_second_view_served_from_cache() {
        let f = fixture(PipelineConfig::default());
        let projection = projection(6);
        let request = ViewportRequest::new(LatLon::new(48.85, 2.35), 512, 512);
        let cancel = CancellationToken::new();

        let first = f.pipeline.acquire_view(&projection, &request, &cancel).await;
        let calls = f.fetcher.calls();
        let second = f.pipeline.acquire_view(&projection, &request, &cancel).await;

        assert_eq!(first.len(), second.len());
        assert_eq!(f.fetcher.calls(), calls);
        assert!(second
            .iter()
            .all(|a| a.entry.as_ref().unwrap().origin() == EntryOrigin::Tier(0)));
    }

    #[tokio::test]
    async fn test_unresolvable_view_is_empty() {
        let f = fixture(PipelineConfig::default());
        let request = ViewportRequest::new(LatLon::new(0.0, 0.0), 0, 100);
        let acquired = f
            .pipeline
            .acquire_view(&projection(3), &request, &CancellationToken::new())
            .await;
        assert!(acquired.is_empty());
    }

    #[tokio::test]
    async fn test_static_view_for_other_projection_rejected() {
        let f = fixture(PipelineConfig::default());
        let view = StaticView {
            projection: "google".into(),
            center: LatLon::new(0.0, 0.0),
            width: 100,
            height: 100,
            scale: 3,
        };
        let entry = f
            .pipeline
            .acquire_static(&projection(3), &view, &CancellationToken::new())
            .await;
        assert!(entry.is_none());
        assert_eq!(f.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_fragment_reported_missing() {
        let fast = Arc::new(MemoryTier::new(TierLimits::unlimited()));
        let chain = Arc::new(CacheChain::new(vec![fast.clone() as Arc<dyn CacheTier>]));
        let source = NetworkSource::new(Arc::new(TemplateBuilder), Arc::new(MockFetcher::status(404)));
        let pipeline = ImagePipeline::new(chain, source, PipelineConfig::default());

        let key = FragmentKey::tile("osm", TileCoord::new(1, 1, 3));
        assert!(pipeline.acquire(&key, &CancellationToken::new()).await.is_none());
        assert_eq!(fast.entry_count(), 0);
    }
}
