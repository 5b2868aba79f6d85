//! Memory + filesystem chain behaviour.

mod common;

use std::sync::Arc;

use bytes::Bytes;
use common::StubFetcher;
use slippymap::acquire::{ImagePipeline, NetworkSource, PipelineConfig};
use slippymap::cache::{CacheChain, CacheEntry, CacheTier, EntryOrigin, FileSystemTier, MemoryTier, TierLimits};
use slippymap::coord::TileCoord;
use slippymap::fragment::{Fragment, FragmentKey};
use slippymap::projection::Projection;
use slippymap::provider::{XyzProvider, XyzTemplate};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn loaded(key: FragmentKey, bytes: &'static [u8]) -> Arc<Fragment> {
    let fragment = Fragment::new(key);
    fragment.set_image(Bytes::from_static(bytes));
    Arc::new(fragment)
}

async fn two_tier_chain(dir: &TempDir) -> (CacheChain, Arc<MemoryTier>, Arc<FileSystemTier>) {
    let memory = Arc::new(MemoryTier::new(TierLimits::unlimited()));
    let disk = Arc::new(
        FileSystemTier::open(dir.path(), TierLimits::unlimited())
            .await
            .unwrap(),
    );
    let chain = CacheChain::new(vec![
        memory.clone() as Arc<dyn CacheTier>,
        disk.clone() as Arc<dyn CacheTier>,
    ]);
    (chain, memory, disk)
}

#[tokio::test]
async fn disk_hit_promoted_to_memory() {
    let dir = TempDir::new().unwrap();
    let (chain, memory, disk) = two_tier_chain(&dir).await;
    let key = FragmentKey::tile("osm", TileCoord::new(5, 9, 4));
    disk.insert(loaded(key.clone(), b"disk bytes")).await.unwrap();

    let first = chain.lookup(&key).await.unwrap();
    assert_eq!(first.origin(), EntryOrigin::Tier(1));
    assert!(memory.contains(&key.cache_key()));

    let second = chain.lookup(&key).await.unwrap();
    assert_eq!(second.origin(), EntryOrigin::Tier(0));
    assert_eq!(second.fragment().image().unwrap().as_ref(), b"disk bytes");
}

#[tokio::test]
async fn disk_tier_survives_restart() {
    let dir = TempDir::new().unwrap();
    let key = FragmentKey::tile("osm", TileCoord::new(3, 3, 3));
    {
        let (chain, _, _) = two_tier_chain(&dir).await;
        let entry = CacheEntry::new(loaded(key.clone(), b"persisted"), EntryOrigin::Network);
        assert_eq!(chain.update_caches(&entry).await, 2);
    }

    let (chain, memory, disk) = two_tier_chain(&dir).await;
    assert_eq!(memory.entry_count(), 0);
    assert_eq!(disk.entry_count(), 1);

    let entry = chain.lookup(&key).await.unwrap();
    assert_eq!(entry.origin(), EntryOrigin::Tier(1));
    assert_eq!(entry.fragment().image().unwrap().as_ref(), b"persisted");
}

#[tokio::test]
async fn pipeline_writes_through_to_disk() {
    let dir = TempDir::new().unwrap();
    let (chain, memory, disk) = two_tier_chain(&dir).await;
    let provider = XyzProvider::new(XyzTemplate::openstreetmap());
    let projection = Projection::with_metadata("osm", &provider.metadata());
    projection.set_scale(8);

    let fetcher = Arc::new(StubFetcher::new(b"net"));
    let source = NetworkSource::new(Arc::new(provider), fetcher.clone());
    let pipeline = ImagePipeline::new(Arc::new(chain), source, PipelineConfig::default());

    let entry = pipeline
        .acquire_tile(&projection, 10, 20, &CancellationToken::new())
        .await
        .unwrap();
    let cache_key = entry.key().cache_key();
    assert!(memory.contains(&cache_key));
    assert!(disk.contains(&cache_key));
    assert!(disk.path_for(&cache_key).exists());
}

#[tokio::test]
async fn eviction_keeps_most_recent_on_disk() {
    let dir = TempDir::new().unwrap();
    let disk = FileSystemTier::open(dir.path(), TierLimits::unlimited().with_max_entries(4))
        .await
        .unwrap();
    let keys: Vec<_> = (0..10)
        .map(|x| FragmentKey::tile("osm", TileCoord::new(x, 0, 4)))
        .collect();
    for key in &keys {
        disk.insert(loaded(key.clone(), b"tile")).await.unwrap();
    }

    assert_eq!(disk.entry_count(), 4);
    for key in &keys[6..] {
        assert!(disk.contains(&key.cache_key()));
    }
}
