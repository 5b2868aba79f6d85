//! Background age purge.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::chain::CacheChain;

/// Default interval between purge cycles.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(300);

/// Spawns a task running [`CacheChain::purge_expired`] every `interval`
/// until `shutdown` is cancelled. A first cycle runs immediately.
pub fn spawn_purge_daemon(
    chain: Arc<CacheChain>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            tiers = chain.len(),
            interval_secs = interval.as_secs(),
            "Cache purge daemon started"
        );

        run_purge_cycle(&chain).await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Cache purge daemon shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    run_purge_cycle(&chain).await;
                }
            }
        }
    })
}

async fn run_purge_cycle(chain: &CacheChain) {
    for (tier, result) in chain.purge_expired().await {
        if result.entries_removed > 0 {
            info!(
                tier = %tier,
                entries_removed = result.entries_removed,
                bytes_freed = result.bytes_freed,
                duration_ms = result.duration_ms,
                "Cache purge complete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheTier, MemoryTier, TierLimits};
    use crate::coord::TileCoord;
    use crate::fragment::{Fragment, FragmentKey};
    use bytes::Bytes;
    use chrono::Utc;

    #[tokio::test]
    async fn test_daemon_purges_and_stops() {
        let tier = Arc::new(MemoryTier::new(
            TierLimits::unlimited().with_retention(Duration::from_secs(60)),
        ));
        let old = Utc::now() - chrono::Duration::hours(1);
        let key = FragmentKey::tile("osm", TileCoord::new(1, 1, 2));
        tier.insert(Arc::new(Fragment::restored(key, Bytes::from_static(b"x"), old, old)))
            .await
            .unwrap();

        let chain = Arc::new(CacheChain::new(vec![tier.clone() as Arc<dyn CacheTier>]));
        let shutdown = CancellationToken::new();
        let handle = spawn_purge_daemon(chain, Duration::from_millis(10), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tier.entry_count(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
