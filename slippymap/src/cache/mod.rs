//! Layered fragment cache.
//!
//! - [`MemoryTier`]: shared fragments in a hash map
//! - [`FileSystemTier`]: one `{key}.tile` file per fragment
//! - [`CacheChain`]: ordered tiers with fallback reads and promotion
//!
//! Both tiers share one eviction policy ([`TierLimits`]) and are addressed by
//! the same `"{projection}-{quadkey}"` keys.

mod chain;
mod entry;
mod eviction;
mod filesystem;
mod maintenance;
mod memory;
mod tier;

pub use chain::{CacheChain, FragmentSource, LoadMode};
pub use entry::{CacheEntry, EntryOrigin};
pub use eviction::TierLimits;
pub use filesystem::FileSystemTier;
pub use maintenance::{spawn_purge_daemon, DEFAULT_PURGE_INTERVAL};
pub use memory::MemoryTier;
pub use tier::{CacheError, CacheTier, PurgeResult, TierStats, TierStatsSnapshot};

#[cfg(test)]
pub(crate) use chain::tests::StubSource;
