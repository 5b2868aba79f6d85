//! Filesystem cache tier.
//!
//! Each entry is one file, `{directory}/{cache_key}.tile`, holding the image
//! bytes verbatim. Writes go to a temporary file that is renamed into place.
//!
//! File timestamps carry the entry bookkeeping so the index can be rebuilt
//! when the tier is reopened:
//!
//! - mtime = created (when the tier wrote the file)
//! - atime = last accessed (stamped explicitly on every read)

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Instant, SystemTime};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, info, warn};

use super::eviction::{Removed, TierIndex, TierLimits};
use super::tier::{validate_insert, CacheError, CacheTier, PurgeResult, TierStats, TierStatsSnapshot};
use crate::fragment::{Fragment, FragmentKey};

const TILE_EXTENSION: &str = "tile";
const TEMP_EXTENSION: &str = "tmp";

/// Pattern for a cache file name.
///
/// `<projection>-<padded quadkey>.tile` or
/// `<projection>-s<w>x<h>z<scale>_<lat_e6>_<lon_e6>.tile`
fn cache_file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_]+-(?:[0-3]+|s\d+x\d+z\d+_-?\d+_-?\d+))\.tile$").unwrap()
    })
}

/// Directory-backed tier.
pub struct FileSystemTier {
    name: String,
    directory: PathBuf,
    limits: TierLimits,
    index: Mutex<TierIndex<()>>,
    stats: TierStats,
    temp_seq: AtomicU64,
}

impl FileSystemTier {
    /// Opens (creating if needed) a tier rooted at `directory` and rebuilds
    /// its index from the files already present.
    pub async fn open(directory: impl Into<PathBuf>, limits: TierLimits) -> Result<Self, CacheError> {
        let tier = Self {
            name: "disk".to_string(),
            directory: directory.into(),
            limits,
            index: Mutex::new(TierIndex::new()),
            stats: TierStats::default(),
            temp_seq: AtomicU64::new(0),
        };

        tokio::fs::create_dir_all(&tier.directory).await?;
        let restored = tier.scan().await?;

        let evicted = tier.index.lock().enforce(&tier.limits);
        tier.delete_files(&evicted).await;

        info!(
            dir = %tier.directory.display(),
            entries = restored,
            evicted = evicted.len(),
            size_bytes = tier.size_bytes(),
            "Disk cache tier opened"
        );
        Ok(tier)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the file holding `cache_key`.
    pub fn path_for(&self, cache_key: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{}", cache_key, TILE_EXTENSION))
    }

    /// Unique temporary path for one write of `cache_key`.
    fn temp_path_for(&self, cache_key: &str) -> PathBuf {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        self.directory.join(format!(
            "{}.{}.{}.{}",
            cache_key,
            TILE_EXTENSION,
            seq,
            TEMP_EXTENSION
        ))
    }

    async fn scan(&self) -> Result<usize, CacheError> {
        let mut found = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.directory).await?;

        while let Some(entry) = dir.next_entry().await? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };

            if file_name.ends_with(TEMP_EXTENSION) {
                debug!(file = file_name, "Removing leftover temporary file");
                let _ = tokio::fs::remove_file(entry.path()).await;
                continue;
            }

            let Some(key) = cache_file_pattern()
                .captures(file_name)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
            else {
                continue;
            };

            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    warn!(file = file_name, error = %e, "Failed to stat cache file");
                    continue;
                }
            };

            let created = to_utc(metadata.modified().ok());
            let accessed = to_utc(metadata.accessed().ok()).max(created);
            found.push((key, metadata.len(), created, accessed));
        }

        // insertion order must follow creation order for count eviction
        found.sort_by(|a, b| a.2.cmp(&b.2));
        let count = found.len();

        let mut index = self.index.lock();
        for (key, size, created, accessed) in found {
            index.insert(key, (), size, created, accessed);
        }
        Ok(count)
    }

    async fn delete_files(&self, removed: &Removed<()>) {
        for (key, _) in removed {
            let path = self.path_for(key);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to delete cache file");
                }
            }
        }
    }

    fn validate_key(key: &str) -> Result<(), CacheError> {
        let file_name = format!("{}.{}", key, TILE_EXTENSION);
        if cache_file_pattern().is_match(&file_name) {
            Ok(())
        } else {
            Err(CacheError::InvalidKey(key.to_string()))
        }
    }
}

fn to_utc(time: Option<SystemTime>) -> DateTime<Utc> {
    time.map(DateTime::<Utc>::from).unwrap_or_else(Utc::now)
}

fn to_file_time(time: DateTime<Utc>) -> FileTime {
    FileTime::from_system_time(SystemTime::from(time))
}

impl CacheTier for FileSystemTier {
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
            let cache_key = key.cache_key();
            let Some(created) = self.index.lock().get(&cache_key).map(|e| e.created) else {
                self.stats.record_miss();
                return Ok(None);
            };

            let path = self.path_for(&cache_key);
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(key = %cache_key, "Cache file vanished, dropping index entry");
                    self.index.lock().remove(&cache_key);
                    self.stats.record_miss();
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

            let now = Utc::now();
            self.index.lock().touch(&cache_key, now);
            if let Err(e) = filetime::set_file_atime(&path, to_file_time(now)) {
                debug!(key = %cache_key, error = %e, "Failed to stamp access time");
            }

            self.stats.record_hit();
            Ok(Some(Arc::new(Fragment::restored(
                key.clone(),
                Bytes::from(bytes),
                created,
                now,
            ))))
        }
        .boxed()
    }

    fn insert(&self, fragment: Arc<Fragment>) -> BoxFuture<'_, Result<(), CacheError>> {
        async move {
            validate_insert(&fragment)?;
            let key = fragment.cache_key();
            Self::validate_key(&key)?;
            let Some(bytes) = fragment.image() else {
                return Err(CacheError::MissingImage(key));
            };

            let path = self.path_for(&key);
            let temp = self.temp_path_for(&key);
            tokio::fs::write(&temp, &bytes).await?;
            if let Err(e) = tokio::fs::rename(&temp, &path).await {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(e.into());
            }

            let created = Utc::now();
            let accessed = fragment.last_accessed_utc();
            filetime::set_file_times(&path, to_file_time(accessed), to_file_time(created))?;

            let evicted = {
                let mut index = self.index.lock();
                if index
                    .insert(key.clone(), (), bytes.len() as u64, created, accessed)
                    .is_some()
                {
                    warn!(tier = %self.name, key = %key, "Replacing existing cache entry");
                }
                index.enforce(&self.limits)
            };

            self.stats.record_insertion();
            if !evicted.is_empty() {
                self.stats.record_evictions(evicted.len());
                debug!(tier = %self.name, evicted = evicted.len(), "Evicted entries over limit");
                self.delete_files(&evicted).await;
            }
            Ok(())
        }
        .boxed()
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, CacheError>> {
        async move {
            let Some(entry) = self.index.lock().remove(key) else {
                return Ok(false);
            };
            self.delete_files(&vec![(key.to_string(), entry)]).await;
            Ok(true)
        }
        .boxed()
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
            self.delete_files(&removed).await;

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
        async move {
            let removed = self.index.lock().drain();
            self.delete_files(&removed).await;
            Ok(removed.len())
        }
        .boxed()
    }

    fn stats(&self) -> TierStatsSnapshot {
        let (entries, bytes) = {
            let index = self.index.lock();
            (index.len(), index.total_bytes())
        };
        self.stats.snapshot(entries, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::coord::{LatLon, TileCoord};
    use crate::viewport::StaticView;

    fn loaded(x: u32, payload: &[u8]) -> Arc<Fragment> {
        let fragment = Fragment::new(FragmentKey::tile("osm", TileCoord::new(x, 3, 6)));
        fragment.set_image(Bytes::copy_from_slice(payload));
        Arc::new(fragment)
    }

    #[tokio::test]
    async fn test_payload_persisted_verbatim() {
        let dir = TempDir::new().unwrap();
        let tier = FileSystemTier::open(dir.path(), TierLimits::unlimited()).await.unwrap();
        let fragment = loaded(1, b"\x89PNG tile bytes");
        tier.insert(Arc::clone(&fragment)).await.unwrap();

        let path = dir.path().join(format!("{}.tile", fragment.cache_key()));
        assert_eq!(std::fs::read(&path).unwrap(), b"\x89PNG tile bytes");

        let hit = tier.get(fragment.key()).await.unwrap().unwrap();
        assert_eq!(hit.image().unwrap().as_ref(), b"\x89PNG tile bytes");
        assert_eq!(hit.key(), fragment.key());
    }

    #[tokio::test]
    async fn test_index_rebuilt_on_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let tier = FileSystemTier::open(dir.path(), TierLimits::unlimited()).await.unwrap();
            tier.insert(loaded(1, b"one")).await.unwrap();
            tier.insert(loaded(2, b"three")).await.unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        std::fs::write(dir.path().join("osm-012.tile.tmp"), b"partial").unwrap();

        let tier = FileSystemTier::open(dir.path(), TierLimits::unlimited()).await.unwrap();
        assert_eq!(tier.entry_count(), 2);
        assert_eq!(tier.size_bytes(), 8);
        assert!(!dir.path().join("osm-012.tile.tmp").exists());

        let hit = tier.get(loaded(2, b"").key()).await.unwrap().unwrap();
        assert_eq!(hit.image().unwrap().as_ref(), b"three");
    }

    #[tokio::test]
    async fn test_created_is_insert_time_and_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let key = FragmentKey::tile("osm", TileCoord::new(4, 4, 4));
        let built = Utc::now() - ChronoDuration::days(3);
        let before = Utc::now();
        {
            let tier = FileSystemTier::open(dir.path(), TierLimits::unlimited()).await.unwrap();
            let fragment = Fragment::restored(key.clone(), Bytes::from_static(b"x"), built, built);
            tier.insert(Arc::new(fragment)).await.unwrap();
        }

        let tier = FileSystemTier::open(dir.path(), TierLimits::unlimited()).await.unwrap();
        let hit = tier.get(&key).await.unwrap().unwrap();
        let drift = (hit.created_utc() - before).num_seconds().abs();
        assert!(drift <= 1, "created drifted by {}s", drift);
    }

    #[tokio::test]
    async fn test_old_fragment_inserted_into_full_tier_is_kept() {
        let dir = TempDir::new().unwrap();
        let tier = FileSystemTier::open(dir.path(), TierLimits::unlimited().with_max_entries(2))
            .await
            .unwrap();
        tier.insert(loaded(1, b"a")).await.unwrap();
        tier.insert(loaded(2, b"b")).await.unwrap();

        let key = FragmentKey::tile("osm", TileCoord::new(9, 3, 6));
        let old = Utc::now() - ChronoDuration::hours(1);
        tier.insert(Arc::new(Fragment::restored(key.clone(), Bytes::from_static(b"c"), old, old)))
            .await
            .unwrap();

        assert!(tier.contains(&key.cache_key()));
        assert!(!tier.contains(&loaded(1, b"").cache_key()));
        assert!(tier.path_for(&key.cache_key()).exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_inserts_of_one_key_all_succeed() {
        let dir = TempDir::new().unwrap();
        let tier = Arc::new(FileSystemTier::open(dir.path(), TierLimits::unlimited()).await.unwrap());

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let tier = Arc::clone(&tier);
                tokio::spawn(async move {
                    let fragment = Fragment::new(FragmentKey::tile("osm", TileCoord::new(5, 3, 6)));
                    fragment.set_image(Bytes::from(vec![i; 64]));
                    tier.insert(Arc::new(fragment)).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(tier.entry_count(), 1);
        let key = FragmentKey::tile("osm", TileCoord::new(5, 3, 6));
        let bytes = std::fs::read(tier.path_for(&key.cache_key())).unwrap();
        assert_eq!(bytes.len(), 64);
        assert!(bytes.iter().all(|b| *b == bytes[0]));

        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with("tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_count_eviction_deletes_files() {
        let dir = TempDir::new().unwrap();
        let tier = FileSystemTier::open(dir.path(), TierLimits::unlimited().with_max_entries(2))
            .await
            .unwrap();
        let fragments: Vec<_> = (0..4).map(|x| loaded(x, b"data")).collect();
        for fragment in &fragments {
            tier.insert(Arc::clone(fragment)).await.unwrap();
        }

        assert_eq!(tier.entry_count(), 2);
        assert!(!tier.path_for(&fragments[0].cache_key()).exists());
        assert!(!tier.path_for(&fragments[1].cache_key()).exists());
        assert!(tier.path_for(&fragments[2].cache_key()).exists());
        assert!(tier.path_for(&fragments[3].cache_key()).exists());
    }

    #[tokio::test]
    async fn test_reopen_with_smaller_limit_evicts() {
        let dir = TempDir::new().unwrap();
        {
            let tier = FileSystemTier::open(dir.path(), TierLimits::unlimited()).await.unwrap();
            for x in 0..5 {
                tier.insert(loaded(x, b"abcd")).await.unwrap();
            }
        }

        let tier = FileSystemTier::open(dir.path(), TierLimits::unlimited().with_max_bytes(10))
            .await
            .unwrap();
        assert!(tier.size_bytes() <= 10);
        assert_eq!(tier.entry_count(), 2);
    }

    #[tokio::test]
    async fn test_purge_expired_removes_files() {
        let dir = TempDir::new().unwrap();
        let tier = FileSystemTier::open(
            dir.path(),
            TierLimits::unlimited().with_retention(Duration::from_secs(3600)),
        )
        .await
        .unwrap();

        let key = FragmentKey::tile("osm", TileCoord::new(7, 7, 3));
        let old = Utc::now() - ChronoDuration::hours(2);
        tier.insert(Arc::new(Fragment::restored(key.clone(), Bytes::from_static(b"old"), old, old)))
            .await
            .unwrap();
        tier.insert(loaded(1, b"new")).await.unwrap();

        let result = tier.purge_expired().await.unwrap();
        assert_eq!(result.entries_removed, 1);
        assert!(!tier.path_for(&key.cache_key()).exists());
        assert_eq!(tier.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_static_fragment_round_trip() {
        let dir = TempDir::new().unwrap();
        let tier = FileSystemTier::open(dir.path(), TierLimits::unlimited()).await.unwrap();
        let view = StaticView {
            projection: "google".into(),
            center: LatLon::new(-12.5, 130.25),
            width: 640,
            height: 640,
            scale: 9,
        };
        let fragment = view.fragment();
        fragment.set_image(Bytes::from_static(b"jpeg"));
        tier.insert(Arc::new(fragment)).await.unwrap();

        let hit = tier.get(&view.key()).await.unwrap().unwrap();
        assert_eq!(hit.image().unwrap().as_ref(), b"jpeg");
    }

    #[tokio::test]
    async fn test_vanished_file_is_miss() {
        let dir = TempDir::new().unwrap();
        let tier = FileSystemTier::open(dir.path(), TierLimits::unlimited()).await.unwrap();
        let fragment = loaded(3, b"gone");
        tier.insert(Arc::clone(&fragment)).await.unwrap();
        std::fs::remove_file(tier.path_for(&fragment.cache_key())).unwrap();

        assert!(tier.get(fragment.key()).await.unwrap().is_none());
        assert!(!tier.contains(&fragment.cache_key()));
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let dir = TempDir::new().unwrap();
        let tier = FileSystemTier::open(dir.path(), TierLimits::unlimited()).await.unwrap();
        tier.insert(loaded(1, b"a")).await.unwrap();
        tier.insert(loaded(2, b"b")).await.unwrap();

        assert_eq!(tier.clear().await.unwrap(), 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
