//! Tile/fragment entity.
//!
//! A [`Fragment`] is one addressable unit of imagery: a square tile or a
//! single static image. Its identity ([`FragmentKey`]) never changes; its
//! image bytes start empty and are filled by [`Fragment::load_image`].
//!
//! Observers follow image state through a `watch` channel. Every load
//! attempt ends with exactly one status publication, success or not, so
//! waiters never hang on a failed fetch.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::coord::{CoordError, LatLon, QuadKey, TileCoord};
use crate::provider::{FetchError, Fetcher, RequestBuilder};
use crate::viewport::StaticView;

/// Fixed-point factor for static view centers (micro-degrees).
const STATIC_COORD_FACTOR: f64 = 1_000_000.0;

/// Address of a fragment within its projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FragmentAddress {
    Tile { coord: TileCoord, quadkey: QuadKey },
    Static(StaticAddress),
}

/// Static image parameters in hashable form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticAddress {
    pub lat_e6: i64,
    pub lon_e6: i64,
    pub width: u32,
    pub height: u32,
    pub scale: u8,
}

impl StaticAddress {
    pub fn center(&self) -> LatLon {
        LatLon::new(
            self.lat_e6 as f64 / STATIC_COORD_FACTOR,
            self.lon_e6 as f64 / STATIC_COORD_FACTOR,
        )
    }
}

/// Identity of a fragment: projection name plus address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    projection: String,
    address: FragmentAddress,
}

impl FragmentKey {
    pub fn tile(projection: impl Into<String>, coord: TileCoord) -> Self {
        Self {
            projection: projection.into(),
            address: FragmentAddress::Tile {
                coord,
                quadkey: QuadKey::from(coord),
            },
        }
    }

    pub fn static_view(view: &StaticView) -> Self {
        Self {
            projection: view.projection.clone(),
            address: FragmentAddress::Static(StaticAddress {
                lat_e6: (view.center.lat * STATIC_COORD_FACTOR).round() as i64,
                lon_e6: (view.center.lon * STATIC_COORD_FACTOR).round() as i64,
                width: view.width,
                height: view.height,
                scale: view.scale,
            }),
        }
    }

    /// Parses a cache key produced by [`FragmentKey::cache_key`].
    pub fn parse(key: &str) -> Result<Self, CoordError> {
        let invalid = |reason| CoordError::InvalidQuadkey(key.to_string(), reason);

        let (projection, address) = key.split_once('-').ok_or(invalid("missing '-'"))?;
        if projection.is_empty() {
            return Err(invalid("empty projection name"));
        }

        let address = match address.strip_prefix('s') {
            Some(rest) => FragmentAddress::Static(parse_static(rest).ok_or(invalid("bad static address"))?),
            None => {
                let quadkey = QuadKey::parse(address)?;
                FragmentAddress::Tile {
                    coord: quadkey.to_tile(),
                    quadkey,
                }
            }
        };

        Ok(Self {
            projection: projection.to_string(),
            address,
        })
    }

    pub fn projection(&self) -> &str {
        &self.projection
    }

    pub fn address(&self) -> &FragmentAddress {
        &self.address
    }

    /// Tile coordinates, for tile fragments.
    pub fn tile_coord(&self) -> Option<TileCoord> {
        match &self.address {
            FragmentAddress::Tile { coord, .. } => Some(*coord),
            FragmentAddress::Static(_) => None,
        }
    }

    pub fn scale(&self) -> u8 {
        match &self.address {
            FragmentAddress::Tile { coord, .. } => coord.scale,
            FragmentAddress::Static(address) => address.scale,
        }
    }

    /// False for scale-0 tiles, whose quadkey is empty.
    pub fn is_addressable(&self) -> bool {
        match &self.address {
            FragmentAddress::Tile { quadkey, .. } => quadkey.is_addressable(),
            FragmentAddress::Static(_) => true,
        }
    }

    /// Cache key: `{projection}-{padded quadkey}` for tiles and
    /// `{projection}-s{w}x{h}z{scale}_{lat_e6}_{lon_e6}` for static images.
    pub fn cache_key(&self) -> String {
        match &self.address {
            FragmentAddress::Tile { quadkey, .. } => {
                format!("{}-{}", self.projection, quadkey.padded())
            }
            FragmentAddress::Static(a) => format!(
                "{}-s{}x{}z{}_{}_{}",
                self.projection, a.width, a.height, a.scale, a.lat_e6, a.lon_e6
            ),
        }
    }
}

impl fmt::Display for FragmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

fn parse_static(rest: &str) -> Option<StaticAddress> {
    let (size, rest) = rest.split_once('z')?;
    let (width, height) = size.split_once('x')?;
    let mut parts = rest.splitn(3, '_');
    let scale = parts.next()?.parse().ok()?;
    let lat_e6 = parts.next()?.parse().ok()?;
    let lon_e6 = parts.next()?.parse().ok()?;

    Some(StaticAddress {
        lat_e6,
        lon_e6,
        width: width.parse().ok()?,
        height: height.parse().ok()?,
        scale,
    })
}

/// Image state published to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    /// No load attempt has finished yet.
    Pending,
    Loaded,
    Failed,
}

/// Options for one [`Fragment::load_image`] call.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Fetch even when bytes are already present.
    pub force_reload: bool,
    /// Upper bound on the fetch; exceeding it is a failed load.
    pub max_latency: Option<Duration>,
    pub cancel: CancellationToken,
}

impl LoadOptions {
    pub fn with_max_latency(mut self, latency: Duration) -> Self {
        self.max_latency = Some(latency);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn forced(mut self) -> Self {
        self.force_reload = true;
        self
    }
}

/// Why a load attempt produced no image.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("No request could be built for {0}")]
    NoRequest(String),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Fetch exceeded max latency of {0:?}")]
    Timeout(Duration),

    #[error("Load cancelled")]
    Cancelled,
}

/// One unit of map imagery.
pub struct Fragment {
    key: FragmentKey,
    created: DateTime<Utc>,
    last_accessed: Mutex<DateTime<Utc>>,
    image: RwLock<Option<Bytes>>,
    status: watch::Sender<ImageStatus>,
    load_lock: tokio::sync::Mutex<()>,
    fetches: AtomicU64,
}

impl Fragment {
    /// Creates an unloaded fragment.
    pub fn new(key: FragmentKey) -> Self {
        let now = Utc::now();
        Self::build(key, None, now, now)
    }

    /// Recreates a fragment from stored bytes and timestamps.
    pub fn restored(
        key: FragmentKey,
        image: Bytes,
        created: DateTime<Utc>,
        last_accessed: DateTime<Utc>,
    ) -> Self {
        Self::build(key, Some(image), created, last_accessed)
    }

    fn build(
        key: FragmentKey,
        image: Option<Bytes>,
        created: DateTime<Utc>,
        last_accessed: DateTime<Utc>,
    ) -> Self {
        let initial = if image.is_some() {
            ImageStatus::Loaded
        } else {
            ImageStatus::Pending
        };
        let (status, _) = watch::channel(initial);

        Self {
            key,
            created,
            last_accessed: Mutex::new(last_accessed),
            image: RwLock::new(image),
            status,
            load_lock: tokio::sync::Mutex::new(()),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> &FragmentKey {
        &self.key
    }

    pub fn cache_key(&self) -> String {
        self.key.cache_key()
    }

    pub fn created_utc(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn last_accessed_utc(&self) -> DateTime<Utc> {
        *self.last_accessed.lock()
    }

    /// Stamps the last-accessed time with now.
    pub fn touch(&self) {
        *self.last_accessed.lock() = Utc::now();
    }

    pub fn image(&self) -> Option<Bytes> {
        self.image.read().clone()
    }

    pub fn has_image(&self) -> bool {
        self.image.read().is_some()
    }

    /// Payload size in bytes (0 when not loaded).
    pub fn size_bytes(&self) -> u64 {
        self.image.read().as_ref().map_or(0, |b| b.len() as u64)
    }

    /// Image format sniffed from the payload.
    pub fn image_format(&self) -> Option<image::ImageFormat> {
        let image = self.image.read();
        image.as_ref().and_then(|b| image::guess_format(b).ok())
    }

    /// Stores bytes directly and notifies observers.
    pub fn set_image(&self, bytes: Bytes) {
        *self.image.write() = Some(bytes);
        self.touch();
        self.status.send_replace(ImageStatus::Loaded);
    }

    pub fn status(&self) -> ImageStatus {
        *self.status.borrow()
    }

    /// Receives a notification at the end of every load attempt.
    pub fn subscribe(&self) -> watch::Receiver<ImageStatus> {
        self.status.subscribe()
    }

    /// Number of network fetches this fragment has issued.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Loads the image, reusing present bytes unless `force_reload` is set.
    ///
    /// Concurrent callers on one fragment are serialized: a second caller
    /// waiting on an in-progress load sees its result instead of fetching
    /// again. A failure leaves the fragment without bytes, publishes
    /// [`ImageStatus::Failed`] and returns the reason.
    pub async fn load_image(
        &self,
        builder: &dyn RequestBuilder,
        fetcher: &dyn Fetcher,
        options: &LoadOptions,
    ) -> Result<Bytes, LoadError> {
        if !options.force_reload {
            if let Some(bytes) = self.image() {
                self.touch();
                return Ok(bytes);
            }
        }

        let _guard = self.load_lock.lock().await;

        if !options.force_reload {
            if let Some(bytes) = self.image() {
                self.touch();
                return Ok(bytes);
            }
        }

        match self.fetch(builder, fetcher, options).await {
            Ok(bytes) => {
                debug!(key = %self.key, bytes = bytes.len(), "Fragment loaded");
                self.set_image(bytes.clone());
                Ok(bytes)
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Fragment load failed");
                self.status.send_replace(ImageStatus::Failed);
                Err(e)
            }
        }
    }

    async fn fetch(
        &self,
        builder: &dyn RequestBuilder,
        fetcher: &dyn Fetcher,
        options: &LoadOptions,
    ) -> Result<Bytes, LoadError> {
        let Some(request) = builder.create_request(self) else {
            error!(key = %self.key, "Request builder produced no request");
            return Err(LoadError::NoRequest(self.cache_key()));
        };

        self.fetches.fetch_add(1, Ordering::Relaxed);
        let fetch = fetcher.fetch(&request);

        tokio::select! {
            _ = options.cancel.cancelled() => Err(LoadError::Cancelled),
            result = async {
                match options.max_latency {
                    Some(limit) => match tokio::time::timeout(limit, fetch).await {
                        Ok(result) => result.map_err(LoadError::from),
                        Err(_) => Err(LoadError::Timeout(limit)),
                    },
                    None => fetch.await.map_err(LoadError::from),
                }
            } => result,
        }
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("key", &self.key.cache_key())
            .field("created", &self.created)
            .field("bytes", &self.size_bytes())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::provider::tests::{MockFetcher, TemplateBuilder};
    use std::sync::Arc;

    fn tile_key() -> FragmentKey {
        FragmentKey::tile("osm", TileCoord::new(27, 48, 15))
    }

    #[test]
    fn test_tile_cache_key_uses_padded_quadkey() {
        let key = FragmentKey::tile("bing", TileCoord::new(2, 1, 3));
        assert_eq!(key.cache_key(), "bing-012");
        assert!(key.is_addressable());
    }

    #[test]
    fn test_scale_zero_key_not_addressable() {
        let key = FragmentKey::tile("osm", TileCoord::new(0, 0, 0));
        assert!(!key.is_addressable());
        assert_eq!(key.cache_key(), "osm-");
    }

    #[test]
    fn test_distinct_projections_distinct_keys() {
        let a = FragmentKey::tile("bing", TileCoord::new(3, 4, 5));
        let b = FragmentKey::tile("osm", TileCoord::new(3, 4, 5));
        assert_ne!(a, b);
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_parse_tile_key() {
        let key = tile_key();
        let parsed = FragmentKey::parse(&key.cache_key()).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.tile_coord(), Some(TileCoord::new(27, 48, 15)));
    }

    #[test]
    fn test_parse_static_key() {
        let view = StaticView {
            projection: "google".into(),
            center: LatLon::new(-33.8688, 151.2093),
            width: 640,
            height: 480,
            scale: 12,
        };
        let key = view.key();
        assert_eq!(key.cache_key(), "google-s640x480z12_-33868800_151209300");
        assert_eq!(FragmentKey::parse(&key.cache_key()).unwrap(), key);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(FragmentKey::parse("nodash").is_err());
        assert!(FragmentKey::parse("-0123").is_err());
        assert!(FragmentKey::parse("osm-0129").is_err());
        assert!(FragmentKey::parse("google-s640x480").is_err());
    }

    #[tokio::test]
    async fn test_load_populates_and_notifies() {
        let fragment = Fragment::new(tile_key());
        let fetcher = MockFetcher::ok(vec![1, 2, 3]);
        let mut rx = fragment.subscribe();
        assert_eq!(*rx.borrow(), ImageStatus::Pending);

        let bytes = fragment
            .load_image(&TemplateBuilder, &fetcher, &LoadOptions::default())
            .await
            .unwrap();

        assert_eq!(bytes.as_ref(), &[1, 2, 3]);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ImageStatus::Loaded);
        assert_eq!(fragment.size_bytes(), 3);
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let fragment = Fragment::new(tile_key());
        let fetcher = MockFetcher::ok(vec![9]);
        let options = LoadOptions::default();

        fragment.load_image(&TemplateBuilder, &fetcher, &options).await.unwrap();
        fragment.load_image(&TemplateBuilder, &fetcher, &options).await.unwrap();
        assert_eq!(fetcher.calls(), 1);

        fragment
            .load_image(&TemplateBuilder, &fetcher, &options.clone().forced())
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_loads_fetch_once() {
        let fragment = Arc::new(Fragment::new(tile_key()));
        let fetcher = Arc::new(MockFetcher::ok(vec![7; 16]).with_delay(Duration::from_millis(20)));
        let options = LoadOptions::default();

        let (a, b) = tokio::join!(
            fragment.load_image(&TemplateBuilder, fetcher.as_ref(), &options),
            fragment.load_image(&TemplateBuilder, fetcher.as_ref(), &options),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(fragment.fetch_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_loads_across_threads_fetch_once() {
        let fragment = Arc::new(Fragment::new(tile_key()));
        let fetcher = Arc::new(MockFetcher::ok(vec![7; 16]).with_delay(Duration::from_millis(50)));
        let barrier = Arc::new(tokio::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let fragment = Arc::clone(&fragment);
                let fetcher = Arc::clone(&fetcher);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    fragment
                        .load_image(&TemplateBuilder, fetcher.as_ref(), &LoadOptions::default())
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().as_ref(), &[7; 16]);
        }
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(fragment.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_leaves_bytes_empty_and_notifies() {
        let fragment = Fragment::new(tile_key());
        let fetcher = MockFetcher::status(404);
        let mut rx = fragment.subscribe();

        let result = fragment
            .load_image(&TemplateBuilder, &fetcher, &LoadOptions::default())
            .await;

        assert!(matches!(result, Err(LoadError::Fetch(FetchError::Status { status: 404, .. }))));
        assert!(!fragment.has_image());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ImageStatus::Failed);
    }

    #[tokio::test]
    async fn test_max_latency_exceeded_is_failure() {
        let fragment = Fragment::new(tile_key());
        let fetcher = MockFetcher::ok(vec![1]).with_delay(Duration::from_millis(200));
        let options = LoadOptions::default().with_max_latency(Duration::from_millis(10));

        let result = fragment.load_image(&TemplateBuilder, &fetcher, &options).await;
        assert!(matches!(result, Err(LoadError::Timeout(_))));
        assert_eq!(fragment.status(), ImageStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_load_is_failure() {
        let fragment = Fragment::new(tile_key());
        let fetcher = MockFetcher::ok(vec![1]).with_delay(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let options = LoadOptions::default().with_cancel(cancel);

        let result = fragment.load_image(&TemplateBuilder, &fetcher, &options).await;
        assert!(matches!(result, Err(LoadError::Cancelled)));
        assert!(!fragment.has_image());
    }

    #[tokio::test]
    async fn test_static_fragment_without_builder_support_fails() {
        let view = StaticView {
            projection: "osm".into(),
            center: LatLon::new(0.0, 0.0),
            width: 100,
            height: 100,
            scale: 3,
        };
        let fragment = view.fragment();
        let fetcher = MockFetcher::ok(vec![1]);

        let result = fragment
            .load_image(&TemplateBuilder, &fetcher, &LoadOptions::default())
            .await;
        assert!(matches!(result, Err(LoadError::NoRequest(_))));
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(fragment.status(), ImageStatus::Failed);
    }

    #[test]
    fn test_image_format_sniffed() {
        let png_header = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        let fragment = Fragment::restored(tile_key(), Bytes::from(png_header), Utc::now(), Utc::now());
        assert_eq!(fragment.image_format(), Some(image::ImageFormat::Png));
        assert_eq!(fragment.status(), ImageStatus::Loaded);
    }
}
