//! slippymap - slippy-map projection, tile addressing and layered caching.
//!
//! Converts geographic positions into provider tile or static-image
//! addresses and retrieves the raster fragments behind them, avoiding
//! repeat network fetches through an ordered chain of cache tiers.
//!
//! ```text
//! ViewportRequest ──► viewport::resolve ──► FragmentKey (quadkey)
//!                                              │
//!                     CacheChain [memory, disk] ◄┘
//!                              │ miss
//!                              ▼
//!                     NetworkSource ──► RequestBuilder + Fetcher
//! ```
//!
//! # Example
//!
//! ```
//! use slippymap::coord::{quad_key, QuadKey, TileCoord};
//!
//! assert_eq!(quad_key(2, 1, 3), "12");
//! assert_eq!(QuadKey::from(TileCoord::new(2, 1, 3)).padded(), "012");
//! ```

pub mod acquire;
pub mod cache;
pub mod config;
pub mod coord;
pub mod fragment;
pub mod logging;
pub mod projection;
pub mod provider;
pub mod viewport;

pub use acquire::{FetchPolicy, ImagePipeline, NetworkSource, PipelineConfig};
pub use cache::{CacheChain, CacheEntry, CacheTier, FileSystemTier, MemoryTier, TierLimits};
pub use fragment::{Fragment, FragmentKey};
pub use projection::{Projection, ProviderMetadata};
pub use viewport::{resolve, ViewportRequest, ViewportResolution};
