//! Provider-supplied projection bounds.

use crate::coord::{ScaleRange, DEFAULT_TILE_SIZE, MAX_LAT};

/// How a provider delivers imagery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageryMode {
    /// Square tiles addressed by `(x, y, scale)`.
    Tiled,
    /// One custom-sized image per view, capped at the given pixel box.
    Static { max_width: u32, max_height: u32 },
}

/// Bounds discovered during authentication and applied to a projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMetadata {
    pub scale_range: ScaleRange,
    pub tile_size: u32,
    pub max_latitude: f64,
    pub mode: ImageryMode,
}

impl ProviderMetadata {
    /// Tiled metadata with the standard Mercator latitude limit.
    pub fn tiled(min_scale: u8, max_scale: u8, tile_size: u32) -> Self {
        Self {
            scale_range: ScaleRange::new(min_scale, max_scale),
            tile_size,
            max_latitude: MAX_LAT,
            mode: ImageryMode::Tiled,
        }
    }

    /// Static metadata capped at `max_width × max_height` pixels.
    pub fn static_map(min_scale: u8, max_scale: u8, max_width: u32, max_height: u32) -> Self {
        Self {
            scale_range: ScaleRange::new(min_scale, max_scale),
            tile_size: DEFAULT_TILE_SIZE,
            max_latitude: MAX_LAT,
            mode: ImageryMode::Static {
                max_width,
                max_height,
            },
        }
    }
}

impl Default for ProviderMetadata {
    fn default() -> Self {
        Self::tiled(1, 19, DEFAULT_TILE_SIZE)
    }
}
