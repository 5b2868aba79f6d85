//! Coordinate types shared by the projection, viewport and cache layers.

use std::fmt;
use thiserror::Error;

/// Minimum valid latitude for Web Mercator projection
pub const MIN_LAT: f64 = -85.05112878;

/// Maximum valid latitude for Web Mercator projection
pub const MAX_LAT: f64 = 85.05112878;

/// Minimum valid longitude
pub const MIN_LON: f64 = -180.0;

/// Maximum valid longitude
pub const MAX_LON: f64 = 180.0;

/// Lowest scale (zoom level) any projection may use.
pub const MIN_SCALE: u8 = 0;

/// Highest scale any projection may use.
///
/// At scale 23 with 256px tiles the pixel extent still fits comfortably in
/// `u32` arithmetic.
pub const MAX_SCALE: u8 = 23;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// A position in the projection's pixel (cartesian) space.
///
/// The origin is the north-west corner of the map; `y` grows southward.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Tile coordinates within the `2^scale × 2^scale` grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TileCoord {
    /// Column, west to east
    pub x: u32,
    /// Row, north to south
    pub y: u32,
    /// Scale (zoom level)
    pub scale: u8,
}

impl TileCoord {
    pub const fn new(x: u32, y: u32, scale: u8) -> Self {
        Self { x, y, scale }
    }

    /// Number of tiles along one side of the grid at this tile's scale.
    #[inline]
    pub fn tiles_per_side(&self) -> u32 {
        tiles_per_side(self.scale)
    }

    /// True when both axes lie inside the grid for this scale.
    pub fn is_valid(&self) -> bool {
        let n = self.tiles_per_side();
        self.scale <= MAX_SCALE && self.x < n && self.y < n
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.scale, self.x, self.y)
    }
}

/// Tile coordinate qualified by the owning projection.
///
/// Two projections can address the same `(x, y, scale)`; equality here keeps
/// them apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileId {
    pub projection: String,
    pub coord: TileCoord,
}

impl TileId {
    pub fn new(projection: impl Into<String>, coord: TileCoord) -> Self {
        Self {
            projection: projection.into(),
            coord,
        }
    }
}

/// Number of tiles along one side of the grid at `scale`.
#[inline]
pub fn tiles_per_side(scale: u8) -> u32 {
    1u32 << scale.min(MAX_SCALE)
}

/// Errors from the few coordinate operations that can fail outright.
///
/// Range violations are never errors: they are clamped and logged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    #[error("Invalid quadkey '{0}': {1}")]
    InvalidQuadkey(String, &'static str),

    #[error("Scale {0} exceeds maximum {MAX_SCALE}")]
    ScaleTooLarge(u8),
}
