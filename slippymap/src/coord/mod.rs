//! Coordinate conversion module
//!
//! Provides the Web Mercator transform between geographic coordinates
//! (latitude/longitude), projection pixel space and the tile grid, plus
//! quadkey tile addressing and clamped value ranges.
//!
//! The functions here are pure: they take the map's pixel width explicitly.
//! [`crate::projection::Projection`] supplies that width from its current
//! scale and tile size, and takes care of clamping.

mod quadkey;
mod range;
mod types;

pub use quadkey::{quad_key, QuadKey};
pub use range::{GeoRange, Range, ScaleRange};
pub use types::{
    tiles_per_side, CoordError, LatLon, PixelPoint, TileCoord, TileId, DEFAULT_TILE_SIZE,
    MAX_LAT, MAX_LON, MAX_SCALE, MIN_LAT, MIN_LON, MIN_SCALE,
};

use std::f64::consts::PI;

/// Pixel extent of the whole map along one axis: `tile_size · 2^scale`.
#[inline]
pub fn map_width(tile_size: u32, scale: u8) -> f64 {
    tile_size as f64 * tiles_per_side(scale) as f64
}

/// Converts a geographic position to pixel coordinates.
///
/// # Arguments
///
/// * `location` - Position in degrees, expected to be inside the Mercator range
/// * `width` - Map pixel width at the target scale (see [`map_width`])
#[inline]
pub fn lat_lon_to_pixel(location: LatLon, width: f64) -> PixelPoint {
    let x = width * (location.lon / 360.0 + 0.5);
    let y = width / 2.0 - width * (PI / 4.0 + location.lat * PI / 360.0).tan().ln() / (2.0 * PI);
    PixelPoint { x, y }
}

/// Converts pixel coordinates back to a geographic position.
///
/// Inverse of [`lat_lon_to_pixel`].
#[inline]
pub fn pixel_to_lat_lon(point: PixelPoint, width: f64) -> LatLon {
    let lon = (point.x / width - 0.5) * 360.0;
    let n = (width / 2.0 - point.y) * 2.0 * PI / width;
    let lat = (2.0 * n.exp().atan() - PI / 2.0) * 180.0 / PI;
    LatLon { lat, lon }
}

/// Converts pixel coordinates to the tile containing them.
///
/// Points on or beyond the map edge land in the nearest edge tile.
#[inline]
pub fn pixel_to_tile(point: PixelPoint, tile_size: u32, scale: u8) -> TileCoord {
    let last = (tiles_per_side(scale) - 1) as f64;
    let size = tile_size as f64;
    let x = (point.x / size).floor().clamp(0.0, last) as u32;
    let y = (point.y / size).floor().clamp(0.0, last) as u32;
    TileCoord { x, y, scale }
}

/// Converts tile coordinates to the geographic position of the tile's
/// north-west corner.
#[inline]
pub fn tile_to_lat_lon(tile: &TileCoord, tile_size: u32) -> LatLon {
    let width = map_width(tile_size, tile.scale);
    let size = tile_size as f64;
    pixel_to_lat_lon(
        PixelPoint::new(tile.x as f64 * size, tile.y as f64 * size),
        width,
    )
}
