//! Map projection state and conversions.
//!
//! A [`Projection`] owns one provider's geographic and scale bounds, its
//! current scale and tile size, and the set of registered points that must
//! follow scale changes. It is created uninitialized and becomes usable once
//! provider metadata is applied (normally by authentication).
//!
//! All conversions clamp their inputs into the projection's ranges and log
//! the correction. Conversions attempted before initialization log an error
//! and return a default value.
//!
//! # Example
//!
//! ```
//! use slippymap::coord::LatLon;
//! use slippymap::projection::{Projection, ProviderMetadata};
//!
//! let projection = Projection::with_metadata("osm", &ProviderMetadata::tiled(0, 19, 256));
//! projection.set_scale(15);
//! let tile = projection.lat_long_to_tile(LatLon::new(51.5074, -0.1278));
//! assert_eq!(tile.scale, 15);
//! ```

mod metadata;

pub use metadata::{ImageryMode, ProviderMetadata};

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::coord::{
    self, tiles_per_side, GeoRange, LatLon, PixelPoint, Range, ScaleRange, TileCoord,
    DEFAULT_TILE_SIZE,
};

/// Handle for a point registered with a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointId(u64);

/// Derived ranges for one `(scale, tile size, geo bounds)` combination.
///
/// Frames are cheap copies; conversions through a frame never touch the
/// projection's lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFrame {
    scale: u8,
    tile_size: u32,
    tiles_per_side: u32,
    geo: GeoRange,
    x_range: Range<f64>,
    y_range: Range<f64>,
}

impl ScaleFrame {
    pub fn new(scale: u8, tile_size: u32, geo: GeoRange) -> Self {
        let width = coord::map_width(tile_size, scale);
        let north = coord::lat_lon_to_pixel(LatLon::new(geo.latitude.max(), 0.0), width);
        let south = coord::lat_lon_to_pixel(LatLon::new(geo.latitude.min(), 0.0), width);

        Self {
            scale,
            tile_size,
            tiles_per_side: tiles_per_side(scale),
            geo,
            x_range: Range::new(0.0, width),
            y_range: Range::new(north.y.max(0.0), south.y.min(width)),
        }
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn tiles_per_side(&self) -> u32 {
        self.tiles_per_side
    }

    pub fn x_range(&self) -> Range<f64> {
        self.x_range
    }

    pub fn y_range(&self) -> Range<f64> {
        self.y_range
    }

    pub fn geo_range(&self) -> GeoRange {
        self.geo
    }

    /// Pixel width of the whole map at this scale.
    pub fn width(&self) -> f64 {
        self.x_range.max()
    }

    pub fn clamp_point(&self, point: PixelPoint) -> PixelPoint {
        PixelPoint {
            x: self.x_range.clamp(point.x, "x"),
            y: self.y_range.clamp(point.y, "y"),
        }
    }

    /// Clamps tile indices into `[0, tiles_per_side - 1]`.
    pub fn clamp_tile(&self, x: u32, y: u32) -> TileCoord {
        let axis = Range::new(0, self.tiles_per_side - 1);
        TileCoord::new(
            axis.clamp(x, "tile_x"),
            axis.clamp(y, "tile_y"),
            self.scale,
        )
    }

    pub fn lat_long_to_cartesian(&self, location: LatLon) -> PixelPoint {
        let location = self.geo.clamp(location);
        self.clamp_point(coord::lat_lon_to_pixel(location, self.width()))
    }

    pub fn cartesian_to_lat_long(&self, point: PixelPoint) -> LatLon {
        let point = self.clamp_point(point);
        coord::pixel_to_lat_lon(point, self.width())
    }

    pub fn cartesian_to_tile(&self, point: PixelPoint) -> TileCoord {
        coord::pixel_to_tile(self.clamp_point(point), self.tile_size, self.scale)
    }

    /// North-west corner of a tile.
    pub fn tile_to_lat_long(&self, x: u32, y: u32) -> LatLon {
        let tile = self.clamp_tile(x, y);
        coord::tile_to_lat_lon(&tile, self.tile_size)
    }

    pub fn lat_long_to_tile(&self, location: LatLon) -> TileCoord {
        self.cartesian_to_tile(self.lat_long_to_cartesian(location))
    }
}

#[derive(Debug, Clone, Copy)]
struct RegisteredPoint {
    location: LatLon,
    pixel: PixelPoint,
}

#[derive(Debug)]
struct ProjectionState {
    initialized: bool,
    scale_range: ScaleRange,
    scale: u8,
    mode: ImageryMode,
    frame: ScaleFrame,
    points: HashMap<PointId, RegisteredPoint>,
    next_point_id: u64,
}

impl ProjectionState {
    fn rebuild(&mut self, tile_size: u32, geo: GeoRange) {
        self.frame = ScaleFrame::new(self.scale, tile_size, geo);
        let frame = self.frame;
        for point in self.points.values_mut() {
            point.pixel = frame.lat_long_to_cartesian(point.location);
        }
    }
}

/// One provider's projection.
pub struct Projection {
    name: String,
    state: RwLock<ProjectionState>,
    scale_tx: watch::Sender<u8>,
}

impl Projection {
    /// Creates an uninitialized projection with default bounds.
    ///
    /// # Arguments
    ///
    /// * `name` - Provider name, used as the cache key prefix. Must not
    ///   contain `-`.
    pub fn new(name: impl Into<String>) -> Self {
        let scale_range = ScaleRange::new(1, 19);
        let scale = scale_range.min();
        let (scale_tx, _) = watch::channel(scale);

        Self {
            name: name.into(),
            state: RwLock::new(ProjectionState {
                initialized: false,
                scale_range,
                scale,
                mode: ImageryMode::Tiled,
                frame: ScaleFrame::new(scale, DEFAULT_TILE_SIZE, GeoRange::default()),
                points: HashMap::new(),
                next_point_id: 0,
            }),
            scale_tx,
        }
    }

    /// Creates a projection and immediately applies `metadata`.
    pub fn with_metadata(name: impl Into<String>, metadata: &ProviderMetadata) -> Self {
        let projection = Self::new(name);
        projection.initialize(metadata);
        projection
    }

    /// Applies provider bounds and marks the projection usable.
    ///
    /// The provider's scale range is conformed into the addressable zoom
    /// levels, and the current scale is re-clamped into the result.
    pub fn initialize(&self, metadata: &ProviderMetadata) {
        let addressable = ScaleRange::default();
        let scale_range = ScaleRange::new(
            addressable.clamp(metadata.scale_range.min(), "min_scale"),
            addressable.clamp(metadata.scale_range.max(), "max_scale"),
        );

        let changed = {
            let mut state = self.state.write();
            let previous = state.scale;
            state.scale_range = scale_range;
            state.scale = scale_range.clamp(previous, "scale");
            state.mode = metadata.mode;
            state.initialized = true;
            state.rebuild(
                metadata.tile_size.max(1),
                GeoRange::mercator(metadata.max_latitude),
            );
            (previous != state.scale).then_some(state.scale)
        };

        info!(
            projection = %self.name,
            min_scale = scale_range.min(),
            max_scale = scale_range.max(),
            tile_size = metadata.tile_size,
            "Projection initialized"
        );

        if let Some(scale) = changed {
            self.scale_tx.send_replace(scale);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    pub fn scale(&self) -> u8 {
        self.state.read().scale
    }

    pub fn scale_range(&self) -> ScaleRange {
        self.state.read().scale_range
    }

    pub fn mode(&self) -> ImageryMode {
        self.state.read().mode
    }

    pub fn tile_size(&self) -> u32 {
        self.state.read().frame.tile_size
    }

    pub fn tiles_per_side(&self) -> u32 {
        self.state.read().frame.tiles_per_side
    }

    pub fn geo_range(&self) -> GeoRange {
        self.state.read().frame.geo
    }

    pub fn x_range(&self) -> Range<f64> {
        self.state.read().frame.x_range
    }

    pub fn y_range(&self) -> Range<f64> {
        self.state.read().frame.y_range
    }

    /// Changes the current scale, clamped into the scale range.
    ///
    /// Derived ranges and every registered point are recomputed, and
    /// subscribers are notified once if the scale actually changed.
    /// Returns the scale in effect afterwards.
    pub fn set_scale(&self, scale: u8) -> u8 {
        let (applied, changed, points) = {
            let mut state = self.state.write();
            let applied = state.scale_range.clamp(scale, "scale");
            let changed = applied != state.scale;
            if changed {
                state.scale = applied;
                let (tile_size, geo) = (state.frame.tile_size, state.frame.geo);
                state.rebuild(tile_size, geo);
            }
            (applied, changed, state.points.len())
        };

        if changed {
            debug!(
                projection = %self.name,
                scale = applied,
                registered_points = points,
                "Scale changed"
            );
            self.scale_tx.send_replace(applied);
        }
        applied
    }

    /// Receives the new scale after every change.
    pub fn subscribe_scale(&self) -> watch::Receiver<u8> {
        self.scale_tx.subscribe()
    }

    /// Snapshot of the derived ranges at the current scale.
    ///
    /// Returns `None` (and logs) when the projection is not initialized.
    pub fn frame(&self) -> Option<ScaleFrame> {
        let state = self.state.read();
        if state.initialized {
            Some(state.frame)
        } else {
            drop(state);
            self.log_uninitialized("frame");
            None
        }
    }

    pub fn lat_long_to_cartesian(&self, location: LatLon) -> PixelPoint {
        self.with_frame("lat_long_to_cartesian", |frame| {
            frame.lat_long_to_cartesian(location)
        })
    }

    pub fn cartesian_to_lat_long(&self, point: PixelPoint) -> LatLon {
        self.with_frame("cartesian_to_lat_long", |frame| {
            frame.cartesian_to_lat_long(point)
        })
    }

    pub fn cartesian_to_tile(&self, point: PixelPoint) -> TileCoord {
        self.with_frame("cartesian_to_tile", |frame| frame.cartesian_to_tile(point))
    }

    pub fn tile_to_lat_long(&self, x: u32, y: u32) -> LatLon {
        self.with_frame("tile_to_lat_long", |frame| frame.tile_to_lat_long(x, y))
    }

    pub fn lat_long_to_tile(&self, location: LatLon) -> TileCoord {
        self.with_frame("lat_long_to_tile", |frame| frame.lat_long_to_tile(location))
    }

    pub fn clamp_tile(&self, x: u32, y: u32) -> TileCoord {
        self.with_frame("clamp_tile", |frame| frame.clamp_tile(x, y))
    }

    /// Registers a geographic point whose pixel position follows scale
    /// changes.
    pub fn register_point(&self, location: LatLon) -> PointId {
        let mut state = self.state.write();
        let location = state.frame.geo.clamp(location);
        let pixel = state.frame.lat_long_to_cartesian(location);
        let id = PointId(state.next_point_id);
        state.next_point_id += 1;
        state.points.insert(id, RegisteredPoint { location, pixel });
        id
    }

    /// Current pixel position of a registered point.
    pub fn point(&self, id: PointId) -> Option<PixelPoint> {
        self.state.read().points.get(&id).map(|p| p.pixel)
    }

    /// Geographic position of a registered point (after clamping).
    pub fn point_location(&self, id: PointId) -> Option<LatLon> {
        self.state.read().points.get(&id).map(|p| p.location)
    }

    pub fn unregister_point(&self, id: PointId) -> bool {
        self.state.write().points.remove(&id).is_some()
    }

    pub fn registered_points(&self) -> usize {
        self.state.read().points.len()
    }

    fn with_frame<T: Default>(&self, operation: &'static str, f: impl FnOnce(&ScaleFrame) -> T) -> T {
        let frame = {
            let state = self.state.read();
            state.initialized.then_some(state.frame)
        };
        match frame {
            Some(frame) => f(&frame),
            None => {
                self.log_uninitialized(operation);
                T::default()
            }
        }
    }

    fn log_uninitialized(&self, operation: &'static str) {
        error!(
            projection = %self.name,
            operation,
            "Projection used before initialization"
        );
    }
}

impl std::fmt::Debug for Projection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Projection")
            .field("name", &self.name)
            .field("initialized", &state.initialized)
            .field("scale", &state.scale)
            .field("tile_size", &state.frame.tile_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{MAX_LAT, MAX_SCALE};

    fn osm() -> Projection {
        Projection::with_metadata("osm", &ProviderMetadata::tiled(0, 19, 256))
    }

    #[test]
    fn test_uninitialized_returns_defaults() {
        let projection = Projection::new("bing");
        assert!(!projection.is_initialized());
        assert_eq!(
            projection.lat_long_to_cartesian(LatLon::new(10.0, 10.0)),
            PixelPoint::default()
        );
        assert_eq!(
            projection.cartesian_to_lat_long(PixelPoint::new(5.0, 5.0)),
            LatLon::default()
        );
        assert_eq!(
            projection.lat_long_to_tile(LatLon::new(1.0, 1.0)),
            TileCoord::default()
        );
        assert!(projection.frame().is_none());
    }

    #[test]
    fn test_initialize_applies_metadata() {
        let projection = Projection::new("topo");
        projection.initialize(&ProviderMetadata::tiled(2, 17, 512));
        assert!(projection.is_initialized());
        assert_eq!(projection.scale(), 2);
        assert_eq!(projection.tile_size(), 512);
        assert_eq!(projection.tiles_per_side(), 4);
        assert_eq!(projection.x_range().max(), 2048.0);
    }

    #[test]
    fn test_provider_scale_range_limited_to_addressable_zooms() {
        let projection = Projection::with_metadata("bing", &ProviderMetadata::tiled(1, 25, 256));
        assert_eq!(projection.scale_range().max(), MAX_SCALE);
        assert_eq!(projection.set_scale(25), MAX_SCALE);
        assert_eq!(projection.tiles_per_side(), 1 << MAX_SCALE);

        let tile = projection.clamp_tile(u32::MAX, 0);
        assert!(tile.is_valid());
        assert_eq!(tile.scale, MAX_SCALE);
    }

    #[test]
    fn test_set_scale_clamps_into_range() {
        let projection = Projection::with_metadata("topo", &ProviderMetadata::tiled(1, 17, 256));
        assert_eq!(projection.set_scale(20), 17);
        assert_eq!(projection.set_scale(0), 1);
        assert_eq!(projection.scale(), 1);
    }

    #[test]
    fn test_set_scale_recomputes_derived_ranges() {
        let projection = osm();
        projection.set_scale(3);
        assert_eq!(projection.tiles_per_side(), 8);
        assert_eq!(projection.x_range().max(), 2048.0);

        projection.set_scale(4);
        assert_eq!(projection.tiles_per_side(), 16);
        assert_eq!(projection.x_range().max(), 4096.0);
    }

    #[test]
    fn test_registered_points_follow_scale() {
        let projection = osm();
        projection.set_scale(1);
        let id = projection.register_point(LatLon::new(0.0, 90.0));

        let p = projection.point(id).unwrap();
        assert!((p.x - 384.0).abs() < 1e-9);
        assert!((p.y - 256.0).abs() < 1e-9);

        projection.set_scale(2);
        let p = projection.point(id).unwrap();
        assert!((p.x - 768.0).abs() < 1e-9);
        assert!((p.y - 512.0).abs() < 1e-9);

        assert!(projection.unregister_point(id));
        assert!(projection.point(id).is_none());
        assert_eq!(projection.registered_points(), 0);
    }

    #[test]
    fn test_registered_point_clamped() {
        let projection = osm();
        let id = projection.register_point(LatLon::new(89.0, 200.0));
        let location = projection.point_location(id).unwrap();
        assert_eq!(location.lat, MAX_LAT);
        assert_eq!(location.lon, 180.0);
    }

    #[test]
    fn test_out_of_range_input_clamped_not_failed() {
        let projection = osm();
        projection.set_scale(2);
        let tile = projection.lat_long_to_tile(LatLon::new(-89.9, 181.0));
        assert_eq!(tile, TileCoord::new(3, 3, 2));

        let tile = projection.clamp_tile(99, 1);
        assert_eq!(tile, TileCoord::new(3, 1, 2));
    }

    #[test]
    fn test_round_trip_grid_within_one_pixel() {
        let projection = osm();
        for scale in [1u8, 5, 10, 15, 19] {
            projection.set_scale(scale);
            for lat in [-85.0, -60.0, -12.5, 0.0, 33.3, 51.5, 85.0] {
                for lon in [-180.0, -122.4, -0.1, 0.0, 45.0, 179.9] {
                    let p = projection.lat_long_to_cartesian(LatLon::new(lat, lon));
                    let back = projection.cartesian_to_lat_long(p);
                    let again = projection.lat_long_to_cartesian(back);
                    assert!(
                        (p.x - again.x).abs() <= 1.0 && (p.y - again.y).abs() <= 1.0,
                        "scale {} ({}, {}) drifted",
                        scale,
                        lat,
                        lon
                    );
                }
            }
        }
    }

    #[test]
    fn test_tile_to_lat_long_is_northwest_corner() {
        let projection = osm();
        projection.set_scale(1);
        let nw = projection.tile_to_lat_long(1, 1);
        assert!(nw.lat.abs() < 1e-9);
        assert!(nw.lon.abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_scale_subscribers_notified_once_per_change() {
        let projection = osm();
        let mut rx = projection.subscribe_scale();

        projection.set_scale(7);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 7);

        projection.set_scale(7);
        assert!(!rx.has_changed().unwrap());

        projection.set_scale(8);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 8);
    }
}
