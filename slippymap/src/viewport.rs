//! Viewport resolution.
//!
//! Turns a view (center, pixel size, heading) into the tiles that cover it,
//! or into a single static fragment for providers that render custom-sized
//! images.
//!
//! Tiled resolution works in projection pixel space:
//!
//! 1. The center is projected to pixels at the current scale.
//! 2. The four corners of the unrotated view are placed around it.
//! 3. A non-zero heading rotates the corner offsets by `360 - heading`
//!    degrees. Screen `y` grows downward, so offsets are reflected into a
//!    `y`-up frame before rotating and reflected back afterwards; a heading
//!    of 270 is therefore the same as a rotation of 90.
//! 4. Each corner is floor-divided by the tile size and the bounding
//!    rectangle is clamped to the tile grid.

use tracing::{debug, error};

use crate::coord::{LatLon, PixelPoint, TileCoord};
use crate::fragment::{Fragment, FragmentKey};
use crate::projection::{ImageryMode, Projection};

/// A requested view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportRequest {
    pub center: LatLon,
    pub width: u32,
    pub height: u32,
    /// Degrees clockwise from north. Normalized modulo 360.
    pub heading: f64,
}

impl ViewportRequest {
    pub fn new(center: LatLon, width: u32, height: u32) -> Self {
        Self {
            center,
            width,
            height,
            heading: 0.0,
        }
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = heading;
        self
    }

    /// Heading folded into `[0, 360)`.
    pub fn normalized_heading(&self) -> f64 {
        let heading = self.heading.rem_euclid(360.0);
        // rem_euclid can round up to exactly 360.0 for tiny negative inputs
        if heading >= 360.0 {
            0.0
        } else {
            heading
        }
    }
}

/// Inclusive rectangle of tiles at one scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRange {
    pub projection: String,
    pub scale: u8,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    pub fn columns(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn rows(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn len(&self) -> usize {
        self.columns() as usize * self.rows() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, tile: &TileCoord) -> bool {
        tile.scale == self.scale
            && (self.min_x..=self.max_x).contains(&tile.x)
            && (self.min_y..=self.max_y).contains(&tile.y)
    }

    /// Tiles in row-major order, north to south then west to east.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (self.min_y..=self.max_y).flat_map(move |y| {
            (self.min_x..=self.max_x).map(move |x| TileCoord::new(x, y, self.scale))
        })
    }

    /// Cache keys for every tile, in iteration order.
    pub fn keys(&self) -> Vec<FragmentKey> {
        self.iter()
            .map(|tile| FragmentKey::tile(&self.projection, tile))
            .collect()
    }

    /// One new, unloaded fragment per tile, in iteration order.
    pub fn fragments(&self) -> Vec<Fragment> {
        self.keys().into_iter().map(Fragment::new).collect()
    }
}

/// A single custom-sized image centred on a position.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticView {
    pub projection: String,
    pub center: LatLon,
    pub width: u32,
    pub height: u32,
    pub scale: u8,
}

impl StaticView {
    pub fn key(&self) -> FragmentKey {
        FragmentKey::static_view(self)
    }

    pub fn fragment(&self) -> Fragment {
        Fragment::new(self.key())
    }
}

/// Outcome of resolving a viewport.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewportResolution {
    Tiled(TileRange),
    Static(StaticView),
}

impl ViewportResolution {
    /// Cache keys of every fragment needed for the view.
    pub fn keys(&self) -> Vec<FragmentKey> {
        match self {
            ViewportResolution::Tiled(range) => range.keys(),
            ViewportResolution::Static(view) => vec![view.key()],
        }
    }

    pub fn fragments(&self) -> Vec<Fragment> {
        self.keys().into_iter().map(Fragment::new).collect()
    }
}

/// Resolves a viewport against a projection.
///
/// Returns `None` (with a logged error) for an uninitialized projection or a
/// degenerate request.
pub fn resolve(projection: &Projection, request: &ViewportRequest) -> Option<ViewportResolution> {
    if request.width == 0 || request.height == 0 {
        error!(
            projection = projection.name(),
            width = request.width,
            height = request.height,
            "Viewport has no area"
        );
        return None;
    }
    if !request.center.is_finite() || !request.heading.is_finite() {
        error!(
            projection = projection.name(),
            center = %request.center,
            heading = request.heading,
            "Viewport has non-finite input"
        );
        return None;
    }

    let frame = projection.frame()?;
    let center = frame.geo_range().clamp(request.center);

    match projection.mode() {
        ImageryMode::Static {
            max_width,
            max_height,
        } => {
            let width = request.width.min(max_width);
            let height = request.height.min(max_height);
            if width != request.width || height != request.height {
                debug!(
                    projection = projection.name(),
                    requested_width = request.width,
                    requested_height = request.height,
                    width,
                    height,
                    "Static view clamped to provider maximum"
                );
            }
            Some(ViewportResolution::Static(StaticView {
                projection: projection.name().to_string(),
                center,
                width,
                height,
                scale: frame.scale(),
            }))
        }
        ImageryMode::Tiled => {
            let origin = frame.lat_long_to_cartesian(center);
            let corners = rotated_corners(
                origin,
                request.width as f64,
                request.height as f64,
                request.normalized_heading(),
            );

            let size = frame.tile_size() as f64;
            let last = (frame.tiles_per_side() - 1) as f64;
            let column = |x: f64| (x / size).floor().clamp(0.0, last) as u32;
            let row = |y: f64| (y / size).floor().clamp(0.0, last) as u32;

            let xs = corners.iter().map(|p| p.x);
            let ys = corners.iter().map(|p| p.y);
            let min_x = xs.clone().fold(f64::INFINITY, f64::min);
            let max_x = xs.fold(f64::NEG_INFINITY, f64::max);
            let min_y = ys.clone().fold(f64::INFINITY, f64::min);
            let max_y = ys.fold(f64::NEG_INFINITY, f64::max);

            let range = TileRange {
                projection: projection.name().to_string(),
                scale: frame.scale(),
                min_x: column(min_x),
                max_x: column(max_x),
                min_y: row(min_y),
                max_y: row(max_y),
            };

            if range.is_empty() {
                error!(projection = projection.name(), "Viewport resolved to no tiles");
                return None;
            }

            debug!(
                projection = projection.name(),
                scale = range.scale,
                columns = range.columns(),
                rows = range.rows(),
                "Viewport resolved"
            );
            Some(ViewportResolution::Tiled(range))
        }
    }
}

/// Corners of a `width × height` box around `center`, rotated for `heading`.
fn rotated_corners(center: PixelPoint, width: f64, height: f64, heading: f64) -> [PixelPoint; 4] {
    let (hw, hh) = (width / 2.0, height / 2.0);
    let offsets = [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)];

    let theta = (360.0 - heading).to_radians();
    let (sin, cos) = theta.sin_cos();

    offsets.map(|(dx, dy)| {
        if heading == 0.0 {
            return PixelPoint::new(center.x + dx, center.y + dy);
        }
        // screen y-down to y-up, rotate, back to y-down
        let up = -dy;
        let rx = dx * cos - up * sin;
        let ry = dx * sin + up * cos;
        PixelPoint::new(center.x + rx, center.y - ry)
    })
}
