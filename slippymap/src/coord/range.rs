//! Closed value ranges with logged clamping.
//!
//! Out-of-range values are conformed into range and a warning is emitted;
//! clamping never fails.

use std::cmp::Ordering;
use std::fmt::Debug;

use tracing::warn;

use super::types::{LatLon, MAX_LAT, MAX_LON, MAX_SCALE, MIN_LAT, MIN_LON, MIN_SCALE};

/// A closed interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range<T> {
    min: T,
    max: T,
}

impl<T: PartialOrd + Copy + Debug> Range<T> {
    /// Creates a range, swapping the bounds if they arrive reversed.
    pub fn new(min: T, max: T) -> Self {
        if max < min {
            warn!(min = ?min, max = ?max, "Range bounds reversed, swapping");
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    pub fn min(&self) -> T {
        self.min
    }

    pub fn max(&self) -> T {
        self.max
    }

    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }

    /// Conforms `value` into the range.
    ///
    /// In-range values are returned unchanged. Anything else (including
    /// values that do not compare, such as NaN) is replaced by the nearest
    /// bound and a warning naming `label` is logged.
    pub fn clamp(&self, value: T, label: &str) -> T {
        let conformed = match (value.partial_cmp(&self.min), value.partial_cmp(&self.max)) {
            (Some(Ordering::Less), _) => self.min,
            (_, Some(Ordering::Greater)) => self.max,
            (Some(_), Some(_)) => return value,
            _ => self.min,
        };

        warn!(
            label,
            value = ?value,
            min = ?self.min,
            max = ?self.max,
            conformed = ?conformed,
            "Value outside range, clamped"
        );
        conformed
    }
}

impl Range<f64> {
    /// Width of the interval.
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Valid scale (zoom) levels for a projection.
pub type ScaleRange = Range<u8>;

impl Default for Range<u8> {
    fn default() -> Self {
        Self::new(MIN_SCALE, MAX_SCALE)
    }
}

/// Geographic bounds for a projection.
///
/// Longitude is always ±180°; latitude is the provider's Mercator limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoRange {
    pub latitude: Range<f64>,
    pub longitude: Range<f64>,
}

impl GeoRange {
    /// Web Mercator bounds symmetric about the equator.
    pub fn mercator(max_latitude: f64) -> Self {
        let max_latitude = Range::new(0.0, MAX_LAT).clamp(max_latitude.abs(), "max_latitude");
        Self {
            latitude: Range::new(-max_latitude, max_latitude),
            longitude: Range::new(MIN_LON, MAX_LON),
        }
    }

    /// Clamps both components of a position.
    pub fn clamp(&self, location: LatLon) -> LatLon {
        LatLon {
            lat: self.latitude.clamp(location.lat, "latitude"),
            lon: self.longitude.clamp(location.lon, "longitude"),
        }
    }

    pub fn contains(&self, location: LatLon) -> bool {
        self.latitude.contains(location.lat) && self.longitude.contains(location.lon)
    }
}

impl Default for GeoRange {
    fn default() -> Self {
        Self {
            latitude: Range::new(MIN_LAT, MAX_LAT),
            longitude: Range::new(MIN_LON, MAX_LON),
        }
    }
}
