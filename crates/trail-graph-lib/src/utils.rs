//! Utility functions for distances, tolerances and segment geometry

use geo::Coord;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Earth's mean radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Length of one degree of latitude in meters on the mean-radius sphere
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Relative padding applied to geographic search radii
const SEARCH_RADIUS_PADDING: f64 = 1.001;

/// Lower bound for `cos(latitude)` when widening longitude search radii near the poles
const MIN_LATITUDE_COS: f64 = 0.01;

/// How input coordinates should be interpreted
///
/// All metric tolerances in the configuration are given in meters; this decides how
/// distances between working coordinates are turned into meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum CoordinateSystem {
    /// `x` is longitude and `y` is latitude, in degrees (WGS84)
    #[default]
    Geographic,
    /// `x` and `y` are already projected meters
    Planar,
}

impl CoordinateSystem {
    /// Distance between two working coordinates in meters
    #[inline]
    pub fn distance_m(self, a: Coord<f64>, b: Coord<f64>) -> f64 {
        match self {
            CoordinateSystem::Geographic => haversine_distance(a.y, a.x, b.y, b.x),
            CoordinateSystem::Planar => planar_distance(a, b),
        }
    }

    /// Convert a tolerance in meters into a search radius in working units
    ///
    /// For geographic coordinates the radius is widened for the largest absolute latitude
    /// involved, so an R-tree query with it never misses a point that is closer than
    /// `meters`. Callers must confirm candidates with [`CoordinateSystem::distance_m`].
    #[inline]
    pub fn search_radius(self, meters: f64, max_abs_latitude: f64) -> f64 {
        match self {
            CoordinateSystem::Geographic => {
                let cos = max_abs_latitude
                    .abs()
                    .min(90.0)
                    .to_radians()
                    .cos()
                    .max(MIN_LATITUDE_COS);
                meters * SEARCH_RADIUS_PADDING / (METERS_PER_DEGREE * cos)
            }
            CoordinateSystem::Planar => meters,
        }
    }
}

/// Calculate the Haversine distance between two (lat, lon) positions in meters
#[inline]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Check that both components of a coordinate are finite
#[inline(always)]
pub fn is_finite_coord(coord: Coord<f64>) -> bool {
    coord.x.is_finite() && coord.y.is_finite()
}

/// Snap a value to a grid of the given cell size (no-op for non-positive sizes)
#[inline(always)]
pub fn snap(value: f64, precision: f64) -> f64 {
    if precision >= 1.0 {
        (value / precision).round() * precision
    } else if precision > 0.0 {
        // Whole number of cells per unit, so values already on the grid come back unchanged
        let cells_per_unit = (1.0 / precision).round();
        (value * cells_per_unit).round() / cells_per_unit
    } else {
        value
    }
}

/// Linear interpolation between two coordinates
#[inline(always)]
pub fn lerp(a: Coord<f64>, b: Coord<f64>, t: f64) -> Coord<f64> {
    Coord {
        x: a.x + (b.x - a.x) * t,
        y: a.y + (b.y - a.y) * t,
    }
}

/// Project `p` onto the segment `a`-`b`
///
/// Returns the clamped segment parameter in `[0, 1]` and the projected coordinate.
pub fn project_onto_segment(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> (f64, Coord<f64>) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f64::EPSILON * f64::EPSILON {
        return (0.0, a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    (t, lerp(a, b, t))
}

/// Planar (working unit) distance between two coordinates
#[inline(always)]
pub fn planar_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Axis-aligned envelope corners of a segment, expanded by `pad` on every side
#[inline]
pub fn segment_envelope(a: Coord<f64>, b: Coord<f64>, pad: f64) -> ([f64; 2], [f64; 2]) {
    (
        [a.x.min(b.x) - pad, a.y.min(b.y) - pad],
        [a.x.max(b.x) + pad, a.y.max(b.y) + pad],
    )
}
