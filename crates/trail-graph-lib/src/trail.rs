//! Trail storage module
//!
//! This module provides [`TrailRecord`], the flat input record handed over by the storage
//! collaborator, and [`Trail`], the immutable normalized polyline with precomputed
//! metadata like bounding box and length.

use crate::utils::{self, CoordinateSystem};
use crate::{GeometryIssue, GraphError, Result};
use geo::{Coord, Rect};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single polyline vertex: working coordinates plus optional elevation in meters
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "Vec<f64>", into = "Vec<f64>")
)]
pub struct TrailPoint {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl TrailPoint {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    #[inline]
    pub fn with_elevation(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    /// The 2D working coordinate of this point
    #[inline(always)]
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.x,
            y: self.y,
        }
    }

    /// Interpolate between two points, including elevation when available
    pub fn interpolate(a: &TrailPoint, b: &TrailPoint, t: f64) -> TrailPoint {
        let c = utils::lerp(a.coord(), b.coord(), t);
        let z = match (a.z, b.z) {
            (Some(za), Some(zb)) => Some(za + (zb - za) * t),
            (Some(z), None) | (None, Some(z)) => Some(z),
            (None, None) => None,
        };
        TrailPoint { x: c.x, y: c.y, z }
    }
}

impl TryFrom<Vec<f64>> for TrailPoint {
    type Error = String;

    fn try_from(values: Vec<f64>) -> std::result::Result<Self, Self::Error> {
        match values.as_slice() {
            [x, y] => Ok(TrailPoint::new(*x, *y)),
            [x, y, z] => Ok(TrailPoint::with_elevation(*x, *y, *z)),
            other => Err(format!(
                "expected [x, y] or [x, y, z], got {} values",
                other.len()
            )),
        }
    }
}

impl From<TrailPoint> for Vec<f64> {
    fn from(point: TrailPoint) -> Self {
        match point.z {
            Some(z) => vec![point.x, point.y, z],
            None => vec![point.x, point.y],
        }
    }
}

/// Raw trail record as delivered by the storage layer
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TrailRecord {
    pub id: String,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub region: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, rename = "type"))]
    pub trail_type: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub surface: Option<String>,
    pub points: Vec<TrailPoint>,
}

impl TrailRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, points: Vec<TrailPoint>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            points,
            ..Default::default()
        }
    }
}

/// A validated trail polyline with precomputed metadata
#[derive(Clone, Debug)]
pub struct Trail {
    /// The record this trail was normalized from (points replaced by the cleaned ones)
    record: TrailRecord,
    /// Precomputed bounding box in working coordinates
    bounding_box: Rect<f64>,
    /// Cached length in meters (computed once during construction)
    cached_length_m: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Trail {
    /// Create a new Trail from a cleaned record
    ///
    /// # Returns
    /// An `Arc<Trail>` on success, or a geometry error if the polyline has fewer than two
    /// points or zero length
    pub fn new(record: TrailRecord, coords: CoordinateSystem) -> Result<Arc<Self>> {
        if record.points.len() < 2 {
            return Err(GraphError::Geometry {
                trail_id: record.id.clone(),
                issue: GeometryIssue::TooFewPoints(record.points.len()),
            });
        }

        let (bounding_box, length_m) = Self::compute_metadata(&record.points, coords);
        if length_m <= 0.0 {
            return Err(GraphError::Geometry {
                trail_id: record.id.clone(),
                issue: GeometryIssue::ZeroLength,
            });
        }

        Ok(Arc::new(Trail {
            record,
            bounding_box,
            cached_length_m: length_m,
        }))
    }

    /// Compute bounding box and length in a single pass
    fn compute_metadata(points: &[TrailPoint], coords: CoordinateSystem) -> (Rect<f64>, f64) {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        let mut length = 0.0;

        for (i, point) in points.iter().enumerate() {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
            if i > 0 {
                length += coords.distance_m(points[i - 1].coord(), point.coord());
            }
        }

        let bounding_box = Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y });
        (bounding_box, length)
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.record.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.record.name
    }

    #[inline]
    pub fn region(&self) -> Option<&str> {
        self.record.region.as_deref()
    }

    #[inline]
    pub fn trail_type(&self) -> Option<&str> {
        self.record.trail_type.as_deref()
    }

    #[inline]
    pub fn points(&self) -> &[TrailPoint] {
        &self.record.points
    }

    #[inline]
    pub fn first(&self) -> &TrailPoint {
        &self.record.points[0]
    }

    #[inline]
    pub fn last(&self) -> &TrailPoint {
        &self.record.points[self.record.points.len() - 1]
    }

    /// Number of segments (points - 1)
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.record.points.len() - 1
    }

    /// Whether the polyline ends where it starts
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.first().coord() == self.last().coord()
    }

    /// Get the bounding box in working coordinates
    #[inline]
    pub fn bounding_box(&self) -> Rect<f64> {
        self.bounding_box
    }

    /// Length in meters
    ///
    /// This is O(1) as the value is cached during construction.
    #[inline]
    pub fn length_m(&self) -> f64 {
        self.cached_length_m
    }
}
