//! Geometry normalization: drop degenerate polylines before they reach the graph

use crate::intersect::segment_tree;
use crate::trail::{Trail, TrailPoint, TrailRecord};
use crate::utils::{self, CoordinateSystem};
use crate::{GraphError, Result};
use geo::line_intersection::{LineIntersection, line_intersection};
use geo::{Coord, LineString, SimplifyVwPreserve};
use rayon::prelude::*;
use rstar::RTreeObject;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Why an input polyline was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryIssue {
    #[error("only {0} distinct points")]
    TooFewPoints(usize),
    #[error("non-finite coordinate")]
    NonFinite,
    #[error("zero length")]
    ZeroLength,
    #[error("self-intersecting polyline")]
    SelfIntersecting,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct NormalizeConfig {
    /// Grid size (working units) coordinates are snapped to; 0 disables snapping
    pub coordinate_precision: f64,
    /// Enable topology-preserving simplification of long polylines
    pub simplify: bool,
    /// Only polylines with more points than this are simplified
    pub simplify_point_threshold: usize,
    /// Simplification tolerance in working units (squared into a Visvalingam area)
    pub simplify_tolerance: f64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            coordinate_precision: 1e-9,
            simplify: false,
            simplify_point_threshold: 1000,
            simplify_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NormalizeReport {
    pub input_count: usize,
    pub accepted: usize,
    /// Rejected trail ids with the reason
    pub rejected: Vec<(String, GeometryIssue)>,
    pub simplified: usize,
    /// Duplicate or simplified-away vertices
    pub points_removed: usize,
}

pub struct GeometryNormalizer {
    config: NormalizeConfig,
    coords: CoordinateSystem,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GeometryNormalizer {
    pub fn new(config: NormalizeConfig, coords: CoordinateSystem) -> Self {
        Self { config, coords }
    }

    /// Validate and clean every record
    ///
    /// Invalid records are dropped and listed in the report; an error is only returned when
    /// nothing survives.
    pub fn apply(&self, records: Vec<TrailRecord>) -> Result<(Vec<Arc<Trail>>, NormalizeReport)> {
        #[cfg(feature = "profiling")]
        profiling::scope!("normalize::apply");

        let input_count = records.len();
        let results: Vec<(String, std::result::Result<(Arc<Trail>, bool, usize), GeometryIssue>)> =
            records
                .into_par_iter()
                .map(|record| {
                    let id = record.id.clone();
                    (id, self.normalize_one(record))
                })
                .collect();

        let mut report = NormalizeReport {
            input_count,
            ..Default::default()
        };
        let mut trails = Vec::with_capacity(results.len());
        for (id, result) in results {
            match result {
                Ok((trail, simplified, removed)) => {
                    report.simplified += usize::from(simplified);
                    report.points_removed += removed;
                    trails.push(trail);
                }
                Err(issue) => {
                    warn!(trail_id = %id, %issue, "dropping invalid trail geometry");
                    report.rejected.push((id, issue));
                }
            }
        }
        report.accepted = trails.len();

        info!(
            accepted = report.accepted,
            rejected = report.rejected.len(),
            simplified = report.simplified,
            "normalized trail geometries"
        );

        if trails.is_empty() {
            return Err(GraphError::EmptyInput);
        }
        Ok((trails, report))
    }

    fn normalize_one(
        &self,
        mut record: TrailRecord,
    ) -> std::result::Result<(Arc<Trail>, bool, usize), GeometryIssue> {
        if record.points.iter().any(|p| {
            !utils::is_finite_coord(p.coord()) || p.z.is_some_and(|z| !z.is_finite())
        }) {
            return Err(GeometryIssue::NonFinite);
        }

        let original_len = record.points.len();
        let precision = self.config.coordinate_precision;
        let mut cleaned: Vec<TrailPoint> = Vec::with_capacity(original_len);
        for point in &record.points {
            let snapped = TrailPoint {
                x: utils::snap(point.x, precision),
                y: utils::snap(point.y, precision),
                z: point.z,
            };
            if cleaned.last().is_some_and(|last| last.coord() == snapped.coord()) {
                continue;
            }
            cleaned.push(snapped);
        }

        if cleaned.len() < 2 {
            return Err(GeometryIssue::TooFewPoints(cleaned.len()));
        }
        let length: f64 = cleaned
            .windows(2)
            .map(|w| self.coords.distance_m(w[0].coord(), w[1].coord()))
            .sum();
        if length <= 0.0 {
            return Err(GeometryIssue::ZeroLength);
        }
        if !is_simple(&cleaned) {
            return Err(GeometryIssue::SelfIntersecting);
        }

        let mut simplified = false;
        if self.config.simplify && cleaned.len() > self.config.simplify_point_threshold {
            let kept = simplify_preserving(&cleaned, self.config.simplify_tolerance);
            if kept.len() >= 2 && kept.len() < cleaned.len() {
                debug!(
                    trail_id = %record.id,
                    before = cleaned.len(),
                    after = kept.len(),
                    "simplified trail"
                );
                cleaned = kept;
                simplified = true;
            }
        }

        let removed = original_len - cleaned.len();
        record.points = cleaned;
        let trail = Trail::new(record, self.coords).map_err(|err| match err {
            GraphError::Geometry { issue, .. } => issue,
            _ => GeometryIssue::ZeroLength,
        })?;
        Ok((trail, simplified, removed))
    }
}

/// Check that a polyline without consecutive duplicates does not cross or touch itself
///
/// Consecutive segments may only share their common vertex, and a closed ring may touch
/// itself only at its start point.
pub(crate) fn is_simple(points: &[TrailPoint]) -> bool {
    let segment_count = points.len().saturating_sub(1);
    if segment_count < 2 {
        return true;
    }
    let closed = points[0].coord() == points[segment_count].coord();

    let tree = segment_tree(points);

    for segment in tree.iter() {
        let envelope = segment.envelope();
        for candidate in tree.locate_in_envelope_intersecting(&envelope) {
            if candidate.index <= segment.index {
                continue;
            }
            let Some(hit) = line_intersection(segment.line, candidate.line) else {
                continue;
            };
            let (i, j) = (segment.index, candidate.index);
            let allowed_touch: Option<Coord<f64>> = if j == i + 1 {
                Some(points[j].coord())
            } else if closed && i == 0 && j == segment_count - 1 {
                Some(points[0].coord())
            } else {
                None
            };
            match (hit, allowed_touch) {
                (LineIntersection::SinglePoint { intersection, .. }, Some(shared))
                    if intersection == shared => {}
                _ => return false,
            }
        }
    }
    true
}

/// Topology-preserving Visvalingam-Whyatt simplification keeping the original points
fn simplify_preserving(points: &[TrailPoint], tolerance: f64) -> Vec<TrailPoint> {
    let line: LineString<f64> = points.iter().map(TrailPoint::coord).collect();
    let simplified = line.simplify_vw_preserve(tolerance * tolerance);

    // The kept coordinates are an ordered subsequence of the input
    let mut kept = Vec::with_capacity(simplified.0.len());
    let mut cursor = 0;
    for coord in simplified.0 {
        while cursor < points.len() && points[cursor].coord() != coord {
            cursor += 1;
        }
        if cursor == points.len() {
            break;
        }
        kept.push(points[cursor]);
        cursor += 1;
    }
    kept
}
