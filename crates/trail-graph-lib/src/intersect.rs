//! Intersection detection between trail polylines
//!
//! Candidate pairs come from an R-tree over trail bounding boxes; exact tests run against
//! per-trail segment R-trees. Each trail ends up with the ordered list of locations it has
//! to be cut at: its two endpoints plus every crossing, touching point and T-junction.

use crate::trail::{Trail, TrailPoint};
use crate::utils::{self, CoordinateSystem};
use geo::line_intersection::{LineIntersection, line_intersection};
use geo::{Coord, Line};
use rayon::prelude::*;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree, RTreeObject};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct IntersectionConfig {
    /// Split locations closer than this (working units) along a trail are merged
    pub split_dedup_tolerance: f64,
    /// Endpoints this close (meters) to another trail's interior split that trail; 0 disables
    pub t_junction_tolerance_meters: f64,
}

impl Default for IntersectionConfig {
    fn default() -> Self {
        Self {
            split_dedup_tolerance: 1e-6,
            t_junction_tolerance_meters: 0.2,
        }
    }
}

/// How a pair of trails meets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntersectionKind {
    None,
    Point,
    MultiPoint,
    /// The trails share at least one collinear stretch
    Overlap,
}

/// A location along a trail where it must be cut
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitLocation {
    /// Index of the segment the location lies on
    pub segment: usize,
    /// Parameter along that segment in `[0, 1]`
    pub t: f64,
    pub point: TrailPoint,
}

impl SplitLocation {
    /// Position along the trail as a single sortable number
    #[inline]
    pub fn position(&self) -> f64 {
        self.segment as f64 + self.t
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntersectionReport {
    /// Trail pairs with overlapping bounding boxes
    pub candidate_pairs: usize,
    pub point_pairs: usize,
    pub multi_point_pairs: usize,
    pub overlap_pairs: usize,
    pub t_junctions: usize,
    /// Interior split locations over all trails (endpoints excluded)
    pub interior_splits: usize,
}

impl IntersectionReport {
    fn merge(mut self, other: IntersectionReport) -> Self {
        self.candidate_pairs += other.candidate_pairs;
        self.point_pairs += other.point_pairs;
        self.multi_point_pairs += other.multi_point_pairs;
        self.overlap_pairs += other.overlap_pairs;
        self.t_junctions += other.t_junctions;
        self.interior_splits += other.interior_splits;
        self
    }
}

/// One polyline segment stored in a segment index
pub(crate) struct IndexedSegment {
    pub index: usize,
    pub line: Line<f64>,
}

impl RTreeObject for IndexedSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        let (min, max) = utils::segment_envelope(self.line.start, self.line.end, 0.0);
        AABB::from_corners(min, max)
    }
}

pub(crate) fn segment_tree(points: &[TrailPoint]) -> RTree<IndexedSegment> {
    let segments = points
        .windows(2)
        .enumerate()
        .map(|(index, w)| IndexedSegment {
            index,
            line: Line::new(w[0].coord(), w[1].coord()),
        })
        .collect();
    RTree::bulk_load(segments)
}

type TrailBox = GeomWithData<Rectangle<[f64; 2]>, usize>;

pub struct IntersectionDetector {
    config: IntersectionConfig,
    coords: CoordinateSystem,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl IntersectionDetector {
    pub fn new(config: IntersectionConfig, coords: CoordinateSystem) -> Self {
        Self { config, coords }
    }

    /// Compute the ordered split locations of every trail
    ///
    /// The result is indexed like `trails`; each list starts with the first point and ends
    /// with the last point of its trail.
    pub fn apply(&self, trails: &[Arc<Trail>]) -> (Vec<Vec<SplitLocation>>, IntersectionReport) {
        #[cfg(feature = "profiling")]
        profiling::scope!("intersect::apply");

        let boxes: Vec<TrailBox> = trails
            .iter()
            .enumerate()
            .map(|(index, trail)| {
                let (min, max) = self.expanded_bbox(trail);
                GeomWithData::new(Rectangle::from_corners(min, max), index)
            })
            .collect();
        let box_tree = RTree::bulk_load(boxes);

        let segment_trees: Vec<RTree<IndexedSegment>> = trails
            .par_iter()
            .map(|trail| segment_tree(trail.points()))
            .collect();

        let per_trail: Vec<(Vec<SplitLocation>, IntersectionReport)> = (0..trails.len())
            .into_par_iter()
            .map(|index| self.splits_for(index, trails, &box_tree, &segment_trees))
            .collect();

        let mut report = IntersectionReport::default();
        let mut splits = Vec::with_capacity(per_trail.len());
        for (trail_splits, trail_report) in per_trail {
            report = report.merge(trail_report);
            splits.push(trail_splits);
        }

        info!(
            candidate_pairs = report.candidate_pairs,
            crossings = report.point_pairs + report.multi_point_pairs,
            overlaps = report.overlap_pairs,
            t_junctions = report.t_junctions,
            interior_splits = report.interior_splits,
            "detected trail intersections"
        );
        (splits, report)
    }

    fn t_junction_radius(&self, trail: &Trail) -> f64 {
        let bbox = trail.bounding_box();
        let max_lat = bbox.min().y.abs().max(bbox.max().y.abs());
        self.coords
            .search_radius(self.config.t_junction_tolerance_meters, max_lat)
    }

    fn expanded_bbox(&self, trail: &Trail) -> ([f64; 2], [f64; 2]) {
        let bbox = trail.bounding_box();
        utils::segment_envelope(bbox.min(), bbox.max(), self.t_junction_radius(trail))
    }

    fn splits_for(
        &self,
        index: usize,
        trails: &[Arc<Trail>],
        box_tree: &RTree<TrailBox>,
        segment_trees: &[RTree<IndexedSegment>],
    ) -> (Vec<SplitLocation>, IntersectionReport) {
        let trail = &trails[index];
        let points = trail.points();
        let own_tree = &segment_trees[index];
        let mut report = IntersectionReport::default();
        let mut found: Vec<SplitLocation> = Vec::new();

        let (min, max) = self.expanded_bbox(trail);
        for candidate in box_tree.locate_in_envelope_intersecting(&AABB::from_corners(min, max)) {
            let other_index = candidate.data;
            if other_index == index {
                continue;
            }
            let other = &trails[other_index];

            let mut hit_points: Vec<Coord<f64>> = Vec::new();
            let mut overlapping = false;
            for segment in own_tree.iter() {
                for other_segment in
                    segment_trees[other_index].locate_in_envelope_intersecting(&segment.envelope())
                {
                    match line_intersection(segment.line, other_segment.line) {
                        Some(LineIntersection::SinglePoint { intersection, .. }) => {
                            found.push(split_at(points, segment.index, intersection));
                            hit_points.push(intersection);
                        }
                        Some(LineIntersection::Collinear { intersection }) => {
                            overlapping = true;
                            for end in [intersection.start, intersection.end] {
                                found.push(split_at(points, segment.index, end));
                                hit_points.push(end);
                            }
                        }
                        None => {}
                    }
                }
            }

            // T-junctions: the other trail ends close to our interior
            if self.config.t_junction_tolerance_meters > 0.0 {
                for end in [other.first().coord(), other.last().coord()] {
                    if let Some(split) = self.t_junction(points, own_tree, end, trail) {
                        debug!(trail_id = %trail.id(), other_id = %other.id(), "t-junction split");
                        found.push(split);
                        report.t_junctions += 1;
                    }
                }
            }

            // Count every pair once
            if index < other_index {
                report.candidate_pairs += 1;
                hit_points.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
                hit_points.dedup_by(|a, b| {
                    utils::planar_distance(*a, *b) <= self.config.split_dedup_tolerance
                });
                match classify(hit_points.len(), overlapping) {
                    IntersectionKind::Overlap => {
                        warn!(
                            trail_id = %trail.id(),
                            other_id = %other.id(),
                            "trails share an overlapping stretch; leaving it unresolved"
                        );
                        report.overlap_pairs += 1;
                    }
                    IntersectionKind::MultiPoint => report.multi_point_pairs += 1,
                    IntersectionKind::Point => report.point_pairs += 1,
                    IntersectionKind::None => {}
                }
            }
        }

        let splits = order_splits(points, found, self.config.split_dedup_tolerance);
        report.interior_splits = splits.len().saturating_sub(2);
        (splits, report)
    }

    /// Project a foreign endpoint onto the closest interior location of this trail
    fn t_junction(
        &self,
        points: &[TrailPoint],
        tree: &RTree<IndexedSegment>,
        end: Coord<f64>,
        trail: &Trail,
    ) -> Option<SplitLocation> {
        let radius = self.t_junction_radius(trail);
        let (min, max) = utils::segment_envelope(end, end, radius);
        let last_segment = points.len() - 2;

        tree.locate_in_envelope_intersecting(&AABB::from_corners(min, max))
            .filter_map(|segment| {
                let (t, projected) = utils::project_onto_segment(end, segment.line.start, segment.line.end);
                let distance = self.coords.distance_m(end, projected);
                let at_trail_end = (segment.index == 0 && t <= 0.0)
                    || (segment.index == last_segment && t >= 1.0);
                (distance <= self.config.t_junction_tolerance_meters && !at_trail_end)
                    .then_some((distance, segment.index, t))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, segment, t)| SplitLocation {
                segment,
                t,
                point: TrailPoint::interpolate(&points[segment], &points[segment + 1], t),
            })
    }
}

fn classify(distinct_points: usize, overlapping: bool) -> IntersectionKind {
    if overlapping {
        IntersectionKind::Overlap
    } else {
        match distinct_points {
            0 => IntersectionKind::None,
            1 => IntersectionKind::Point,
            _ => IntersectionKind::MultiPoint,
        }
    }
}

/// Split location for an exact intersection coordinate on a given segment
fn split_at(points: &[TrailPoint], segment: usize, at: Coord<f64>) -> SplitLocation {
    let (a, b) = (&points[segment], &points[segment + 1]);
    let (t, _) = utils::project_onto_segment(at, a.coord(), b.coord());
    let mut point = TrailPoint::interpolate(a, b, t);
    point.x = at.x;
    point.y = at.y;
    SplitLocation { segment, t, point }
}

/// Sort interior splits along the trail, merge near-duplicates and add both endpoints
pub(crate) fn order_splits(
    points: &[TrailPoint],
    mut interior: Vec<SplitLocation>,
    tolerance: f64,
) -> Vec<SplitLocation> {
    let last_segment = points.len() - 2;
    let start = SplitLocation {
        segment: 0,
        t: 0.0,
        point: points[0],
    };
    let end = SplitLocation {
        segment: last_segment,
        t: 1.0,
        point: points[points.len() - 1],
    };

    interior.sort_by(|a, b| a.position().total_cmp(&b.position()));

    let mut ordered = Vec::with_capacity(interior.len() + 2);
    ordered.push(start);
    for split in interior {
        let previous = ordered[ordered.len() - 1];
        if utils::planar_distance(previous.point.coord(), split.point.coord()) > tolerance
            && split.position() > previous.position()
        {
            ordered.push(split);
        }
    }
    // The end point wins over interior splits right next to it
    while ordered.len() > 1 {
        let last = ordered[ordered.len() - 1];
        let along_gap = end.position() - last.position();
        if utils::planar_distance(last.point.coord(), end.point.coord()) <= tolerance
            || along_gap <= 0.0
        {
            ordered.pop();
        } else {
            break;
        }
    }
    ordered.push(end);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::planar_trail;

    fn detector() -> IntersectionDetector {
        IntersectionDetector::new(IntersectionConfig::default(), CoordinateSystem::Planar)
    }

    #[test]
    fn test_crossing_trails_split_once_each() {
        let trails = vec![
            planar_trail("h", "Horizontal", &[(0.0, 0.0), (100.0, 0.0)]),
            planar_trail("v", "Vertical", &[(50.0, -50.0), (50.0, 50.0)]),
        ];
        let (splits, report) = detector().apply(&trails);

        assert_eq!(splits[0].len(), 3);
        assert_eq!(splits[1].len(), 3);
        assert_eq!(splits[0][1].point.coord(), Coord { x: 50.0, y: 0.0 });
        assert!((splits[1][1].t - 0.5).abs() < 1e-12);
        assert_eq!(report.point_pairs, 1);
        assert_eq!(report.candidate_pairs, 1);
        assert_eq!(report.interior_splits, 2);
    }

    #[test]
    fn test_t_junction_counted_in_either_order() {
        let main = planar_trail("main", "Main", &[(0.0, 0.0), (100.0, 0.0)]);
        let spur = planar_trail("spur", "Spur", &[(50.0, 0.1), (50.0, 50.0)]);

        let (splits, report) = detector().apply(&[main.clone(), spur.clone()]);
        assert_eq!(report.t_junctions, 1);
        assert_eq!(splits[0].len(), 3);

        let (splits, report) = detector().apply(&[spur, main]);
        assert_eq!(report.t_junctions, 1);
        assert_eq!(splits[1].len(), 3);
        assert_eq!(splits[0].len(), 2);
    }

    #[test]
    fn test_disjoint_trails_have_only_endpoints() {
        let trails = vec![
            planar_trail("a", "A", &[(0.0, 0.0), (10.0, 0.0)]),
            planar_trail("b", "B", &[(0.0, 100.0), (10.0, 100.0)]),
        ];
        let (splits, report) = detector().apply(&trails);
        assert!(splits.iter().all(|s| s.len() == 2));
        assert_eq!(report.candidate_pairs, 0);
    }

    #[test]
    fn test_multi_point_intersection() {
        let trails = vec![
            planar_trail("zig", "Zig", &[(0.0, -10.0), (10.0, 10.0), (20.0, -10.0)]),
            planar_trail("flat", "Flat", &[(-5.0, 0.0), (25.0, 0.0)]),
        ];
        let (splits, report) = detector().apply(&trails);
        assert_eq!(report.multi_point_pairs, 1);
        assert_eq!(splits[1].len(), 4);
        assert_eq!(splits[0].len(), 4);
    }

    #[test]
    fn test_t_junction_within_tolerance() {
        // The spur ends 0.1 m short of the main trail
        let trails = vec![
            planar_trail("main", "Main", &[(0.0, 0.0), (100.0, 0.0)]),
            planar_trail("spur", "Spur", &[(40.0, 0.1), (40.0, 60.0)]),
        ];
        let (splits, report) = detector().apply(&trails);
        assert_eq!(report.t_junctions, 1);
        assert_eq!(splits[0].len(), 3);
        assert!((splits[0][1].point.x - 40.0).abs() < 1e-9);
        assert!(splits[0][1].point.y.abs() < 1e-9);
        assert_eq!(splits[1].len(), 2);
    }

    #[test]
    fn test_shared_endpoints_do_not_add_splits() {
        let trails = vec![
            planar_trail("a", "A", &[(0.0, 0.0), (10.0, 0.0)]),
            planar_trail("b", "B", &[(10.0, 0.0), (20.0, 0.0)]),
        ];
        let (splits, report) = detector().apply(&trails);
        assert!(splits.iter().all(|s| s.len() == 2));
        assert_eq!(report.interior_splits, 0);
    }

    #[test]
    fn test_overlap_is_reported() {
        let trails = vec![
            planar_trail("a", "A", &[(0.0, 0.0), (20.0, 0.0)]),
            planar_trail("b", "B", &[(10.0, 0.0), (30.0, 0.0)]),
        ];
        let (splits, report) = detector().apply(&trails);
        assert_eq!(report.overlap_pairs, 1);
        // Each trail is cut where the shared stretch begins or ends
        assert_eq!(splits[0].len(), 3);
        assert_eq!(splits[1].len(), 3);
    }

    #[test]
    fn test_order_splits_dedups_near_points() {
        let points = vec![TrailPoint::new(0.0, 0.0), TrailPoint::new(10.0, 0.0)];
        let near = |x: f64| SplitLocation {
            segment: 0,
            t: x / 10.0,
            point: TrailPoint::new(x, 0.0),
        };
        let ordered = order_splits(&points, vec![near(5.0), near(5.0 + 1e-9), near(10.0 - 1e-9)], 1e-6);
        assert_eq!(ordered.len(), 3);
        assert_eq!(ordered[1].point.x, 5.0);
        assert_eq!(ordered[2].point.x, 10.0);
    }
}
