//! Graph construction: cut trails at their split locations into nodes and edges

use crate::graph::{EdgeDraft, Graph, NodeId};
use crate::intersect::SplitLocation;
use crate::trail::{Trail, TrailPoint};
use crate::utils::CoordinateSystem;
use crate::{GraphError, Result};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct BuildConfig {
    /// Split locations closer than this share one node
    pub node_identity_tolerance_meters: f64,
    /// Include elevation differences in edge lengths
    #[cfg_attr(feature = "serde", serde(rename = "use3dLength"))]
    pub use_3d_length: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            node_identity_tolerance_meters: 0.1,
            use_3d_length: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub trails: usize,
    pub nodes_created: usize,
    pub edges_created: usize,
    /// Pieces dropped because they collapsed to a point or to a single node
    pub degenerate_pieces: usize,
    /// Closed trails split at their middle vertex
    pub closed_trails_split: usize,
}

type NodeEntry = GeomWithData<[f64; 2], NodeId>;

pub struct GraphBuilder {
    config: BuildConfig,
    coords: CoordinateSystem,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GraphBuilder {
    pub fn new(config: BuildConfig, coords: CoordinateSystem) -> Self {
        Self { config, coords }
    }

    /// Build a graph from trails and their split locations (indexed like `trails`)
    pub fn apply(&self, trails: &[Arc<Trail>], splits: &[Vec<SplitLocation>]) -> Result<(Graph, BuildReport)> {
        #[cfg(feature = "profiling")]
        profiling::scope!("builder::apply");

        let mut graph = Graph::new();
        let mut node_index: RTree<NodeEntry> = RTree::new();
        let mut report = BuildReport {
            trails: trails.len(),
            ..Default::default()
        };

        for (trail, trail_splits) in trails.iter().zip(splits) {
            let mut trail_splits = trail_splits.clone();
            if trail.is_closed() && trail_splits.len() <= 2 {
                if let Some(middle) = middle_vertex_split(trail.points()) {
                    trail_splits.insert(1, middle);
                    report.closed_trails_split += 1;
                }
            }

            for pair in trail_splits.windows(2) {
                let Some(mut piece) = extract_piece(trail.points(), &pair[0], &pair[1]) else {
                    report.degenerate_pieces += 1;
                    continue;
                };

                let last = piece.len() - 1;
                let source = self.node_for(&mut graph, &mut node_index, piece[0]);
                let target = self.node_for(&mut graph, &mut node_index, piece[last]);
                if source == target {
                    debug!(trail_id = %trail.id(), "skipping piece that starts and ends on the same node");
                    report.degenerate_pieces += 1;
                    continue;
                }

                // Pin the piece ends onto the (possibly shared) node locations
                for (slot, node) in [(0, source), (last, target)] {
                    if let Some(node) = graph.node(node) {
                        piece[slot].x = node.location.x;
                        piece[slot].y = node.location.y;
                    }
                }

                let draft = EdgeDraft::from_geometry(
                    source,
                    target,
                    piece,
                    self.coords,
                    self.config.use_3d_length,
                )
                .with_trail(trail.id(), trail.name());
                graph.add_edge(draft)?;
                report.edges_created += 1;
            }
        }
        report.nodes_created = graph.node_count();

        if graph.edge_count() == 0 {
            return Err(GraphError::Topology {
                stage: "build",
                reason: "no edges were created".to_string(),
            });
        }

        graph.bump_version("build");
        info!(
            nodes = report.nodes_created,
            edges = report.edges_created,
            degenerate = report.degenerate_pieces,
            "built trail graph"
        );
        Ok((graph, report))
    }

    /// Find the node within the identity tolerance of `point`, or create one
    fn node_for(&self, graph: &mut Graph, index: &mut RTree<NodeEntry>, point: TrailPoint) -> NodeId {
        let tolerance = self.config.node_identity_tolerance_meters;
        let radius = self.coords.search_radius(tolerance, point.y);
        let query = [point.x, point.y];

        let existing = index
            .locate_within_distance(query, radius * radius)
            .filter_map(|entry| {
                let [x, y] = *entry.geom();
                let distance = self.coords.distance_m(point.coord(), geo::Coord { x, y });
                (distance <= tolerance).then_some((distance, entry.data))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        match existing {
            Some((_, id)) => id,
            None => {
                let id = graph.add_node(point);
                index.insert(GeomWithData::new(query, id));
                id
            }
        }
    }
}

/// Split location at the middle vertex of a closed trail
fn middle_vertex_split(points: &[TrailPoint]) -> Option<SplitLocation> {
    let middle = points.len() / 2;
    (middle > 0 && middle < points.len() - 1).then(|| SplitLocation {
        segment: middle,
        t: 0.0,
        point: points[middle],
    })
}

/// Polyline between two split locations, or `None` if it has no length
fn extract_piece(points: &[TrailPoint], from: &SplitLocation, to: &SplitLocation) -> Option<Vec<TrailPoint>> {
    let (start, end) = (from.position(), to.position());
    if end <= start {
        return None;
    }

    let mut piece = vec![from.point];
    for vertex in (from.segment + 1)..=to.segment.min(points.len() - 1) {
        let position = vertex as f64;
        if position > start && position < end {
            piece.push(points[vertex]);
        }
    }
    piece.push(to.point);
    piece.dedup_by(|a, b| a.coord() == b.coord());

    (piece.len() >= 2).then_some(piece)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intersect::{IntersectionConfig, IntersectionDetector};
    use crate::test_fixtures::planar_trail;

    fn build(trails: &[Arc<Trail>]) -> Result<(Graph, BuildReport)> {
        let detector = IntersectionDetector::new(IntersectionConfig::default(), CoordinateSystem::Planar);
        let (splits, _) = detector.apply(trails);
        GraphBuilder::new(BuildConfig::default(), CoordinateSystem::Planar).apply(trails, &splits)
    }

    #[test]
    fn test_crossing_trails_make_four_edges() {
        let trails = vec![
            planar_trail("h", "Horizontal", &[(0.0, 0.0), (100.0, 0.0)]),
            planar_trail("v", "Vertical", &[(50.0, -50.0), (50.0, 50.0)]),
        ];
        let (graph, report) = build(&trails).unwrap();

        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.node_count(), 5);
        assert_eq!(report.edges_created, 4);
        assert!(graph.check_invariants().is_ok());
        let center = graph.nodes().find(|n| n.degree == 4).unwrap();
        assert_eq!(center.trail_names.len(), 2);
        assert!((graph.total_length_km() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_pieces_keep_interior_vertices_and_elevation() {
        let record = crate::trail::TrailRecord::new(
            "bent",
            "Bent",
            vec![
                TrailPoint::with_elevation(0.0, 0.0, 10.0),
                TrailPoint::with_elevation(10.0, 0.0, 20.0),
                TrailPoint::with_elevation(10.0, 10.0, 15.0),
            ],
        );
        let bent = Trail::new(record, CoordinateSystem::Planar).unwrap();
        let cross = planar_trail("cross", "Cross", &[(5.0, -5.0), (5.0, 5.0)]);
        let (graph, _) = build(&[bent, cross]).unwrap();

        let long_piece = graph
            .edges()
            .find(|e| e.trail_ids[0] == "bent" && e.geometry.len() == 3)
            .unwrap();
        assert_eq!(long_piece.geometry[0].z, Some(15.0));
        assert!((long_piece.elevation_gain - 5.0).abs() < 1e-9);
        assert!((long_piece.elevation_loss - 5.0).abs() < 1e-9);
        assert!((long_piece.length_km - 0.015).abs() < 1e-12);
    }

    #[test]
    fn test_nearby_endpoints_share_a_node() {
        let trails = vec![
            planar_trail("a", "A", &[(0.0, 0.0), (10.0, 0.0)]),
            planar_trail("b", "B", &[(10.05, 0.0), (20.0, 0.0)]),
        ];
        let (graph, _) = build(&trails).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        let shared = graph.nodes().find(|n| n.degree == 2).unwrap();
        assert_eq!(shared.location.x, 10.0);
    }

    #[test]
    fn test_closed_trail_is_split_in_two() {
        let ring = planar_trail(
            "ring",
            "Ring",
            &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)],
        );
        let (graph, report) = build(&[ring]).unwrap();
        assert_eq!(report.closed_trails_split, 1);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.node_count(), 2);
        assert!(graph.edges().all(|e| !e.is_self_loop()));
        assert!((graph.total_length_km() - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_extract_piece_between_splits() {
        let points = vec![
            TrailPoint::new(0.0, 0.0),
            TrailPoint::new(10.0, 0.0),
            TrailPoint::new(20.0, 0.0),
        ];
        let from = SplitLocation {
            segment: 0,
            t: 0.5,
            point: TrailPoint::new(5.0, 0.0),
        };
        let to = SplitLocation {
            segment: 1,
            t: 1.0,
            point: points[2],
        };
        let piece = extract_piece(&points, &from, &to).unwrap();
        let xs: Vec<f64> = piece.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![5.0, 10.0, 20.0]);

        assert!(extract_piece(&points, &to, &from).is_none());
    }
}
