//! Vertex consolidation - fuse nodes closer than a tolerance into one canonical node
//!
//! Equivalent to DBSCAN with `minPts = 2`: every pair of nodes within the tolerance ends
//! up in the same cluster, transitively. Clusters are found with an R-tree neighbour query
//! and a union-find, then collapsed onto their lowest node id at the cluster centroid.
//! Moving nodes to centroids can bring other nodes into range, so passes repeat until a
//! pass merges nothing.

use crate::graph::{Graph, NodeId, measure_polyline};
use crate::trail::TrailPoint;
use crate::union_find::UnionFind;
use crate::utils::CoordinateSystem;
use crate::{GraphError, Result};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Elevation given to a consolidated node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum ElevationPolicy {
    /// Mean of the cluster members that have an elevation
    #[default]
    Average,
    /// Elevation of the canonical (lowest id) node
    KeepCanonical,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct ConsolidateConfig {
    pub vertex_consolidation_tolerance_meters: f64,
    pub elevation_policy: ElevationPolicy,
    /// Upper bound on clustering passes
    pub max_consolidation_passes: usize,
}

impl Default for ConsolidateConfig {
    fn default() -> Self {
        Self {
            vertex_consolidation_tolerance_meters: 0.2,
            elevation_policy: ElevationPolicy::Average,
            max_consolidation_passes: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    pub passes: usize,
    /// Clusters of two or more nodes, over all passes
    pub clusters: usize,
    /// Nodes deleted because they were fused into another one
    pub nodes_merged: usize,
    pub self_loops_dropped: usize,
    /// False if the pass cap was hit while nodes were still within tolerance
    pub converged: bool,
}

type NodeEntry = GeomWithData<[f64; 2], usize>;

pub struct VertexConsolidator {
    config: ConsolidateConfig,
    coords: CoordinateSystem,
    use_3d_length: bool,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl VertexConsolidator {
    pub fn new(config: ConsolidateConfig, coords: CoordinateSystem) -> Self {
        Self {
            config,
            coords,
            use_3d_length: false,
        }
    }

    /// Recompute edge lengths in 3D after moving their endpoints
    pub fn with_3d_length(mut self, use_3d_length: bool) -> Self {
        self.use_3d_length = use_3d_length;
        self
    }

    pub fn apply(&self, input: &Graph) -> Result<(Graph, ConsolidationReport)> {
        #[cfg(feature = "profiling")]
        profiling::scope!("consolidate::apply");

        let mut graph = input.clone();
        let mut report = ConsolidationReport::default();

        while report.passes < self.config.max_consolidation_passes {
            report.passes += 1;
            let clusters = self.find_clusters(&graph);
            if clusters.is_empty() {
                report.converged = true;
                break;
            }
            for cluster in &clusters {
                self.collapse(&mut graph, cluster, &mut report)?;
            }
            report.clusters += clusters.len();
            debug!(pass = report.passes, clusters = clusters.len(), "consolidation pass");
        }
        if !report.converged {
            // The last pass may have been the one that finished the job
            report.converged = self.find_clusters(&graph).is_empty();
        }
        if !report.converged {
            warn!(
                passes = report.passes,
                "vertex consolidation stopped at the pass limit with nodes still within tolerance"
            );
        }

        if graph.edge_count() == 0 {
            return Err(GraphError::Topology {
                stage: "consolidate",
                reason: "every edge collapsed into a self-loop".to_string(),
            });
        }

        graph.bump_version("consolidate");
        info!(
            clusters = report.clusters,
            nodes_merged = report.nodes_merged,
            self_loops_dropped = report.self_loops_dropped,
            passes = report.passes,
            "consolidated vertices"
        );
        Ok((graph, report))
    }

    /// Groups of node ids (ascending, size >= 2) that lie within the tolerance of each other
    fn find_clusters(&self, graph: &Graph) -> Vec<Vec<NodeId>> {
        let tolerance = self.config.vertex_consolidation_tolerance_meters;
        let nodes: Vec<(NodeId, TrailPoint)> = graph.nodes().map(|n| (n.id, n.location)).collect();
        let tree = RTree::bulk_load(
            nodes
                .iter()
                .enumerate()
                .map(|(index, (_, p))| NodeEntry::new([p.x, p.y], index))
                .collect(),
        );

        let mut union_find = UnionFind::new(nodes.len());
        for (index, (_, point)) in nodes.iter().enumerate() {
            let radius = self.coords.search_radius(tolerance, point.y);
            for neighbour in tree.locate_within_distance([point.x, point.y], radius * radius) {
                let other = neighbour.data;
                if other <= index {
                    continue;
                }
                if self.coords.distance_m(point.coord(), nodes[other].1.coord()) < tolerance {
                    union_find.union(index, other);
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for (index, (id, _)) in nodes.iter().enumerate() {
            groups.entry(union_find.find(index)).or_default().push(*id);
        }
        let mut clusters: Vec<Vec<NodeId>> = groups.into_values().filter(|g| g.len() > 1).collect();
        clusters.sort_by_key(|c| c[0]);
        clusters
    }

    fn collapse(&self, graph: &mut Graph, cluster: &[NodeId], report: &mut ConsolidationReport) -> Result<()> {
        let canonical = cluster[0];
        let members: Vec<TrailPoint> = cluster
            .iter()
            .filter_map(|id| graph.node(*id).map(|n| n.location))
            .collect();
        let count = members.len() as f64;
        let x = members.iter().map(|p| p.x).sum::<f64>() / count;
        let y = members.iter().map(|p| p.y).sum::<f64>() / count;
        let z = match self.config.elevation_policy {
            ElevationPolicy::Average => {
                let known: Vec<f64> = members.iter().filter_map(|p| p.z).collect();
                (!known.is_empty()).then(|| known.iter().sum::<f64>() / known.len() as f64)
            }
            ElevationPolicy::KeepCanonical => members[0].z,
        };
        let centroid = TrailPoint { x, y, z };

        if let Some(node) = graph.node_mut(canonical) {
            node.location = centroid;
        }
        for &member in &cluster[1..] {
            let incident = graph.incident_edges(member).to_vec();
            for edge in incident {
                graph.reattach_edge(edge, member, canonical)?;
            }
            graph.remove_node(member);
            report.nodes_merged += 1;
        }

        for edge_id in graph.incident_edges(canonical).to_vec() {
            let is_loop = graph.edge(edge_id).is_some_and(|e| e.is_self_loop());
            if is_loop {
                graph.remove_edge(edge_id);
                report.self_loops_dropped += 1;
                continue;
            }
            if let Some(edge) = graph.edge_mut(edge_id) {
                let last = edge.geometry.len() - 1;
                let slot = if edge.source == canonical { 0 } else { last };
                edge.geometry[slot].x = centroid.x;
                edge.geometry[slot].y = centroid.y;
                if centroid.z.is_some() {
                    edge.geometry[slot].z = centroid.z;
                }
                edge.geometry.dedup_by(|a, b| a.coord() == b.coord());
                let (length_m, gain, loss) = measure_polyline(&edge.geometry, self.coords, self.use_3d_length);
                edge.length_km = length_m / 1000.0;
                edge.elevation_gain = gain;
                edge.elevation_loss = loss;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::planar_graph;

    fn consolidator() -> VertexConsolidator {
        VertexConsolidator::new(ConsolidateConfig::default(), CoordinateSystem::Planar)
    }

    fn min_pairwise_distance(graph: &Graph) -> f64 {
        let nodes: Vec<_> = graph.nodes().collect();
        let mut min = f64::INFINITY;
        for (i, a) in nodes.iter().enumerate() {
            for b in &nodes[i + 1..] {
                min = min.min(crate::utils::planar_distance(a.location.coord(), b.location.coord()));
            }
        }
        min
    }

    #[test]
    fn test_near_nodes_are_fused_at_centroid() {
        // Two trails that end 0.1 m apart, plus one far node
        let graph = planar_graph(
            &[(0.0, 0.0), (10.0, 0.0), (10.1, 0.0), (20.0, 0.0)],
            &[(0, 1, "A"), (2, 3, "B")],
        );
        let (merged, report) = consolidator().apply(&graph).unwrap();

        assert_eq!(report.clusters, 1);
        assert_eq!(report.nodes_merged, 1);
        assert!(report.converged);
        assert_eq!(merged.node_count(), 3);
        let joint = merged.node(NodeId(1)).unwrap();
        assert!((joint.location.x - 10.05).abs() < 1e-9);
        assert_eq!(joint.degree, 2);
        assert!(merged.node(NodeId(2)).is_none());
        assert!(merged.check_invariants().is_ok());
        assert!(min_pairwise_distance(&merged) >= 0.2);

        // Geometry endpoints follow the node
        for edge in merged.edges() {
            let touching = if edge.source == NodeId(1) { edge.geometry[0] } else { edge.geometry[1] };
            assert!((touching.x - 10.05).abs() < 1e-9);
        }
    }

    #[test]
    fn test_chaining_is_transitive() {
        // 0.15 m steps: first and last are 0.3 m apart but chained through the middle
        let graph = planar_graph(
            &[(0.0, 0.0), (0.15, 0.0), (0.3, 0.0), (50.0, 0.0), (0.0, 50.0), (0.3, 50.0)],
            &[(0, 3, "A"), (1, 4, "B"), (2, 5, "C")],
        );
        let (merged, report) = consolidator().apply(&graph).unwrap();
        assert_eq!(report.nodes_merged, 2);
        assert_eq!(merged.node(NodeId(0)).unwrap().degree, 3);
        assert!(merged.check_invariants().is_ok());
    }

    #[test]
    fn test_short_edges_become_dropped_self_loops() {
        let graph = planar_graph(
            &[(0.0, 0.0), (0.1, 0.0), (30.0, 0.0)],
            &[(0, 1, "Stub"), (1, 2, "Main")],
        );
        let (merged, report) = consolidator().apply(&graph).unwrap();
        assert_eq!(report.self_loops_dropped, 1);
        assert_eq!(merged.edge_count(), 1);
        assert!(merged.edges().all(|e| !e.is_self_loop()));
        assert!(merged.check_invariants().is_ok());
    }

    #[test]
    fn test_collapsing_everything_is_fatal() {
        let graph = planar_graph(&[(0.0, 0.0), (0.1, 0.0)], &[(0, 1, "Stub")]);
        let result = consolidator().apply(&graph);
        assert!(matches!(result, Err(GraphError::Topology { stage: "consolidate", .. })));
    }

    #[test]
    fn test_elevation_policy() {
        let mut graph = Graph::new();
        let a = graph.add_node(TrailPoint::with_elevation(0.0, 0.0, 100.0));
        let b = graph.add_node(TrailPoint::with_elevation(0.1, 0.0, 110.0));
        let c = graph.add_node(TrailPoint::new(20.0, 0.0));
        let d = graph.add_node(TrailPoint::new(0.0, 20.0));
        crate::test_fixtures::add_straight_edge(&mut graph, a, c, "a", "A");
        crate::test_fixtures::add_straight_edge(&mut graph, b, d, "b", "B");

        let (averaged, _) = consolidator().apply(&graph).unwrap();
        assert_eq!(averaged.node(a).unwrap().location.z, Some(105.0));

        let config = ConsolidateConfig {
            elevation_policy: ElevationPolicy::KeepCanonical,
            ..Default::default()
        };
        let (kept, _) = VertexConsolidator::new(config, CoordinateSystem::Planar)
            .apply(&graph)
            .unwrap();
        assert_eq!(kept.node(a).unwrap().location.z, Some(100.0));
    }
}
