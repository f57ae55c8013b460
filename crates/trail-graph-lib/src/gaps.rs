//! Gap bridging - connector edges across small gaps between dead ends
//!
//! Dead ends (degree-1 nodes) of different trails that stop just short of each other get a
//! straight connector edge. Same-named trails are joined anywhere within the tolerance,
//! differently named ones only within half of it, and endpoints surrounded by several other
//! trails are left alone so connectors never fabricate junctions.

use crate::graph::{EdgeDraft, EdgeKind, Graph, NodeId};
use crate::trail::TrailPoint;
use crate::utils::CoordinateSystem;
use crate::Result;
use rstar::RTree;
use rstar::primitives::GeomWithData;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct GapConfig {
    /// Maximum gap bridged between same-named trails (half of it for different names)
    pub gap_tolerance_meters: f64,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            gap_tolerance_meters: 5.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GapReport {
    /// Dead ends considered
    pub endpoints: usize,
    /// Dead-end pairs of different trails within the tolerance
    pub gaps_found: usize,
    pub connectors_inserted: usize,
    pub skipped_already_joined: usize,
    pub skipped_ambiguous: usize,
    pub skipped_name_mismatch: usize,
    /// Pairs dropped because one side was already bridged to a closer endpoint
    pub skipped_endpoint_used: usize,
}

type NodeEntry = GeomWithData<[f64; 2], NodeId>;

/// A dead end with the trails that reach it
struct DeadEnd {
    node: NodeId,
    location: TrailPoint,
    trail_ids: BTreeSet<String>,
    trail_names: BTreeSet<String>,
}

pub struct GapBridger {
    config: GapConfig,
    coords: CoordinateSystem,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GapBridger {
    pub fn new(config: GapConfig, coords: CoordinateSystem) -> Self {
        Self { config, coords }
    }

    pub fn apply(&self, input: &Graph) -> Result<(Graph, GapReport)> {
        #[cfg(feature = "profiling")]
        profiling::scope!("gaps::apply");

        let tolerance = self.config.gap_tolerance_meters;
        let mut graph = input.clone();
        let mut report = GapReport::default();

        let dead_ends: Vec<DeadEnd> = graph
            .nodes()
            .filter(|n| n.degree == 1)
            .map(|n| {
                let (trail_ids, trail_names) = trails_at(&graph, n.id);
                DeadEnd {
                    node: n.id,
                    location: n.location,
                    trail_ids,
                    trail_names,
                }
            })
            .collect();
        report.endpoints = dead_ends.len();

        let all_nodes = RTree::bulk_load(
            graph
                .nodes()
                .map(|n| NodeEntry::new([n.location.x, n.location.y], n.id))
                .collect(),
        );
        let dead_end_index = RTree::bulk_load(
            dead_ends
                .iter()
                .enumerate()
                .map(|(index, end)| GeomWithData::new([end.location.x, end.location.y], index))
                .collect::<Vec<GeomWithData<[f64; 2], usize>>>(),
        );

        // (distance, first, second) for every acceptable pair
        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
        for (index, end) in dead_ends.iter().enumerate() {
            let location = end.location;
            let radius = self.coords.search_radius(tolerance, location.y);
            for neighbour in dead_end_index.locate_within_distance([location.x, location.y], radius * radius) {
                let other_index = neighbour.data;
                if other_index <= index {
                    continue;
                }
                let other = &dead_ends[other_index];
                let distance = self.coords.distance_m(location.coord(), other.location.coord());
                if distance <= 0.0 || distance > tolerance || !end.trail_ids.is_disjoint(&other.trail_ids) {
                    continue;
                }
                report.gaps_found += 1;

                if graph.edge_between(end.node, other.node).is_some() {
                    report.skipped_already_joined += 1;
                    continue;
                }
                if self.is_ambiguous(&graph, &all_nodes, end) || self.is_ambiguous(&graph, &all_nodes, other) {
                    report.skipped_ambiguous += 1;
                    continue;
                }
                let same_name = !end.trail_names.is_disjoint(&other.trail_names);
                if !same_name && distance > tolerance / 2.0 {
                    report.skipped_name_mismatch += 1;
                    continue;
                }
                candidates.push((distance, index, other_index));
            }
        }

        // Closest gaps first, each dead end bridged at most once
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
        let mut used: HashSet<usize> = HashSet::new();
        for (distance, first, second) in candidates {
            if used.contains(&first) || used.contains(&second) {
                report.skipped_endpoint_used += 1;
                continue;
            }
            used.insert(first);
            used.insert(second);
            self.insert_connector(&mut graph, dead_ends[first].node, dead_ends[second].node, distance)?;
            report.connectors_inserted += 1;
        }

        graph.bump_version("gaps");
        info!(
            gaps_found = report.gaps_found,
            connectors = report.connectors_inserted,
            ambiguous = report.skipped_ambiguous,
            name_mismatch = report.skipped_name_mismatch,
            "bridged endpoint gaps"
        );
        Ok((graph, report))
    }

    /// Whether more than one other trail converges within the tolerance of a dead end
    fn is_ambiguous(&self, graph: &Graph, all_nodes: &RTree<NodeEntry>, end: &DeadEnd) -> bool {
        let tolerance = self.config.gap_tolerance_meters;
        let location = end.location;
        let radius = self.coords.search_radius(tolerance, location.y);
        let mut others: BTreeSet<String> = BTreeSet::new();
        for neighbour in all_nodes.locate_within_distance([location.x, location.y], radius * radius) {
            if neighbour.data == end.node {
                continue;
            }
            let [x, y] = *neighbour.geom();
            if self.coords.distance_m(location.coord(), geo::Coord { x, y }) > tolerance {
                continue;
            }
            let (ids, _) = trails_at(graph, neighbour.data);
            others.extend(ids.into_iter().filter(|id| !end.trail_ids.contains(id)));
        }
        others.len() > 1
    }

    fn insert_connector(&self, graph: &mut Graph, from: NodeId, to: NodeId, distance_m: f64) -> Result<()> {
        let (Some(a), Some(b)) = (graph.node(from), graph.node(to)) else {
            return Ok(());
        };
        let geometry = vec![a.location, b.location];
        debug!(from = %from, to = %to, distance_m, "inserting connector");
        let mut draft = EdgeDraft::from_geometry(from, to, geometry, self.coords, false).with_kind(EdgeKind::Connector);
        draft.length_km = distance_m / 1000.0;
        draft.elevation_gain = 0.0;
        draft.elevation_loss = 0.0;
        graph.add_edge(draft)?;
        Ok(())
    }
}

/// Trail ids and names of every edge touching a node
fn trails_at(graph: &Graph, node: NodeId) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut ids = BTreeSet::new();
    let mut names = BTreeSet::new();
    for edge in graph.incident_edges(node).iter().filter_map(|e| graph.edge(*e)) {
        ids.extend(edge.trail_ids.iter().cloned());
        names.extend(edge.trail_names.iter().cloned());
    }
    (ids, names)
}
