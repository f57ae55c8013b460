//! Loop route discovery
//!
//! From every high-degree anchor node, destinations roughly half the target distance away
//! are reached with a shortest outbound path; the return leg is the k-shortest candidate
//! that shares the fewest edges with it. Anchors are searched in parallel over the
//! read-only graph, in batches so that cancellation and the route cap are honoured.

use super::{CancelToken, Path, ShortestPathTree, k_shortest_paths, select_return_path};
use crate::graph::{EdgeId, Graph, NodeId, measure_polyline};
use crate::trail::TrailPoint;
use crate::utils::CoordinateSystem;
use crate::{GraphError, Result};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct LoopConfig {
    pub target_loop_distance_km: f64,
    pub max_anchor_nodes: usize,
    /// Destinations considered per anchor
    pub max_reachable_nodes: usize,
    /// Destinations actually routed per anchor
    pub max_destination_exploration: usize,
    /// Lower bound of the destination window, as a fraction of the target distance
    pub distance_range_min: f64,
    /// Upper bound of the destination window, as a fraction of the target distance
    pub distance_range_max: f64,
    /// Return candidates computed per destination
    pub ksp_paths: usize,
    pub min_outbound_distance_km: f64,
    /// Overlap above this is logged, never rejected
    pub edge_overlap_threshold_percent: f64,
    /// Physical radius around the anchor in which junctions are also tried as destinations
    pub nearby_radius_km: f64,
    /// Stop once this many routes were found (0 = unlimited)
    pub max_routes: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_loop_distance_km: 10.0,
            max_anchor_nodes: 50,
            max_reachable_nodes: 100,
            max_destination_exploration: 20,
            distance_range_min: 0.3,
            distance_range_max: 0.7,
            ksp_paths: 5,
            min_outbound_distance_km: 1.0,
            edge_overlap_threshold_percent: 30.0,
            nearby_radius_km: 0.5,
            max_routes: 0,
        }
    }
}

/// Overall shape of a loop route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum RouteShape {
    /// Return leg shares no edge with the outbound leg
    Loop,
    /// Some edges are walked twice
    Lollipop,
    /// The return leg walks back over every outbound edge
    OutAndBack,
}

impl RouteShape {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteShape::Loop => "loop",
            RouteShape::Lollipop => "lollipop",
            RouteShape::OutAndBack => "out-and-back",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopRoute {
    pub anchor: NodeId,
    pub destination: NodeId,
    /// Anchor to destination
    pub outbound: Path,
    /// Destination back to the anchor
    pub return_path: Path,
    pub outbound_distance_km: f64,
    pub return_distance_km: f64,
    pub total_distance_km: f64,
    pub edge_overlap_count: usize,
    pub edge_overlap_percentage: f64,
    pub name: String,
    /// Closeness to the target distance times the non-overlapping fraction, in `[0, 1]`
    pub score: f64,
    pub shape: RouteShape,
    /// Distinct trail ids walked
    pub trail_count: usize,
    /// Meters climbed along the travel direction
    pub elevation_gain: f64,
}

impl LoopRoute {
    /// Outbound edges followed by return edges
    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.outbound
            .edges
            .iter()
            .chain(self.return_path.edges.iter())
            .copied()
            .collect()
    }

    /// `(from node, edge)` steps in travel order
    fn steps(&self) -> impl Iterator<Item = (NodeId, EdgeId)> + '_ {
        let outbound = self.outbound.nodes.iter().copied().zip(self.outbound.edges.iter().copied());
        let back = self.return_path.nodes.iter().copied().zip(self.return_path.edges.iter().copied());
        outbound.chain(back)
    }

    /// One line per edge, each oriented along the direction of travel
    pub fn geometry(&self, graph: &Graph) -> Vec<Vec<TrailPoint>> {
        self.steps()
            .filter_map(|(from, edge)| graph.edge(edge).map(|e| e.geometry_from(from)))
            .collect()
    }

    /// Length of the walked geometry in meters including elevation changes
    pub fn length_3d_m(&self, graph: &Graph, coords: CoordinateSystem) -> f64 {
        self.geometry(graph)
            .iter()
            .map(|line| measure_polyline(line, coords, true).0)
            .sum()
    }

    fn assemble(graph: &Graph, anchor: NodeId, outbound: Path, return_path: Path, shared: usize, target_km: f64) -> Self {
        let outbound_distance_km = outbound.cost;
        let return_distance_km = return_path.cost;
        let total_distance_km = outbound_distance_km + return_distance_km;
        let longest_leg = outbound.edges.len().max(return_path.edges.len());
        let edge_overlap_percentage = if longest_leg == 0 {
            0.0
        } else {
            shared as f64 / longest_leg as f64 * 100.0
        };
        let shape = if shared == 0 {
            RouteShape::Loop
        } else if shared >= outbound.edges.len() {
            RouteShape::OutAndBack
        } else {
            RouteShape::Lollipop
        };
        let closeness = if target_km > 0.0 {
            (1.0 - (total_distance_km - target_km).abs() / target_km).max(0.0)
        } else {
            0.0
        };
        let score = (closeness * (1.0 - edge_overlap_percentage / 100.0)).clamp(0.0, 1.0);
        let destination = outbound.end().unwrap_or(anchor);

        let mut route = LoopRoute {
            anchor,
            destination,
            outbound,
            return_path,
            outbound_distance_km,
            return_distance_km,
            total_distance_km,
            edge_overlap_count: shared,
            edge_overlap_percentage,
            name: String::new(),
            score,
            shape,
            trail_count: 0,
            elevation_gain: 0.0,
        };

        let mut names: Vec<&str> = Vec::new();
        let mut trail_ids: BTreeSet<&str> = BTreeSet::new();
        let mut gain = 0.0;
        for (from, edge_id) in route.steps() {
            let Some(edge) = graph.edge(edge_id) else {
                continue;
            };
            gain += edge.gain_from(from);
            trail_ids.extend(edge.trail_ids.iter().map(String::as_str));
            for name in &edge.trail_names {
                if !name.is_empty() && !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        let name = route_name(&names);
        route.trail_count = trail_ids.len();
        route.elevation_gain = gain;
        route.name = name;
        route
    }
}

/// Distinct trail names in travel order, at most three, suffixed with "Loop"
fn route_name(names: &[&str]) -> String {
    if names.is_empty() {
        return "Unnamed Loop".to_string();
    }
    let mut joined = names.iter().take(3).copied().collect::<Vec<_>>().join(" / ");
    if names.len() > 3 {
        joined.push('…');
    }
    format!("{joined} Loop")
}

#[derive(Debug, Clone, Default)]
pub struct LoopSearchReport {
    pub anchor_candidates: usize,
    pub anchors_searched: usize,
    pub anchors_without_loops: usize,
    pub destinations_explored: usize,
    pub outbound_too_short: usize,
    pub routes_not_found: usize,
    /// Accepted routes whose overlap exceeded the advisory threshold
    pub overlap_threshold_exceeded: usize,
    pub routes_found: usize,
    /// The search stopped early because the cancel token fired
    pub cancelled: bool,
}

impl LoopSearchReport {
    fn merge(&mut self, other: &LoopSearchReport) {
        self.anchors_searched += other.anchors_searched;
        self.anchors_without_loops += other.anchors_without_loops;
        self.destinations_explored += other.destinations_explored;
        self.outbound_too_short += other.outbound_too_short;
        self.routes_not_found += other.routes_not_found;
        self.overlap_threshold_exceeded += other.overlap_threshold_exceeded;
    }
}

pub struct LoopRouteFinder {
    config: LoopConfig,
    coords: CoordinateSystem,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl LoopRouteFinder {
    pub fn new(config: LoopConfig, coords: CoordinateSystem) -> Self {
        Self { config, coords }
    }

    /// Anchor candidates: nodes of degree >= 3, highest degree first, ties by id
    pub fn anchors(&self, graph: &Graph) -> Vec<NodeId> {
        let mut anchors: Vec<(usize, NodeId)> = graph
            .nodes()
            .filter(|n| n.degree >= 3)
            .map(|n| (n.degree, n.id))
            .collect();
        anchors.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        anchors
            .into_iter()
            .take(self.config.max_anchor_nodes)
            .map(|(_, id)| id)
            .collect()
    }

    /// Search loops around every anchor
    ///
    /// A fired cancel token stops the search between anchor batches; the routes found so far
    /// are returned with `cancelled` set in the report.
    pub fn find(&self, graph: &Graph, cancel: &CancelToken) -> Result<(Vec<LoopRoute>, LoopSearchReport)> {
        #[cfg(feature = "profiling")]
        profiling::scope!("loops::find");

        let anchors = self.anchors(graph);
        if anchors.is_empty() {
            return Err(GraphError::NoAnchorCandidates);
        }
        let mut report = LoopSearchReport {
            anchor_candidates: anchors.len(),
            ..Default::default()
        };

        let batch_size = rayon::current_num_threads().max(1);
        let mut routes: Vec<LoopRoute> = Vec::new();
        'batches: for batch in anchors.chunks(batch_size) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let results: Vec<(Vec<LoopRoute>, LoopSearchReport)> = batch
                .par_iter()
                .map(|anchor| self.search_anchor(graph, *anchor))
                .collect();

            // Merge in anchor rank order
            for (anchor_routes, anchor_report) in results {
                report.merge(&anchor_report);
                routes.extend(anchor_routes);
                if self.config.max_routes > 0 && routes.len() >= self.config.max_routes {
                    routes.truncate(self.config.max_routes);
                    break 'batches;
                }
            }
        }

        routes.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.total_distance_km.total_cmp(&a.total_distance_km))
                .then(a.anchor.cmp(&b.anchor))
                .then(a.destination.cmp(&b.destination))
        });
        report.routes_found = routes.len();

        info!(
            anchors = report.anchors_searched,
            routes = report.routes_found,
            cancelled = report.cancelled,
            "loop search finished"
        );
        Ok((routes, report))
    }

    /// Destinations for an anchor: the distance window first, then nearby junctions
    fn destinations(&self, graph: &Graph, anchor: NodeId, tree: &ShortestPathTree) -> Vec<NodeId> {
        let target = self.config.target_loop_distance_km;
        let (low, high) = (
            target * self.config.distance_range_min,
            target * self.config.distance_range_max,
        );
        let half = target / 2.0;

        let mut in_range: Vec<(f64, NodeId)> = tree
            .reachable()
            .filter(|(node, d)| *node != anchor && *d >= low && *d <= high)
            .map(|(node, d)| ((d - half).abs(), node))
            .collect();
        in_range.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut destinations: Vec<NodeId> = in_range.into_iter().map(|(_, node)| node).collect();

        if self.config.nearby_radius_km > 0.0 {
            if let Some(origin) = graph.node(anchor).map(|n| n.location.coord()) {
                let radius_m = self.config.nearby_radius_km * 1000.0;
                let chosen: BTreeSet<NodeId> = destinations.iter().copied().collect();
                let mut nearby: Vec<(f64, NodeId)> = tree
                    .reachable()
                    .filter(|(node, _)| *node != anchor && !chosen.contains(node))
                    .filter_map(|(node, _)| {
                        let n = graph.node(node)?;
                        let distance = self.coords.distance_m(origin, n.location.coord());
                        (n.degree >= 2 && distance <= radius_m).then_some((distance, node))
                    })
                    .collect();
                nearby.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                destinations.extend(nearby.into_iter().map(|(_, node)| node));
            }
        }

        destinations.truncate(self.config.max_reachable_nodes);
        destinations
    }

    fn search_anchor(&self, graph: &Graph, anchor: NodeId) -> (Vec<LoopRoute>, LoopSearchReport) {
        let mut report = LoopSearchReport {
            anchors_searched: 1,
            ..Default::default()
        };
        let tree = ShortestPathTree::new(graph, anchor);
        let destinations = self.destinations(graph, anchor, &tree);

        let mut accepted: BTreeMap<NodeId, LoopRoute> = BTreeMap::new();
        for destination in destinations.into_iter().take(self.config.max_destination_exploration) {
            report.destinations_explored += 1;

            let Some(outbound) = tree.path_to(destination) else {
                report.routes_not_found += 1;
                continue;
            };
            if outbound.cost < self.config.min_outbound_distance_km {
                report.outbound_too_short += 1;
                continue;
            }

            let candidates = k_shortest_paths(graph, destination, anchor, self.config.ksp_paths);
            let Some((return_path, shared)) = select_return_path(&outbound, &candidates) else {
                debug!(anchor = %anchor, destination = %destination, "no return path");
                report.routes_not_found += 1;
                continue;
            };

            let route = LoopRoute::assemble(
                graph,
                anchor,
                outbound,
                return_path.clone(),
                shared,
                self.config.target_loop_distance_km,
            );
            if route.edge_overlap_percentage > self.config.edge_overlap_threshold_percent {
                warn!(
                    anchor = %anchor,
                    destination = %destination,
                    overlap = route.edge_overlap_percentage,
                    "keeping loop above the overlap threshold"
                );
                report.overlap_threshold_exceeded += 1;
            }

            match accepted.get(&destination) {
                Some(existing) if existing.total_distance_km >= route.total_distance_km => {}
                _ => {
                    accepted.insert(destination, route);
                }
            }
        }

        if accepted.is_empty() {
            report.anchors_without_loops += 1;
        }
        (accepted.into_values().collect(), report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{grid_graph, planar_graph};

    fn finder(config: LoopConfig) -> LoopRouteFinder {
        LoopRouteFinder::new(config, CoordinateSystem::Planar)
    }

    /// 5x5 grid of 1 km blocks
    fn town() -> Graph {
        grid_graph(5, 1000.0)
    }

    fn town_config() -> LoopConfig {
        LoopConfig {
            target_loop_distance_km: 4.0,
            max_anchor_nodes: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_anchor_ranking() {
        let graph = town();
        let anchors = finder(LoopConfig::default()).anchors(&graph);
        // 9 interior nodes of degree 4 come before the 12 border nodes of degree 3
        assert_eq!(anchors.len(), 21);
        assert_eq!(anchors[0], NodeId(6));
        assert!(anchors[..9].iter().all(|a| graph.degree(*a) == 4));
        assert!(anchors[9..].iter().all(|a| graph.degree(*a) == 3));
    }

    #[test]
    fn test_finds_disjoint_loops_in_grid() {
        let graph = town();
        let (routes, report) = finder(town_config()).find(&graph, &CancelToken::default()).unwrap();

        assert!(!routes.is_empty());
        assert_eq!(report.anchors_searched, 4);
        assert_eq!(report.routes_found, routes.len());
        let best = &routes[0];
        assert_eq!(best.edge_overlap_count, 0);
        assert_eq!(best.shape, RouteShape::Loop);
        assert!((best.total_distance_km - 4.0).abs() < 1e-9);
        assert!((best.score - 1.0).abs() < 1e-9);
        assert!(best.name.ends_with(" Loop"));

        // Legs join up into a closed walk
        assert_eq!(best.outbound.start(), Some(best.anchor));
        assert_eq!(best.outbound.end(), best.return_path.start());
        assert_eq!(best.return_path.end(), Some(best.anchor));
        let lines = best.geometry(&graph);
        for pair in lines.windows(2) {
            assert_eq!(pair[0].last().map(|p| p.coord()), pair[1].first().map(|p| p.coord()));
        }
        assert!((best.length_3d_m(&graph, CoordinateSystem::Planar) - 4000.0).abs() < 1e-6);

        for pair in routes.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_no_anchor_candidates() {
        let graph = planar_graph(&[(0.0, 0.0), (10.0, 0.0)], &[(0, 1, "A")]);
        let result = finder(LoopConfig::default()).find(&graph, &CancelToken::default());
        assert!(matches!(result, Err(GraphError::NoAnchorCandidates)));
    }

    #[test]
    fn test_cancelled_search_returns_flagged_partial_result() {
        let token = CancelToken::new();
        token.cancel();
        let (routes, report) = finder(town_config()).find(&town(), &token).unwrap();
        assert!(routes.is_empty());
        assert!(report.cancelled);
    }

    #[test]
    fn test_route_cap() {
        let config = LoopConfig {
            max_routes: 2,
            ..town_config()
        };
        let (routes, _) = finder(config).find(&town(), &CancelToken::default()).unwrap();
        assert_eq!(routes.len(), 2);
    }

    #[test]
    fn test_short_outbound_is_rejected() {
        let config = LoopConfig {
            min_outbound_distance_km: 50.0,
            ..town_config()
        };
        let (routes, report) = finder(config).find(&town(), &CancelToken::default()).unwrap();
        assert!(routes.is_empty());
        assert!(report.outbound_too_short > 0);
        assert_eq!(report.anchors_without_loops, 4);
    }

    #[test]
    fn test_deterministic_results() {
        let graph = town();
        let (first, _) = finder(town_config()).find(&graph, &CancelToken::default()).unwrap();
        let (second, _) = finder(town_config()).find(&graph, &CancelToken::default()).unwrap();
        let key = |r: &LoopRoute| (r.anchor, r.destination, r.edge_ids());
        assert_eq!(first.iter().map(key).collect::<Vec<_>>(), second.iter().map(key).collect::<Vec<_>>());
    }

    #[test]
    fn test_route_name() {
        assert_eq!(route_name(&[]), "Unnamed Loop");
        assert_eq!(route_name(&["Ridge", "Creek"]), "Ridge / Creek Loop");
        assert_eq!(route_name(&["A", "B", "C", "D"]), "A / B / C… Loop");
    }

    #[test]
    fn test_out_and_back_shape() {
        // A single corridor leaves only the way back
        let graph = planar_graph(
            &[(0.0, 0.0), (-100.0, 0.0), (0.0, -100.0), (2000.0, 0.0)],
            &[(1, 0, "W"), (2, 0, "S"), (0, 3, "Corridor")],
        );
        let config = LoopConfig {
            target_loop_distance_km: 4.0,
            ..Default::default()
        };
        let (routes, report) = finder(config).find(&graph, &CancelToken::default()).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].shape, RouteShape::OutAndBack);
        assert!((routes[0].edge_overlap_percentage - 100.0).abs() < 1e-9);
        assert_eq!(report.overlap_threshold_exceeded, 1);
    }
}
