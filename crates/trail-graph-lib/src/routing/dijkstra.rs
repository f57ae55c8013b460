//! Dijkstra shortest paths weighted by edge length

use super::Path;
use crate::graph::{EdgeId, Graph, NodeId};
use crate::{GraphError, Result};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

#[derive(Copy, Clone, PartialEq)]
struct State {
    cost: f64,
    node: NodeId,
}

impl Eq for State {}

// Reversed so the max-heap pops the cheapest state first; ties go to the lower node id
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Single-source shortest path distances and predecessors
pub(crate) struct ShortestPathTree {
    source: NodeId,
    distance: Vec<f64>,
    previous: Vec<Option<(NodeId, EdgeId)>>,
}

impl ShortestPathTree {
    /// Run Dijkstra from `source` over the whole graph
    pub fn new(graph: &Graph, source: NodeId) -> Self {
        Self::search(graph, source, None, &HashSet::new(), &HashSet::new())
    }

    fn search(
        graph: &Graph,
        source: NodeId,
        target: Option<NodeId>,
        banned_edges: &HashSet<EdgeId>,
        banned_nodes: &HashSet<NodeId>,
    ) -> Self {
        let capacity = graph.node_capacity();
        let mut tree = Self {
            source,
            distance: vec![f64::INFINITY; capacity],
            previous: vec![None; capacity],
        };
        if graph.node(source).is_none() {
            return tree;
        }

        let mut heap = BinaryHeap::new();
        tree.distance[source.index()] = 0.0;
        heap.push(State {
            cost: 0.0,
            node: source,
        });

        while let Some(State { cost, node }) = heap.pop() {
            if Some(node) == target {
                break;
            }
            if cost > tree.distance[node.index()] {
                continue;
            }
            for &edge_id in graph.incident_edges(node) {
                if banned_edges.contains(&edge_id) {
                    continue;
                }
                let Some(edge) = graph.edge(edge_id) else {
                    continue;
                };
                let Some(next) = edge.opposite(node) else {
                    continue;
                };
                if next == node || banned_nodes.contains(&next) {
                    continue;
                }
                let next_cost = cost + edge.length_km;
                if next_cost < tree.distance[next.index()] {
                    tree.distance[next.index()] = next_cost;
                    tree.previous[next.index()] = Some((node, edge_id));
                    heap.push(State {
                        cost: next_cost,
                        node: next,
                    });
                }
            }
        }
        tree
    }

    /// Distance in kilometers, or `None` if unreachable
    pub fn distance(&self, node: NodeId) -> Option<f64> {
        self.distance
            .get(node.index())
            .copied()
            .filter(|d| d.is_finite())
    }

    /// Reachable nodes with their distance, in id order
    pub fn reachable(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        self.distance
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_finite())
            .map(|(index, d)| (NodeId(index as u32), *d))
    }

    /// Walk the predecessor links back from `target`
    pub fn path_to(&self, target: NodeId) -> Option<Path> {
        let cost = self.distance(target)?;
        let mut nodes = vec![target];
        let mut edges = Vec::new();
        let mut current = target;
        while current != self.source {
            let (previous, edge) = self.previous[current.index()]?;
            edges.push(edge);
            nodes.push(previous);
            current = previous;
        }
        nodes.reverse();
        edges.reverse();
        Some(Path { nodes, edges, cost })
    }
}

/// Shortest path between two nodes by total edge length
pub fn shortest_path(graph: &Graph, from: NodeId, to: NodeId) -> Result<Path> {
    for node in [from, to] {
        if graph.node(node).is_none() {
            return Err(GraphError::UnknownNode(node));
        }
    }
    shortest_path_avoiding(graph, from, to, &HashSet::new(), &HashSet::new())
        .ok_or(GraphError::RouteNotFound { from, to })
}

/// Shortest path that never uses `banned_edges` nor passes through `banned_nodes`
pub(crate) fn shortest_path_avoiding(
    graph: &Graph,
    from: NodeId,
    to: NodeId,
    banned_edges: &HashSet<EdgeId>,
    banned_nodes: &HashSet<NodeId>,
) -> Option<Path> {
    if banned_nodes.contains(&from) || banned_nodes.contains(&to) {
        return None;
    }
    ShortestPathTree::search(graph, from, Some(to), banned_edges, banned_nodes).path_to(to)
}
