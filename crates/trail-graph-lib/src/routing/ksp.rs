//! Yen's k-shortest loopless paths
//!
//! Paths are compared by their edge sequence, so parallel edges between the same two nodes
//! yield distinct paths.

use super::{Path, shortest_path_avoiding};
use crate::graph::{EdgeId, Graph, NodeId};
use std::collections::HashSet;

/// Up to `k` loopless paths from `from` to `to`, cheapest first
///
/// Returns an empty list when `to` is unreachable.
pub fn k_shortest_paths(graph: &Graph, from: NodeId, to: NodeId, k: usize) -> Vec<Path> {
    #[cfg(feature = "profiling")]
    profiling::scope!("ksp::k_shortest_paths");

    if k == 0 {
        return Vec::new();
    }
    let Some(first) = shortest_path_avoiding(graph, from, to, &HashSet::new(), &HashSet::new()) else {
        return Vec::new();
    };

    let mut accepted: Vec<Path> = vec![first];
    let mut candidates: Vec<Path> = Vec::new();

    while accepted.len() < k {
        let previous = &accepted[accepted.len() - 1];
        for spur_index in 0..previous.edges.len() {
            let spur_node = previous.nodes[spur_index];
            let root_nodes = &previous.nodes[..=spur_index];
            let root_edges = &previous.edges[..spur_index];

            // Forbid the next edge of every accepted path sharing this root
            let mut banned_edges: HashSet<EdgeId> = HashSet::new();
            for path in &accepted {
                if path.edges.len() > spur_index
                    && path.nodes[..=spur_index] == *root_nodes
                    && path.edges[..spur_index] == *root_edges
                {
                    banned_edges.insert(path.edges[spur_index]);
                }
            }
            let banned_nodes: HashSet<NodeId> = root_nodes[..spur_index].iter().copied().collect();

            let Some(spur) = shortest_path_avoiding(graph, spur_node, to, &banned_edges, &banned_nodes) else {
                continue;
            };

            let root_cost: f64 = root_edges
                .iter()
                .filter_map(|e| graph.edge(*e))
                .map(|e| e.length_km)
                .sum();
            let mut nodes = root_nodes.to_vec();
            nodes.extend_from_slice(&spur.nodes[1..]);
            let mut edges = root_edges.to_vec();
            edges.extend_from_slice(&spur.edges);
            let total = Path {
                nodes,
                edges,
                cost: root_cost + spur.cost,
            };

            let known = accepted
                .iter()
                .chain(candidates.iter())
                .any(|p| p.edges == total.edges);
            if !known {
                candidates.push(total);
            }
        }

        // Cheapest candidate next; fewer edges, then edge ids, keep the order deterministic
        let Some(best) = candidates
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.cost
                    .total_cmp(&b.cost)
                    .then(a.edges.len().cmp(&b.edges.len()))
                    .then_with(|| a.edges.cmp(&b.edges))
            })
            .map(|(index, _)| index)
        else {
            break;
        };
        accepted.push(candidates.swap_remove(best));
    }
    accepted
}
