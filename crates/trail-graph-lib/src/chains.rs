//! Degree-2 chain merging
//!
//! A node with exactly two incident edges is a pass-through point, not a decision point.
//! Maximal runs of edges through such nodes are collapsed into a single edge, repeatedly,
//! until an iteration finds nothing left to merge.

use crate::graph::{EdgeDraft, EdgeId, EdgeKind, Graph, NodeId};
use crate::trail::TrailPoint;
use crate::Result;
use smallvec::SmallVec;
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct ChainConfig {
    /// Maximum number of edges merged in one chain per iteration
    pub max_chain_length: usize,
    pub max_merge_iterations: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_chain_length: 15,
            max_merge_iterations: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChainReport {
    pub iterations: usize,
    pub chains_merged: usize,
    pub edges_removed: usize,
    pub nodes_removed: usize,
    /// True when the last iteration found no chain
    pub converged: bool,
}

/// A walk through degree-2 nodes: `nodes[i]` and `nodes[i + 1]` are joined by `edges[i]`
#[derive(Debug)]
struct Chain {
    nodes: Vec<NodeId>,
    edges: Vec<EdgeId>,
}

pub struct Degree2ChainMerger {
    config: ChainConfig,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Degree2ChainMerger {
    pub fn new(config: ChainConfig) -> Self {
        Self { config }
    }

    pub fn apply(&self, input: &Graph) -> Result<(Graph, ChainReport)> {
        #[cfg(feature = "profiling")]
        profiling::scope!("chains::apply");

        let mut graph = input.clone();
        let mut report = ChainReport::default();

        while report.iterations < self.config.max_merge_iterations {
            report.iterations += 1;
            let chains = self.find_chains(&graph);
            if chains.is_empty() {
                report.converged = true;
                break;
            }
            for chain in &chains {
                merge_chain(&mut graph, chain)?;
                report.edges_removed += chain.edges.len();
                report.nodes_removed += chain.nodes.len() - 2;
            }
            report.chains_merged += chains.len();
            debug!(iteration = report.iterations, chains = chains.len(), "merged degree-2 chains");
        }
        if !report.converged {
            report.converged = self.find_chains(&graph).is_empty();
        }
        if !report.converged {
            warn!(
                iterations = report.iterations,
                "chain merging stopped at the iteration limit before converging"
            );
        }

        graph.bump_version("chains");
        info!(
            chains_merged = report.chains_merged,
            iterations = report.iterations,
            edges = graph.edge_count(),
            nodes = graph.node_count(),
            "collapsed degree-2 chains"
        );
        Ok((graph, report))
    }

    /// Walk outward from every node of degree != 2 through degree-2 nodes
    fn find_chains(&self, graph: &Graph) -> Vec<Chain> {
        let mut visited: HashSet<EdgeId> = HashSet::new();
        let mut chains = Vec::new();

        for start in graph.nodes().filter(|n| n.degree != 2).map(|n| n.id) {
            for &first_edge in graph.incident_edges(start) {
                if visited.contains(&first_edge) {
                    continue;
                }
                let chain = self.walk(graph, start, first_edge, &mut visited);
                let (Some(first), Some(last)) = (chain.nodes.first(), chain.nodes.last()) else {
                    continue;
                };
                // Chains that come back to their start would become self-loops
                if chain.edges.len() >= 2 && first != last {
                    chains.push(chain);
                }
            }
        }
        chains
    }

    fn walk(&self, graph: &Graph, start: NodeId, first_edge: EdgeId, visited: &mut HashSet<EdgeId>) -> Chain {
        let mut chain = Chain {
            nodes: vec![start],
            edges: Vec::new(),
        };
        let mut current = start;
        let mut edge_id = first_edge;

        loop {
            visited.insert(edge_id);
            let Some(next) = graph.edge(edge_id).and_then(|e| e.opposite(current)) else {
                break;
            };
            // Self-loops end the chain before they are walked
            if next == current {
                break;
            }
            chain.edges.push(edge_id);
            chain.nodes.push(next);

            if graph.degree(next) != 2 || chain.edges.len() >= self.config.max_chain_length {
                break;
            }
            let Some(&following) = graph.incident_edges(next).iter().find(|e| **e != edge_id) else {
                break;
            };
            if visited.contains(&following) {
                break;
            }
            current = next;
            edge_id = following;
        }
        chain
    }
}

/// Replace the edges of a chain by one merged edge and drop its interior nodes
fn merge_chain(graph: &mut Graph, chain: &Chain) -> Result<()> {
    let mut geometry: Vec<TrailPoint> = Vec::new();
    let mut length_km = 0.0;
    let mut gain = 0.0;
    let mut loss = 0.0;
    let mut trail_ids: SmallVec<[String; 2]> = SmallVec::new();
    let mut trail_names: SmallVec<[String; 2]> = SmallVec::new();

    for (step, edge_id) in chain.edges.iter().enumerate() {
        let Some(edge) = graph.edge(*edge_id) else {
            continue;
        };
        let from = chain.nodes[step];
        let piece = edge.geometry_from(from);
        let skip = usize::from(!geometry.is_empty());
        geometry.extend(piece.into_iter().skip(skip));

        length_km += edge.length_km;
        gain += edge.gain_from(from);
        loss += if from == edge.source {
            edge.elevation_loss
        } else {
            edge.elevation_gain
        };
        for id in &edge.trail_ids {
            if !trail_ids.contains(id) {
                trail_ids.push(id.clone());
            }
        }
        for name in &edge.trail_names {
            if !trail_names.contains(name) {
                trail_names.push(name.clone());
            }
        }
    }

    for edge_id in &chain.edges {
        graph.remove_edge(*edge_id);
    }
    for interior in &chain.nodes[1..chain.nodes.len() - 1] {
        graph.remove_node(*interior);
    }

    let source = chain.nodes[0];
    let target = chain.nodes[chain.nodes.len() - 1];
    graph.add_edge(EdgeDraft {
        source,
        target,
        geometry,
        length_km,
        elevation_gain: gain,
        elevation_loss: loss,
        trail_ids,
        trail_names,
        kind: EdgeKind::Merged,
    })?;
    Ok(())
}
