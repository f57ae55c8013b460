//! Connectivity validation: components, isolated nodes, orphaned edges, degree statistics

use crate::graph::{EdgeId, Graph, NodeId};
use crate::union_find::UnionFind;
use crate::{GraphError, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct ConnectivityConfig {
    /// Fail instead of warning when the graph is not one connected piece
    pub strict_connectivity: bool,
    /// Drop every component except the one with the most total edge length
    pub retain_largest_component: bool,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ConnectivityReport {
    pub total_nodes: usize,
    pub total_edges: usize,
    /// Nodes without any incident edge
    pub isolated_nodes: usize,
    /// Edges with a missing endpoint or looping back onto their own node
    pub orphaned_edges: usize,
    /// Node count of every component, largest first
    pub component_sizes: Vec<usize>,
    pub average_degree: f64,
    /// Degree -> number of nodes with that degree
    pub degree_distribution: BTreeMap<usize, usize>,
    /// Nodes removed by pruning (isolated nodes and dropped components)
    pub pruned_nodes: usize,
    pub pruned_edges: usize,
    pub dropped_components: usize,
}

impl ConnectivityReport {
    /// No isolated nodes and no orphaned edges
    pub fn is_connected(&self) -> bool {
        self.isolated_nodes == 0 && self.orphaned_edges == 0
    }

    pub fn is_single_component(&self) -> bool {
        self.component_sizes.len() == 1
    }
}

pub struct ConnectivityValidator {
    config: ConnectivityConfig,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ConnectivityValidator {
    pub fn new(config: ConnectivityConfig) -> Self {
        Self { config }
    }

    /// Compute the connectivity statistics of a graph without changing it
    pub fn analyze(graph: &Graph) -> ConnectivityReport {
        let mut report = ConnectivityReport {
            total_nodes: graph.node_count(),
            total_edges: graph.edge_count(),
            ..Default::default()
        };

        report.orphaned_edges = orphaned_edges(graph).len();
        let mut degree_sum = 0;
        for node in graph.nodes() {
            degree_sum += node.degree;
            *report.degree_distribution.entry(node.degree).or_default() += 1;
            if node.degree == 0 {
                report.isolated_nodes += 1;
            }
        }
        if report.total_nodes > 0 {
            report.average_degree = degree_sum as f64 / report.total_nodes as f64;
        }

        let (mut union_find, roots) = components(graph);
        let mut sizes: BTreeMap<usize, usize> = BTreeMap::new();
        for node in &roots {
            *sizes.entry(union_find.find(node.index())).or_default() += 1;
        }
        report.component_sizes = sizes.into_values().collect();
        report.component_sizes.sort_unstable_by(|a, b| b.cmp(a));
        report
    }

    /// Report on the graph, fail in strict mode, then prune what cannot be routed
    pub fn apply(&self, input: &Graph) -> Result<(Graph, ConnectivityReport)> {
        #[cfg(feature = "profiling")]
        profiling::scope!("connectivity::apply");

        let mut report = Self::analyze(input);
        let fully_connected = report.is_connected() && report.is_single_component();
        if !fully_connected {
            if self.config.strict_connectivity {
                return Err(GraphError::Connectivity {
                    components: report.component_sizes.len(),
                    isolated_nodes: report.isolated_nodes,
                    orphaned_edges: report.orphaned_edges,
                });
            }
            warn!(
                components = report.component_sizes.len(),
                isolated_nodes = report.isolated_nodes,
                orphaned_edges = report.orphaned_edges,
                "trail graph is not fully connected"
            );
        }

        let mut graph = input.clone();
        for edge in orphaned_edges(&graph) {
            graph.remove_edge(edge);
            report.pruned_edges += 1;
        }
        let isolated: Vec<NodeId> = graph.nodes().filter(|n| n.degree == 0).map(|n| n.id).collect();
        for node in isolated {
            graph.remove_node(node);
            report.pruned_nodes += 1;
        }

        if self.config.retain_largest_component {
            self.retain_largest(&mut graph, &mut report);
        }

        if graph.edge_count() == 0 || graph.node_count() == 0 {
            return Err(GraphError::Topology {
                stage: "connectivity",
                reason: "no routable edges remain after pruning".to_string(),
            });
        }

        graph.bump_version("connectivity");
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            components = report.component_sizes.len(),
            average_degree = report.average_degree,
            pruned_nodes = report.pruned_nodes,
            pruned_edges = report.pruned_edges,
            "validated connectivity"
        );
        Ok((graph, report))
    }

    fn retain_largest(&self, graph: &mut Graph, report: &mut ConnectivityReport) {
        let (mut union_find, nodes) = components(graph);
        let mut lengths: BTreeMap<usize, f64> = BTreeMap::new();
        for edge in graph.edges() {
            *lengths.entry(union_find.find(edge.source.index())).or_default() += edge.length_km;
        }
        // Most length wins; ties go to the component seen first (lowest node id)
        let mut best: Option<(usize, f64)> = None;
        for node in &nodes {
            let root = union_find.find(node.index());
            let length = lengths.get(&root).copied().unwrap_or(0.0);
            if best.is_none_or(|(_, best_length)| length > best_length) {
                best = Some((root, length));
            }
        }
        let Some((keep, _)) = best else { return };

        let mut dropped_roots: BTreeSet<usize> = BTreeSet::new();
        for node in nodes {
            let root = union_find.find(node.index());
            if root != keep {
                report.pruned_edges += graph.degree(node);
                graph.remove_node(node);
                report.pruned_nodes += 1;
                dropped_roots.insert(root);
            }
        }
        report.dropped_components = dropped_roots.len();
        if report.dropped_components > 0 {
            info!(dropped = report.dropped_components, "kept only the longest component");
        }
    }
}

/// Union-find over node indices plus the live node ids it covers
fn components(graph: &Graph) -> (UnionFind, Vec<NodeId>) {
    let mut union_find = UnionFind::new(graph.node_capacity());
    for edge in graph.edges() {
        if graph.node(edge.source).is_some() && graph.node(edge.target).is_some() {
            union_find.union(edge.source.index(), edge.target.index());
        }
    }
    (union_find, graph.node_ids())
}

fn orphaned_edges(graph: &Graph) -> Vec<EdgeId> {
    graph
        .edges()
        .filter(|e| e.is_self_loop() || graph.node(e.source).is_none() || graph.node(e.target).is_none())
        .map(|e| e.id)
        .collect()
}
