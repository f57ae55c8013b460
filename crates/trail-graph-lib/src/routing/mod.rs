//! Routing over the trail graph: shortest paths, k-shortest paths and loop discovery

mod dijkstra;
mod ksp;
mod loops;

pub use dijkstra::shortest_path;
pub use ksp::k_shortest_paths;
pub use loops::{LoopConfig, LoopRoute, LoopRouteFinder, LoopSearchReport, RouteShape};

pub(crate) use dijkstra::{ShortestPathTree, shortest_path_avoiding};

use crate::graph::{EdgeId, NodeId};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A walk through the graph: `edges[i]` leads from `nodes[i]` to `nodes[i + 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    /// Sum of edge lengths in kilometers
    pub cost: f64,
}

impl Path {
    pub fn start(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    pub fn end(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    /// Number of edges of this path that also appear in `other`
    pub fn shared_edges(&self, other: &Path) -> usize {
        let theirs: HashSet<EdgeId> = other.edges.iter().copied().collect();
        self.edges.iter().filter(|e| theirs.contains(e)).count()
    }
}

/// Pick the return path sharing the fewest edges with the outbound path
///
/// Ties are broken by lower cost, then by candidate order. Returns the chosen path and its
/// number of shared edges.
pub fn select_return_path<'a>(outbound: &Path, candidates: &'a [Path]) -> Option<(&'a Path, usize)> {
    candidates
        .iter()
        .map(|candidate| (candidate, candidate.shared_edges(outbound)))
        .min_by(|a, b| a.1.cmp(&b.1).then(a.0.cost.total_cmp(&b.0.cost)))
}

/// Cooperative cancellation flag shared between a caller and a running search
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
