//! Trail Graph Library - Routing Graph Construction and Loop Discovery for Trail Networks
//!
//! This library turns a collection of raw trail polylines (overlapping, self-touching or
//! slightly imprecise hiking geometries) into a clean, topologically valid routing graph,
//! and then searches that graph for closed "lollipop" loop routes: an outbound leg plus a
//! return leg that shares as few edges as possible with it.
//!
//! # Architecture
//!
//! The pipeline is a chain of stages, each consuming and producing a [`Graph`] value:
//!
//! - **[`GeometryNormalizer`]**: drops degenerate input polylines and snaps coordinates
//! - **[`IntersectionDetector`]**: finds crossing points and T-junctions between trails
//! - **[`GraphBuilder`]**: cuts trails at their split points into nodes and edges
//! - **[`VertexConsolidator`]**: fuses nodes closer than a tolerance (DBSCAN-style)
//! - **[`GapBridger`]**: inserts connector edges across small endpoint gaps
//! - **[`Degree2ChainMerger`]**: collapses pass-through chains into single edges
//! - **[`ConnectivityValidator`]**: reports components and prunes orphans
//! - **[`LoopRouteFinder`]**: discovers loop routes around high-degree anchor nodes
//!
//! [`TrailNetwork`] runs the graph stages in order and keeps their reports.
//!
//! # Performance Characteristics
//!
//! - **Intersection detection**: R-tree candidate pairs, parallel per trail
//! - **Consolidation**: O(N log N) with an R-tree and union-find
//! - **Loop search**: anchors searched in parallel, bounded by deterministic work caps

mod builder;
mod chains;
mod connectivity;
mod consolidate;
pub mod export;
mod gaps;
mod graph;
mod intersect;
mod network;
mod normalize;
mod routing;
mod trail;
mod union_find;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_fixtures;

// Public API exports
pub use builder::{BuildConfig, BuildReport, GraphBuilder};
pub use chains::{ChainConfig, ChainReport, Degree2ChainMerger};
pub use connectivity::{ConnectivityConfig, ConnectivityReport, ConnectivityValidator};
pub use consolidate::{ConsolidateConfig, ConsolidationReport, ElevationPolicy, VertexConsolidator};
pub use gaps::{GapBridger, GapConfig, GapReport};
pub use graph::{Edge, EdgeDraft, EdgeId, EdgeKind, Graph, Node, NodeId, NodeKind};
pub use intersect::{
    IntersectionConfig, IntersectionDetector, IntersectionKind, IntersectionReport, SplitLocation,
};
pub use network::{Config, NetworkInfo, StageReports, TrailNetwork, TrailSource};
pub use normalize::{GeometryIssue, GeometryNormalizer, NormalizeConfig, NormalizeReport};
pub use routing::{
    CancelToken, LoopConfig, LoopRoute, LoopRouteFinder, LoopSearchReport, Path, RouteShape,
    k_shortest_paths, select_return_path, shortest_path,
};
pub use trail::{Trail, TrailPoint, TrailRecord};
pub use utils::CoordinateSystem;

/// Error types for the graph pipeline
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("invalid geometry for trail {trail_id}: {issue}")]
    Geometry {
        trail_id: String,
        issue: GeometryIssue,
    },

    #[error("no valid trail geometries remain after normalization")]
    EmptyInput,

    #[error("topology error after {stage}: {reason}")]
    Topology { stage: &'static str, reason: String },

    #[error("no route from node {from} to node {to}")]
    RouteNotFound { from: NodeId, to: NodeId },

    #[error(
        "graph is not connected: {components} components, {isolated_nodes} isolated nodes, {orphaned_edges} orphaned edges"
    )]
    Connectivity {
        components: usize,
        isolated_nodes: usize,
        orphaned_edges: usize,
    },

    #[error("graph has no anchor candidates (nodes with degree >= 3)")]
    NoAnchorCandidates,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("failed to load trails: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, GraphError>;
