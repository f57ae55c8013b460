//! Graph arena - nodes, edges and adjacency in dense id-indexed vectors
//!
//! Nodes and edges live in `Vec<Option<_>>` slots: removal tombstones a slot so ids
//! stay stable for the whole lifetime of the graph. Every pipeline stage takes a
//! `Graph` value, mutates a copy of it and bumps its version.

use crate::trail::TrailPoint;
use crate::utils::CoordinateSystem;
use crate::{GraphError, Result};
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable node identifier (index into the node arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(pub u32);

/// Stable edge identifier (index into the edge arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EdgeId(pub u32);

impl NodeId {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl EdgeId {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum NodeKind {
    /// Dead end (degree 0 or 1)
    Endpoint,
    /// Junction or pass-through (degree 2 or more)
    Intersection,
}

impl NodeKind {
    #[inline]
    pub fn from_degree(degree: usize) -> Self {
        if degree <= 1 {
            NodeKind::Endpoint
        } else {
            NodeKind::Intersection
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Endpoint => "endpoint",
            NodeKind::Intersection => "intersection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum EdgeKind {
    /// Piece of a single input trail
    Trail,
    /// Synthetic straight segment inserted across a small gap
    Connector,
    /// Result of collapsing a degree-2 chain
    Merged,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub location: TrailPoint,
    pub degree: usize,
    pub kind: NodeKind,
    /// Names of the trails whose edges touch this node
    pub trail_names: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// Polyline from `source` to `target`
    pub geometry: Vec<TrailPoint>,
    pub length_km: f64,
    /// Meters climbed walking from `source` to `target`
    pub elevation_gain: f64,
    /// Meters descended walking from `source` to `target`
    pub elevation_loss: f64,
    pub trail_ids: SmallVec<[String; 2]>,
    pub trail_names: SmallVec<[String; 2]>,
    pub kind: EdgeKind,
    pub bidirectional: bool,
}

impl Edge {
    /// The endpoint opposite to `node`, or `None` if `node` is not an endpoint of this edge
    #[inline]
    pub fn opposite(&self, node: NodeId) -> Option<NodeId> {
        if node == self.source {
            Some(self.target)
        } else if node == self.target {
            Some(self.source)
        } else {
            None
        }
    }

    #[inline]
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    /// Elevation gain when traversing the edge starting at `from`
    #[inline]
    pub fn gain_from(&self, from: NodeId) -> f64 {
        if from == self.source {
            self.elevation_gain
        } else {
            self.elevation_loss
        }
    }

    /// Geometry oriented so that it starts at `from`
    pub fn geometry_from(&self, from: NodeId) -> Vec<TrailPoint> {
        let mut points = self.geometry.clone();
        if from != self.source {
            points.reverse();
        }
        points
    }

    /// The primary display name of the edge (first trail name, empty for connectors)
    pub fn display_name(&self) -> &str {
        self.trail_names.first().map(String::as_str).unwrap_or("")
    }
}

/// Everything needed to insert an edge; ids and degrees are assigned by the graph
#[derive(Debug, Clone)]
pub struct EdgeDraft {
    pub source: NodeId,
    pub target: NodeId,
    pub geometry: Vec<TrailPoint>,
    pub length_km: f64,
    pub elevation_gain: f64,
    pub elevation_loss: f64,
    pub trail_ids: SmallVec<[String; 2]>,
    pub trail_names: SmallVec<[String; 2]>,
    pub kind: EdgeKind,
}

impl EdgeDraft {
    /// Build a draft from a geometry, computing length and elevation deltas
    pub fn from_geometry(
        source: NodeId,
        target: NodeId,
        geometry: Vec<TrailPoint>,
        coords: CoordinateSystem,
        use_3d_length: bool,
    ) -> Self {
        let (length_m, gain, loss) = measure_polyline(&geometry, coords, use_3d_length);
        Self {
            source,
            target,
            geometry,
            length_km: length_m / 1000.0,
            elevation_gain: gain,
            elevation_loss: loss,
            trail_ids: SmallVec::new(),
            trail_names: SmallVec::new(),
            kind: EdgeKind::Trail,
        }
    }

    pub fn with_trail(mut self, id: &str, name: &str) -> Self {
        self.trail_ids.push(id.to_string());
        self.trail_names.push(name.to_string());
        self
    }

    pub fn with_kind(mut self, kind: EdgeKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Length in meters plus elevation gain and loss of a polyline
pub fn measure_polyline(
    points: &[TrailPoint],
    coords: CoordinateSystem,
    use_3d_length: bool,
) -> (f64, f64, f64) {
    let mut length = 0.0;
    let mut gain = 0.0;
    let mut loss = 0.0;
    for pair in points.windows(2) {
        let flat = coords.distance_m(pair[0].coord(), pair[1].coord());
        let dz = match (pair[0].z, pair[1].z) {
            (Some(a), Some(b)) => b - a,
            _ => 0.0,
        };
        if dz > 0.0 {
            gain += dz;
        } else {
            loss -= dz;
        }
        length += if use_3d_length { flat.hypot(dz) } else { flat };
    }
    (length, gain, loss)
}

/// The routing graph
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    edges: Vec<Option<Edge>>,
    adjacency: Vec<SmallVec<[EdgeId; 4]>>,
    node_count: usize,
    edge_count: usize,
    version: u64,
    stage: &'static str,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Graph {
    pub fn new() -> Self {
        Self {
            stage: "empty",
            ..Default::default()
        }
    }

    /// Monotonic version, bumped once per pipeline stage
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Label of the last stage that produced this graph
    #[inline]
    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn bump_version(&mut self, stage: &'static str) {
        self.version += 1;
        self.stage = stage;
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.node_count == 0
    }

    /// Upper bound (exclusive) of node indices, including tombstones
    #[inline]
    pub fn node_capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn add_node(&mut self, location: TrailPoint) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node {
            id,
            location,
            degree: 0,
            kind: NodeKind::Endpoint,
            trail_names: BTreeSet::new(),
        }));
        self.adjacency.push(SmallVec::new());
        self.node_count += 1;
        id
    }

    /// Insert an edge between two existing nodes, updating their degrees
    pub fn add_edge(&mut self, draft: EdgeDraft) -> Result<EdgeId> {
        for node in [draft.source, draft.target] {
            if self.node(node).is_none() {
                return Err(GraphError::UnknownNode(node));
            }
        }

        let id = EdgeId(self.edges.len() as u32);
        self.adjacency[draft.source.index()].push(id);
        if draft.target != draft.source {
            self.adjacency[draft.target.index()].push(id);
        }
        self.edges.push(Some(Edge {
            id,
            source: draft.source,
            target: draft.target,
            geometry: draft.geometry,
            length_km: draft.length_km,
            elevation_gain: draft.elevation_gain,
            elevation_loss: draft.elevation_loss,
            trail_ids: draft.trail_ids,
            trail_names: draft.trail_names,
            kind: draft.kind,
            bidirectional: true,
        }));
        self.edge_count += 1;
        self.sync_node(draft.source);
        self.sync_node(draft.target);
        Ok(id)
    }

    /// Remove an edge and detach it from its endpoints
    pub fn remove_edge(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.edges.get_mut(id.index())?.take()?;
        self.adjacency[edge.source.index()].retain(|e| *e != id);
        self.adjacency[edge.target.index()].retain(|e| *e != id);
        self.edge_count -= 1;
        self.sync_node(edge.source);
        self.sync_node(edge.target);
        Some(edge)
    }

    /// Remove a node together with every edge touching it
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.get(id.index())?.as_ref()?;
        let incident: SmallVec<[EdgeId; 4]> = self.adjacency[id.index()].clone();
        for edge in incident {
            self.remove_edge(edge);
        }
        self.node_count -= 1;
        self.nodes[id.index()].take()
    }

    /// Move the `from` endpoint(s) of an edge onto node `to`
    ///
    /// Only the connectivity changes; callers are responsible for fixing the geometry.
    pub fn reattach_edge(&mut self, id: EdgeId, from: NodeId, to: NodeId) -> Result<()> {
        if self.node(to).is_none() {
            return Err(GraphError::UnknownNode(to));
        }
        let Some(edge) = self.edges.get_mut(id.index()).and_then(Option::as_mut) else {
            return Ok(());
        };
        let (old_source, old_target) = (edge.source, edge.target);
        if edge.source == from {
            edge.source = to;
        }
        if edge.target == from {
            edge.target = to;
        }
        let (new_source, new_target) = (edge.source, edge.target);

        for node in [old_source, old_target] {
            self.adjacency[node.index()].retain(|e| *e != id);
        }
        self.adjacency[new_source.index()].push(id);
        if new_target != new_source {
            self.adjacency[new_target.index()].push(id);
        }
        for node in [old_source, old_target, new_source, new_target] {
            self.sync_node(node);
        }
        Ok(())
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    #[inline]
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index()).and_then(Option::as_ref)
    }

    #[inline]
    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Iterate over live nodes in id order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    /// Iterate over live edges in id order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().flatten()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes().map(|n| n.id).collect()
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges().map(|e| e.id).collect()
    }

    /// Incident edge ids of a node (a self-loop appears once)
    #[inline]
    pub fn incident_edges(&self, id: NodeId) -> &[EdgeId] {
        self.adjacency
            .get(id.index())
            .map(SmallVec::as_slice)
            .unwrap_or(&[])
    }

    #[inline]
    pub fn degree(&self, id: NodeId) -> usize {
        self.incident_edges(id).len()
    }

    /// Any edge directly joining `a` and `b`
    pub fn edge_between(&self, a: NodeId, b: NodeId) -> Option<EdgeId> {
        self.incident_edges(a).iter().copied().find(|e| {
            self.edge(*e)
                .is_some_and(|edge| edge.opposite(a) == Some(b))
        })
    }

    /// Sum of all live edge lengths in kilometers
    pub fn total_length_km(&self) -> f64 {
        self.edges().map(|e| e.length_km).sum()
    }

    /// Recompute degree, kind and touching trail names of every node
    pub fn refresh_degrees(&mut self) {
        for index in 0..self.nodes.len() {
            self.sync_node(NodeId(index as u32));
        }
    }

    fn sync_node(&mut self, id: NodeId) {
        if self.node(id).is_none() {
            return;
        }
        let degree = self.adjacency[id.index()].len();
        let names: BTreeSet<String> = self.adjacency[id.index()]
            .iter()
            .filter_map(|e| self.edges[e.index()].as_ref())
            .flat_map(|e| e.trail_names.iter().cloned())
            .collect();
        if let Some(node) = self.nodes[id.index()].as_mut() {
            node.degree = degree;
            node.kind = NodeKind::from_degree(degree);
            node.trail_names = names;
        }
    }

    /// Verify referential integrity and degree bookkeeping
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let mut live_nodes = 0;
        for (index, slot) in self.nodes.iter().enumerate() {
            let Some(node) = slot else {
                if !self.adjacency[index].is_empty() {
                    return Err(format!("removed node {index} still has incident edges"));
                }
                continue;
            };
            live_nodes += 1;
            if node.id.index() != index {
                return Err(format!("node in slot {index} carries id {}", node.id));
            }
            let referencing = self
                .edges()
                .filter(|e| e.source == node.id || e.target == node.id)
                .count();
            if node.degree != referencing || self.adjacency[index].len() != referencing {
                return Err(format!(
                    "node {} has degree {} and {} adjacency entries but {} referencing edges",
                    node.id,
                    node.degree,
                    self.adjacency[index].len(),
                    referencing
                ));
            }
        }

        let mut live_edges = 0;
        for (index, slot) in self.edges.iter().enumerate() {
            let Some(edge) = slot else { continue };
            live_edges += 1;
            if edge.id.index() != index {
                return Err(format!("edge in slot {index} carries id {}", edge.id));
            }
            for end in [edge.source, edge.target] {
                if self.node(end).is_none() {
                    return Err(format!("edge {} references missing node {end}", edge.id));
                }
                if !self.adjacency[end.index()].contains(&edge.id) {
                    return Err(format!("edge {} missing from adjacency of {end}", edge.id));
                }
            }
        }

        if live_nodes != self.node_count || live_edges != self.edge_count {
            return Err(format!(
                "counters out of sync: {}/{} nodes, {}/{} edges",
                self.node_count, live_nodes, self.edge_count, live_edges
            ));
        }
        Ok(())
    }
}
