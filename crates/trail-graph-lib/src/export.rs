//! Serializable output records for graphs and loop routes
//!
//! Field names follow the camelCase output contract when the `serde` feature is enabled;
//! points are written as `[x, y]` or `[x, y, z]` arrays.

use crate::graph::{Edge, Graph, Node};
use crate::routing::{LoopRoute, RouteShape};
use crate::trail::TrailPoint;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct NodeRecord {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub z: Option<f64>,
    pub degree: usize,
    /// "endpoint" or "intersection"
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub node_type: String,
    pub trail_names: Vec<String>,
}

impl From<&Node> for NodeRecord {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.0,
            x: node.location.x,
            y: node.location.y,
            z: node.location.z,
            degree: node.degree,
            node_type: node.kind.as_str().to_string(),
            trail_names: node.trail_names.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct EdgeRecord {
    pub id: u32,
    pub source: u32,
    pub target: u32,
    pub trail_ids: Vec<String>,
    pub trail_name: String,
    pub length_km: f64,
    pub elevation_gain: f64,
    pub elevation_loss: f64,
    pub geometry: Vec<TrailPoint>,
}

impl From<&Edge> for EdgeRecord {
    fn from(edge: &Edge) -> Self {
        Self {
            id: edge.id.0,
            source: edge.source.0,
            target: edge.target.0,
            trail_ids: edge.trail_ids.to_vec(),
            trail_name: edge.display_name().to_string(),
            length_km: edge.length_km,
            elevation_gain: edge.elevation_gain,
            elevation_loss: edge.elevation_loss,
            geometry: edge.geometry.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GraphRecord {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl GraphRecord {
    /// Live nodes and edges in id order
    pub fn from_graph(graph: &Graph) -> Self {
        Self {
            nodes: graph.nodes().map(NodeRecord::from).collect(),
            edges: graph.edges().map(EdgeRecord::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RouteRecord {
    pub anchor_node: u32,
    pub dest_node: u32,
    pub outbound_distance_km: f64,
    pub return_distance_km: f64,
    pub total_distance_km: f64,
    pub edge_overlap_count: usize,
    pub edge_overlap_percentage: f64,
    /// Outbound edges then return edges, in travel order
    pub edge_ids: Vec<u32>,
    pub name: String,
    pub score: f64,
    pub shape: RouteShape,
    pub trail_count: usize,
    pub elevation_gain: f64,
    /// One line per edge along the travel direction; empty unless requested
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub geometry: Vec<Vec<TrailPoint>>,
}

impl RouteRecord {
    pub fn from_route(route: &LoopRoute) -> Self {
        Self {
            anchor_node: route.anchor.0,
            dest_node: route.destination.0,
            outbound_distance_km: route.outbound_distance_km,
            return_distance_km: route.return_distance_km,
            total_distance_km: route.total_distance_km,
            edge_overlap_count: route.edge_overlap_count,
            edge_overlap_percentage: route.edge_overlap_percentage,
            edge_ids: route.edge_ids().into_iter().map(|e| e.0).collect(),
            name: route.name.clone(),
            score: route.score,
            shape: route.shape,
            trail_count: route.trail_count,
            elevation_gain: route.elevation_gain,
            geometry: Vec::new(),
        }
    }

    /// Also carry the walked geometry
    pub fn with_geometry(mut self, route: &LoopRoute, graph: &Graph) -> Self {
        self.geometry = route.geometry(graph);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;
    use crate::test_fixtures::planar_graph;

    fn sample() -> Graph {
        planar_graph(
            &[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (200.0, 0.0)],
            &[(0, 1, "Creek"), (1, 2, "Ridge"), (1, 3, "Creek")],
        )
    }

    #[test]
    fn test_graph_record_mirrors_graph() {
        let graph = sample();
        let record = GraphRecord::from_graph(&graph);
        assert_eq!(record.nodes.len(), 4);
        assert_eq!(record.edges.len(), 3);

        let hub = &record.nodes[1];
        assert_eq!(hub.id, 1);
        assert_eq!(hub.degree, 3);
        assert_eq!(hub.node_type, "intersection");
        assert_eq!(hub.trail_names, vec!["Creek".to_string(), "Ridge".to_string()]);
        assert_eq!(record.nodes[0].node_type, "endpoint");

        let edge = &record.edges[1];
        assert_eq!((edge.source, edge.target), (1, 2));
        assert_eq!(edge.trail_name, "Ridge");
        assert!((edge.length_km - 0.1).abs() < 1e-12);
        assert_eq!(edge.geometry.len(), 2);
    }

    #[test]
    fn test_removed_items_are_not_exported() {
        let mut graph = sample();
        graph.remove_node(NodeId(3));
        let record = GraphRecord::from_graph(&graph);
        assert_eq!(record.nodes.len(), 3);
        assert_eq!(record.edges.len(), 2);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_uses_contract_keys() {
        let record = GraphRecord::from_graph(&sample());
        let json = serde_json::to_value(&record).unwrap();
        let node = &json["nodes"][1];
        assert_eq!(node["type"], "intersection");
        assert!(node.get("trailNames").is_some());
        assert!(node.get("z").is_none());
        let edge = &json["edges"][0];
        assert!(edge.get("lengthKm").is_some());
        assert!(edge.get("trailIds").is_some());
        assert_eq!(edge["geometry"][1], serde_json::json!([100.0, 0.0]));
    }
}
