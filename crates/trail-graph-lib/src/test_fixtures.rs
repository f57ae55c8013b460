//! Synthetic trails and graphs shared by the unit tests

use crate::graph::{EdgeDraft, Graph, NodeId};
use crate::trail::{Trail, TrailPoint, TrailRecord};
use crate::utils::CoordinateSystem;
use std::sync::Arc;

/// Planar record from `(x, y)` pairs in meters
pub fn planar_record(id: &str, name: &str, coords: &[(f64, f64)]) -> TrailRecord {
    TrailRecord::new(
        id,
        name,
        coords.iter().map(|&(x, y)| TrailPoint::new(x, y)).collect(),
    )
}

/// Validated planar trail from `(x, y)` pairs in meters
pub fn planar_trail(id: &str, name: &str, coords: &[(f64, f64)]) -> Arc<Trail> {
    Trail::new(planar_record(id, name, coords), CoordinateSystem::Planar)
        .expect("fixture trail must be valid")
}

/// Graph with one node per location and a straight trail edge per `(from, to, trail name)`
pub fn planar_graph(locations: &[(f64, f64)], edges: &[(u32, u32, &str)]) -> Graph {
    let mut graph = Graph::new();
    for &(x, y) in locations {
        graph.add_node(TrailPoint::new(x, y));
    }
    for (index, &(from, to, name)) in edges.iter().enumerate() {
        add_straight_edge(&mut graph, NodeId(from), NodeId(to), &format!("e{index}"), name);
    }
    graph
}

/// Add a straight planar edge between two existing nodes
pub fn add_straight_edge(graph: &mut Graph, from: NodeId, to: NodeId, trail_id: &str, name: &str) {
    let geometry = vec![
        graph.node(from).expect("fixture node").location,
        graph.node(to).expect("fixture node").location,
    ];
    let draft = EdgeDraft::from_geometry(from, to, geometry, CoordinateSystem::Planar, false)
        .with_trail(trail_id, name);
    graph.add_edge(draft).expect("fixture edge must be valid");
}

/// A `size` x `size` planar grid with `spacing` meters between neighbours
///
/// Node `(row, col)` has id `row * size + col`; every grid line is one trail name.
pub fn grid_graph(size: u32, spacing: f64) -> Graph {
    let mut locations = Vec::new();
    for row in 0..size {
        for col in 0..size {
            locations.push((col as f64 * spacing, row as f64 * spacing));
        }
    }
    let mut graph = planar_graph(&locations, &[]);
    for row in 0..size {
        for col in 0..size {
            let id = row * size + col;
            if col + 1 < size {
                add_straight_edge(&mut graph, NodeId(id), NodeId(id + 1), &format!("row{row}"), &format!("Row {row}"));
            }
            if row + 1 < size {
                add_straight_edge(&mut graph, NodeId(id), NodeId(id + size), &format!("col{col}"), &format!("Col {col}"));
            }
        }
    }
    graph
}
