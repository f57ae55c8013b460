//! End-to-end tests of the trail network pipeline through the public API

use trail_graph_lib::utils::haversine_distance;
use trail_graph_lib::{
    CancelToken, Config, ConnectivityValidator, EdgeKind, GraphError, LoopConfig, NodeId, RouteShape, TrailNetwork,
    TrailPoint, TrailRecord,
};

fn record(id: &str, name: &str, coords: &[(f64, f64)]) -> TrailRecord {
    TrailRecord::new(id, name, coords.iter().map(|&(x, y)| TrailPoint::new(x, y)).collect())
}

/// `size` horizontal and `size` vertical straight trails with `spacing` meters between them
fn grid_trails(size: usize, spacing: f64) -> Vec<TrailRecord> {
    let extent = (size - 1) as f64 * spacing;
    let mut records = Vec::new();
    for i in 0..size {
        let offset = i as f64 * spacing;
        records.push(record(&format!("row{i}"), &format!("Row {i}"), &[(0.0, offset), (extent, offset)]));
        records.push(record(&format!("col{i}"), &format!("Col {i}"), &[(offset, 0.0), (offset, extent)]));
    }
    records
}

#[test]
fn crossing_trails_become_four_edges() {
    let records = vec![
        record("h", "Horizontal", &[(0.0, 50.0), (100.0, 50.0)]),
        record("v", "Vertical", &[(50.0, 0.0), (50.0, 100.0)]),
    ];
    let network = TrailNetwork::build(records, Config::planar()).unwrap();
    let graph = network.graph();

    assert_eq!(graph.node_count(), 5);
    assert_eq!(graph.edge_count(), 4);
    let hub = graph.nodes().find(|n| n.degree == 4).unwrap();
    assert_eq!((hub.location.x, hub.location.y), (50.0, 50.0));
    assert_eq!(hub.trail_names.len(), 2);
    assert!(graph.check_invariants().is_ok());
}

#[test]
fn collinear_pieces_merge_into_one_edge() {
    let records = vec![
        record("a", "Valley", &[(0.0, 0.0), (100.0, 0.0)]),
        record("b", "Valley", &[(100.0, 0.0), (200.0, 0.0)]),
        record("c", "Valley", &[(200.0, 0.0), (300.0, 0.0)]),
    ];
    let network = TrailNetwork::build(records, Config::planar()).unwrap();
    let graph = network.graph();

    assert_eq!(graph.edge_count(), 1);
    assert_eq!(graph.node_count(), 2);
    let edge = graph.edges().next().unwrap();
    assert!((edge.length_km - 0.3).abs() < 1e-9);
    assert_eq!(edge.kind, EdgeKind::Merged);
    assert_eq!(edge.trail_ids.len(), 3);
    assert_eq!(network.reports().chains.chains_merged, 1);
}

#[test]
fn small_gap_is_bridged_and_large_gap_is_not() {
    let near = vec![
        record("a", "Ridge", &[(0.0, 0.0), (100.0, 0.0)]),
        record("b", "Ridge", &[(100.3, 0.0), (200.0, 0.0)]),
    ];
    let network = TrailNetwork::build(near, Config::planar()).unwrap();
    assert_eq!(network.reports().gaps.connectors_inserted, 1);
    assert_eq!(network.get_info().component_count, 1);
    // The connector and both trails collapse into one pass-through edge
    assert_eq!(network.graph().edge_count(), 1);
    assert!((network.graph().total_length_km() - 0.2).abs() < 1e-9);

    let far = vec![
        record("a", "Ridge", &[(0.0, 0.0), (100.0, 0.0)]),
        record("b", "Ridge", &[(600.0, 0.0), (700.0, 0.0)]),
    ];
    let network = TrailNetwork::build(far, Config::planar()).unwrap();
    assert_eq!(network.reports().gaps.connectors_inserted, 0);
    assert_eq!(network.get_info().component_count, 2);
}

#[test]
fn strict_connectivity_rejects_islands() {
    let records = vec![
        record("a", "North", &[(0.0, 0.0), (100.0, 0.0)]),
        record("b", "South", &[(0.0, 1000.0), (100.0, 1000.0)]),
    ];
    let mut config = Config::planar();
    config.connectivity.strict_connectivity = true;
    let result = TrailNetwork::build(records, config);
    assert!(matches!(result, Err(GraphError::Connectivity { components: 2, .. })));
}

#[test]
fn invalid_geometries_are_dropped() {
    let mut records = vec![record("ok", "Good", &[(0.0, 0.0), (100.0, 0.0)])];
    records.push(record("single", "Point", &[(5.0, 5.0)]));
    records.push(record("nan", "Broken", &[(0.0, 0.0), (f64::NAN, 1.0)]));
    records.push(record("dup", "Stuck", &[(3.0, 3.0), (3.0, 3.0)]));

    let network = TrailNetwork::build(records, Config::planar()).unwrap();
    let info = network.get_info();
    assert_eq!(info.trail_count, 1);
    assert_eq!(info.rejected_trails, 3);
    assert_eq!(info.edge_count, 1);
}

#[test]
fn all_invalid_input_is_an_error() {
    let records = vec![record("single", "Point", &[(5.0, 5.0)])];
    assert!(matches!(TrailNetwork::build(records, Config::planar()), Err(GraphError::EmptyInput)));
}

#[test]
fn grid_of_trails_yields_low_overlap_loops() {
    let network = TrailNetwork::build(grid_trails(5, 1000.0), Config::planar()).unwrap();
    let graph = network.graph();

    // 25 crossings, minus the four corners merged away as pass-through nodes
    assert_eq!(graph.node_count(), 21);
    assert_eq!(graph.edge_count(), 36);
    assert!((graph.total_length_km() - 40.0).abs() < 1e-6);
    assert!(ConnectivityValidator::analyze(graph).is_single_component());

    let loops = LoopConfig {
        target_loop_distance_km: 4.0,
        max_anchor_nodes: 5,
        ..Default::default()
    };
    let (routes, report) = network.find_loops(&loops, &CancelToken::default()).unwrap();
    assert!(!routes.is_empty());
    assert_eq!(report.anchors_searched, 5);

    let best = &routes[0];
    assert_eq!(best.edge_overlap_count, 0);
    assert_eq!(best.shape, RouteShape::Loop);
    assert!(best.score > 0.99);
    assert!((best.total_distance_km - 4.0).abs() < 1e-6);

    for route in &routes {
        assert_eq!(route.outbound.start(), Some(route.anchor));
        assert_eq!(route.outbound.end(), Some(route.destination));
        assert_eq!(route.return_path.start(), Some(route.destination));
        assert_eq!(route.return_path.end(), Some(route.anchor));
        assert!(route.outbound_distance_km >= loops.min_outbound_distance_km);
        assert!(graph.node(route.anchor).unwrap().degree >= 3);
    }
}

#[test]
fn loop_search_without_junctions_fails() {
    let records = vec![record("a", "Solo", &[(0.0, 0.0), (2000.0, 0.0)])];
    let network = TrailNetwork::build(records, Config::planar()).unwrap();
    let result = network.find_loops(&LoopConfig::default(), &CancelToken::default());
    assert!(matches!(result, Err(GraphError::NoAnchorCandidates)));
}

#[test]
fn shortest_path_over_network() {
    let network = TrailNetwork::build(grid_trails(3, 500.0), Config::planar()).unwrap();
    let graph = network.graph();
    let find = |x: f64, y: f64| {
        graph
            .nodes()
            .find(|n| n.location.x == x && n.location.y == y)
            .map(|n| n.id)
            .unwrap()
    };
    let south = find(500.0, 0.0);
    let path = network.shortest_path(south, find(500.0, 1000.0)).unwrap();
    assert!((path.cost - 1.0).abs() < 1e-9);
    assert_eq!(path.edges.len(), 2);
    assert!(matches!(
        network.shortest_path(south, NodeId(9999)),
        Err(GraphError::UnknownNode(NodeId(9999)))
    ));
}

#[test]
fn geographic_lengths_use_haversine() {
    let records = vec![
        record("h", "East West", &[(8.0, 46.5), (8.01, 46.5)]),
        record("v", "North South", &[(8.005, 46.495), (8.005, 46.505)]),
    ];
    let network = TrailNetwork::build(records, Config::default()).unwrap();
    assert_eq!(network.graph().edge_count(), 4);

    let expected_km = (haversine_distance(46.5, 8.0, 46.5, 8.01) + haversine_distance(46.495, 8.005, 46.505, 8.005))
        / 1000.0;
    assert!((network.graph().total_length_km() - expected_km).abs() < 1e-6);
}

#[test]
fn builds_are_deterministic() {
    let first = TrailNetwork::build(grid_trails(4, 250.0), Config::planar()).unwrap();
    let second = TrailNetwork::build(grid_trails(4, 250.0), Config::planar()).unwrap();
    assert_eq!(first.export_graph(), second.export_graph());
}

#[cfg(feature = "serde")]
mod json {
    use super::*;
    use trail_graph_lib::export::RouteRecord;

    #[test]
    fn config_reads_flat_camel_case_keys() {
        let config: Config = serde_json::from_str(
            r#"{
                "coordinateSystem": "planar",
                "gapToleranceMeters": 2.5,
                "maxChainLength": 8,
                "targetLoopDistanceKm": 12.0,
                "strictConnectivity": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.coordinate_system, trail_graph_lib::CoordinateSystem::Planar);
        assert_eq!(config.gaps.gap_tolerance_meters, 2.5);
        assert_eq!(config.chains.max_chain_length, 8);
        assert_eq!(config.loops.target_loop_distance_km, 12.0);
        assert!(config.connectivity.strict_connectivity);
        // Untouched options keep their defaults
        assert_eq!(config.loops.ksp_paths, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn trail_records_round_trip_from_json() {
        let records: Vec<TrailRecord> = serde_json::from_str(
            r#"[
                {"id": "h", "name": "Horizontal", "type": "hiking", "points": [[0, 50, 300], [100, 50, 310]]},
                {"id": "v", "name": "Vertical", "points": [[50, 0], [50, 100]]}
            ]"#,
        )
        .unwrap();
        assert_eq!(records[0].trail_type.as_deref(), Some("hiking"));
        assert_eq!(records[0].points[1].z, Some(310.0));

        let network = TrailNetwork::build(records, Config::planar()).unwrap();
        let json = serde_json::to_value(network.export_graph()).unwrap();
        assert_eq!(json["nodes"].as_array().unwrap().len(), 5);
        assert_eq!(json["edges"].as_array().unwrap().len(), 4);
        assert!(json["edges"][0]["elevationGain"].is_number());
    }

    #[test]
    fn route_records_use_output_keys() {
        let network = TrailNetwork::build(grid_trails(5, 1000.0), Config::planar()).unwrap();
        let loops = LoopConfig {
            target_loop_distance_km: 4.0,
            max_anchor_nodes: 1,
            ..Default::default()
        };
        let (routes, _) = network.find_loops(&loops, &CancelToken::default()).unwrap();
        let record = RouteRecord::from_route(&routes[0]).with_geometry(&routes[0], network.graph());
        let json = serde_json::to_value(&record).unwrap();
        for key in [
            "anchorNode",
            "destNode",
            "outboundDistanceKm",
            "returnDistanceKm",
            "totalDistanceKm",
            "edgeOverlapCount",
            "edgeOverlapPercentage",
            "edgeIds",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["shape"], "loop");
        assert_eq!(record.geometry.len(), record.edge_ids.len());
    }
}
