//! Performance benchmarks for trail-graph-lib
//!
//! Run with: cargo bench --package trail-graph-lib

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use trail_graph_lib::{
    CancelToken, Config, GeometryNormalizer, IntersectionDetector, LoopConfig, TrailNetwork, TrailPoint, TrailRecord,
};

/// Generate a wiggly geographic trail with the specified number of points.
///
/// Horizontal trails advance in longitude, vertical ones in latitude, so none of them
/// crosses itself.
fn generate_trail(id: usize, num_points: usize, offset: f64, horizontal: bool) -> TrailRecord {
    const EXTENT: f64 = 0.1;
    let points = (0..num_points)
        .map(|i| {
            let t = i as f64 / (num_points - 1) as f64;
            let along = t * EXTENT;
            let across = offset + (t * 60.0).sin() * 0.0002;
            let elevation = 500.0 + (t * 12.0).sin() * 80.0;
            if horizontal {
                TrailPoint::with_elevation(8.0 + along, 46.5 + across, elevation)
            } else {
                TrailPoint::with_elevation(8.0 + across, 46.5 + along, elevation)
            }
        })
        .collect();
    TrailRecord::new(format!("trail-{id}"), format!("Trail {}", id % 7), points)
}

/// A mesh of `lines` horizontal and `lines` vertical trails crossing each other
fn generate_mesh(lines: usize, points_per_trail: usize) -> Vec<TrailRecord> {
    let spacing = 0.1 / (lines + 1) as f64;
    (0..lines)
        .flat_map(|i| {
            let offset = (i + 1) as f64 * spacing;
            [
                generate_trail(2 * i, points_per_trail, offset, true),
                generate_trail(2 * i + 1, points_per_trail, offset, false),
            ]
        })
        .collect()
}

// ============================================================================
// Core Benchmarks - Key performance indicators
// ============================================================================

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(10);

    for lines in [10, 30] {
        let records = generate_mesh(lines, 1_000);
        let total_points = 2 * lines * 1_000;
        group.throughput(Throughput::Elements(total_points as u64));
        group.bench_with_input(BenchmarkId::new("mesh_1k_points", lines), &records, |b, records| {
            b.iter(|| TrailNetwork::build(records.clone(), Config::default()).unwrap());
        });
    }

    group.finish();
}

fn bench_intersections(c: &mut Criterion) {
    let mut group = c.benchmark_group("intersections");
    group.sample_size(20);

    let config = Config::default();
    let records = generate_mesh(30, 1_000);
    let (trails, _) = GeometryNormalizer::new(config.normalize.clone(), config.coordinate_system)
        .apply(records)
        .unwrap();
    let detector = IntersectionDetector::new(config.intersection.clone(), config.coordinate_system);

    group.throughput(Throughput::Elements(trails.len() as u64));
    group.bench_function("mesh_30x30", |b| {
        b.iter(|| detector.apply(&trails));
    });

    group.finish();
}

fn bench_loops(c: &mut Criterion) {
    let mut group = c.benchmark_group("loops");
    group.sample_size(10);

    let network = TrailNetwork::build(generate_mesh(20, 200), Config::default()).unwrap();
    let loops = LoopConfig {
        target_loop_distance_km: 6.0,
        max_anchor_nodes: 20,
        ..Default::default()
    };

    group.bench_function("mesh_20x20_20_anchors", |b| {
        b.iter(|| network.find_loops(&loops, &CancelToken::default()).unwrap());
    });

    group.finish();
}

fn bench_network_info(c: &mut Criterion) {
    let mut group = c.benchmark_group("info");

    let network = TrailNetwork::build(generate_mesh(30, 200), Config::default()).unwrap();

    group.bench_function("get_info", |b| {
        b.iter(|| network.get_info());
    });

    group.bench_function("export_graph", |b| {
        b.iter(|| network.export_graph());
    });

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(benches, bench_build, bench_intersections, bench_loops, bench_network_info,);

criterion_main!(benches);
