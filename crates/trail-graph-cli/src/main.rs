mod logging;
mod settings;
mod sources;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use settings::Settings;
use sources::{CombinedSource, GpxFileSource, JsonFileSource};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use trail_graph_lib::export::RouteRecord;
use trail_graph_lib::{CancelToken, TrailNetwork};

fn main() -> anyhow::Result<()> {
    let _logging = logging::setup_logging_and_profiling();
    let settings = Settings::parse();
    run(&settings)
}

fn run(settings: &Settings) -> anyhow::Result<()> {
    let config = settings.load_config()?;

    if let Some(threads) = settings.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure the worker pool")?;
    }

    let mut source = CombinedSource::default();
    for path in &settings.trail_files {
        source.push(JsonFileSource::new(path));
    }
    for path in &settings.gpx_files {
        source.push(GpxFileSource::new(path));
    }
    if source.is_empty() {
        anyhow::bail!("no input given, pass --trails and/or --gpx files");
    }

    let network = TrailNetwork::from_source(&source, config).context("failed to build the trail network")?;
    let info = network.get_info();
    tracing::info!(
        trails = info.trail_count,
        rejected = info.rejected_trails,
        nodes = info.node_count,
        edges = info.edge_count,
        length_km = info.total_length_km,
        components = info.component_count,
        anchors = info.anchor_candidates,
        "network summary"
    );

    if let Some(path) = &settings.graph_out {
        write_json(path, &network.export_graph())?;
        tracing::info!(path = %path.display(), "wrote graph");
    }

    if let Some(path) = &settings.routes_out {
        let (routes, report) = network
            .find_loops(&network.config().loops, &CancelToken::default())
            .context("loop search failed")?;
        tracing::info!(
            routes = routes.len(),
            anchors = report.anchors_searched,
            destinations = report.destinations_explored,
            "loop search summary"
        );
        let records: Vec<RouteRecord> = routes
            .iter()
            .map(|route| {
                let record = RouteRecord::from_route(route);
                if settings.route_geometry {
                    record.with_geometry(route, network.graph())
                } else {
                    record
                }
            })
            .collect();
        write_json(path, &records)?;
        tracing::info!(path = %path.display(), "wrote routes");
    }

    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("failed to write {}", path.display()))
}
