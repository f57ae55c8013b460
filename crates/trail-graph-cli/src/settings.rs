use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use trail_graph_lib::{Config, CoordinateSystem};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Trail Graph - Build a routable trail network from raw polylines and discover loop routes
pub struct Settings {
    /// JSON files holding an array of trail records
    #[clap(short, long = "trails", value_name = "FILE")]
    pub trail_files: Vec<PathBuf>,

    /// GPX files; every track segment becomes one trail
    #[clap(short, long = "gpx", value_name = "FILE")]
    pub gpx_files: Vec<PathBuf>,

    /// JSON configuration file with camelCase option keys
    #[clap(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Target loop distance in kilometers
    #[clap(long)]
    pub target_km: Option<f64>,

    /// Largest endpoint gap bridged by a connector, in meters
    #[clap(long)]
    pub gap_tolerance_m: Option<f64>,

    /// Maximum number of anchor nodes searched for loops
    #[clap(long)]
    pub max_anchors: Option<usize>,

    /// Stop the loop search after this many routes
    #[clap(long)]
    pub max_routes: Option<usize>,

    /// Coordinates are projected meters instead of longitude/latitude degrees
    #[clap(long, default_value = "false")]
    pub planar: bool,

    /// Fail when the graph is not one connected piece
    #[clap(long, default_value = "false")]
    pub strict_connectivity: bool,

    /// Worker threads (defaults to one per core)
    #[clap(long)]
    pub threads: Option<usize>,

    /// Write the routing graph here
    #[clap(long, value_name = "FILE")]
    pub graph_out: Option<PathBuf>,

    /// Write the loop routes here; skips the loop search when absent
    #[clap(long, value_name = "FILE")]
    pub routes_out: Option<PathBuf>,

    /// Include the walked geometry of each route in the routes output
    #[clap(long, default_value = "false")]
    pub route_geometry: bool,
}

impl Settings {
    /// Configuration file (or defaults) with the command line overrides applied
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => Config::default(),
        };
        self.apply_overrides(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(target) = self.target_km {
            config.loops.target_loop_distance_km = target;
        }
        if let Some(gap) = self.gap_tolerance_m {
            config.gaps.gap_tolerance_meters = gap;
        }
        if let Some(anchors) = self.max_anchors {
            config.loops.max_anchor_nodes = anchors;
        }
        if let Some(routes) = self.max_routes {
            config.loops.max_routes = routes;
        }
        if self.planar {
            config.coordinate_system = CoordinateSystem::Planar;
        }
        if self.strict_connectivity {
            config.connectivity.strict_connectivity = true;
        }
    }
}

fn read_config(path: &Path) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse config file {}", path.display()))
}
