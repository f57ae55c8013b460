//! TrailNetwork - Top-level pipeline from raw trail records to a validated routing graph
//!
//! Runs the graph stages in order, keeps every stage report and optionally a snapshot of
//! each intermediate graph, and answers routing queries over the final graph.

use crate::builder::{BuildConfig, BuildReport, GraphBuilder};
use crate::chains::{ChainConfig, ChainReport, Degree2ChainMerger};
use crate::connectivity::{ConnectivityConfig, ConnectivityReport, ConnectivityValidator};
use crate::consolidate::{ConsolidateConfig, ConsolidationReport, VertexConsolidator};
use crate::export::GraphRecord;
use crate::gaps::{GapBridger, GapConfig, GapReport};
use crate::graph::{Graph, NodeId};
use crate::intersect::{IntersectionConfig, IntersectionDetector, IntersectionReport};
use crate::normalize::{GeometryNormalizer, NormalizeConfig, NormalizeReport};
use crate::routing::{self, CancelToken, LoopConfig, LoopRoute, LoopRouteFinder, LoopSearchReport, Path};
use crate::trail::{Trail, TrailRecord};
use crate::utils::CoordinateSystem;
use crate::{GraphError, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Anything that can hand over a batch of trail records
pub trait TrailSource {
    fn load_trails(&self) -> Result<Vec<TrailRecord>>;
}

impl TrailSource for Vec<TrailRecord> {
    fn load_trails(&self) -> Result<Vec<TrailRecord>> {
        Ok(self.clone())
    }
}

/// Configuration for the whole pipeline
///
/// With the `serde` feature every stage option is a flat camelCase key, so a JSON
/// configuration file reads like `{"gapToleranceMeters": 3.0, "targetLoopDistanceKm": 12}`.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct Config {
    pub coordinate_system: CoordinateSystem,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub normalize: NormalizeConfig,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub intersection: IntersectionConfig,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub build: BuildConfig,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub consolidate: ConsolidateConfig,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub gaps: GapConfig,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub chains: ChainConfig,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub connectivity: ConnectivityConfig,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub loops: LoopConfig,
    /// Keep a copy of the graph after every stage
    pub retain_snapshots: bool,
}

impl Config {
    /// Planar defaults, for inputs already projected to meters
    pub fn planar() -> Self {
        Self {
            coordinate_system: CoordinateSystem::Planar,
            ..Default::default()
        }
    }

    /// Reject settings no stage can work with
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(GraphError::InvalidConfig(format!("{name} must be positive, got {value}")))
            }
        }
        fn non_negative(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(GraphError::InvalidConfig(format!("{name} must not be negative, got {value}")))
            }
        }
        fn nonzero(name: &str, value: usize) -> Result<()> {
            if value > 0 {
                Ok(())
            } else {
                Err(GraphError::InvalidConfig(format!("{name} must be at least 1")))
            }
        }

        non_negative("coordinatePrecision", self.normalize.coordinate_precision)?;
        non_negative("simplifyTolerance", self.normalize.simplify_tolerance)?;
        non_negative("splitDedupTolerance", self.intersection.split_dedup_tolerance)?;
        non_negative("tJunctionToleranceMeters", self.intersection.t_junction_tolerance_meters)?;
        positive("nodeIdentityToleranceMeters", self.build.node_identity_tolerance_meters)?;
        positive(
            "vertexConsolidationToleranceMeters",
            self.consolidate.vertex_consolidation_tolerance_meters,
        )?;
        nonzero("maxConsolidationPasses", self.consolidate.max_consolidation_passes)?;
        non_negative("gapToleranceMeters", self.gaps.gap_tolerance_meters)?;
        if self.chains.max_chain_length < 2 {
            return Err(GraphError::InvalidConfig("maxChainLength must be at least 2".to_string()));
        }
        nonzero("maxMergeIterations", self.chains.max_merge_iterations)?;

        let loops = &self.loops;
        positive("targetLoopDistanceKm", loops.target_loop_distance_km)?;
        nonzero("maxAnchorNodes", loops.max_anchor_nodes)?;
        nonzero("maxReachableNodes", loops.max_reachable_nodes)?;
        nonzero("maxDestinationExploration", loops.max_destination_exploration)?;
        nonzero("kspPaths", loops.ksp_paths)?;
        non_negative("distanceRangeMin", loops.distance_range_min)?;
        non_negative("minOutboundDistanceKm", loops.min_outbound_distance_km)?;
        non_negative("edgeOverlapThresholdPercent", loops.edge_overlap_threshold_percent)?;
        non_negative("nearbyRadiusKm", loops.nearby_radius_km)?;
        if loops.distance_range_max.is_nan() || loops.distance_range_max <= loops.distance_range_min {
            return Err(GraphError::InvalidConfig(format!(
                "distanceRangeMax ({}) must be greater than distanceRangeMin ({})",
                loops.distance_range_max, loops.distance_range_min
            )));
        }
        Ok(())
    }
}

/// Report of every graph stage of the last build
#[derive(Debug, Clone, Default)]
pub struct StageReports {
    pub normalize: NormalizeReport,
    pub intersection: IntersectionReport,
    pub build: BuildReport,
    pub consolidation: ConsolidationReport,
    pub gaps: GapReport,
    pub chains: ChainReport,
    pub connectivity: ConnectivityReport,
}

/// Summary of a built network
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct NetworkInfo {
    /// Trails that survived normalization
    pub trail_count: usize,
    pub rejected_trails: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub total_length_km: f64,
    pub component_count: usize,
    /// Nodes of degree >= 3
    pub anchor_candidates: usize,
    pub graph_version: u64,
    /// Distinct regions of the kept trails, sorted
    pub regions: Vec<String>,
    /// Distinct trail types of the kept trails, sorted
    pub trail_types: Vec<String>,
}

/// A validated routing graph built from trail records
#[derive(Debug, Clone)]
pub struct TrailNetwork {
    trails: Vec<Arc<Trail>>,
    graph: Graph,
    config: Config,
    reports: StageReports,
    snapshots: Vec<Graph>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrailNetwork {
    /// Run every graph stage over `records`
    pub fn build(records: Vec<TrailRecord>, config: Config) -> Result<Self> {
        Self::build_cancellable(records, config, &CancelToken::default())
    }

    /// Load the records from a source, then [`TrailNetwork::build`]
    pub fn from_source(source: &dyn TrailSource, config: Config) -> Result<Self> {
        let records = source.load_trails()?;
        Self::build(records, config)
    }

    /// Like [`TrailNetwork::build`], returning [`GraphError::Cancelled`] if `cancel` fires
    /// between two stages
    pub fn build_cancellable(records: Vec<TrailRecord>, config: Config, cancel: &CancelToken) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("network::build");

        config.validate()?;
        let coords = config.coordinate_system;
        let mut reports = StageReports::default();
        let mut snapshots = Vec::new();
        let record_count = records.len();

        let (trails, normalize) = GeometryNormalizer::new(config.normalize.clone(), coords).apply(records)?;
        reports.normalize = normalize;
        check_cancelled(cancel)?;

        let (splits, intersection) =
            IntersectionDetector::new(config.intersection.clone(), coords).apply(&trails);
        reports.intersection = intersection;
        check_cancelled(cancel)?;

        let (graph, build) = GraphBuilder::new(config.build.clone(), coords).apply(&trails, &splits)?;
        reports.build = build;
        let graph = checkpoint(graph, &config, &mut snapshots)?;
        check_cancelled(cancel)?;

        let (graph, consolidation) = VertexConsolidator::new(config.consolidate.clone(), coords)
            .with_3d_length(config.build.use_3d_length)
            .apply(&graph)?;
        reports.consolidation = consolidation;
        let graph = checkpoint(graph, &config, &mut snapshots)?;
        check_cancelled(cancel)?;

        let (graph, gaps) = GapBridger::new(config.gaps.clone(), coords).apply(&graph)?;
        reports.gaps = gaps;
        let graph = checkpoint(graph, &config, &mut snapshots)?;
        check_cancelled(cancel)?;

        let (graph, chains) = Degree2ChainMerger::new(config.chains.clone()).apply(&graph)?;
        reports.chains = chains;
        let graph = checkpoint(graph, &config, &mut snapshots)?;
        check_cancelled(cancel)?;

        let (graph, connectivity) = ConnectivityValidator::new(config.connectivity.clone()).apply(&graph)?;
        reports.connectivity = connectivity;
        let graph = checkpoint(graph, &config, &mut snapshots)?;

        info!(
            records = record_count,
            trails = trails.len(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            length_km = graph.total_length_km(),
            "trail network ready"
        );

        Ok(Self {
            trails,
            graph,
            config,
            reports,
            snapshots,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn trails(&self) -> &[Arc<Trail>] {
        &self.trails
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn reports(&self) -> &StageReports {
        &self.reports
    }

    /// Graph after each stage, oldest first (empty unless `retain_snapshots` is set)
    pub fn snapshots(&self) -> &[Graph] {
        &self.snapshots
    }

    pub fn get_info(&self) -> NetworkInfo {
        NetworkInfo {
            trail_count: self.trails.len(),
            rejected_trails: self.reports.normalize.rejected.len(),
            node_count: self.graph.node_count(),
            edge_count: self.graph.edge_count(),
            total_length_km: self.graph.total_length_km(),
            component_count: ConnectivityValidator::analyze(&self.graph).component_sizes.len(),
            anchor_candidates: self.graph.nodes().filter(|n| n.degree >= 3).count(),
            graph_version: self.graph.version(),
            regions: distinct(self.trails.iter().filter_map(|t| t.region())),
            trail_types: distinct(self.trails.iter().filter_map(|t| t.trail_type())),
        }
    }

    /// Shortest path between two nodes of the final graph
    pub fn shortest_path(&self, from: NodeId, to: NodeId) -> Result<Path> {
        routing::shortest_path(&self.graph, from, to)
    }

    /// Search loop routes over the final graph
    pub fn find_loops(&self, config: &LoopConfig, cancel: &CancelToken) -> Result<(Vec<LoopRoute>, LoopSearchReport)> {
        LoopRouteFinder::new(config.clone(), self.config.coordinate_system).find(&self.graph, cancel)
    }

    /// Final graph in its serializable output form
    pub fn export_graph(&self) -> GraphRecord {
        GraphRecord::from_graph(&self.graph)
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn check_cancelled(cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(GraphError::Cancelled);
    }
    Ok(())
}

/// Verify a stage output in debug builds and keep a snapshot if asked to
fn checkpoint(graph: Graph, config: &Config, snapshots: &mut Vec<Graph>) -> Result<Graph> {
    if cfg!(debug_assertions) {
        graph.check_invariants().map_err(|reason| GraphError::Topology {
            stage: graph.stage(),
            reason,
        })?;
    }
    debug!(
        stage = graph.stage(),
        version = graph.version(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "stage finished"
    );
    if config.retain_snapshots {
        snapshots.push(graph.clone());
    }
    Ok(graph)
}
