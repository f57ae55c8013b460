//! Trail sources backed by files: JSON trail records and GPX tracks

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use trail_graph_lib::{GraphError, Result, TrailPoint, TrailRecord, TrailSource};

fn source_error(path: &Path, err: impl std::fmt::Display) -> GraphError {
    GraphError::Source(format!("{}: {err}", path.display()).into())
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|err| source_error(path, err))
}

/// A JSON file holding an array of trail records
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TrailSource for JsonFileSource {
    fn load_trails(&self) -> Result<Vec<TrailRecord>> {
        let reader = open(&self.path)?;
        serde_json::from_reader(reader).map_err(|err| source_error(&self.path, err))
    }
}

/// A GPX file; every track segment becomes one trail named after its track
pub struct GpxFileSource {
    path: PathBuf,
}

impl GpxFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TrailSource for GpxFileSource {
    fn load_trails(&self) -> Result<Vec<TrailRecord>> {
        let reader = open(&self.path)?;
        let gpx = gpx::read(reader).map_err(|err| source_error(&self.path, err))?;
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "gpx".to_string());
        Ok(records_from_gpx(&gpx, &stem))
    }
}

/// One record per track segment, ids `{prefix}-{track}-{segment}`
pub fn records_from_gpx(gpx: &gpx::Gpx, prefix: &str) -> Vec<TrailRecord> {
    let mut records = Vec::new();
    for (track_index, track) in gpx.tracks.iter().enumerate() {
        let name = track.name.clone().unwrap_or_else(|| prefix.to_string());
        for (segment_index, segment) in track.segments.iter().enumerate() {
            let points = segment
                .points
                .iter()
                .map(|waypoint| {
                    let point = waypoint.point();
                    match waypoint.elevation {
                        Some(z) => TrailPoint::with_elevation(point.x(), point.y(), z),
                        None => TrailPoint::new(point.x(), point.y()),
                    }
                })
                .collect();
            let mut record = TrailRecord::new(format!("{prefix}-{track_index}-{segment_index}"), name.clone(), points);
            record.trail_type = track.type_.clone();
            records.push(record);
        }
    }
    records
}

/// Several sources read one after another
#[derive(Default)]
pub struct CombinedSource {
    sources: Vec<Box<dyn TrailSource>>,
}

impl CombinedSource {
    pub fn push(&mut self, source: impl TrailSource + 'static) {
        self.sources.push(Box::new(source));
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl TrailSource for CombinedSource {
    fn load_trails(&self) -> Result<Vec<TrailRecord>> {
        let mut records = Vec::new();
        for source in &self.sources {
            records.extend(source.load_trails()?);
        }
        Ok(records)
    }
}
