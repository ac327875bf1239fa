#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use ndarray::Array3;
use sarchange::core::{BatchOptions, BatchProcessor, TemporalAnalyzer, TemporalStats};
use sarchange::io::{
    LoadRequest, PassthroughSigner, RasterLoader, SarDataLoader, SceneCatalog, SceneDescriptor,
    SceneSearch, SceneStream, SignedScene,
};
use sarchange::{BandDataset, BoundingBox, GriddedArray, ProcessingConfig, SarError, SarResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const ROWS: usize = 4;
pub const COLS: usize = 5;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn berlin() -> BoundingBox {
    BoundingBox::new(13.0, 52.3, 13.8, 52.7).expect("valid bbox")
}

pub fn hamburg() -> BoundingBox {
    BoundingBox::new(9.7, 53.4, 10.3, 53.7).expect("valid bbox")
}

pub fn quiet_options() -> BatchOptions {
    BatchOptions {
        show_progress: false,
        ..BatchOptions::default()
    }
}

fn acquisition(step: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 1, 3, 17, 4, 0).unwrap() + Duration::days(12 * step as i64)
}

/// Catalog that returns a fixed number of scenes per datetime expression,
/// newest first so callers have to sort
pub struct MockSearch {
    counts: HashMap<String, usize>,
}

impl MockSearch {
    pub fn new(counts: &[(&str, usize)]) -> Self {
        Self {
            counts: counts.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }
}

impl SceneSearch for MockSearch {
    fn search(
        &self,
        _bbox: &BoundingBox,
        datetime: &str,
        limit: Option<usize>,
    ) -> SarResult<SceneStream<'_>> {
        if datetime == "catalog-down" {
            return Err(SarError::Catalog("HTTP 503 from catalog".to_string()));
        }

        let n = self.counts.get(datetime).copied().unwrap_or(0);
        let n = limit.map_or(n, |l| l.min(n));
        let key = datetime.to_string();
        Ok(Box::new((0..n).rev().map(move |step| {
            Ok(SceneDescriptor::new(format!("{}#{}", key, step), Some(acquisition(step)))
                .with_asset("vv", format!("https://example.com/{}/{}/vv.tiff", key, step))
                .with_asset("vh", format!("https://example.com/{}/{}/vh.tiff", key, step)))
        })))
    }
}

/// Raster backend that synthesizes VV/VH stacks from scene timestamps.
///
/// Scenes whose datetime key is `fail-load` error, `panic-load` panic.
pub struct MockLoader;

pub fn synthetic_value(step: usize, y: usize, x: usize) -> f32 {
    0.05 * (1 + step) as f32 + 0.001 * (y * COLS + x) as f32
}

impl RasterLoader for MockLoader {
    fn load(&self, scenes: &[SignedScene], request: &LoadRequest) -> SarResult<BandDataset> {
        let key = scenes[0].id().split('#').next().unwrap_or_default();
        match key {
            "fail-load" => return Err(SarError::Load("backend unavailable".to_string())),
            "panic-load" => panic!("raster backend crashed"),
            _ => {}
        }

        let steps: Vec<usize> = scenes
            .iter()
            .map(|s| s.id().rsplit('#').next().unwrap().parse().unwrap())
            .collect();
        let times: Vec<DateTime<Utc>> = scenes.iter().map(|s| s.datetime().unwrap()).collect();

        let vv = Array3::from_shape_fn((scenes.len(), ROWS, COLS), |(t, y, x)| {
            synthetic_value(steps[t], y, x)
        });
        let vh = vv.mapv(|v| v * 0.25);

        BandDataset::new()
            .with_crs(request.crs.clone())
            .with_band("vv", GriddedArray::temporal(vv, times.clone())?)?
            .with_band("vh", GriddedArray::temporal(vh, times)?)
    }
}

/// Analyzer whose temporal statistics fail for series of one length
pub struct FlakyStatsAnalyzer {
    pub fail_on_steps: usize,
}

impl TemporalAnalyzer for FlakyStatsAnalyzer {
    fn temporal_stats(&self, data: &GriddedArray, show_progress: bool) -> SarResult<TemporalStats> {
        if data.time_len() == self.fail_on_steps {
            return Err(SarError::Processing("out of memory".to_string()));
        }
        sarchange::SarStatistics::temporal_stats(data, show_progress)
    }
}

/// Analyzer that remembers the progress flag of every statistics call
#[derive(Default)]
pub struct RecordingAnalyzer {
    pub progress_flags: Mutex<Vec<bool>>,
}

impl TemporalAnalyzer for RecordingAnalyzer {
    fn temporal_stats(&self, data: &GriddedArray, show_progress: bool) -> SarResult<TemporalStats> {
        self.progress_flags.lock().unwrap().push(show_progress);
        sarchange::SarStatistics::temporal_stats(data, false)
    }
}

pub fn processor(counts: &[(&str, usize)]) -> BatchProcessor {
    let catalog = SceneCatalog::new(Arc::new(MockSearch::new(counts)), Arc::new(PassthroughSigner));
    let loader = SarDataLoader::new(ProcessingConfig::default(), Arc::new(MockLoader));
    BatchProcessor::new(catalog, loader)
}
