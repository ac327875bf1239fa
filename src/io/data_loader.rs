use crate::config::{Chunks, ProcessingConfig};
use crate::core::change_detection::{ChangeDetector, DEFAULT_EPSILON};
use crate::core::speckle_filter::{SpeckleFilter, SpeckleFilterParams};
use crate::grid::{BandDataset, GriddedArray};
use crate::io::catalog::SignedScene;
use crate::types::{BoundingBox, SarError, SarResult};
use std::sync::Arc;

/// What the raster loader should produce for a set of scenes
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub bands: Vec<String>,
    pub crs: String,
    /// Output pixel size in CRS units
    pub resolution: f64,
    pub chunks: Chunks,
    /// Clip to this area when set
    pub bbox: Option<BoundingBox>,
}

/// Raster loading collaborator
///
/// Reads and reprojects the requested bands of every scene onto one grid and
/// stacks them along time, one time step per scene.
pub trait RasterLoader: Send + Sync {
    fn load(&self, scenes: &[SignedScene], request: &LoadRequest) -> SarResult<BandDataset>;
}

/// Band extraction options, applied in a fixed order: select, sort by time,
/// median filter, convert to dB
#[derive(Debug, Clone, PartialEq)]
pub struct BandOptions {
    pub sort_by_time: bool,
    pub speckle_filter: bool,
    /// Side of the median filter window
    pub filter_size: usize,
    pub to_db: bool,
}

impl Default for BandOptions {
    fn default() -> Self {
        Self {
            sort_by_time: true,
            speckle_filter: false,
            filter_size: 3,
            to_db: false,
        }
    }
}

/// Loads signed scenes into band datasets and extracts single bands
pub struct SarDataLoader {
    config: ProcessingConfig,
    backend: Arc<dyn RasterLoader>,
}

impl SarDataLoader {
    pub fn new(config: ProcessingConfig, backend: Arc<dyn RasterLoader>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Request from the processing config, with per-call overrides
    pub fn build_request(
        &self,
        bbox: Option<&BoundingBox>,
        crs: Option<&str>,
        resolution: Option<f64>,
    ) -> SarResult<LoadRequest> {
        let resolution = resolution.unwrap_or(self.config.resolution);
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(SarError::InvalidInput(format!(
                "Resolution must be positive, got {}",
                resolution
            )));
        }
        if let Some(b) = bbox {
            b.validate()?;
        }

        Ok(LoadRequest {
            bands: self.config.bands.clone(),
            crs: crs.unwrap_or(&self.config.crs).to_string(),
            resolution,
            chunks: self.config.chunks(),
            bbox: bbox.copied(),
        })
    }

    /// Load scenes onto a common grid through the raster backend
    pub fn load(
        &self,
        scenes: &[SignedScene],
        bbox: Option<&BoundingBox>,
        crs: Option<&str>,
        resolution: Option<f64>,
    ) -> SarResult<BandDataset> {
        if scenes.is_empty() {
            return Err(SarError::InvalidInput("No scenes to load".to_string()));
        }

        let request = self.build_request(bbox, crs, resolution)?;
        log::info!(
            "Loading {} scenes: bands {:?}, {} at {} m",
            scenes.len(),
            request.bands,
            request.crs,
            request.resolution
        );

        let dataset = self.backend.load(scenes, &request)?;
        log::debug!(
            "Loaded bands {:?}",
            dataset.band_names().collect::<Vec<_>>()
        );
        Ok(dataset)
    }

    /// Extract one polarization band and prepare it for analysis
    pub fn get_polarization(
        dataset: &BandDataset,
        polarization: &str,
        options: &BandOptions,
    ) -> SarResult<GriddedArray> {
        let band = dataset.band(polarization).ok_or_else(|| {
            SarError::InvalidInput(format!(
                "Polarization {} not in dataset (bands: {:?})",
                polarization,
                dataset.band_names().collect::<Vec<_>>()
            ))
        })?;

        let mut data = if options.sort_by_time && band.has_time() {
            band.sorted_by_time()
        } else {
            band.clone()
        };

        if options.speckle_filter {
            let filter = SpeckleFilter::with_params(SpeckleFilterParams {
                window_size: options.filter_size,
            })?;
            data = filter.apply_filter(&data)?;
        }

        if options.to_db {
            data = ChangeDetector::to_db(&data, DEFAULT_EPSILON);
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ndarray::{array, Array3};
    use std::sync::Mutex;

    struct RecordingLoader {
        requests: Mutex<Vec<LoadRequest>>,
    }

    impl RasterLoader for RecordingLoader {
        fn load(&self, _scenes: &[SignedScene], request: &LoadRequest) -> SarResult<BandDataset> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(BandDataset::new())
        }
    }

    fn dataset() -> BandDataset {
        let t = |d| Utc.with_ymd_and_hms(2022, 1, d, 0, 0, 0).unwrap();
        let data = Array3::from_shape_fn((2, 3, 3), |(i, _, _)| if i == 0 { 100.0 } else { 10.0 });
        let band = GriddedArray::temporal(data, vec![t(20), t(8)]).unwrap();
        BandDataset::new().with_band("vv", band).unwrap()
    }

    #[test]
    fn test_load_request_overrides() {
        let backend = Arc::new(RecordingLoader {
            requests: Mutex::new(Vec::new()),
        });
        let loader = SarDataLoader::new(ProcessingConfig::default(), backend.clone());
        let scene = SignedScene::new(crate::io::catalog::SceneDescriptor::new("s1", None), None);
        let bbox = BoundingBox::new(13.0, 52.0, 14.0, 53.0).unwrap();

        loader.load(&[scene.clone()], None, None, None).unwrap();
        loader.load(&[scene], Some(&bbox), Some("EPSG:4326"), Some(0.0002)).unwrap();

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].crs, "EPSG:32633");
        assert_eq!(requests[0].resolution, 20.0);
        assert_eq!(requests[0].bands, vec!["vh", "vv"]);
        assert!(requests[0].bbox.is_none());
        assert_eq!(requests[1].crs, "EPSG:4326");
        assert_eq!(requests[1].resolution, 0.0002);
        assert_eq!(requests[1].bbox, Some(bbox));
    }

    #[test]
    fn test_load_without_scenes() {
        let backend = Arc::new(RecordingLoader {
            requests: Mutex::new(Vec::new()),
        });
        let loader = SarDataLoader::new(ProcessingConfig::default(), backend);
        assert!(loader.load(&[], None, None, None).is_err());
    }

    #[test]
    fn test_get_polarization_sorts_and_converts() {
        let options = BandOptions {
            to_db: true,
            ..BandOptions::default()
        };
        let vv = SarDataLoader::get_polarization(&dataset(), "VV", &options).unwrap();

        let times = vv.times().unwrap();
        assert!(times[0] < times[1]);
        // 10 linear -> 10 dB comes first after sorting
        assert!((vv.data()[[0, 0, 0]] - 10.0).abs() < 1e-4);
        assert!((vv.data()[[1, 0, 0]] - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_get_polarization_unsorted() {
        let options = BandOptions {
            sort_by_time: false,
            ..BandOptions::default()
        };
        let vv = SarDataLoader::get_polarization(&dataset(), "vv", &options).unwrap();
        assert_eq!(vv.data()[[0, 0, 0]], 100.0);
    }

    #[test]
    fn test_get_polarization_errors() {
        let missing = SarDataLoader::get_polarization(&dataset(), "vh", &BandOptions::default());
        assert!(matches!(missing, Err(SarError::InvalidInput(_))));

        let options = BandOptions {
            speckle_filter: true,
            filter_size: 0,
            ..BandOptions::default()
        };
        assert!(SarDataLoader::get_polarization(&dataset(), "vv", &options).is_err());
    }

    #[test]
    fn test_spatial_band_is_not_sorted() {
        let band = GriddedArray::spatial(array![[1.0, 2.0], [3.0, 4.0]]);
        let ds = BandDataset::new().with_band("vh", band.clone()).unwrap();
        let vh = SarDataLoader::get_polarization(&ds, "vh", &BandOptions::default()).unwrap();
        assert_eq!(vh.data(), band.data());
    }
}
