//! Catalog and processing configuration
//!
//! Both structs deserialize from JSON with every field optional; missing
//! fields take the Sentinel-1 GRD defaults below.

use crate::types::{AcquisitionMode, OrbitState, SarError, SarResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_STAC_URL: &str = "https://planetarycomputer.microsoft.com/api/stac/v1";
pub const DEFAULT_COLLECTION: &str = "sentinel-1-grd";

/// Where and what to search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StacConfig {
    pub stac_url: String,
    pub collection: String,
    pub orbit_state: OrbitState,
    pub instrument_mode: AcquisitionMode,
    /// Upper bound on scenes returned per search, `None` for all
    pub limit: Option<usize>,
}

impl Default for StacConfig {
    fn default() -> Self {
        Self {
            stac_url: DEFAULT_STAC_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            orbit_state: OrbitState::Descending,
            instrument_mode: AcquisitionMode::IW,
            limit: None,
        }
    }
}

impl StacConfig {
    pub fn from_json_str(json: &str) -> SarResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SarError::Config(format!("Invalid STAC configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SarResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> SarResult<()> {
        if self.stac_url.trim().is_empty() {
            return Err(SarError::Config("stac_url must not be empty".to_string()));
        }
        if self.collection.trim().is_empty() {
            return Err(SarError::Config("collection must not be empty".to_string()));
        }
        if self.limit == Some(0) {
            return Err(SarError::Config("limit must be positive when set".to_string()));
        }
        Ok(())
    }

    /// Search endpoint, tolerant of a trailing slash on the root URL
    pub fn search_url(&self) -> String {
        format!("{}/search", self.stac_url.trim_end_matches('/'))
    }
}

/// Chunk sizes handed to the raster loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunks {
    pub x: usize,
    pub y: usize,
}

/// How loaded rasters are gridded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub bands: Vec<String>,
    /// `(x, y)` chunk size in pixels
    pub chunk_size: (usize, usize),
    /// Output pixel size in CRS units
    pub resolution: f64,
    pub crs: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            bands: vec!["vh".to_string(), "vv".to_string()],
            chunk_size: (512, 512),
            resolution: 20.0,
            crs: "EPSG:32633".to_string(),
        }
    }
}

impl ProcessingConfig {
    pub fn chunks(&self) -> Chunks {
        Chunks {
            x: self.chunk_size.0,
            y: self.chunk_size.1,
        }
    }

    pub fn from_json_str(json: &str) -> SarResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SarError::Config(format!("Invalid processing configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SarResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> SarResult<()> {
        if self.bands.is_empty() {
            return Err(SarError::Config("At least one band is required".to_string()));
        }
        if self.chunk_size.0 == 0 || self.chunk_size.1 == 0 {
            return Err(SarError::Config(format!(
                "Chunk size must be positive, got {:?}",
                self.chunk_size
            )));
        }
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(SarError::Config(format!(
                "Resolution must be positive, got {}",
                self.resolution
            )));
        }
        if self.crs.trim().is_empty() {
            return Err(SarError::Config("crs must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let stac = StacConfig::default();
        assert_eq!(stac.collection, "sentinel-1-grd");
        assert_eq!(stac.orbit_state, OrbitState::Descending);
        assert_eq!(stac.instrument_mode, AcquisitionMode::IW);
        assert_eq!(stac.search_url(), format!("{}/search", DEFAULT_STAC_URL));

        let processing = ProcessingConfig::default();
        assert_eq!(processing.bands, vec!["vh", "vv"]);
        assert_eq!(processing.chunks(), Chunks { x: 512, y: 512 });
        assert_eq!(processing.resolution, 20.0);
        assert_eq!(processing.crs, "EPSG:32633");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let stac = StacConfig::from_json_str(r#"{"orbit_state": "ascending", "limit": 5}"#).unwrap();
        assert_eq!(stac.orbit_state, OrbitState::Ascending);
        assert_eq!(stac.limit, Some(5));
        assert_eq!(stac.collection, DEFAULT_COLLECTION);

        let processing = ProcessingConfig::from_json_str(r#"{"chunk_size": [256, 128]}"#).unwrap();
        assert_eq!(processing.chunks(), Chunks { x: 256, y: 128 });
        assert_eq!(processing.bands.len(), 2);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = ProcessingConfig::from_json_str(r#"{"resolution": -10.0}"#).unwrap_err();
        assert!(matches!(err, SarError::Config(_)));

        let err = StacConfig::from_json_str(r#"{"orbit_state": "sideways"}"#).unwrap_err();
        assert!(matches!(err, SarError::Config(_)));

        let err = ProcessingConfig::from_json_str(r#"{"bands": []}"#).unwrap_err();
        assert!(matches!(err, SarError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"collection": "sentinel-1-rtc", "stac_url": "http://localhost:8080/"}}"#).unwrap();

        let stac = StacConfig::from_json_file(file.path()).unwrap();
        assert_eq!(stac.collection, "sentinel-1-rtc");
        assert_eq!(stac.search_url(), "http://localhost:8080/search");
    }
}
