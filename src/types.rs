use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Real-valued backscatter intensity (linear or dB)
pub type SarReal = f32;

/// Polarization channels for Sentinel-1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl Polarization {
    /// Band name as used by the raster loader (lower case)
    pub fn band_name(&self) -> &'static str {
        match self {
            Polarization::VV => "vv",
            Polarization::VH => "vh",
            Polarization::HV => "hv",
            Polarization::HH => "hh",
        }
    }
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

impl FromStr for Polarization {
    type Err = SarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VV" => Ok(Polarization::VV),
            "VH" => Ok(Polarization::VH),
            "HV" => Ok(Polarization::HV),
            "HH" => Ok(Polarization::HH),
            _ => Err(SarError::InvalidInput(format!("Invalid polarization: {}", s))),
        }
    }
}

/// Sentinel-1 acquisition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionMode {
    IW, // Interferometric Wide swath
    EW, // Extra Wide swath
    SM, // StripMap
    WV, // Wave
}

impl std::fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AcquisitionMode::IW => "IW",
            AcquisitionMode::EW => "EW",
            AcquisitionMode::SM => "SM",
            AcquisitionMode::WV => "WV",
        };
        f.write_str(s)
    }
}

/// Direction of the satellite pass over the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrbitState {
    Ascending,
    Descending,
}

impl std::fmt::Display for OrbitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrbitState::Ascending => f.write_str("ascending"),
            OrbitState::Descending => f.write_str("descending"),
        }
    }
}

/// Geospatial bounding box in geographic coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a bounding box, rejecting empty or inverted extents
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> SarResult<Self> {
        let bbox = Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Check `min < max` on both axes
    pub fn validate(&self) -> SarResult<()> {
        let finite = [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.min_lon >= self.max_lon || self.min_lat >= self.max_lat {
            return Err(SarError::InvalidInput(format!(
                "Invalid bounding box: ({}, {}, {}, {})",
                self.min_lon, self.min_lat, self.max_lon, self.max_lat
            )));
        }
        Ok(())
    }

    /// `[min_lon, min_lat, max_lon, max_lat]`, the order STAC expects
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

impl TryFrom<(f64, f64, f64, f64)> for BoundingBox {
    type Error = SarError;

    fn try_from(b: (f64, f64, f64, f64)) -> Result<Self, Self::Error> {
        BoundingBox::new(b.0, b.1, b.2, b.3)
    }
}

/// Error types for SAR processing
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for SAR operations
pub type SarResult<T> = Result<T, SarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polarization_parse_is_case_insensitive() {
        assert_eq!("vv".parse::<Polarization>().unwrap(), Polarization::VV);
        assert_eq!("Vh".parse::<Polarization>().unwrap(), Polarization::VH);
        assert!("xx".parse::<Polarization>().is_err());
        assert_eq!(Polarization::HH.band_name(), "hh");
    }

    #[test]
    fn test_bounding_box_validation() {
        assert!(BoundingBox::new(13.0, 52.0, 14.0, 53.0).is_ok());
        assert!(BoundingBox::new(14.0, 52.0, 13.0, 53.0).is_err());
        assert!(BoundingBox::new(13.0, 52.0, 13.0, 53.0).is_err());
        assert!(BoundingBox::new(13.0, f64::NAN, 14.0, 53.0).is_err());

        let bbox = BoundingBox::try_from((13.0, 52.0, 14.0, 53.0)).unwrap();
        assert_eq!(bbox.to_array(), [13.0, 52.0, 14.0, 53.0]);
    }
}
