//! sarchange: Sentinel-1 backscatter change detection
//!
//! Finds Sentinel-1 scenes for an area and time window in a STAC catalog,
//! loads them through a pluggable raster loader and computes log-ratio change
//! and temporal statistics, one batch of named tasks at a time.

pub mod config;
pub mod core;
pub mod grid;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{AcquisitionMode, BoundingBox, OrbitState, Polarization, SarError, SarReal, SarResult};

pub use config::{Chunks, ProcessingConfig, StacConfig};
pub use grid::{AxisName, BandDataset, GriddedArray};

pub use crate::core::{
    BatchOptions, BatchProcessor, BatchResults, ChangeDetector, ProcessingTask, SarStatistics,
    TaskFailure, TaskOutcome, TaskReport, TemporalAnalyzer,
};
pub use io::{
    BandOptions, PassthroughSigner, PlanetaryComputerSigner, RasterLoader, SarDataLoader,
    SceneCatalog, SceneDescriptor, SceneSearch, SceneSigner, SignedScene, StacClient,
};
