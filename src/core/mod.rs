//! Core change-detection and statistics modules

pub mod batch_processor;
pub mod change_detection;
pub mod deferred;
pub mod speckle_filter;
pub mod statistics;

// Re-export main types
pub use batch_processor::{
    AnalysisStep, BatchOptions, BatchProcessor, BatchResults, ProcessingTask, SkippedStep,
    StandardAnalyzer, TaskFailure, TaskOutcome, TaskReport, TemporalAnalyzer,
};
pub use change_detection::{ChangeDetector, DEFAULT_EPSILON};
pub use deferred::Deferred;
pub use speckle_filter::{SpeckleFilter, SpeckleFilterParams};
pub use statistics::{Percentiles, SarStatistics, SpatialStats, TemporalStats, DEFAULT_PERCENTILES};
