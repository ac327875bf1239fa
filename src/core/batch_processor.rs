//! Batch orchestration of change-detection tasks
//!
//! Each task runs search, sign, load, band extraction and then the optional
//! analysis steps. A failing task becomes a failure entry in the results and
//! the batch moves on. A failing analysis step is recorded as skipped and the
//! loaded data is still reported.

use crate::core::change_detection::{ChangeDetector, DEFAULT_EPSILON};
use crate::core::deferred::counter;
use crate::core::statistics::{Percentiles, SarStatistics, TemporalStats};
use crate::grid::GriddedArray;
use crate::io::catalog::SceneCatalog;
use crate::io::data_loader::{BandOptions, SarDataLoader};
use crate::types::{BoundingBox, Polarization, SarError, SarResult};
use rayon::prelude::*;
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// One named (area, time window) unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingTask {
    pub name: String,
    pub bbox: BoundingBox,
    /// Date range expression, e.g. `2022-01-01/2022-01-31`
    pub datetime: String,
    /// Output CRS, overriding the loader default
    pub crs: Option<String>,
}

impl ProcessingTask {
    pub fn new(name: impl Into<String>, bbox: BoundingBox, datetime: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bbox,
            datetime: datetime.into(),
            crs: None,
        }
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }
}

/// Options shared by every task of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub polarization: Polarization,
    pub compute_stats: bool,
    pub compute_change: bool,
    pub show_progress: bool,
    /// Run tasks concurrently on a worker pool
    pub parallel: bool,
    pub band_options: BandOptions,
    /// Also report these percentiles of the band
    pub percentiles: Option<Vec<f64>>,
    /// Worker count for the internal pool, rayon's default when `None`
    pub num_threads: Option<usize>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            polarization: Polarization::VV,
            compute_stats: true,
            compute_change: true,
            show_progress: true,
            parallel: false,
            band_options: BandOptions::default(),
            percentiles: None,
            num_threads: None,
        }
    }
}

/// Everything computed for a task that loaded data
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub num_items: usize,
    pub shape: Vec<usize>,
    pub data: GriddedArray,
    pub stats: Option<TemporalStats>,
    /// First vs last acquisition, in dB
    pub change: Option<GriddedArray>,
    pub percentiles: Option<Percentiles>,
    /// Earliest and latest acquisition date
    pub time_range: Option<(String, String)>,
}

/// Optional analysis step of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStep {
    Stats,
    Change,
    Percentiles,
}

impl std::fmt::Display for AnalysisStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisStep::Stats => f.write_str("stats"),
            AnalysisStep::Change => f.write_str("change"),
            AnalysisStep::Percentiles => f.write_str("percentiles"),
        }
    }
}

/// An analysis step that failed, and why
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedStep {
    pub step: AnalysisStep,
    pub reason: String,
}

/// Why a task produced no data
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskFailure {
    #[error("No items found")]
    NoItemsFound,

    #[error("{0}")]
    Collaborator(String),
}

/// Result of one task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(TaskReport),
    PartialSuccess {
        report: TaskReport,
        skipped: Vec<SkippedStep>,
    },
    Failure(TaskFailure),
}

impl TaskOutcome {
    pub fn report(&self) -> Option<&TaskReport> {
        match self {
            TaskOutcome::Success(report) | TaskOutcome::PartialSuccess { report, .. } => Some(report),
            TaskOutcome::Failure(_) => None,
        }
    }

    /// Failure message, e.g. `"No items found"`
    pub fn error(&self) -> Option<String> {
        match self {
            TaskOutcome::Failure(failure) => Some(failure.to_string()),
            _ => None,
        }
    }

    pub fn skipped(&self) -> &[SkippedStep] {
        match self {
            TaskOutcome::PartialSuccess { skipped, .. } => skipped,
            _ => &[],
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }
}

/// Outcomes keyed by task name
pub type BatchResults = BTreeMap<String, TaskOutcome>;

/// Analysis applied to each extracted band
///
/// The defaults are the statistics engine and change detector; implementors
/// override what they need.
pub trait TemporalAnalyzer: Send + Sync {
    fn temporal_stats(&self, data: &GriddedArray, show_progress: bool) -> SarResult<TemporalStats> {
        SarStatistics::temporal_stats(data, show_progress)
    }

    fn temporal_change(&self, data: &GriddedArray) -> SarResult<Option<GriddedArray>> {
        ChangeDetector::temporal_change(data, 0, -1, DEFAULT_EPSILON)
    }

    fn percentiles(&self, data: &GriddedArray, percentiles: &[f64]) -> SarResult<Percentiles> {
        SarStatistics::percentiles(data, percentiles)
    }
}

/// Statistics engine plus first-vs-last change detection
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAnalyzer;

impl TemporalAnalyzer for StandardAnalyzer {}

/// Internally created worker pool, released when the batch ends
struct ScopedPool {
    pool: rayon::ThreadPool,
}

impl ScopedPool {
    fn new(num_threads: Option<usize>) -> SarResult<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = num_threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| SarError::Processing(format!("Failed to create worker pool: {}", e)))?;

        log::info!("Created worker pool with {} threads", pool.current_num_threads());
        Ok(Self { pool })
    }
}

impl Drop for ScopedPool {
    fn drop(&mut self) {
        log::info!(
            "Releasing worker pool with {} threads",
            self.pool.current_num_threads()
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run a step, turning errors and panics into a message
fn guarded<T, F>(step: F) -> Result<T, String>
where
    F: FnOnce() -> SarResult<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(step)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// Runs batches of tasks against a catalog, a loader and an analyzer
pub struct BatchProcessor {
    catalog: SceneCatalog,
    loader: SarDataLoader,
    analyzer: Arc<dyn TemporalAnalyzer>,
}

impl BatchProcessor {
    pub fn new(catalog: SceneCatalog, loader: SarDataLoader) -> Self {
        Self {
            catalog,
            loader,
            analyzer: Arc::new(StandardAnalyzer),
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn TemporalAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Reject duplicate names and bad boxes before anything runs
    fn validate_tasks(tasks: &[ProcessingTask]) -> SarResult<()> {
        let mut seen = HashSet::new();
        for task in tasks {
            if !seen.insert(task.name.as_str()) {
                return Err(SarError::InvalidInput(format!(
                    "Duplicate task name: {}",
                    task.name
                )));
            }
            task.bbox.validate().map_err(|e| {
                SarError::InvalidInput(format!("Task {}: {}", task.name, e))
            })?;
        }
        Ok(())
    }

    /// Process tasks in order, or concurrently on a fresh pool when
    /// `options.parallel` is set
    pub fn process_tasks(
        &self,
        tasks: &[ProcessingTask],
        options: &BatchOptions,
    ) -> SarResult<BatchResults> {
        Self::validate_tasks(tasks)?;

        if options.parallel {
            let scoped = ScopedPool::new(options.num_threads)?;
            return self.process_tasks_with_pool(tasks, options, &scoped.pool);
        }

        log::info!("Processing {} tasks sequentially", tasks.len());
        let pb = counter(tasks.len() as u64, "tasks", options.show_progress);
        let mut results = BatchResults::new();
        for task in tasks {
            pb.set_message(task.name.clone());
            let outcome = self.run_task(task, options);
            results.insert(task.name.clone(), outcome);
            pb.inc(1);
        }
        pb.finish_and_clear();

        Ok(results)
    }

    /// Process tasks concurrently on a caller-supplied pool
    pub fn process_tasks_with_pool(
        &self,
        tasks: &[ProcessingTask],
        options: &BatchOptions,
        pool: &rayon::ThreadPool,
    ) -> SarResult<BatchResults> {
        Self::validate_tasks(tasks)?;

        log::info!(
            "Processing {} tasks on {} worker threads",
            tasks.len(),
            pool.current_num_threads()
        );
        let pb = counter(tasks.len() as u64, "tasks", options.show_progress);

        let outcomes: Vec<(String, TaskOutcome)> = pool.install(|| {
            tasks
                .par_iter()
                .map(|task| {
                    let outcome = self.run_task(task, options);
                    pb.inc(1);
                    (task.name.clone(), outcome)
                })
                .collect()
        });
        pb.finish_and_clear();

        Ok(outcomes.into_iter().collect())
    }

    /// Same time window over several named areas
    pub fn process_multiple_regions<I, N>(
        &self,
        regions: I,
        datetime: &str,
        options: &BatchOptions,
    ) -> SarResult<BatchResults>
    where
        I: IntoIterator<Item = (N, BoundingBox)>,
        N: Into<String>,
    {
        let tasks: Vec<ProcessingTask> = regions
            .into_iter()
            .map(|(name, bbox)| ProcessingTask::new(name, bbox, datetime))
            .collect();
        self.process_tasks(&tasks, options)
    }

    /// Same area over several named time windows
    pub fn process_multiple_periods<I, N, D>(
        &self,
        bbox: BoundingBox,
        periods: I,
        options: &BatchOptions,
    ) -> SarResult<BatchResults>
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: Into<String>,
    {
        let tasks: Vec<ProcessingTask> = periods
            .into_iter()
            .map(|(name, datetime)| ProcessingTask::new(name, bbox, datetime))
            .collect();
        self.process_tasks(&tasks, options)
    }

    /// Search, sign, load and extract; `None` when nothing matched
    fn load_band(
        &self,
        task: &ProcessingTask,
        options: &BatchOptions,
    ) -> SarResult<Option<(usize, GriddedArray)>> {
        let scenes = self.catalog.search_and_sign(&task.bbox, &task.datetime, None)?;
        if scenes.is_empty() {
            return Ok(None);
        }

        let dataset = self
            .loader
            .load(&scenes, Some(&task.bbox), task.crs.as_deref(), None)?;
        let band = SarDataLoader::get_polarization(
            &dataset,
            options.polarization.band_name(),
            &options.band_options,
        )?;
        Ok(Some((scenes.len(), band)))
    }

    /// Run one task end to end. Only the batch counter is drawn; step
    /// spinners stay hidden so they never share its terminal line.
    fn run_task(&self, task: &ProcessingTask, options: &BatchOptions) -> TaskOutcome {
        log::info!("Task {}: searching {} in {:?}", task.name, task.datetime, task.bbox.to_array());

        let (num_items, data) = match guarded(|| self.load_band(task, options)) {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                log::warn!("Task {}: no items found", task.name);
                return TaskOutcome::Failure(TaskFailure::NoItemsFound);
            }
            Err(reason) => {
                log::error!("Task {} failed: {}", task.name, reason);
                return TaskOutcome::Failure(TaskFailure::Collaborator(reason));
            }
        };

        let steps = data.time_len();
        log::info!(
            "Task {}: loaded {} items, shape {:?}",
            task.name,
            num_items,
            data.shape()
        );

        let mut report = TaskReport {
            num_items,
            shape: data.shape().to_vec(),
            time_range: ChangeDetector::get_time_range(&data),
            data,
            stats: None,
            change: None,
            percentiles: None,
        };
        let mut skipped = Vec::new();
        let mut skip = |step: AnalysisStep, reason: String| {
            log::error!("Task {}: {} failed: {}", task.name, step, reason);
            skipped.push(SkippedStep { step, reason });
        };

        if options.compute_stats && steps >= 1 {
            match guarded(|| self.analyzer.temporal_stats(&report.data, false)) {
                Ok(stats) => {
                    log::debug!("Task {}: temporal statistics computed", task.name);
                    report.stats = Some(stats);
                }
                Err(reason) => skip(AnalysisStep::Stats, reason),
            }
        }

        if options.compute_change && steps >= 2 {
            match guarded(|| self.analyzer.temporal_change(&report.data)) {
                Ok(change) => {
                    log::debug!("Task {}: change computed", task.name);
                    report.change = change;
                }
                Err(reason) => skip(AnalysisStep::Change, reason),
            }
        }

        if let Some(percentiles) = options.percentiles.as_deref() {
            match guarded(|| self.analyzer.percentiles(&report.data, percentiles)) {
                Ok(values) => report.percentiles = Some(values),
                Err(reason) => skip(AnalysisStep::Percentiles, reason),
            }
        }

        if skipped.is_empty() {
            log::info!("Task {}: done", task.name);
            TaskOutcome::Success(report)
        } else {
            log::info!("Task {}: done with {} skipped steps", task.name, skipped.len());
            TaskOutcome::PartialSuccess { report, skipped }
        }
    }
}
