use crate::core::deferred::Deferred;
use crate::grid::GriddedArray;
use crate::types::{SarError, SarReal, SarResult};
use num_traits::Float;
use serde::Serialize;

/// Percentiles reported when the caller does not choose any
pub const DEFAULT_PERCENTILES: [f64; 5] = [10.0, 25.0, 50.0, 75.0, 90.0];

/// Per-pixel mean and standard deviation over time
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalStats {
    pub mean: GriddedArray,
    pub std: GriddedArray,
}

/// Scalar summary over every value of an array
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpatialStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

/// Percentile values in the order they were requested
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Percentiles {
    values: Vec<(f64, f64)>,
}

impl Percentiles {
    /// Report key for a percentile, e.g. `p50` or `p12.5`
    pub fn key(p: f64) -> String {
        format!("p{}", p)
    }

    pub fn get(&self, p: f64) -> Option<f64> {
        self.values.iter().find(|(q, _)| *q == p).map(|(_, v)| *v)
    }

    /// Look up by report key
    pub fn get_key(&self, key: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(q, _)| Self::key(*q) == key)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (String, f64)> + '_ {
        self.values.iter().map(|(p, v)| (Self::key(*p), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Running count, mean, variance and range that skips NaN
#[derive(Debug, Clone, Copy)]
struct Moments {
    count: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Moments {
    fn from_values<T, I>(values: I) -> Self
    where
        T: Float,
        I: IntoIterator<Item = T>,
    {
        let mut m = Moments {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        };

        for v in values {
            if v.is_nan() {
                continue;
            }
            let x = match v.to_f64() {
                Some(x) => x,
                None => continue,
            };

            // Welford update
            m.count += 1;
            let delta = x - m.mean;
            m.mean += delta / m.count as f64;
            m.m2 += delta * (x - m.mean);
            m.min = m.min.min(x);
            m.max = m.max.max(x);
        }
        m
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    /// Population standard deviation (ddof = 0)
    fn std(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }

    fn min(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.min
        }
    }

    fn max(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.max
        }
    }
}

/// Quantile `q` in `[0, 1]` of ascending values, interpolating linearly
/// between the two closest ranks
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }

    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Statistical reducers for SAR time series
///
/// Every reducer skips NaN values. A reduction over nothing but NaN yields
/// NaN rather than an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct SarStatistics;

impl SarStatistics {
    fn require_time(data: &GriddedArray) -> SarResult<()> {
        if !data.has_time() {
            return Err(SarError::InvalidInput(
                "Temporal statistics need an array with a time axis".to_string(),
            ));
        }
        if data.time_len() == 0 {
            return Err(SarError::InvalidInput(
                "Temporal statistics need at least one time step".to_string(),
            ));
        }
        Ok(())
    }

    fn reduce_temporal(data: &GriddedArray) -> SarResult<TemporalStats> {
        let mean = data.reduce_time(|lane| Moments::from_values(lane.iter().copied()).mean() as SarReal)?;
        let std = data.reduce_time(|lane| Moments::from_values(lane.iter().copied()).std() as SarReal)?;

        Ok(TemporalStats {
            mean: mean.with_name("mean"),
            std: std.with_name("std"),
        })
    }

    /// Mean and standard deviation along time, realized immediately
    pub fn temporal_stats(data: &GriddedArray, show_progress: bool) -> SarResult<TemporalStats> {
        Self::temporal_stats_deferred(data)?.realize_with_progress(show_progress)
    }

    /// Mean and standard deviation along time, described but not computed
    pub fn temporal_stats_deferred(data: &GriddedArray) -> SarResult<Deferred<TemporalStats>> {
        Self::require_time(data)?;
        log::debug!(
            "Temporal statistics over {} time steps of {:?}",
            data.time_len(),
            data.shape()
        );

        let data = data.clone();
        Ok(Deferred::new("Computing temporal statistics", move || {
            Self::reduce_temporal(&data)
        }))
    }

    fn reduce_spatial(data: &GriddedArray) -> SpatialStats {
        let m = Moments::from_values(data.data().iter().copied());
        SpatialStats {
            min: m.min(),
            max: m.max(),
            mean: m.mean(),
            std: m.std(),
        }
    }

    /// Scalar min, max, mean and standard deviation over all values
    pub fn spatial_stats(data: &GriddedArray) -> SarResult<SpatialStats> {
        Self::spatial_stats_deferred(data)?.realize()
    }

    pub fn spatial_stats_deferred(data: &GriddedArray) -> SarResult<Deferred<SpatialStats>> {
        if data.is_empty() {
            return Err(SarError::InvalidInput(
                "Spatial statistics of an empty array".to_string(),
            ));
        }

        let data = data.clone();
        Ok(Deferred::new("Computing spatial statistics", move || {
            Ok(Self::reduce_spatial(&data))
        }))
    }

    /// Percentiles over all values, e.g. `&DEFAULT_PERCENTILES`
    pub fn percentiles(data: &GriddedArray, percentiles: &[f64]) -> SarResult<Percentiles> {
        Self::percentiles_deferred(data, percentiles)?.realize()
    }

    pub fn percentiles_deferred(
        data: &GriddedArray,
        percentiles: &[f64],
    ) -> SarResult<Deferred<Percentiles>> {
        if let Some(bad) = percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
            return Err(SarError::InvalidInput(format!(
                "Percentile {} outside [0, 100]",
                bad
            )));
        }

        let data = data.clone();
        let requested = percentiles.to_vec();
        Ok(Deferred::new("Computing percentiles", move || {
            let mut sorted: Vec<f64> = data
                .data()
                .iter()
                .filter(|v| !v.is_nan())
                .map(|&v| v as f64)
                .collect();
            sorted.sort_unstable_by(|a, b| a.total_cmp(b));

            let values = requested
                .into_iter()
                .map(|p| (p, quantile_sorted(&sorted, p / 100.0)))
                .collect();
            Ok(Percentiles { values })
        }))
    }
}
