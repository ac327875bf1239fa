//! Gridded backscatter arrays with named axes
//!
//! A [`GriddedArray`] is either a single image with dims `[y, x]` or a time
//! series with dims `[time, y, x]`. Time coordinates may arrive unsorted from
//! the loader; [`GriddedArray::sorted_by_time`] restores acquisition order.
//! Every operation returns a new array; nothing is modified in place.

use crate::types::{SarError, SarReal, SarResult};
use chrono::{DateTime, Utc};
use ndarray::{Array2, Array3, ArrayD, ArrayView1, ArrayView2, Axis, Ix2, Zip};
use std::collections::BTreeMap;

/// Axis names of a gridded array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisName {
    Time,
    Y,
    X,
}

impl AxisName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AxisName::Time => "time",
            AxisName::Y => "y",
            AxisName::X => "x",
        }
    }
}

impl std::fmt::Display for AxisName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backscatter values on a regular grid, optionally stacked over time
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedArray {
    name: Option<String>,
    data: ArrayD<SarReal>,
    time: Option<Vec<DateTime<Utc>>>,
    y: Vec<f64>,
    x: Vec<f64>,
    crs: Option<String>,
}

impl GriddedArray {
    /// Single image with dims `[y, x]` and index coordinates
    pub fn spatial(data: Array2<SarReal>) -> Self {
        let (rows, cols) = data.dim();
        Self {
            name: None,
            data: data.into_dyn(),
            time: None,
            y: index_coords(rows),
            x: index_coords(cols),
            crs: None,
        }
    }

    /// Time series with dims `[time, y, x]`, one timestamp per time step
    pub fn temporal(data: Array3<SarReal>, times: Vec<DateTime<Utc>>) -> SarResult<Self> {
        let (steps, rows, cols) = data.dim();
        if times.len() != steps {
            return Err(SarError::InvalidInput(format!(
                "{} time coordinates given for {} time steps",
                times.len(),
                steps
            )));
        }

        Ok(Self {
            name: None,
            data: data.into_dyn(),
            time: Some(times),
            y: index_coords(rows),
            x: index_coords(cols),
            crs: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    /// Replace the index coordinates with real ones (one per row / column)
    pub fn with_spatial_coords(mut self, y: Vec<f64>, x: Vec<f64>) -> SarResult<Self> {
        if y.len() != self.y.len() || x.len() != self.x.len() {
            return Err(SarError::InvalidInput(format!(
                "Spatial coordinates {}x{} do not match grid {}x{}",
                y.len(),
                x.len(),
                self.y.len(),
                self.x.len()
            )));
        }
        self.y = y;
        self.x = x;
        Ok(self)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    pub fn data(&self) -> &ArrayD<SarReal> {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn dims(&self) -> Vec<AxisName> {
        if self.time.is_some() {
            vec![AxisName::Time, AxisName::Y, AxisName::X]
        } else {
            vec![AxisName::Y, AxisName::X]
        }
    }

    pub fn has_time(&self) -> bool {
        self.time.is_some()
    }

    /// Number of time steps, zero when there is no time axis
    pub fn time_len(&self) -> usize {
        self.time.as_ref().map_or(0, |t| t.len())
    }

    pub fn times(&self) -> Option<&[DateTime<Utc>]> {
        self.time.as_deref()
    }

    pub fn y_coords(&self) -> &[f64] {
        &self.y
    }

    pub fn x_coords(&self) -> &[f64] {
        &self.x
    }

    /// Total number of values
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Same metadata, new values of identical shape
    fn with_data(&self, data: ArrayD<SarReal>) -> GriddedArray {
        GriddedArray {
            name: self.name.clone(),
            data,
            time: self.time.clone(),
            y: self.y.clone(),
            x: self.x.clone(),
            crs: self.crs.clone(),
        }
    }

    /// Same spatial metadata, time axis removed
    fn without_time(&self, data: ArrayD<SarReal>) -> GriddedArray {
        GriddedArray {
            name: self.name.clone(),
            data,
            time: None,
            y: self.y.clone(),
            x: self.x.clone(),
            crs: self.crs.clone(),
        }
    }

    /// Select one time step; negative indices count from the end
    pub fn select_time(&self, index: isize) -> SarResult<GriddedArray> {
        let steps = self
            .time
            .as_ref()
            .ok_or_else(|| SarError::InvalidInput("Array has no time axis".to_string()))?
            .len() as isize;

        let resolved = if index < 0 { steps + index } else { index };
        if resolved < 0 || resolved >= steps {
            return Err(SarError::InvalidInput(format!(
                "Time index {} out of range for {} time steps",
                index, steps
            )));
        }

        let slice = self.data.index_axis(Axis(0), resolved as usize).to_owned();
        Ok(self.without_time(slice))
    }

    /// Stable ascending sort along the time axis
    pub fn sorted_by_time(&self) -> GriddedArray {
        let times = match &self.time {
            Some(times) => times,
            None => return self.clone(),
        };

        let mut order: Vec<usize> = (0..times.len()).collect();
        order.sort_by_key(|&i| times[i]);

        let mut sorted = self.with_data(self.data.select(Axis(0), &order));
        sorted.time = Some(order.iter().map(|&i| times[i]).collect());
        sorted
    }

    /// Elementwise transform
    pub fn map<F>(&self, f: F) -> GriddedArray
    where
        F: Fn(SarReal) -> SarReal,
    {
        self.with_data(self.data.mapv(f))
    }

    /// Elementwise combination of two arrays on the same grid
    pub fn zip_map<F>(&self, other: &GriddedArray, f: F) -> SarResult<GriddedArray>
    where
        F: Fn(SarReal, SarReal) -> SarReal,
    {
        if self.dims() != other.dims() || self.shape() != other.shape() {
            return Err(SarError::InvalidInput(format!(
                "Grid mismatch: {:?} {:?} vs {:?} {:?}",
                self.dims(),
                self.shape(),
                other.dims(),
                other.shape()
            )));
        }

        let data = Zip::from(&self.data)
            .and(&other.data)
            .map_collect(|&a, &b| f(a, b));
        Ok(self.with_data(data))
    }

    /// Reduce the time axis lane by lane, keeping `[y, x]`
    pub fn reduce_time<F>(&self, f: F) -> SarResult<GriddedArray>
    where
        F: FnMut(ArrayView1<'_, SarReal>) -> SarReal,
    {
        if !self.has_time() {
            return Err(SarError::InvalidInput("Array has no time axis".to_string()));
        }
        let reduced = self.data.map_axis(Axis(0), f);
        Ok(self.without_time(reduced))
    }

    /// The `[y, x]` planes of the array, one per time step
    pub fn spatial_slices(&self) -> SarResult<Vec<ArrayView2<'_, SarReal>>> {
        let shape_err = |e: ndarray::ShapeError| SarError::Processing(format!("Shape error: {}", e));

        if self.has_time() {
            self.data
                .outer_iter()
                .map(|plane| plane.into_dimensionality::<Ix2>().map_err(shape_err))
                .collect()
        } else {
            Ok(vec![self.data.view().into_dimensionality::<Ix2>().map_err(shape_err)?])
        }
    }

    /// Apply a spatial operator to every `[y, x]` plane independently.
    ///
    /// Planes never see each other, so the operator cannot mix values across
    /// time. With the `parallel` feature the planes are processed on the rayon
    /// pool.
    pub fn map_spatial_slices<F>(&self, f: F) -> SarResult<GriddedArray>
    where
        F: Fn(ArrayView2<'_, SarReal>) -> SarResult<Array2<SarReal>> + Sync,
    {
        if self.has_time() && self.time_len() == 0 {
            return Ok(self.clone());
        }

        let planes = self.spatial_slices()?;
        let plane_dim = (self.y.len(), self.x.len());

        #[cfg(feature = "parallel")]
        let processed: SarResult<Vec<Array2<SarReal>>> = {
            use rayon::prelude::*;
            planes.into_par_iter().map(&f).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let processed: SarResult<Vec<Array2<SarReal>>> = planes.into_iter().map(&f).collect();
        let processed = processed?;

        if let Some(bad) = processed.iter().find(|p| p.dim() != plane_dim) {
            return Err(SarError::Processing(format!(
                "Spatial operator changed plane shape from {:?} to {:?}",
                plane_dim,
                bad.dim()
            )));
        }

        let data = if self.has_time() {
            let views: Vec<ArrayView2<'_, SarReal>> = processed.iter().map(|p| p.view()).collect();
            ndarray::stack(Axis(0), &views)
                .map_err(|e| SarError::Processing(format!("Shape error: {}", e)))?
                .into_dyn()
        } else {
            processed
                .into_iter()
                .next()
                .ok_or_else(|| SarError::Processing("Spatial operator returned no plane".to_string()))?
                .into_dyn()
        };

        Ok(self.with_data(data))
    }
}

fn index_coords(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64).collect()
}

/// Bands of one load, keyed by lower-case name, sharing a single grid
#[derive(Debug, Clone, Default)]
pub struct BandDataset {
    bands: BTreeMap<String, GriddedArray>,
    crs: Option<String>,
}

impl BandDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    /// Add a band; it must share the grid and time coordinates of the others
    pub fn insert(&mut self, name: &str, band: GriddedArray) -> SarResult<()> {
        if let Some(existing) = self.bands.values().next() {
            if existing.shape() != band.shape() || existing.times() != band.times() {
                return Err(SarError::InvalidInput(format!(
                    "Band '{}' with shape {:?} does not share the dataset grid {:?}",
                    name,
                    band.shape(),
                    existing.shape()
                )));
            }
        }

        let key = name.to_lowercase();
        let mut band = band.with_name(key.clone());
        if band.crs.is_none() {
            band.crs = self.crs.clone();
        }
        self.bands.insert(key, band);
        Ok(())
    }

    pub fn with_band(mut self, name: &str, band: GriddedArray) -> SarResult<Self> {
        self.insert(name, band)?;
        Ok(self)
    }

    /// Case-insensitive band lookup
    pub fn band(&self, name: &str) -> Option<&GriddedArray> {
        self.bands.get(&name.to_lowercase())
    }

    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(|k| k.as_str())
    }

    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}
