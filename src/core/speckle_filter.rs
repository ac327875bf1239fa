use crate::grid::GriddedArray;
use crate::types::{SarError, SarReal, SarResult};
use ndarray::{Array2, ArrayView2};

/// Speckle filtering parameters
#[derive(Debug, Clone)]
pub struct SpeckleFilterParams {
    /// Side of the square filter window in pixels
    pub window_size: usize,
}

impl Default for SpeckleFilterParams {
    fn default() -> Self {
        Self {
            window_size: 3, // 3x3 window
        }
    }
}

/// Median speckle filter over the two spatial axes
///
/// Windows that run off the image are filled by mirroring the edge pixels
/// (`d c b a | a b c d | d c b a`). Even window sizes are allowed; the extra
/// row and column lie before the centre pixel.
pub struct SpeckleFilter {
    params: SpeckleFilterParams,
}

impl SpeckleFilter {
    /// Create a new speckle filter with default parameters
    pub fn new() -> Self {
        Self {
            params: SpeckleFilterParams::default(),
        }
    }

    /// Create a speckle filter with custom parameters
    pub fn with_params(params: SpeckleFilterParams) -> SarResult<Self> {
        if params.window_size == 0 {
            return Err(SarError::InvalidInput(
                "Filter window size must be at least 1".to_string(),
            ));
        }
        Ok(Self { params })
    }

    pub fn window_size(&self) -> usize {
        self.params.window_size
    }

    /// Median-filter a single image
    pub fn apply_median_filter(&self, image: ArrayView2<'_, SarReal>) -> SarResult<Array2<SarReal>> {
        let (height, width) = image.dim();
        let size = self.params.window_size;
        if height == 0 || width == 0 {
            return Ok(image.to_owned());
        }

        let rows = reflected_windows(height, size);
        let cols = reflected_windows(width, size);
        let mut window_values = Vec::with_capacity(size * size);

        let filtered = Array2::from_shape_fn((height, width), |(i, j)| {
            window_values.clear();
            for &wi in &rows[i] {
                for &wj in &cols[j] {
                    window_values.push(image[[wi, wj]]);
                }
            }

            let mid = window_values.len() / 2;
            let (_, median, _) = window_values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
            *median
        });

        Ok(filtered)
    }

    /// Median-filter every time slice of an array independently
    pub fn apply_filter(&self, data: &GriddedArray) -> SarResult<GriddedArray> {
        log::debug!(
            "Applying {}x{} median filter to {:?}",
            self.params.window_size,
            self.params.window_size,
            data.shape()
        );

        data.map_spatial_slices(|plane| self.apply_median_filter(plane))
    }
}

impl Default for SpeckleFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Source indices of every window along one axis of length `n`
fn reflected_windows(n: usize, size: usize) -> Vec<Vec<usize>> {
    let before = (size / 2) as isize;
    (0..n as isize)
        .map(|center| {
            (0..size as isize)
                .map(|k| reflect_index(center - before + k, n))
                .collect()
        })
        .collect()
}

/// Mirror an out-of-range index back into `0..n`, repeating edge pixels
fn reflect_index(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m >= n as isize {
        (period - 1 - m) as usize
    } else {
        m as usize
    }
}
