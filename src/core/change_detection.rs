use crate::grid::GriddedArray;
use crate::types::{SarReal, SarResult};

/// Offset added to both sides of a ratio so zero backscatter stays finite
pub const DEFAULT_EPSILON: f64 = 1e-10;

/// Log-ratio change detection between SAR acquisitions
///
/// All operations are pure: inputs are borrowed, outputs are new arrays with
/// the axes and coordinates of the first input.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    /// Change from `before` to `after` in dB.
    ///
    /// For linear intensities this is `10 * log10((after + eps) / (before + eps))`;
    /// equal inputs give exactly zero, a doubling gives about +3.01 dB. When
    /// both inputs are already in dB the change is the plain difference.
    pub fn log_ratio(
        before: &GriddedArray,
        after: &GriddedArray,
        epsilon: f64,
        input_is_db: bool,
    ) -> SarResult<GriddedArray> {
        if input_is_db {
            return before.zip_map(after, |b, a| a - b);
        }

        before.zip_map(after, |b, a| {
            let ratio = (a as f64 + epsilon) / (b as f64 + epsilon);
            (10.0 * ratio.log10()) as SarReal
        })
    }

    /// Change between two time steps of a series, first vs last by default.
    ///
    /// Negative indices count from the end. Returns `Ok(None)` when the array
    /// has no time axis or fewer than two time steps.
    pub fn temporal_change(
        data: &GriddedArray,
        time_index_before: isize,
        time_index_after: isize,
        epsilon: f64,
    ) -> SarResult<Option<GriddedArray>> {
        if data.time_len() < 2 {
            log::debug!(
                "Skipping temporal change: {} time steps available",
                data.time_len()
            );
            return Ok(None);
        }

        let before = data.select_time(time_index_before)?;
        let after = data.select_time(time_index_after)?;
        log::debug!(
            "Temporal change between time steps {} and {}",
            time_index_before,
            time_index_after
        );

        Self::log_ratio(&before, &after, epsilon, false).map(Some)
    }

    /// Linear intensity to dB
    pub fn to_db(data: &GriddedArray, epsilon: f64) -> GriddedArray {
        data.map(|v| (10.0 * (v as f64 + epsilon).log10()) as SarReal)
    }

    /// Earliest and latest acquisition dates as `YYYY-MM-DD`
    pub fn get_time_range(data: &GriddedArray) -> Option<(String, String)> {
        let times = data.times()?;
        let min = times.iter().min()?;
        let max = times.iter().max()?;
        Some((
            min.format("%Y-%m-%d").to_string(),
            max.format("%Y-%m-%d").to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::{DateTime, TimeZone, Utc};
    use ndarray::{array, Array2, Array3};

    fn day(m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, m, d, 6, 30, 0).unwrap()
    }

    fn flat(value: f32) -> GriddedArray {
        GriddedArray::spatial(Array2::from_elem((4, 4), value))
    }

    #[test]
    fn test_log_ratio_identical_is_zero() {
        let a = GriddedArray::spatial(array![[0.01, 0.2], [1.5, 0.0]]);
        let change = ChangeDetector::log_ratio(&a, &a, DEFAULT_EPSILON, false).unwrap();
        for v in change.data().iter() {
            assert_eq!(*v, 0.0);
        }
    }

    #[test]
    fn test_log_ratio_doubling_and_halving() {
        let doubled = ChangeDetector::log_ratio(&flat(0.1), &flat(0.2), DEFAULT_EPSILON, false).unwrap();
        let halved = ChangeDetector::log_ratio(&flat(0.2), &flat(0.1), DEFAULT_EPSILON, false).unwrap();

        for v in doubled.data().iter() {
            assert_abs_diff_eq!(*v, 3.0103, epsilon = 1e-3);
        }
        for v in halved.data().iter() {
            assert_abs_diff_eq!(*v, -3.0103, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_log_ratio_zero_input_is_finite() {
        let change = ChangeDetector::log_ratio(&flat(0.0), &flat(0.5), DEFAULT_EPSILON, false).unwrap();
        assert!(change.data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_log_ratio_db_input_is_difference() {
        let before = GriddedArray::spatial(array![[-12.5, -20.0]]);
        let after = GriddedArray::spatial(array![[-10.0, -21.25]]);
        let change = ChangeDetector::log_ratio(&before, &after, DEFAULT_EPSILON, true).unwrap();

        assert_eq!(change.data()[[0, 0]], -10.0 - -12.5);
        assert_eq!(change.data()[[0, 1]], -21.25 - -20.0);
    }

    #[test]
    fn test_log_ratio_shape_mismatch() {
        let a = flat(1.0);
        let b = GriddedArray::spatial(Array2::from_elem((2, 4), 1.0));
        assert!(ChangeDetector::log_ratio(&a, &b, DEFAULT_EPSILON, false).is_err());
    }

    #[test]
    fn test_temporal_change_needs_two_steps() {
        let none = GriddedArray::temporal(Array3::zeros((0, 2, 2)), vec![]).unwrap();
        let one = GriddedArray::temporal(Array3::ones((1, 2, 2)), vec![day(1, 1)]).unwrap();

        assert!(ChangeDetector::temporal_change(&none, 0, -1, DEFAULT_EPSILON).unwrap().is_none());
        assert!(ChangeDetector::temporal_change(&one, 0, -1, DEFAULT_EPSILON).unwrap().is_none());
        assert!(ChangeDetector::temporal_change(&flat(1.0), 0, -1, DEFAULT_EPSILON).unwrap().is_none());
    }

    #[test]
    fn test_temporal_change_first_vs_last() {
        let data = Array3::from_shape_fn((3, 2, 2), |(t, _, _)| 0.1 * (1 << t) as f32);
        let series = GriddedArray::temporal(data, vec![day(1, 1), day(1, 13), day(1, 25)]).unwrap();

        let change = ChangeDetector::temporal_change(&series, 0, -1, DEFAULT_EPSILON)
            .unwrap()
            .unwrap();
        assert!(!change.has_time());
        assert_eq!(change.shape(), &[2, 2]);
        for v in change.data().iter() {
            assert_abs_diff_eq!(*v, 6.0206, epsilon = 1e-3);
        }

        assert!(ChangeDetector::temporal_change(&series, 0, 5, DEFAULT_EPSILON).is_err());
    }

    #[test]
    fn test_to_db_decades() {
        let linear = GriddedArray::spatial(array![[1.0, 10.0, 100.0, 1000.0]]);
        let db = ChangeDetector::to_db(&linear, DEFAULT_EPSILON);
        let expected = [0.0, 10.0, 20.0, 30.0];
        for (v, e) in db.data().iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*v, *e, epsilon = 0.01);
        }
    }

    #[test]
    fn test_get_time_range() {
        assert!(ChangeDetector::get_time_range(&flat(1.0)).is_none());

        let series = GriddedArray::temporal(
            Array3::zeros((3, 1, 1)),
            vec![day(3, 2), day(1, 9), day(2, 14)],
        )
        .unwrap();
        let (start, end) = ChangeDetector::get_time_range(&series).unwrap();
        assert_eq!(start, "2022-01-09");
        assert_eq!(end, "2022-03-02");
        assert!(start <= end);

        let empty = GriddedArray::temporal(Array3::zeros((0, 1, 1)), vec![]).unwrap();
        assert!(ChangeDetector::get_time_range(&empty).is_none());
    }
}
