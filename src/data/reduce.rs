use log::debug;

use super::model::{DataSheet, ReductionStage, Sample};
use crate::error::ReduceError;

// ---------------------------------------------------------------------------
// Pure sequence operations
// ---------------------------------------------------------------------------

/// Incremental mean. A constant input yields that constant exactly.
fn running_mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut mean = 0.0;
    for (k, v) in values.into_iter().enumerate() {
        mean += (v - mean) / (k + 1) as f64;
    }
    mean
}

/// Copy of `samples` ordered by `x` ascending. Stable; positive NaN sorts last.
pub fn sort_samples(samples: &[Sample]) -> Vec<Sample> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x));
    sorted
}

/// Sort, then replace each full window of `window` samples with its mean.
///
/// A trailing partial window is dropped.
pub fn window_average(samples: &[Sample], window: usize) -> Result<Vec<Sample>, ReduceError> {
    if window == 0 || window > samples.len() {
        return Err(ReduceError::InvalidWindowSize {
            window,
            len: samples.len(),
        });
    }

    let sorted = sort_samples(samples);
    Ok(sorted
        .chunks_exact(window)
        .map(|chunk| {
            Sample::new(
                running_mean(chunk.iter().map(|s| s.x)),
                running_mean(chunk.iter().map(|s| s.y)),
            )
        })
        .collect())
}

/// Subtract the mean of `y` from every sample's `y`.
fn subtract_baseline(set: &mut [Sample]) -> f64 {
    let mean = running_mean(set.iter().map(|s| s.y));
    for s in set.iter_mut() {
        s.y -= mean;
    }
    mean
}

// ---------------------------------------------------------------------------
// In-place sheet reduction
// ---------------------------------------------------------------------------

impl DataSheet {
    /// Zero-centre each set's signal channel independently.
    pub fn mean_subtract(&mut self) {
        let m1 = subtract_baseline(&mut self.set_1);
        let m2 = subtract_baseline(&mut self.set_2);
        let m3 = subtract_baseline(&mut self.set_3);
        debug!("{}: baselines {m1:.6} / {m2:.6} / {m3:.6}", self.description);
        self.stage = self.stage.max(ReductionStage::Corrected);
    }

    /// Interleave the three sets round-robin into `combined_set`.
    pub fn combine_sets(&mut self) -> Result<(), ReduceError> {
        let n = self.set_1.len();
        if self.set_2.len() != n || self.set_3.len() != n {
            return Err(ReduceError::LengthMismatch {
                set_1: n,
                set_2: self.set_2.len(),
                set_3: self.set_3.len(),
            });
        }

        let mut combined = Vec::with_capacity(3 * n);
        for ((a, b), c) in self.set_1.iter().zip(&self.set_2).zip(&self.set_3) {
            combined.extend([*a, *b, *c]);
        }
        self.combined_set = combined;
        self.stage = ReductionStage::Combined;
        Ok(())
    }

    pub fn sort_combined(&mut self) {
        self.combined_set = sort_samples(&self.combined_set);
        self.stage = self.stage.max(ReductionStage::Sorted);
    }

    /// Replace `combined_set` by its window average. The result is sorted.
    pub fn window_average_combined(&mut self, window: usize) -> Result<(), ReduceError> {
        let before = self.combined_set.len();
        self.combined_set = window_average(&self.combined_set, window)?;
        debug!(
            "{}: averaged {before} points into {} (window {window})",
            self.description,
            self.combined_set.len()
        );
        self.stage = ReductionStage::Averaged;
        Ok(())
    }

    /// Full per-sheet chain: correct, combine, sort, average.
    pub fn reduce(&mut self, window: usize) -> Result<(), ReduceError> {
        self.mean_subtract();
        self.combine_sets()?;
        self.sort_combined();
        self.window_average_combined(window)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::data::model::SetupParameters;

    fn samples(pairs: &[(f64, f64)]) -> Vec<Sample> {
        pairs.iter().copied().map(Sample::from).collect()
    }

    fn sheet(s1: &[(f64, f64)], s2: &[(f64, f64)], s3: &[(f64, f64)]) -> DataSheet {
        DataSheet::new(
            "test sheet",
            samples(s1),
            samples(s2),
            samples(s3),
            SetupParameters::default(),
        )
    }

    #[test]
    fn mean_subtract_centres_each_set_independently() {
        let mut ds = sheet(
            &[(0.0, 10.0), (1.0, 12.0), (2.0, 17.0)],
            &[(0.0, -4.0), (1.0, -2.0), (2.0, 0.3)],
            &[(0.0, 1e6), (1.0, 1e6 + 1.0), (2.0, 1e6 + 5.0)],
        );
        ds.mean_subtract();

        for set in [&ds.set_1, &ds.set_2, &ds.set_3] {
            let mean: f64 = set.iter().map(|s| s.y).sum::<f64>() / set.len() as f64;
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-9);
        }
        // x untouched, per-set offsets differ
        assert_eq!(ds.set_1[2].x, 2.0);
        assert_abs_diff_eq!(ds.set_1[0].y, -3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ds.set_3[0].y, -2.0, epsilon = 1e-6);
        assert_eq!(ds.stage(), ReductionStage::Corrected);
    }

    #[test]
    fn mean_subtract_twice_changes_nothing() {
        let mut ds = sheet(&[(0.0, 3.0), (1.0, 5.0)], &[(0.0, 7.0), (1.0, 7.0)], &[(0.0, 1.0), (1.0, 0.0)]);
        ds.mean_subtract();
        let once = ds.clone();
        ds.mean_subtract();
        assert_eq!(ds.set_1, once.set_1);
        assert_eq!(ds.set_2, once.set_2);
        assert_eq!(ds.set_3, once.set_3);
    }

    #[test]
    fn combine_interleaves_round_robin() {
        let mut ds = sheet(
            &[(1.0, 1.0), (4.0, 4.0)],
            &[(2.0, 2.0), (5.0, 5.0)],
            &[(3.0, 3.0), (6.0, 6.0)],
        );
        ds.combine_sets().unwrap();

        assert_eq!(ds.combined_set.len(), 6);
        for i in 0..2 {
            assert_eq!(ds.combined_set[3 * i], ds.set_1[i]);
            assert_eq!(ds.combined_set[3 * i + 1], ds.set_2[i]);
            assert_eq!(ds.combined_set[3 * i + 2], ds.set_3[i]);
        }
    }

    #[test]
    fn combine_rejects_unequal_lengths() {
        let mut ds = sheet(&[(1.0, 1.0), (2.0, 2.0)], &[(1.0, 1.0)], &[(1.0, 1.0), (2.0, 2.0)]);
        let err = ds.combine_sets().unwrap_err();
        assert!(matches!(
            err,
            ReduceError::LengthMismatch {
                set_1: 2,
                set_2: 1,
                set_3: 2
            }
        ));
        assert!(ds.combined_set.is_empty());
    }

    #[test]
    fn sort_is_stable_and_leaves_input_alone() {
        let input = samples(&[(3.0, 0.0), (1.0, 1.0), (3.0, 2.0), (-2.0, 3.0), (1.0, 4.0)]);
        let sorted = sort_samples(&input);

        assert_eq!(input[0], Sample::new(3.0, 0.0));
        assert!(sorted.windows(2).all(|w| w[0].x <= w[1].x));
        assert_eq!(
            sorted,
            samples(&[(-2.0, 3.0), (1.0, 1.0), (1.0, 4.0), (3.0, 0.0), (3.0, 2.0)])
        );
    }

    #[test]
    fn sort_puts_nan_keys_last_in_input_order() {
        let input = samples(&[
            (f64::NAN, 0.0),
            (2.0, 1.0),
            (f64::NAN, 2.0),
            (-1.0, 3.0),
            (f64::NAN, 4.0),
        ]);
        let sorted = sort_samples(&input);

        assert_eq!(sorted[0], Sample::new(-1.0, 3.0));
        assert_eq!(sorted[1], Sample::new(2.0, 1.0));
        assert!(sorted[2..].iter().all(|s| s.x.is_nan()));
        let tail: Vec<f64> = sorted[2..].iter().map(|s| s.y).collect();
        assert_eq!(tail, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn sort_is_a_permutation() {
        let input: Vec<Sample> = (0..50)
            .map(|i| Sample::new(((i * 37) % 11) as f64 - 5.0, i as f64))
            .collect();
        let sorted = sort_samples(&input);

        let mut a: Vec<f64> = input.iter().map(|s| s.y).collect();
        let mut b: Vec<f64> = sorted.iter().map(|s| s.y).collect();
        a.sort_by(f64::total_cmp);
        b.sort_by(f64::total_cmp);
        assert_eq!(a, b);
    }

    #[test]
    fn window_average_drops_partial_window() {
        let input = samples(&[(4.0, 40.0), (0.0, 0.0), (2.0, 20.0), (1.0, 10.0), (3.0, 30.0)]);
        let out = window_average(&input, 2).unwrap();
        assert_eq!(out, samples(&[(0.5, 5.0), (2.5, 25.0)]));
    }

    #[test]
    fn window_average_output_length_is_floor() {
        let input: Vec<Sample> = (0..3000).map(|i| Sample::new(i as f64 * 0.01, 1.0)).collect();
        for window in [1, 7, 30, 1000, 3000] {
            assert_eq!(window_average(&input, window).unwrap().len(), 3000 / window);
        }
    }

    #[test]
    fn window_average_constant_input_is_exact() {
        let input = vec![Sample::new(0.1, 0.7); 90];
        let out = window_average(&input, 30).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|s| *s == Sample::new(0.1, 0.7)));
    }

    #[test]
    fn window_average_rejects_bad_sizes() {
        let input = samples(&[(0.0, 0.0), (1.0, 1.0)]);
        assert!(matches!(
            window_average(&input, 0),
            Err(ReduceError::InvalidWindowSize { window: 0, len: 2 })
        ));
        assert!(matches!(
            window_average(&input, 3),
            Err(ReduceError::InvalidWindowSize { window: 3, len: 2 })
        ));
        assert!(window_average(&[], 1).is_err());
    }

    #[test]
    fn two_row_sheet_end_to_end() {
        let mut ds = sheet(
            &[(0.0, 10.0), (1.0, 12.0)],
            &[(0.0, 11.0), (1.0, 13.0)],
            &[(0.5, 20.0), (1.5, 22.0)],
        );
        ds.reduce(2).unwrap();

        // every set is offset by a constant, so corrected values are ±1
        // sorted: (0,-1) (0,-1) (0.5,-1) (1,1) (1,1) (1.5,1)
        assert_eq!(ds.stage(), ReductionStage::Averaged);
        assert_eq!(ds.combined_set.len(), 3);
        assert_eq!(ds.combined_set[0], Sample::new(0.0, -1.0));
        assert_eq!(ds.combined_set[1], Sample::new(0.75, 0.0));
        assert_eq!(ds.combined_set[2], Sample::new(1.25, 1.0));
    }
}
