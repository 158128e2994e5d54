use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::model::{CurveMatrix, DataSheet, Sample};
use crate::error::ReduceError;

/// Default half-width of the matching window, in volts.
pub const DEFAULT_EPSILON: f64 = 0.2;

// ---------------------------------------------------------------------------
// Lookup strategies
// ---------------------------------------------------------------------------

/// Finds the first sample whose `x` lies in the open interval `(v - eps, v + eps)`.
pub trait MatchStrategy: Sync {
    fn first_in_range(&self, samples: &[Sample], v: f64, eps: f64) -> Option<Sample>;
}

/// Scan from the start; works on any ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearScan;

impl MatchStrategy for LinearScan {
    fn first_in_range(&self, samples: &[Sample], v: f64, eps: f64) -> Option<Sample> {
        samples
            .iter()
            .find(|s| s.x > v - eps && s.x < v + eps)
            .copied()
    }
}

/// Binary search for the lower edge of the window.
///
/// Requires `samples` sorted by `x` and free of NaN (a negative-sign NaN
/// sorts first under `total_cmp` and breaks the search); on such input it
/// returns the same sample as [`LinearScan`]. The loader rejects NaN cells.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortedSearch;

impl MatchStrategy for SortedSearch {
    fn first_in_range(&self, samples: &[Sample], v: f64, eps: f64) -> Option<Sample> {
        debug_assert!(samples.windows(2).all(|w| w[0].x.total_cmp(&w[1].x).is_le()));
        let lo = v - eps;
        let start = samples.partition_point(|s| s.x <= lo);
        samples.get(start).filter(|s| s.x < v + eps).copied()
    }
}

/// Strategy selector used by the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Linear,
    Sorted,
}

impl StrategyKind {
    pub fn strategy(self) -> &'static dyn MatchStrategy {
        match self {
            StrategyKind::Linear => &LinearScan,
            StrategyKind::Sorted => &SortedSearch,
        }
    }
}

// ---------------------------------------------------------------------------
// Curve assembly
// ---------------------------------------------------------------------------

/// Build the `n_curves × sheets.len()` curve matrix.
///
/// The first sheet is the reference: row `i` starts with the signal of its
/// `i`-th combined point, and column `j` holds the signal of the first point
/// of sheet `j` within `eps` of that point's voltage, or `None`.
pub fn build_curves(
    sheets: &[DataSheet],
    n_curves: usize,
    eps: f64,
    strategy: &dyn MatchStrategy,
) -> Result<CurveMatrix, ReduceError> {
    if !(eps.is_finite() && eps > 0.0) {
        return Err(ReduceError::InvalidEpsilon(eps));
    }
    let reference = sheets.first().ok_or(ReduceError::NoSheets)?;
    if let Some((sheet, ds)) = sheets.iter().enumerate().find(|(_, ds)| !ds.is_sorted()) {
        return Err(ReduceError::UnsortedSheet {
            sheet,
            stage: ds.stage().to_string(),
        });
    }
    if reference.combined_set.len() < n_curves {
        return Err(ReduceError::NotEnoughReferencePoints {
            requested: n_curves,
            available: reference.combined_set.len(),
        });
    }

    let anchors = &reference.combined_set[..n_curves];
    let build_row = |anchor: &Sample| -> Vec<Option<f64>> {
        std::iter::once(Some(anchor.y))
            .chain(sheets[1..].iter().map(|ds| {
                strategy
                    .first_in_range(&ds.combined_set, anchor.x, eps)
                    .map(|s| s.y)
            }))
            .collect()
    };

    #[cfg(feature = "parallel")]
    let rows: Vec<Vec<Option<f64>>> = {
        use rayon::prelude::*;
        anchors.par_iter().map(build_row).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<Vec<Option<f64>>> = anchors.iter().map(build_row).collect();

    let matrix = CurveMatrix::from_rows(rows, sheets.len());
    for (col, missing) in matrix.missing_per_column().into_iter().enumerate() {
        if missing > 0 {
            warn!("column {col}: {missing} of {n_curves} reference points unmatched within {eps}");
        }
    }
    debug!(
        "curve matrix {}x{}, {} unmatched cells",
        matrix.n_rows(),
        matrix.n_cols(),
        matrix.missing_count()
    );
    Ok(matrix)
}
