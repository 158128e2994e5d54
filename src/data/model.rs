use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Sample – one captured (voltage, signal) pair
// ---------------------------------------------------------------------------

/// One oscilloscope reading: channel 1 (independent) and channel 2 (dependent).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
}

impl Sample {
    pub const fn new(x: f64, y: f64) -> Self {
        Sample { x, y }
    }
}

impl From<(f64, f64)> for Sample {
    fn from((x, y): (f64, f64)) -> Self {
        Sample { x, y }
    }
}

// ---------------------------------------------------------------------------
// SetupParameters – scalar settings captured once per sheet
// ---------------------------------------------------------------------------

/// Instrument setup recorded alongside a run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SetupParameters {
    pub srs_gain: f64,
    pub distance: f64,
    pub resistance: f64,
    pub flux_bias_current: f64,
}

impl SetupParameters {
    /// Semantic key names, in the order they appear on the sheet.
    pub const KEYS: [&'static str; 4] = ["srs gain", "distance", "resistance", "flux bias current"];

    /// Look a parameter up by its semantic key.
    pub fn get(&self, key: &str) -> Option<f64> {
        match key {
            "srs gain" => Some(self.srs_gain),
            "distance" => Some(self.distance),
            "resistance" => Some(self.resistance),
            "flux bias current" => Some(self.flux_bias_current),
            _ => None,
        }
    }

    pub fn as_map(&self) -> BTreeMap<&'static str, f64> {
        Self::KEYS
            .iter()
            .filter_map(|&k| self.get(k).map(|v| (k, v)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// ReductionStage – how far a sheet has been processed
// ---------------------------------------------------------------------------

/// Processing stage of a [`DataSheet`]. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReductionStage {
    Loaded,
    Corrected,
    Combined,
    Sorted,
    Averaged,
}

impl fmt::Display for ReductionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReductionStage::Loaded => "loaded",
            ReductionStage::Corrected => "corrected",
            ReductionStage::Combined => "combined",
            ReductionStage::Sorted => "sorted",
            ReductionStage::Averaged => "averaged",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// DataSheet – one measurement run
// ---------------------------------------------------------------------------

/// The three channel-pair sets of one run plus its setup parameters.
///
/// `combined_set` stays empty until [`DataSheet::combine_sets`] is called.
#[derive(Debug, Clone)]
pub struct DataSheet {
    pub description: String,
    pub set_1: Vec<Sample>,
    pub set_2: Vec<Sample>,
    pub set_3: Vec<Sample>,
    pub setup: SetupParameters,
    pub combined_set: Vec<Sample>,
    pub(crate) stage: ReductionStage,
}

impl DataSheet {
    pub fn new(
        description: impl Into<String>,
        set_1: Vec<Sample>,
        set_2: Vec<Sample>,
        set_3: Vec<Sample>,
        setup: SetupParameters,
    ) -> Self {
        DataSheet {
            description: description.into(),
            set_1,
            set_2,
            set_3,
            setup,
            combined_set: Vec::new(),
            stage: ReductionStage::Loaded,
        }
    }

    pub fn stage(&self) -> ReductionStage {
        self.stage
    }

    /// Whether `combined_set` is known to be ordered by `x`.
    pub fn is_sorted(&self) -> bool {
        self.stage >= ReductionStage::Sorted
    }
}

// ---------------------------------------------------------------------------
// CurveMatrix – reference points × sheets
// ---------------------------------------------------------------------------

/// Row-major matrix of matched signal values.
///
/// `None` marks a sheet where no point fell inside the tolerance window.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveMatrix {
    n_rows: usize,
    n_cols: usize,
    cells: Vec<Option<f64>>,
}

impl CurveMatrix {
    /// Assemble from rows that all have `n_cols` entries.
    pub fn from_rows(rows: Vec<Vec<Option<f64>>>, n_cols: usize) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == n_cols));
        let n_rows = rows.len();
        let cells = rows.into_iter().flatten().collect();
        CurveMatrix {
            n_rows,
            n_cols,
            cells,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.n_rows || col >= self.n_cols {
            return None;
        }
        self.cells[row * self.n_cols + col]
    }

    pub fn row(&self, row: usize) -> &[Option<f64>] {
        let start = row * self.n_cols;
        &self.cells[start..start + self.n_cols]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Option<f64>]> {
        // chunks() panics on zero; an empty-column matrix has no rows anyway.
        self.cells.chunks(self.n_cols.max(1))
    }

    /// Number of cells without a match.
    pub fn missing_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_none()).count()
    }

    /// Unmatched cells per sheet column.
    pub fn missing_per_column(&self) -> Vec<usize> {
        (0..self.n_cols)
            .map(|col| {
                (0..self.n_rows)
                    .filter(|&row| self.get(row, col).is_none())
                    .count()
            })
            .collect()
    }
}
