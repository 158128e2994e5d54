use thiserror::Error;

// ---------------------------------------------------------------------------
// Reduction errors
// ---------------------------------------------------------------------------

/// Failures of the per-sheet reduction and the cross-sheet matcher.
///
/// A missing cross-sheet match is not an error: it shows up as `None` in
/// the [`CurveMatrix`](crate::data::model::CurveMatrix).
#[derive(Debug, Error)]
pub enum ReduceError {
    /// Missing column, too few rows, or a non-numeric cell in the data range.
    #[error("malformed source for sheet {sheet}: {reason}")]
    MalformedSource { sheet: usize, reason: String },

    #[error("cannot combine sets of unequal length ({set_1}, {set_2}, {set_3})")]
    LengthMismatch {
        set_1: usize,
        set_2: usize,
        set_3: usize,
    },

    #[error("invalid window size {window} for {len} samples")]
    InvalidWindowSize { window: usize, len: usize },

    #[error("no sheets to match")]
    NoSheets,

    #[error("reference sheet has {available} points, {requested} curves requested")]
    NotEnoughReferencePoints { requested: usize, available: usize },

    #[error("sheet {sheet} has not been sorted (stage: {stage})")]
    UnsortedSheet { sheet: usize, stage: String },

    #[error("match tolerance must be positive and finite, got {0}")]
    InvalidEpsilon(f64),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ReduceError {
    pub fn malformed(sheet: usize, reason: impl Into<String>) -> Self {
        ReduceError::MalformedSource {
            sheet,
            reason: reason.into(),
        }
    }
}
