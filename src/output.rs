use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::data::model::CurveMatrix;

// ---------------------------------------------------------------------------
// Waterfall traces (what a plotter draws)
// ---------------------------------------------------------------------------

/// One curve of the waterfall: sheets spread over `x ∈ [0, 1]`, lifted by `offset`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaterfallTrace {
    pub x: Vec<f64>,
    /// Signal plus offset; `None` where the sheet had no match.
    pub y: Vec<Option<f64>>,
    pub offset: f64,
}

/// `n` evenly spaced points from 0 to 1 inclusive.
fn linspace01(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n).map(|i| i as f64 / (n - 1) as f64).collect(),
    }
}

/// Turn each matrix row into a trace; row `i` sits at `(n_rows - i) * spacing`.
pub fn waterfall_traces(matrix: &CurveMatrix, spacing: f64) -> Vec<WaterfallTrace> {
    let x = linspace01(matrix.n_cols());
    let n_rows = matrix.n_rows();

    matrix
        .rows()
        .take(n_rows)
        .enumerate()
        .map(|(i, row)| {
            let offset = (n_rows - i) as f64 * spacing;
            WaterfallTrace {
                x: x.clone(),
                y: row.iter().map(|c| c.map(|v| v + offset)).collect(),
                offset,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Write the matrix as CSV: header `sheet_0, sheet_1, ...`, empty cell for no match.
pub fn write_matrix_csv(matrix: &CurveMatrix, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let header: Vec<String> = (0..matrix.n_cols()).map(|j| format!("sheet_{j}")).collect();
    writer.write_record(&header).context("writing CSV header")?;

    for i in 0..matrix.n_rows() {
        let record: Vec<String> = matrix
            .row(i)
            .iter()
            .map(|c| c.map(|v| v.to_string()).unwrap_or_default())
            .collect();
        writer
            .write_record(&record)
            .with_context(|| format!("writing matrix row {i}"))?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

pub fn write_traces_json(traces: &[WaterfallTrace], path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), traces)
        .context("writing traces JSON")?;
    Ok(())
}
