use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, AsArray, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::DataType;
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};

use super::model::{DataSheet, Sample, SetupParameters};
use crate::error::ReduceError;

// ---------------------------------------------------------------------------
// RawTable – what a sheet source hands to the core
// ---------------------------------------------------------------------------

/// A sheet as a grid of optional numbers under named columns.
///
/// Row 0 is the first row after the header line; on the scope exports it
/// holds units/labels and is never read as data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell lookup; ragged rows read as empty past their end.
    pub fn cell(&self, row: usize, col: usize) -> Option<f64> {
        self.rows.get(row).and_then(|r| r.get(col).copied().flatten())
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }
}

// ---------------------------------------------------------------------------
// Column mapping and row range
// ---------------------------------------------------------------------------

/// Physical column names for each semantic column of a sheet.
///
/// Defaults are the names pandas gives the unlabelled scope export columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub set_1_chan_1: String,
    pub set_1_chan_2: String,
    pub set_2_chan_1: String,
    pub set_2_chan_2: String,
    pub set_3_chan_1: String,
    pub set_3_chan_2: String,
    pub srs_gain: String,
    pub distance: String,
    pub resistance: String,
    pub flux_bias_current: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        let unnamed = |i: u32| format!("Unnamed: {i}");
        ColumnMap {
            set_1_chan_1: unnamed(1),
            set_1_chan_2: unnamed(2),
            set_2_chan_1: unnamed(4),
            set_2_chan_2: unnamed(5),
            set_3_chan_1: unnamed(7),
            set_3_chan_2: unnamed(8),
            srs_gain: unnamed(9),
            distance: unnamed(10),
            resistance: unnamed(11),
            flux_bias_current: unnamed(12),
        }
    }
}

impl ColumnMap {
    /// (semantic name, physical name) for every mapped column.
    pub fn entries(&self) -> [(&'static str, &str); 10] {
        [
            ("set 1 chan 1", self.set_1_chan_1.as_str()),
            ("set 1 chan 2", self.set_1_chan_2.as_str()),
            ("set 2 chan 1", self.set_2_chan_1.as_str()),
            ("set 2 chan 2", self.set_2_chan_2.as_str()),
            ("set 3 chan 1", self.set_3_chan_1.as_str()),
            ("set 3 chan 2", self.set_3_chan_2.as_str()),
            ("srs gain", self.srs_gain.as_str()),
            ("distance", self.distance.as_str()),
            ("resistance", self.resistance.as_str()),
            ("flux bias current", self.flux_bias_current.as_str()),
        ]
    }
}

/// Inclusive data row range: `first_row ..= first_row + row_count - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub first_row: usize,
    pub row_count: usize,
}

impl Default for RowRange {
    fn default() -> Self {
        RowRange {
            first_row: 1,
            row_count: 1000,
        }
    }
}

impl RowRange {
    /// One past the last data row; `None` if that overflows.
    pub fn end(&self) -> Option<usize> {
        self.first_row.checked_add(self.row_count)
    }
}

// ---------------------------------------------------------------------------
// RawTable → DataSheet
// ---------------------------------------------------------------------------

/// Build a [`DataSheet`] from a raw table.
///
/// Every mapped column must exist and every cell in the row range must be
/// numeric; setup parameters come from `rows.first_row` only.
pub fn load_sheet(
    table: &RawTable,
    columns: &ColumnMap,
    rows: RowRange,
    sheet: usize,
    source_label: &str,
) -> Result<DataSheet, ReduceError> {
    let mut idx = [0usize; 10];
    for (slot, (semantic, physical)) in idx.iter_mut().zip(columns.entries()) {
        *slot = table.column_index(physical).ok_or_else(|| {
            ReduceError::malformed(sheet, format!("missing column '{physical}' ({semantic})"))
        })?;
    }

    let end = rows.end().ok_or_else(|| {
        ReduceError::malformed(
            sheet,
            format!("row range {} + {} overflows", rows.first_row, rows.row_count),
        )
    })?;
    if table.n_rows() < end {
        return Err(ReduceError::malformed(
            sheet,
            format!(
                "need rows {}..={} but table has {} rows",
                rows.first_row,
                end - 1,
                table.n_rows()
            ),
        ));
    }

    let cell = |row: usize, col: usize| -> Result<f64, ReduceError> {
        table.cell(row, col).filter(|v| v.is_finite()).ok_or_else(|| {
            ReduceError::malformed(
                sheet,
                format!("row {row}, column '{}' is empty or not a number", table.headers[col]),
            )
        })
    };

    let mut sets: [Vec<Sample>; 3] = Default::default();
    for set in &mut sets {
        set.reserve(rows.row_count);
    }
    for row in rows.first_row..end {
        for (k, set) in sets.iter_mut().enumerate() {
            set.push(Sample::new(cell(row, idx[2 * k])?, cell(row, idx[2 * k + 1])?));
        }
    }

    let setup = SetupParameters {
        srs_gain: cell(rows.first_row, idx[6])?,
        distance: cell(rows.first_row, idx[7])?,
        resistance: cell(rows.first_row, idx[8])?,
        flux_bias_current: cell(rows.first_row, idx[9])?,
    };

    let [set_1, set_2, set_3] = sets;
    debug!("sheet {sheet}: loaded {} rows per set", set_1.len());
    Ok(DataSheet::new(
        format!("From \"{source_label}\", sheet number {sheet}"),
        set_1,
        set_2,
        set_3,
        setup,
    ))
}

// ---------------------------------------------------------------------------
// Sheet sources
// ---------------------------------------------------------------------------

/// Anything that can hand out sheets as raw tables by index.
pub trait SheetSource {
    /// Label used in sheet descriptions.
    fn label(&self) -> &str;

    fn sheet_count(&self) -> usize;

    fn read_table(&self, index: usize) -> Result<RawTable>;
}

/// In-memory sheets for tests.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pub label: String,
    pub tables: Vec<RawTable>,
}

#[cfg(test)]
impl SheetSource for MemorySource {
    fn label(&self) -> &str {
        &self.label
    }

    fn sheet_count(&self) -> usize {
        self.tables.len()
    }

    fn read_table(&self, index: usize) -> Result<RawTable> {
        self.tables
            .get(index)
            .cloned()
            .with_context(|| format!("no sheet {index} (have {})", self.tables.len()))
    }
}

/// A directory holding one `.csv` or `.parquet` file per sheet.
///
/// Sheet `i` is the `i`-th file in file-name order. Files are only read
/// when their sheet is requested.
#[derive(Debug, Clone)]
pub struct SheetDirectory {
    label: String,
    files: Vec<PathBuf>,
}

impl SheetDirectory {
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("reading sheet directory {}", dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.context("listing sheet directory")?.path();
            if path.is_file() && is_table_file(&path) {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            bail!("no .csv or .parquet files in {}", dir.display());
        }
        info!("opened {} with {} sheet files", dir.display(), files.len());

        Ok(SheetDirectory {
            label: dir.display().to_string(),
            files,
        })
    }
}

impl SheetSource for SheetDirectory {
    fn label(&self) -> &str {
        &self.label
    }

    fn sheet_count(&self) -> usize {
        self.files.len()
    }

    fn read_table(&self, index: usize) -> Result<RawTable> {
        let path = self
            .files
            .get(index)
            .with_context(|| format!("no sheet {index} in {}", self.label))?;
        load_table(path)
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn is_table_file(path: &Path) -> bool {
    matches!(extension(path).as_str(), "csv" | "parquet" | "pq")
}

/// Load one sheet file. Dispatch by extension.
pub fn load_table(path: &Path) -> Result<RawTable> {
    match extension(path).as_str() {
        "parquet" | "pq" => load_parquet(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, then one record per sheet row.
/// Cells that are empty or not numbers become `None`.
fn load_csv(path: &Path) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening CSV {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        rows.push(record.iter().map(parse_cell).collect());
    }

    debug!("{}: {} columns, {} rows", path.display(), headers.len(), rows.len());
    Ok(RawTable { headers, rows })
}

/// "NaN" and "inf" parse as floats but are not measurements.
fn parse_cell(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file holding one sheet.
///
/// Numeric columns (Float64/Float32/Int32/Int64) map directly; string
/// columns are parsed cell by cell (pandas writes a column holding a text
/// label in row 0 as strings). Anything else reads as empty.
fn load_parquet(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening parquet file {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut rows: Vec<Vec<Option<f64>>> = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let columns: Vec<Vec<Option<f64>>> =
            batch.columns().iter().map(extract_cells).collect();

        for row in 0..batch.num_rows() {
            rows.push(columns.iter().map(|c| c[row]).collect());
        }
    }

    debug!("{}: {} columns, {} rows", path.display(), headers.len(), rows.len());
    Ok(RawTable { headers, rows })
}

// -- Parquet / Arrow helpers --

/// Convert one Arrow column to optional floats.
fn extract_cells(col: &Arc<dyn Array>) -> Vec<Option<f64>> {
    let n = col.len();
    match col.data_type() {
        DataType::Float64 => match col.as_any().downcast_ref::<Float64Array>() {
            Some(arr) => arr.iter().map(|v| v.filter(|f| f.is_finite())).collect(),
            None => vec![None; n],
        },
        DataType::Float32 => match col.as_any().downcast_ref::<Float32Array>() {
            Some(arr) => arr
                .iter()
                .map(|v| v.map(f64::from).filter(|f| f.is_finite()))
                .collect(),
            None => vec![None; n],
        },
        DataType::Int32 => match col.as_any().downcast_ref::<Int32Array>() {
            Some(arr) => arr.iter().map(|v| v.map(f64::from)).collect(),
            None => vec![None; n],
        },
        DataType::Int64 => match col.as_any().downcast_ref::<Int64Array>() {
            Some(arr) => arr.iter().map(|v| v.map(|i| i as f64)).collect(),
            None => vec![None; n],
        },
        DataType::Utf8 => match col.as_any().downcast_ref::<StringArray>() {
            Some(arr) => arr.iter().map(|v| v.and_then(parse_cell)).collect(),
            None => vec![None; n],
        },
        DataType::LargeUtf8 => col
            .as_string::<i64>()
            .iter()
            .map(|v| v.and_then(parse_cell))
            .collect(),
        _ => vec![None; n],
    }
}
