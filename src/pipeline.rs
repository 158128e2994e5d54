use log::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::data::loader::{SheetSource, load_sheet};
use crate::data::matcher::build_curves;
use crate::data::model::{CurveMatrix, DataSheet};
use crate::error::ReduceError;

// ---------------------------------------------------------------------------
// Pipeline run state
// ---------------------------------------------------------------------------

/// A sheet that was dropped, and why.
#[derive(Debug, Clone)]
pub struct ExcludedSheet {
    pub index: usize,
    pub reason: String,
}

/// Reduced sheets of one run, independent of any output format.
#[derive(Debug, Default)]
pub struct PipelineRun {
    /// Sheets that made it through reduction, in source order.
    pub sheets: Vec<DataSheet>,

    /// Source index of each entry in `sheets`.
    pub sheet_indices: Vec<usize>,

    pub excluded: Vec<ExcludedSheet>,
}

impl PipelineRun {
    /// Load and reduce up to `config.sheet_count` sheets.
    ///
    /// A sheet that fails to load or reduce is excluded and logged; the
    /// others carry on.
    pub fn load(source: &dyn SheetSource, config: &PipelineConfig) -> Self {
        let available = source.sheet_count();
        let count = config.sheet_count.min(available);
        if count < config.sheet_count {
            warn!(
                "{} has {available} sheets, {} requested",
                source.label(),
                config.sheet_count
            );
        }

        let mut run = PipelineRun::default();
        for index in 0..count {
            match reduce_one(source, config, index) {
                Ok(sheet) => {
                    run.sheets.push(sheet);
                    run.sheet_indices.push(index);
                }
                Err(err) => {
                    let excluded = ExcludedSheet {
                        index,
                        reason: format!("{err:#}"),
                    };
                    warn!("excluding sheet {}: {}", excluded.index, excluded.reason);
                    run.excluded.push(excluded);
                }
            }
        }

        info!(
            "reduced {} of {count} sheets ({} excluded)",
            run.sheets.len(),
            run.excluded.len()
        );
        run
    }

    /// Cross-reference the reduced sheets into a curve matrix.
    pub fn curves(&self, config: &PipelineConfig) -> Result<CurveMatrix, ReduceError> {
        build_curves(
            &self.sheets,
            config.n_curves,
            config.epsilon,
            config.strategy.strategy(),
        )
    }
}

fn reduce_one(
    source: &dyn SheetSource,
    config: &PipelineConfig,
    index: usize,
) -> anyhow::Result<DataSheet> {
    let table = source.read_table(index)?;
    let mut sheet = load_sheet(&table, &config.columns, config.row_range(), index, source.label())?;
    debug!("sheet {index} setup: {:?}", sheet.setup.as_map());
    sheet.reduce(config.window_size)?;
    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::{ColumnMap, MemorySource, RawTable};

    /// Sheet table with voltages `offset + i * step` on every set.
    fn table(rows: usize, offset: f64, step: f64) -> RawTable {
        let columns = ColumnMap::default();
        let headers: Vec<String> = columns.entries().iter().map(|(_, p)| p.to_string()).collect();
        let mut data = vec![vec![None; headers.len()]];
        for i in 0..rows {
            let v = offset + i as f64 * step;
            let s = (i % 4) as f64;
            data.push(vec![
                Some(v),
                Some(s + 1.0),
                Some(v),
                Some(s + 2.0),
                Some(v),
                Some(s + 3.0),
                Some(10.0),
                Some(1.0),
                Some(50.0),
                Some(offset),
            ]);
        }
        RawTable { headers, rows: data }
    }

    fn config(sheet_count: usize) -> PipelineConfig {
        PipelineConfig {
            sheet_count,
            window_size: 3,
            n_curves: 5,
            row_count: 20,
            ..Default::default()
        }
    }

    #[test]
    fn reduces_every_sheet_and_builds_matrix() {
        let source = MemorySource {
            label: "mem".into(),
            tables: vec![table(20, 0.0, 0.1), table(20, 0.05, 0.1), table(20, 0.0, 0.1)],
        };
        let run = PipelineRun::load(&source, &config(3));

        assert_eq!(run.sheets.len(), 3);
        assert!(run.excluded.is_empty());
        // 3 * 20 combined points averaged in windows of 3
        assert!(run.sheets.iter().all(|s| s.combined_set.len() == 20));
        assert_eq!(run.sheets[1].setup.flux_bias_current, 0.05);
        assert_eq!(run.sheets[2].description, "From \"mem\", sheet number 2");

        let m = run.curves(&config(3)).unwrap();
        assert_eq!((m.n_rows(), m.n_cols()), (5, 3));
        assert_eq!(m.missing_count(), 0);
    }

    #[test]
    fn malformed_sheet_is_excluded() {
        let source = MemorySource {
            label: "mem".into(),
            tables: vec![table(20, 0.0, 0.1), table(5, 0.0, 0.1), table(20, 0.0, 0.1)],
        };
        let run = PipelineRun::load(&source, &config(3));

        assert_eq!(run.sheet_indices, vec![0, 2]);
        assert_eq!(run.excluded.len(), 1);
        assert_eq!(run.excluded[0].index, 1);
        assert!(run.excluded[0].reason.contains("malformed"));
    }

    #[test]
    fn requesting_more_sheets_than_available_loads_what_exists() {
        let source = MemorySource {
            label: "mem".into(),
            tables: vec![table(20, 0.0, 0.1)],
        };
        let run = PipelineRun::load(&source, &config(8));
        assert_eq!(run.sheets.len(), 1);
        assert!(run.excluded.is_empty());
    }

    #[test]
    fn far_apart_sheets_leave_missing_cells() {
        let source = MemorySource {
            label: "mem".into(),
            tables: vec![table(20, 0.0, 0.1), table(20, 100.0, 0.1)],
        };
        let run = PipelineRun::load(&source, &config(2));
        let m = run.curves(&config(2)).unwrap();
        assert_eq!(m.missing_count(), 5);
        assert!(m.rows().all(|r| r[0].is_some() && r[1].is_none()));
    }
}
