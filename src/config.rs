//! Pipeline parameters, loadable from JSON.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::loader::{ColumnMap, RowRange};
use crate::data::matcher::{DEFAULT_EPSILON, StrategyKind};
use crate::error::ReduceError;

/// Everything the reduction and matching steps need, passed explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of sheets to load from the source.
    #[serde(default = "default_sheet_count")]
    pub sheet_count: usize,

    /// Samples per averaging window.
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Reference points (rows of the curve matrix).
    #[serde(default = "default_n_curves")]
    pub n_curves: usize,

    /// Half-width of the voltage matching window.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    /// First data row; rows before it are labels.
    #[serde(default = "default_first_row")]
    pub first_row: usize,

    #[serde(default = "default_row_count")]
    pub row_count: usize,

    #[serde(default)]
    pub strategy: StrategyKind,

    /// Vertical gap between consecutive waterfall traces.
    #[serde(default = "default_waterfall_spacing")]
    pub waterfall_spacing: f64,

    #[serde(default)]
    pub columns: ColumnMap,
}

fn default_sheet_count() -> usize {
    32
}

fn default_window_size() -> usize {
    30
}

fn default_n_curves() -> usize {
    100
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_first_row() -> usize {
    1
}

fn default_row_count() -> usize {
    1000
}

fn default_waterfall_spacing() -> f64 {
    0.1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sheet_count: default_sheet_count(),
            window_size: default_window_size(),
            n_curves: default_n_curves(),
            epsilon: default_epsilon(),
            first_row: default_first_row(),
            row_count: default_row_count(),
            strategy: StrategyKind::default(),
            waterfall_spacing: default_waterfall_spacing(),
            columns: ColumnMap::default(),
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file; missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&text).context("parsing config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReduceError> {
        if self.sheet_count == 0 {
            return Err(ReduceError::Config("sheet_count must be at least 1".into()));
        }
        if self.window_size == 0 {
            return Err(ReduceError::Config("window_size must be at least 1".into()));
        }
        if self.n_curves == 0 {
            return Err(ReduceError::Config("n_curves must be at least 1".into()));
        }
        if self.row_count == 0 {
            return Err(ReduceError::Config("row_count must be at least 1".into()));
        }
        if self.row_range().end().is_none() {
            return Err(ReduceError::Config("first_row + row_count overflows".into()));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(ReduceError::InvalidEpsilon(self.epsilon));
        }
        if !self.waterfall_spacing.is_finite() {
            return Err(ReduceError::Config("waterfall_spacing must be finite".into()));
        }
        Ok(())
    }

    pub fn row_range(&self) -> RowRange {
        RowRange {
            first_row: self.first_row,
            row_count: self.row_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.window_size, 30);
        assert_eq!(config.n_curves, 100);
        assert_eq!(config.epsilon, 0.2);
        assert_eq!(config.row_range(), RowRange::default());
        assert_eq!(config.columns.flux_bias_current, "Unnamed: 12");
    }

    #[test]
    fn partial_json_overrides() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{ "window_size": 10, "strategy": "sorted", "columns": { "distance": "dist" } }"#,
        )
        .unwrap();
        assert_eq!(config.window_size, 10);
        assert_eq!(config.strategy, StrategyKind::Sorted);
        assert_eq!(config.columns.distance, "dist");
        assert_eq!(config.columns.set_1_chan_1, "Unnamed: 1");
    }

    #[test]
    fn validate_rejects_zero_and_bad_epsilon() {
        let mut config = PipelineConfig {
            window_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.window_size = 5;
        config.epsilon = -1.0;
        assert!(matches!(config.validate(), Err(ReduceError::InvalidEpsilon(_))));

        config.epsilon = 0.2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_overflowing_row_range() {
        let config = PipelineConfig {
            row_count: usize::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ReduceError::Config(_))));
    }

    #[test]
    fn from_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "sheet_count": 4, "epsilon": 0.05 }"#).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.sheet_count, 4);
        assert_eq!(config.epsilon, 0.05);

        std::fs::write(&path, r#"{ "n_curves": 0 }"#).unwrap();
        assert!(PipelineConfig::from_file(&path).is_err());
    }
}
