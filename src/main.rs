mod config;
mod data;
mod error;
mod output;
mod pipeline;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;

use config::PipelineConfig;
use data::loader::SheetDirectory;
use data::matcher::StrategyKind;
use pipeline::PipelineRun;

/// Reduce oscilloscope sheets and assemble waterfall curves.
#[derive(Debug, Parser)]
#[command(name = "scope-waterfall", version, about)]
struct Cli {
    /// Directory with one .csv or .parquet file per sheet
    #[arg(short, long)]
    input: PathBuf,

    /// Curve matrix CSV to write
    #[arg(short, long, default_value = "curves.csv")]
    output: PathBuf,

    /// Optional JSON file for the offset waterfall traces
    #[arg(long)]
    traces: Option<PathBuf>,

    /// JSON pipeline configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    sheet_count: Option<usize>,

    #[arg(long)]
    window_size: Option<usize>,

    #[arg(long)]
    n_curves: Option<usize>,

    #[arg(long)]
    epsilon: Option<f64>,

    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<StrategyKind>,
}

fn parse_strategy(s: &str) -> Result<StrategyKind, String> {
    match s {
        "linear" => Ok(StrategyKind::Linear),
        "sorted" => Ok(StrategyKind::Sorted),
        other => Err(format!("unknown strategy '{other}' (expected linear or sorted)")),
    }
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(v) = self.sheet_count {
            config.sheet_count = v;
        }
        if let Some(v) = self.window_size {
            config.window_size = v;
        }
        if let Some(v) = self.n_curves {
            config.n_curves = v;
        }
        if let Some(v) = self.epsilon {
            config.epsilon = v;
        }
        if let Some(v) = self.strategy {
            config.strategy = v;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Excluded sheets and unmatched points are reported at warn level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = cli.pipeline_config()?;

    let source = SheetDirectory::open(&cli.input)?;
    let run = PipelineRun::load(&source, &config);
    if run.sheets.is_empty() {
        bail!("no sheet in {} could be reduced", cli.input.display());
    }

    info!("matrix columns are source sheets {:?}", run.sheet_indices);
    let matrix = run.curves(&config).context("building curve matrix")?;
    output::write_matrix_csv(&matrix, &cli.output)?;
    info!(
        "wrote {}x{} curve matrix to {} ({} unmatched cells)",
        matrix.n_rows(),
        matrix.n_cols(),
        cli.output.display(),
        matrix.missing_count()
    );

    if let Some(path) = &cli.traces {
        let traces = output::waterfall_traces(&matrix, config.waterfall_spacing);
        output::write_traces_json(&traces, path)?;
        info!("wrote {} waterfall traces to {}", traces.len(), path.display());
    }
    Ok(())
}
