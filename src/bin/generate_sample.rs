use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

/// Write synthetic scope sheets, one CSV per sheet, laid out like the lab exports.
#[derive(Debug, Parser)]
struct Args {
    /// Output directory (created if missing)
    #[arg(short, long, default_value = "sample_sheets")]
    out_dir: PathBuf,

    #[arg(short, long, default_value_t = 32)]
    sheets: usize,

    /// Data rows per sheet (row 0 holds labels)
    #[arg(short, long, default_value_t = 1000)]
    rows: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// SQUID-like periodic response to the bias voltage, shifted by flux bias.
fn response(volts: f64, flux_bias: f64) -> f64 {
    let phase = 2.0 * std::f64::consts::PI * (volts / 0.8 + flux_bias);
    0.5 * phase.sin().abs()
}

/// One channel pair: a noisy triangular sweep over ±2 V and its response.
fn channel_pair(
    rows: usize,
    phase: f64,
    flux_bias: f64,
    offset: f64,
    rng: &mut SimpleRng,
) -> Vec<(f64, f64)> {
    (0..rows)
        .map(|i| {
            let t = (i as f64 / rows as f64 + phase).fract();
            let sweep = if t < 0.5 { 4.0 * t - 1.0 } else { 3.0 - 4.0 * t };
            let volts = 2.0 * sweep + rng.gauss(0.0, 0.01);
            let signal = offset + response(volts, flux_bias) + rng.gauss(0.0, 0.02);
            (volts, signal)
        })
        .collect()
}

fn fmt(v: f64) -> String {
    format!("{v:.6}")
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    for sheet in 0..args.sheets {
        let flux_bias = sheet as f64 / args.sheets.max(1) as f64;
        // each channel has its own instrument offset
        let sets: Vec<Vec<(f64, f64)>> = (0..3)
            .map(|k| {
                let offset = rng.gauss(0.0, 0.3);
                channel_pair(args.rows, k as f64 / 3.0, flux_bias, offset, &mut rng)
            })
            .collect();

        let path = args.out_dir.join(format!("sheet_{sheet:03}.csv"));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("creating {}", path.display()))?;

        let header: Vec<String> = (0..13).map(|i| format!("Unnamed: {i}")).collect();
        writer.write_record(&header)?;

        let mut labels = vec![String::new(); 13];
        for (col, label) in [
            (1, "CH1 [V]"),
            (2, "CH2 [V]"),
            (4, "CH1 [V]"),
            (5, "CH2 [V]"),
            (7, "CH1 [V]"),
            (8, "CH2 [V]"),
            (9, "SRS gain"),
            (10, "distance"),
            (11, "resistance"),
            (12, "flux bias current"),
        ] {
            labels[col] = label.to_string();
        }
        writer.write_record(&labels)?;

        for i in 0..args.rows {
            let mut record = vec![String::new(); 13];
            record[0] = i.to_string();
            for (k, set) in sets.iter().enumerate() {
                record[1 + 3 * k] = fmt(set[i].0);
                record[2 + 3 * k] = fmt(set[i].1);
            }
            if i == 0 {
                record[9] = "100".to_string();
                record[10] = fmt(2.5);
                record[11] = fmt(50.0);
                record[12] = fmt(flux_bias);
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
    }

    println!(
        "Wrote {} sheets ({} rows each) to {}",
        args.sheets,
        args.rows,
        args.out_dir.display()
    );
    Ok(())
}
