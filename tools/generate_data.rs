//! Synthetic Dataset Generator
//!
//! Writes the seeded, labeled transaction dataset used for training.
//!
//! Usage: generate_data [output_path] [n_rows] [seed]

use anyhow::Context;
use fraud_scoring_service::{config::AppConfig, synthetic};
use std::path::PathBuf;
use tracing::info;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fraud_scoring_service=info".parse()?)
                .add_directive("generate_data=info".parse()?),
        )
        .init();

    let training = AppConfig::load()?.training;

    let args: Vec<String> = std::env::args().collect();
    let path = args.get(1).map(PathBuf::from).unwrap_or(training.data_path);
    let n_rows: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(training.n_rows);
    let seed: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(training.seed);

    info!(path = %path.display(), n_rows, seed, "Generating synthetic transactions");

    let rows = synthetic::generate(n_rows, seed).context("Failed to generate dataset")?;
    synthetic::write_csv(&path, &rows)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let frauds = rows.iter().filter(|r| r.target == 1).count();
    info!(
        "Saved {} ({} rows, {:.1}% fraud)",
        path.display(),
        rows.len(),
        100.0 * frauds as f64 / rows.len().max(1) as f64
    );

    Ok(())
}
