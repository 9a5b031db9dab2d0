//! Model Trainer
//!
//! Generates the dataset when missing, fits the preprocessing + random forest
//! pipeline, evaluates it on a held-out split and writes the artifacts the
//! service loads at startup.
//!
//! Usage: train_model [data_path] [output_dir]

use anyhow::Context;
use fraud_scoring_service::{config::AppConfig, training::Trainer};
use std::path::PathBuf;
use tracing::info;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fraud_scoring_service=info".parse()?)
                .add_directive("train_model=info".parse()?),
        )
        .init();

    let config = AppConfig::load()?;
    let mut training = config.training;

    let args: Vec<String> = std::env::args().collect();
    if let Some(path) = args.get(1) {
        training.data_path = PathBuf::from(path);
    }
    if let Some(dir) = args.get(2) {
        training.output_dir = PathBuf::from(dir);
    }

    info!(
        data = %training.data_path.display(),
        output = %training.output_dir.display(),
        n_estimators = training.n_estimators,
        seed = training.seed,
        "Starting training"
    );

    let report = Trainer::new(training, config.models.model_version)
        .run()
        .context("Training failed")?;

    info!(
        artifact_id = %report.artifact_id,
        train_rows = report.n_train,
        test_rows = report.n_test,
        "Model saved to {}",
        report.model_path.display()
    );
    info!("ROC AUC: {:.4}", report.metrics.roc_auc);

    Ok(())
}
