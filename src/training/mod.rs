//! Offline training: dataset preparation, model fitting, evaluation and
//! artifact persistence.

pub mod evaluation;

use crate::config::TrainingConfig;
use crate::error::TrainingError;
use crate::models::forest::RandomForest;
use crate::models::pipeline::{ClassifierPipeline, ModelMetadata};
use crate::preprocessor::{FeatureOrigin, Preprocessor};
use crate::synthetic::{self, LabeledTransaction};
use crate::types::transaction::Transaction;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

pub use evaluation::{roc_auc, ClassMetrics, ClassificationReport};

pub const MODEL_FILE: &str = "model.json";
pub const FEATURE_NAMES_FILE: &str = "feature_names.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const REFERENCE_SAMPLE_FILE: &str = "train_sample.csv";

/// Contents of `metrics.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationMetrics {
    pub roc_auc: f64,
    pub report: ClassificationReport,
}

/// Outcome of a training run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub artifact_id: Uuid,
    pub n_train: usize,
    pub n_test: usize,
    pub metrics: EvaluationMetrics,
    pub model_path: PathBuf,
}

/// Stratified train/test split.
///
/// Each class contributes `round(test_size * class_count)` rows to the test
/// set. Both index lists are returned in ascending order.
pub fn stratified_split(targets: &[u8], test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(targets.len());
    let mut test = Vec::new();

    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = (0..targets.len()).filter(|&i| targets[i] == class).collect();
        members.shuffle(&mut rng);
        let n_test = ((members.len() as f64) * test_size.clamp(0.0, 1.0)).round() as usize;
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Runs the full training pipeline from a [`TrainingConfig`].
pub struct Trainer {
    config: TrainingConfig,
    model_version: String,
}

impl Trainer {
    pub fn new(config: TrainingConfig, model_version: impl Into<String>) -> Self {
        Self {
            config,
            model_version: model_version.into(),
        }
    }

    /// Read the dataset, generating and writing it first when missing.
    pub fn ensure_data(&self) -> Result<Vec<LabeledTransaction>, TrainingError> {
        let path = &self.config.data_path;
        if path.exists() {
            let rows = synthetic::read_csv(path)?;
            info!(path = %path.display(), rows = rows.len(), "Dataset loaded");
            return Ok(rows);
        }

        info!(path = %path.display(), "Dataset missing, generating");
        let rows = synthetic::generate(self.config.n_rows, self.config.seed)?;
        synthetic::write_csv(path, &rows)?;
        Ok(rows)
    }

    /// Prepare data, fit, evaluate and persist every artifact.
    pub fn run(&self) -> Result<TrainingReport, TrainingError> {
        let rows = self.ensure_data()?;
        let (pipeline, train_idx, metrics) = self.fit(&rows)?;

        let sample: Vec<&Transaction> = self.reference_sample(&rows, &train_idx);
        let model_path = self.persist(&pipeline, &metrics, &sample)?;

        Ok(TrainingReport {
            artifact_id: pipeline.metadata.artifact_id,
            n_train: train_idx.len(),
            n_test: rows.len() - train_idx.len(),
            metrics,
            model_path,
        })
    }

    /// Fit the pipeline on a stratified split and evaluate it on the held-out
    /// rows. Returns the pipeline, the training indices and the metrics.
    pub fn fit(
        &self,
        rows: &[LabeledTransaction],
    ) -> Result<(ClassifierPipeline, Vec<usize>, EvaluationMetrics), TrainingError> {
        if rows.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }

        let targets: Vec<u8> = rows.iter().map(|r| r.target).collect();
        let (train_idx, test_idx) = stratified_split(&targets, self.config.test_size, self.config.seed);
        info!(train = train_idx.len(), test = test_idx.len(), "Stratified split");

        let train_rows: Vec<Vec<f64>> = train_idx.iter().map(|&i| rows[i].transaction.to_row()).collect();
        let preprocessor = Preprocessor::fit(&train_rows);
        let x: Vec<Vec<f64>> = train_rows.iter().map(|r| preprocessor.transform_row(r)).collect();
        let y: Vec<u8> = train_idx.iter().map(|&i| targets[i]).collect();

        let params = self.config.forest_params();
        let start = Instant::now();
        let forest = RandomForest::fit(&x, &y, &params)?;
        info!(
            trees = forest.n_trees(),
            features = forest.n_features(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Random forest fitted"
        );

        let feature_map = preprocessor.feature_names_out();
        let mut pipeline = ClassifierPipeline {
            metadata: ModelMetadata {
                artifact_id: Uuid::new_v4(),
                model_version: self.model_version.clone(),
                trained_at: Utc::now(),
                seed: self.config.seed,
                n_training_rows: train_idx.len(),
                roc_auc: 0.0,
            },
            preprocessor,
            forest,
            feature_map,
        };

        let y_test: Vec<u8> = test_idx.iter().map(|&i| targets[i]).collect();
        let scores: Vec<f64> = test_idx
            .iter()
            .map(|&i| pipeline.predict_proba(&rows[i].transaction))
            .collect();
        let metrics = EvaluationMetrics {
            roc_auc: roc_auc(&y_test, &scores),
            report: ClassificationReport::from_scores(&y_test, &scores),
        };
        pipeline.metadata.roc_auc = metrics.roc_auc;

        info!(roc_auc = metrics.roc_auc, "Held-out evaluation");
        info!("Classification report:\n{}", metrics.report);

        Ok((pipeline, train_idx, metrics))
    }

    /// Seeded sample of training rows used as the LIME background.
    fn reference_sample<'a>(&self, rows: &'a [LabeledTransaction], train_idx: &[usize]) -> Vec<&'a Transaction> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let n = self.config.reference_sample_size.min(train_idx.len());
        train_idx
            .choose_multiple(&mut rng, n)
            .map(|&i| &rows[i].transaction)
            .collect()
    }

    fn persist(
        &self,
        pipeline: &ClassifierPipeline,
        metrics: &EvaluationMetrics,
        sample: &[&Transaction],
    ) -> Result<PathBuf, TrainingError> {
        let dir = &self.config.output_dir;
        fs::create_dir_all(dir)?;

        let model_path = dir.join(MODEL_FILE);
        serde_json::to_writer(BufWriter::new(File::create(&model_path)?), pipeline)?;

        let names: Vec<FeatureOrigin> = pipeline.feature_map.clone().unwrap_or_default();
        write_pretty(&dir.join(FEATURE_NAMES_FILE), &names)?;
        write_pretty(&dir.join(METRICS_FILE), metrics)?;

        let mut writer = csv::Writer::from_path(dir.join(REFERENCE_SAMPLE_FILE))?;
        for tx in sample {
            writer.serialize(tx)?;
        }
        writer.flush()?;

        info!(
            dir = %dir.display(),
            artifact_id = %pipeline.metadata.artifact_id,
            reference_rows = sample.len(),
            "Artifacts saved"
        );
        Ok(model_path)
    }
}

fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), TrainingError> {
    serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), value)?;
    Ok(())
}
