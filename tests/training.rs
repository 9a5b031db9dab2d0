//! Offline pipeline tests: generation, fitting, evaluation and artifacts

mod common;

use common::{dataset, small_training_config, SEED};
use fraud_scoring_service::{
    config::TrainingConfig,
    models::loader::ModelLoader,
    synthetic,
    training::{Trainer, FEATURE_NAMES_FILE, METRICS_FILE, MODEL_FILE, REFERENCE_SAMPLE_FILE},
};
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

fn artifact_config(dir: &TempDir) -> TrainingConfig {
    TrainingConfig {
        data_path: dir.path().join("data").join("transactions.csv"),
        output_dir: dir.path().join("artifacts"),
        n_rows: 1500,
        n_estimators: 10,
        reference_sample_size: 100,
        seed: SEED,
        ..TrainingConfig::default()
    }
}

#[test]
fn test_seeded_training_is_reproducible() {
    let a = synthetic::generate(800, 7).unwrap();
    let b = synthetic::generate(800, 7).unwrap();
    assert_eq!(a, b);

    let config = TrainingConfig {
        n_estimators: 8,
        seed: 7,
        ..TrainingConfig::default()
    };
    let (first, train_a, metrics_a) = Trainer::new(config.clone(), "1.0.0").fit(&a).unwrap();
    let (second, train_b, metrics_b) = Trainer::new(config, "1.0.0").fit(&b).unwrap();

    assert_eq!(train_a, train_b);
    assert_eq!(first.forest, second.forest);
    assert_eq!(metrics_a.roc_auc, metrics_b.roc_auc);
    assert_ne!(first.metadata.artifact_id, second.metadata.artifact_id);
}

#[test]
fn test_model_separates_classes() {
    let (pipeline, train_idx, metrics) = Trainer::new(small_training_config(), "1.0.0")
        .fit(dataset())
        .unwrap();

    assert!(metrics.roc_auc > 0.7, "roc_auc {}", metrics.roc_auc);
    assert_eq!(pipeline.metadata.roc_auc, metrics.roc_auc);
    assert_eq!(pipeline.metadata.n_training_rows, train_idx.len());
    let n_test = metrics.report.legit.support + metrics.report.fraud.support;
    assert_eq!(train_idx.len() + n_test, dataset().len());
    assert!((1199..=1201).contains(&n_test));
}

#[test]
fn test_run_writes_loadable_artifacts() {
    let dir = TempDir::new().unwrap();
    let config = artifact_config(&dir);
    let report = Trainer::new(config.clone(), "2.1.0").run().unwrap();

    assert!(config.data_path.exists());
    assert_eq!(report.n_train + report.n_test, 1500);
    assert_eq!(report.model_path, config.output_dir.join(MODEL_FILE));

    let loader = ModelLoader::new();
    let pipeline = loader.load_pipeline(&report.model_path).unwrap();
    assert_eq!(pipeline.model_version(), "2.1.0");
    assert_eq!(pipeline.metadata.artifact_id, report.artifact_id);
    assert_eq!(pipeline.forest.n_trees(), 10);
    assert_eq!(pipeline.forest.n_features(), 12);

    let sample = loader
        .load_reference_sample(config.output_dir.join(REFERENCE_SAMPLE_FILE))
        .unwrap();
    assert_eq!(sample.len(), 100);

    let names: Value =
        serde_json::from_str(&fs::read_to_string(config.output_dir.join(FEATURE_NAMES_FILE)).unwrap())
            .unwrap();
    let names = names.as_array().unwrap();
    assert_eq!(names.len(), 12);
    assert_eq!(names[0]["name"], "cat__channel_CARD");
    assert_eq!(names[0]["field"], "channel");

    let metrics: Value =
        serde_json::from_str(&fs::read_to_string(config.output_dir.join(METRICS_FILE)).unwrap())
            .unwrap();
    assert_eq!(metrics["roc_auc"].as_f64().unwrap(), report.metrics.roc_auc);
    assert!(metrics["report"]["weighted avg"]["support"].is_number());
}

#[test]
fn test_existing_dataset_is_reused() {
    let dir = TempDir::new().unwrap();
    let config = artifact_config(&dir);
    let rows = synthetic::generate(200, 3).unwrap();
    synthetic::write_csv(&config.data_path, &rows).unwrap();

    let loaded = Trainer::new(config, "1.0.0").ensure_data().unwrap();

    assert_eq!(loaded.len(), 200);
    assert_eq!(loaded[0].target, rows[0].target);
    assert_eq!(loaded[0].transaction.channel, rows[0].transaction.channel);
}
