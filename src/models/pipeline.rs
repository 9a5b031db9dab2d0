//! The trained two-stage classifier pipeline (preprocessor + forest)

use crate::models::forest::RandomForest;
use crate::preprocessor::{FeatureOrigin, Preprocessor};
use crate::types::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provenance recorded when the pipeline was trained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Unique identifier of this training run
    pub artifact_id: Uuid,
    /// Version string reported with every prediction
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    /// Seed used for data generation, splitting and tree construction
    pub seed: u64,
    pub n_training_rows: usize,
    /// Held-out ROC AUC
    pub roc_auc: f64,
}

/// Serialized pipeline artifact.
///
/// Loaded once at startup and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierPipeline {
    pub metadata: ModelMetadata,
    pub preprocessor: Preprocessor,
    pub forest: RandomForest,
    /// Transformed name -> originating field table, built at training time
    #[serde(default)]
    pub feature_map: Option<Vec<FeatureOrigin>>,
}

impl ClassifierPipeline {
    /// Fraud probability for a validated transaction.
    pub fn predict_proba(&self, tx: &Transaction) -> f64 {
        self.forest.predict_proba(&self.preprocessor.transform(tx))
    }

    /// Fraud probabilities for raw original-space rows, the channel column
    /// carrying its categorical code.
    pub fn predict_proba_rows(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter()
            .map(|row| self.forest.predict_proba(&self.preprocessor.transform_row(row)))
            .collect()
    }

    /// Run the preprocessor stage only.
    pub fn transform(&self, tx: &Transaction) -> Vec<f64> {
        self.preprocessor.transform(tx)
    }

    pub fn model_version(&self) -> &str {
        &self.metadata.model_version
    }
}
