//! Artifact loader for the classifier pipeline and the reference sample

use crate::error::ArtifactError;
use crate::models::pipeline::ClassifierPipeline;
use crate::types::transaction::Transaction;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

/// Loader for persisted training artifacts
#[derive(Debug, Default)]
pub struct ModelLoader;

impl ModelLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load the pipeline artifact (`model.json`).
    pub fn load_pipeline<P: AsRef<Path>>(&self, path: P) -> Result<ClassifierPipeline, ArtifactError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading classifier pipeline");

        let file = File::open(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let pipeline: ClassifierPipeline =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| ArtifactError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        let width_out = pipeline.preprocessor.n_features_out();
        let width_in = pipeline.forest.n_features();
        if pipeline.preprocessor.is_fitted() && width_out != width_in {
            return Err(ArtifactError::Incompatible(format!(
                "preprocessor emits {} features, forest expects {}",
                width_out, width_in
            )));
        }
        if pipeline.forest.n_trees() == 0 {
            return Err(ArtifactError::Incompatible("forest has no trees".to_string()));
        }

        info!(
            artifact_id = %pipeline.metadata.artifact_id,
            model_version = %pipeline.metadata.model_version,
            trees = pipeline.forest.n_trees(),
            features = width_in,
            roc_auc = pipeline.metadata.roc_auc,
            "Classifier pipeline loaded"
        );

        Ok(pipeline)
    }

    /// Load the reference sample (`train_sample.csv`), original-space rows
    /// with one header line.
    pub fn load_reference_sample<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Transaction>, ArtifactError> {
        let path = path.as_ref();
        let csv_error = |source| ArtifactError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
        let rows = reader
            .deserialize::<Transaction>()
            .collect::<Result<Vec<_>, csv::Error>>()
            .map_err(csv_error)?;

        info!(path = %path.display(), rows = rows.len(), "Reference sample loaded");
        Ok(rows)
    }

    /// Like [`ModelLoader::load_reference_sample`], but a missing or
    /// unreadable sample is logged and reported as `None`.
    pub fn load_reference_sample_or_warn<P: AsRef<Path>>(&self, path: P) -> Option<Vec<Transaction>> {
        let path = path.as_ref();
        match self.load_reference_sample(path) {
            Ok(rows) if !rows.is_empty() => Some(rows),
            Ok(_) => {
                warn!(path = %path.display(), "Reference sample is empty, LIME will use the single-row fallback");
                None
            }
            Err(e) => {
                warn!(error = %e, "Reference sample unavailable, LIME will use the single-row fallback");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_pipeline_is_an_error() {
        let err = ModelLoader::new()
            .load_pipeline("/nonexistent/model.json")
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Io { .. }));
    }

    #[test]
    fn test_reference_sample_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train_sample.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(
            file,
            "amount,channel,hour,is_new_device,device_trust_score,days_since_last_tx,tx_velocity_1h,merchant_risk_score,customer_age,has_chargeback_history,country_risk_score"
        )
        .unwrap();
        writeln!(file, "120.5,PIX,3,1,0.4,2.5,1,0.6,33,0,0.2").unwrap();
        writeln!(file, "80.0,CARD,14,0,0.9,0.3,0,0.1,51,1,0.5").unwrap();
        drop(file);

        let rows = ModelLoader::new().load_reference_sample(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].customer_age, 51);
    }

    #[test]
    fn test_missing_reference_sample_falls_back() {
        assert!(ModelLoader::new()
            .load_reference_sample_or_warn("/nonexistent/train_sample.csv")
            .is_none());
    }
}
