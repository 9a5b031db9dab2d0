//! Fraud prediction over the shared classifier pipeline

use crate::models::pipeline::ClassifierPipeline;
use crate::types::explanation::PredictionResult;
use crate::types::transaction::Transaction;
use std::sync::Arc;
use tracing::debug;

/// Scores transactions with the trained pipeline.
#[derive(Clone)]
pub struct InferenceEngine {
    pipeline: Arc<ClassifierPipeline>,
}

impl InferenceEngine {
    pub fn new(pipeline: Arc<ClassifierPipeline>) -> Self {
        Self { pipeline }
    }

    /// Label and probability for one validated transaction.
    pub fn predict(&self, tx: &Transaction) -> PredictionResult {
        let proba = self.pipeline.predict_proba(tx);
        let result = PredictionResult::from_proba(proba, self.pipeline.model_version());

        debug!(
            proba = result.proba,
            label = result.label,
            channel = %tx.channel,
            "Transaction scored"
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::forest::{RandomForest, Tree};
    use crate::models::pipeline::ModelMetadata;
    use crate::preprocessor::Preprocessor;
    use crate::types::transaction::TransactionPayload;
    use uuid::Uuid;

    fn tx(velocity: i64) -> Transaction {
        Transaction::try_from(TransactionPayload {
            amount: 50.0,
            channel: "CARD".to_string(),
            hour: 10,
            is_new_device: 0,
            device_trust_score: 0.8,
            days_since_last_tx: 1.0,
            tx_velocity_1h: velocity,
            merchant_risk_score: 0.2,
            customer_age: 40,
            has_chargeback_history: 0,
            country_risk_score: 0.1,
        })
        .unwrap()
    }

    /// Stump on scaled velocity: one CARD column, then amount, hour,
    /// is_new_device, device_trust_score, days_since_last_tx, velocity.
    fn pipeline() -> ClassifierPipeline {
        let rows = vec![tx(0).to_row(), tx(2).to_row()];
        let preprocessor = Preprocessor::fit(&rows);

        let mut tree = Tree::new(2);
        let root = tree.push_split(6, 0.0, 10.0, &[0.5, 0.5]);
        let l = tree.push_leaf(5.0, &[0.8, 0.2]);
        let r = tree.push_leaf(5.0, &[0.3, 0.7]);
        tree.set_children(root, l, r);

        ClassifierPipeline {
            metadata: ModelMetadata {
                artifact_id: Uuid::nil(),
                model_version: "1.0.0".to_string(),
                trained_at: chrono::Utc::now(),
                seed: 0,
                n_training_rows: 2,
                roc_auc: 1.0,
            },
            forest: RandomForest::from_trees(preprocessor.n_features_out(), vec![tree]),
            preprocessor,
            feature_map: None,
        }
    }

    #[test]
    fn test_predict_thresholds_probability() {
        let engine = InferenceEngine::new(Arc::new(pipeline()));

        let low = engine.predict(&tx(0));
        assert_eq!(low.label, 0);
        assert!((low.proba - 0.2).abs() < 1e-12);

        let high = engine.predict(&tx(2));
        assert_eq!(high.label, 1);
        assert_eq!(high.model_version, "1.0.0");
    }

    #[test]
    fn test_predict_at_threshold_is_fraud() {
        let engine = InferenceEngine::new(Arc::new(pipeline()));
        let results: Vec<u8> = [tx(0), tx(2), tx(5)].iter().map(|t| engine.predict(t).label).collect();
        assert_eq!(results, vec![0, 1, 1]);
    }
}
