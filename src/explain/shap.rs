//! SHAP explainer adapter: TreeSHAP attributions in the transformed space

use crate::explain::feature_names::FeatureNames;
use crate::explain::tree_shap::TreeExplainer;
use crate::models::pipeline::ClassifierPipeline;
use crate::types::explanation::{top_k_by_magnitude, ExplanationItem};
use crate::types::transaction::{Transaction, TransactionField};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Index of the fraud class in the forest output
pub const POSITIVE_CLASS: usize = 1;

#[derive(Debug, thiserror::Error)]
#[error("SHAP explanation failed: {0}")]
pub struct ShapExplainError(#[from] crate::explain::tree_shap::ShapError);

/// Explains predictions with exact TreeSHAP over the forest stage.
#[derive(Clone)]
pub struct ShapExplainer {
    pipeline: Arc<ClassifierPipeline>,
    names: Arc<FeatureNames>,
    base_values: Vec<f64>,
}

impl ShapExplainer {
    pub fn new(pipeline: Arc<ClassifierPipeline>, names: Arc<FeatureNames>) -> Self {
        let base_values = TreeExplainer::new(&pipeline.forest).base_values().to_vec();
        Self {
            pipeline,
            names,
            base_values,
        }
    }

    /// Expected fraud probability over the training distribution.
    pub fn base_value(&self) -> f64 {
        self.base_values
            .get(POSITIVE_CLASS)
            .or_else(|| self.base_values.first())
            .copied()
            .unwrap_or(0.0)
    }

    /// Top `top_k` transformed features by absolute attribution.
    pub fn explain(&self, tx: &Transaction, top_k: usize) -> Result<Vec<ExplanationItem>, ShapExplainError> {
        let row = self.pipeline.transform(tx);
        let raw = TreeExplainer::new(&self.pipeline.forest).shap_values(&row)?;
        let mut attributions = raw.into_attributions(&self.base_values, POSITIVE_CLASS)?;

        let n = attributions.values.len().min(self.names.len());
        if attributions.values.len() != self.names.len() {
            warn!(
                attributions = attributions.values.len(),
                names = self.names.len(),
                "Attribution and feature name lengths differ, truncating"
            );
        }
        attributions.values.truncate(n);

        let items: Vec<ExplanationItem> = top_k_by_magnitude(&attributions.values, top_k)
            .into_iter()
            .map(|i| {
                let name = self.names.name(i).unwrap_or_default();
                let value = recover_value(tx, self.names.origin(i));
                ExplanationItem::shap(name, value, attributions.values[i])
            })
            .collect();

        debug!(
            base_value = attributions.base_value,
            returned = items.len(),
            "SHAP explanation computed"
        );
        Ok(items)
    }
}

fn recover_value(tx: &Transaction, origin: Option<TransactionField>) -> Value {
    match origin {
        Some(field) => tx.field_value(field),
        None => Value::Null,
    }
}
