//! Prediction and explanation result structures

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Probability at or above which a transaction is labeled fraud.
pub const FRAUD_THRESHOLD: f64 = 0.5;

/// Result of scoring one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    /// 1 when `proba >= FRAUD_THRESHOLD`
    pub label: u8,
    /// Fraud probability (0.0 - 1.0)
    pub proba: f64,
    /// Version of the model that produced the score
    pub model_version: String,
}

impl PredictionResult {
    pub fn from_proba(proba: f64, model_version: impl Into<String>) -> Self {
        Self {
            label: u8::from(proba >= FRAUD_THRESHOLD),
            proba,
            model_version: model_version.into(),
        }
    }

    pub fn is_fraud(&self) -> bool {
        self.label == 1
    }
}

/// Direction in which a feature moved the fraud probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Increase,
    Decrease,
}

impl Impact {
    /// `Increase` only for strictly positive attributions.
    pub fn from_attribution(value: f64) -> Self {
        if value > 0.0 {
            Impact::Increase
        } else {
            Impact::Decrease
        }
    }
}

/// One contributing feature of an explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationItem {
    /// Transformed-space name (SHAP) or original-space condition (LIME)
    pub feature: String,

    /// Recovered original field value; SHAP only, `null` when unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shap_value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    pub impact: Impact,
}

impl ExplanationItem {
    pub fn shap(feature: impl Into<String>, value: Value, shap_value: f64) -> Self {
        Self {
            feature: feature.into(),
            value: Some(value),
            shap_value: Some(shap_value),
            weight: None,
            impact: Impact::from_attribution(shap_value),
        }
    }

    pub fn lime(feature: impl Into<String>, weight: f64) -> Self {
        Self {
            feature: feature.into(),
            value: None,
            shap_value: None,
            weight: Some(weight),
            impact: Impact::from_attribution(weight),
        }
    }

    /// The signed attribution, whichever explainer produced it.
    pub fn attribution(&self) -> f64 {
        self.shap_value.or(self.weight).unwrap_or(0.0)
    }
}

/// Indices of the `k` largest absolute values, ties broken by lower index.
pub fn top_k_by_magnitude(values: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .abs()
            .partial_cmp(&values[a].abs())
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    order.truncate(k);
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_threshold_is_inclusive() {
        assert_eq!(PredictionResult::from_proba(0.5, "1.0.0").label, 1);
        assert_eq!(PredictionResult::from_proba(0.4999999, "1.0.0").label, 0);
        assert!(PredictionResult::from_proba(0.93, "1.0.0").is_fraud());
    }

    #[test]
    fn test_impact_from_sign() {
        assert_eq!(Impact::from_attribution(0.1), Impact::Increase);
        assert_eq!(Impact::from_attribution(0.0), Impact::Decrease);
        assert_eq!(Impact::from_attribution(-0.3), Impact::Decrease);
    }

    #[test]
    fn test_top_k_breaks_ties_by_index() {
        let values = [0.1, -0.5, 0.5, 0.0, -0.2];
        assert_eq!(top_k_by_magnitude(&values, 3), vec![1, 2, 4]);
        assert_eq!(top_k_by_magnitude(&values, 10).len(), 5);
    }

    #[test]
    fn test_item_serialization_omits_other_explainer_fields() {
        let shap = serde_json::to_value(ExplanationItem::shap("num__hour", Value::Null, -0.02)).unwrap();
        assert_eq!(shap["value"], Value::Null);
        assert_eq!(shap["impact"], "decrease");
        assert!(shap.get("weight").is_none());

        let lime = serde_json::to_value(ExplanationItem::lime("channel=PIX", 0.07)).unwrap();
        assert!(lime.get("value").is_none());
        assert!(lime.get("shap_value").is_none());
        assert_eq!(lime["impact"], "increase");
    }
}
