//! Feature preprocessing: one-hot encoding of the channel plus standard
//! scaling of the numeric fields.
//!
//! Output columns are laid out as `cat__channel_<CATEGORY>` for every fitted
//! category (sorted), followed by `num__<field>` for every numeric field in
//! canonical order. The same layout is used at training and serving time.

use crate::types::transaction::{Channel, Transaction, TransactionField, N_FIELDS};
use serde::{Deserialize, Serialize};

/// A transformed feature name and the original field it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureOrigin {
    pub name: String,
    /// `None` when the name could not be traced back to a payload field.
    pub field: Option<TransactionField>,
}

/// Fitted preprocessing stage of the classifier pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    /// One-hot vocabulary seen during fit, sorted
    categories: Vec<Channel>,
    /// Per numeric field mean
    means: Vec<f64>,
    /// Per numeric field population standard deviation (0 replaced by 1)
    scales: Vec<f64>,
}

impl Preprocessor {
    /// Fit on original-space rows (see [`Transaction::to_row`]).
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let channel_idx = TransactionField::Channel.index();
        let categories: Vec<Channel> = Channel::ALL
            .into_iter()
            .filter(|c| {
                rows.iter()
                    .any(|r| Channel::from_code(r[channel_idx]) == Some(*c))
            })
            .collect();

        let n = rows.len().max(1) as f64;
        let mut means = Vec::with_capacity(N_FIELDS - 1);
        let mut scales = Vec::with_capacity(N_FIELDS - 1);
        for field in TransactionField::numeric() {
            let col = field.index();
            let mean = rows.iter().map(|r| r[col]).sum::<f64>() / n;
            let variance = rows.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            means.push(mean);
            scales.push(if std > 0.0 { std } else { 1.0 });
        }

        Self {
            categories,
            means,
            scales,
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.categories.is_empty() && self.means.len() == N_FIELDS - 1
    }

    /// Width of the transformed feature space.
    pub fn n_features_out(&self) -> usize {
        self.categories.len() + self.means.len()
    }

    /// Transform one original-space row.
    ///
    /// Channel codes outside the fitted vocabulary encode as all zeros.
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.n_features_out());

        let channel = Channel::from_code(row[TransactionField::Channel.index()]);
        for category in &self.categories {
            out.push(if channel == Some(*category) { 1.0 } else { 0.0 });
        }

        for (i, field) in TransactionField::numeric().enumerate() {
            out.push((row[field.index()] - self.means[i]) / self.scales[i]);
        }

        out
    }

    pub fn transform(&self, tx: &Transaction) -> Vec<f64> {
        self.transform_row(&tx.to_row())
    }

    /// Output feature names with their originating fields.
    ///
    /// Returns `None` when the preprocessor has not been fitted.
    pub fn feature_names_out(&self) -> Option<Vec<FeatureOrigin>> {
        if !self.is_fitted() {
            return None;
        }

        let categorical = self.categories.iter().map(|c| FeatureOrigin {
            name: format!("cat__{}_{}", TransactionField::Channel, c),
            field: Some(TransactionField::Channel),
        });
        let numeric = TransactionField::numeric().map(|f| FeatureOrigin {
            name: format!("num__{}", f),
            field: Some(f),
        });

        Some(categorical.chain(numeric).collect())
    }
}
